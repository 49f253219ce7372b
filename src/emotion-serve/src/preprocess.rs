use std::borrow::Cow;

use image::imageops;
use image::RgbImage;

use crate::config::PreprocessorConfig;
use crate::timer::Timer;

/// Model input: one image as a `[1, 3, height, width]` channel-first tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelValues {
    data: Vec<f32>,
    height: u32,
    width: u32,
}

impl PixelValues {
    pub fn new(data: Vec<f32>, height: u32, width: u32) -> Self {
        debug_assert_eq!(data.len(), 3 * height as usize * width as usize);
        PixelValues {
            data,
            height,
            width,
        }
    }

    pub fn shape(&self) -> [u64; 4] {
        [1, 3, u64::from(self.height), u64::from(self.width)]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Values of one colour channel, row-major
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height as usize * self.width as usize;
        &self.data[c * plane..(c + 1) * plane]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessorConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessorConfig) -> Self {
        Preprocessor { config }
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    /// Resize, rescale and normalize an RGB image into model input.
    pub fn apply(&self, image: &RgbImage) -> PixelValues {
        let t = Timer::start("Preprocessing image");

        let resized = self.resize(image);
        let (width, height) = resized.dimensions();
        let plane = width as usize * height as usize;

        let mut data = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                data[c * plane + i] = self.scale(c, pixel[c]);
            }
        }

        t.stop();

        PixelValues::new(data, height, width)
    }

    fn resize<'a>(&self, image: &'a RgbImage) -> Cow<'a, RgbImage> {
        let (width, height) = self.config.size.dimensions();

        if !self.config.do_resize || image.dimensions() == (width, height) {
            return Cow::Borrowed(image);
        }

        Cow::Owned(imageops::resize(
            image,
            width,
            height,
            self.config.filter(),
        ))
    }

    fn scale(&self, channel: usize, value: u8) -> f32 {
        let mut x = f32::from(value);
        if self.config.do_rescale {
            x *= self.config.rescale_factor;
        }
        if self.config.do_normalize {
            x = (x - self.config.image_mean[channel]) / self.config.image_std[channel];
        }
        x
    }
}
