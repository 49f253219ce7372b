//! Turning request payloads into RGB rasters.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use image::RgbImage;

use crate::error::Result;

/// Standard alphabet, padded, tolerant of non-zero trailing bits.
const PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// Decode a base64 payload. ASCII whitespace (line wrapping) is skipped.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    Ok(PAYLOAD.decode(compact)?)
}

/// Load an encoded image of any supported format as 8-bit RGB.
pub fn load_rgb(data: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(data)?.to_rgb8())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use image::{DynamicImage, GrayAlphaImage, ImageFormat, LumaA, Rgb, RgbImage};

    use super::*;
    use crate::error::Error;

    pub(crate) fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decodes_wrapped_payload() {
        let encoded = STANDARD.encode(b"facial expression");
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!(" {}\r\n{}\n", head, tail);

        assert_eq!(decode_base64(&wrapped).unwrap(), b"facial expression");
    }

    #[test]
    fn accepts_non_canonical_trailing_bits() {
        // "QR==" carries bits past the single decoded byte
        assert_eq!(decode_base64("QR==").unwrap(), vec![0x41]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode_base64("not base64!"), Err(Error::Base64(_))));
        assert!(matches!(decode_base64("QQ"), Err(Error::Base64(_))));
    }

    #[test]
    fn loads_png_as_rgb() {
        let png = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            3,
            2,
            Rgb([10, 20, 30]),
        )));

        let rgb = load_rgb(&png).unwrap();
        assert_eq!(rgb.dimensions(), (3, 2));
        assert_eq!(rgb.get_pixel(2, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn grey_alpha_is_expanded_and_alpha_dropped() {
        let png = png_bytes(DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(
            1,
            1,
            LumaA([200, 0]),
        )));

        assert_eq!(load_rgb(&png).unwrap().get_pixel(0, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn rejects_non_image_bytes() {
        assert!(matches!(
            load_rgb(b"definitely not a picture"),
            Err(Error::Image(_))
        ));
    }
}
