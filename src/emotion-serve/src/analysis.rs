use std::io::Read;

use chrono::{DateTime, Timelike, Utc};
use image::RgbImage;
use log::info;
use serde::{Serialize, Serializer};

use crate::config::{Labels, ModelDir};
use crate::decode::{decode_base64, load_rgb};
use crate::error::{Error, Result};
use crate::model::{softmax, EmotionModel, SavedModel, SignatureConfig};
use crate::preprocess::Preprocessor;
use crate::timer::Timer;

pub const ANALYSIS_METHOD: &str = "huggingface-vit";

pub const DEFAULT_MODEL_ID: &str = "mo-thecreator/vit-Facial-Expression-Recognition";

/// How many ranked predictions a response carries
pub const TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub emotion: String,
    pub score: f64,
    pub percentage: f64,
}

impl Prediction {
    fn new(emotion: &str, probability: f32) -> Self {
        let score = f64::from(probability);
        Prediction {
            emotion: emotion.to_owned(),
            score,
            percentage: score * 100.0,
        }
    }
}

/// Response envelope of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionAnalysis {
    /// Highest scoring emotion
    pub emotion: String,

    /// Its probability
    pub confidence: f64,

    /// Best predictions, highest score first
    pub predictions: Vec<Prediction>,

    pub analysis_method: &'static str,

    pub model_used: String,

    #[serde(serialize_with = "naive_isoformat")]
    pub timestamp: DateTime<Utc>,
}

impl EmotionAnalysis {
    /// Rank `probabilities` (in label order) and build the envelope.
    ///
    /// Ties keep label order, so the lowest index wins among equal scores.
    pub fn rank(
        probabilities: &[f32],
        labels: &Labels,
        model_used: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if probabilities.len() != labels.len() {
            return Err(Error::LabelMismatch {
                scores: probabilities.len(),
                labels: labels.len(),
            });
        }

        let mut predictions: Vec<Prediction> = labels
            .iter()
            .zip(probabilities)
            .map(|(emotion, p)| Prediction::new(emotion, *p))
            .collect();

        // stable: equal scores stay in label order
        predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
        predictions.truncate(TOP_K);

        let top = &predictions[0];

        Ok(EmotionAnalysis {
            emotion: top.emotion.clone(),
            confidence: top.score,
            analysis_method: ANALYSIS_METHOD,
            model_used: model_used.to_owned(),
            timestamp,
            predictions,
        })
    }
}

/// `YYYY-MM-DDTHH:MM:SS[.ffffff]`, UTC without offset; the fraction is left
/// out when the microseconds are zero.
fn naive_isoformat<S>(ts: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let formatted = if ts.nanosecond() / 1_000 == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    };
    serializer.serialize_str(&formatted)
}

/// Everything needed to analyze an image, built once and shared read-only.
pub struct EmotionAnalyzer<M = SavedModel> {
    model: M,
    preprocessor: Preprocessor,
    labels: Labels,
    model_id: String,
}

impl EmotionAnalyzer<SavedModel> {
    /// Load labels, preprocessing and graph from a model directory.
    pub fn load(dir: &ModelDir, model_id: &str, signature: &SignatureConfig) -> Result<Self> {
        let labels = dir.labels()?;
        let preprocessor = Preprocessor::new(dir.preprocessor_config()?);
        let model = SavedModel::load(dir.saved_model(), signature)?;

        info!(
            "Loaded {} from {} with {} labels",
            model_id,
            dir.root().display(),
            labels.len()
        );

        Ok(EmotionAnalyzer::new(model, preprocessor, labels, model_id))
    }
}

impl<M: EmotionModel> EmotionAnalyzer<M> {
    pub fn new(model: M, preprocessor: Preprocessor, labels: Labels, model_id: &str) -> Self {
        EmotionAnalyzer {
            model,
            preprocessor,
            labels,
            model_id: model_id.to_owned(),
        }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Probability of every label, in label order
    pub fn probabilities(&self, image: &RgbImage) -> Result<Vec<f32>> {
        let pixels = self.preprocessor.apply(image);
        let logits = self.model.logits(&pixels)?;

        if logits.len() != self.labels.len() {
            return Err(Error::LabelMismatch {
                scores: logits.len(),
                labels: self.labels.len(),
            });
        }

        Ok(softmax(&logits))
    }

    pub fn analyze_image(&self, image: &RgbImage) -> Result<EmotionAnalysis> {
        let probabilities = self.probabilities(image)?;
        EmotionAnalysis::rank(&probabilities, &self.labels, &self.model_id, Utc::now())
    }

    pub fn analyze_bytes(&self, data: &[u8]) -> Result<EmotionAnalysis> {
        let t = Timer::start("Load image from memory");
        let image = load_rgb(data)?;
        t.stop();

        self.analyze_image(&image)
    }

    pub fn analyze_base64(&self, payload: &str) -> Result<EmotionAnalysis> {
        let data = decode_base64(payload)?;
        self.analyze_bytes(&data)
    }

    pub fn analyze_url(&self, url: &str) -> Result<EmotionAnalysis> {
        let t = Timer::start(&format!("Fetching image from {}", url));

        let mut buf: Vec<u8> = vec![];
        reqwest::blocking::get(url)?
            .error_for_status()?
            .read_to_end(&mut buf)?;

        t.stop();

        self.analyze_bytes(&buf)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use image::{DynamicImage, Rgb};

    use super::*;
    use crate::decode::tests::png_bytes;
    use crate::preprocess::PixelValues;

    fn fer_labels() -> Labels {
        Labels::new(
            ["anger", "disgust", "fear", "happy", "neutral", "sad", "surprise"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap()
    }

    /// Derives scores from the channel means: different colours rank
    /// differently, the same image always ranks the same.
    struct ChannelMeans;

    impl EmotionModel for ChannelMeans {
        fn logits(&self, pixels: &PixelValues) -> Result<Vec<f32>> {
            let mean = |c: usize| {
                let ch = pixels.channel(c);
                ch.iter().sum::<f32>() / ch.len() as f32
            };
            let (r, g, b) = (mean(0), mean(1), mean(2));
            Ok(vec![r, g, b, r - g, g - b, b - r, 0.5])
        }
    }

    struct Fixed(Vec<f32>);

    impl EmotionModel for Fixed {
        fn logits(&self, _: &PixelValues) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    fn at(micros: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 9, 3, 7).unwrap()
            + chrono::Duration::microseconds(i64::from(micros))
    }

    fn analyzer<M: EmotionModel>(model: M) -> EmotionAnalyzer<M> {
        EmotionAnalyzer::new(model, Preprocessor::default(), fer_labels(), DEFAULT_MODEL_ID)
    }

    fn reddish() -> RgbImage {
        RgbImage::from_pixel(32, 48, Rgb([220, 40, 90]))
    }

    #[test]
    fn ranking_is_sorted_and_truncated() {
        let probs = [0.05, 0.02, 0.1, 0.6, 0.15, 0.07, 0.01];
        let analysis =
            EmotionAnalysis::rank(&probs, &fer_labels(), DEFAULT_MODEL_ID, at(0)).unwrap();

        let names: Vec<_> = analysis.predictions.iter().map(|p| p.emotion.as_str()).collect();
        assert_eq!(names, ["happy", "neutral", "fear", "sad", "anger"]);
        assert_eq!(analysis.emotion, "happy");
        assert_eq!(analysis.confidence, analysis.predictions[0].score);
        assert!(analysis
            .predictions
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
        for p in &analysis.predictions {
            assert!((p.percentage - p.score * 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ties_keep_label_order() {
        let probs = [0.1, 0.3, 0.1, 0.3, 0.1, 0.05, 0.05];
        let analysis = EmotionAnalysis::rank(&probs, &fer_labels(), "m", at(0)).unwrap();

        let names: Vec<_> = analysis.predictions.iter().map(|p| p.emotion.as_str()).collect();
        assert_eq!(names, ["disgust", "happy", "anger", "fear", "neutral"]);
        assert_eq!(analysis.emotion, "disgust");
    }

    #[test]
    fn small_label_sets_are_not_padded() {
        let labels = Labels::new(vec!["calm".to_owned(), "upset".to_owned()]).unwrap();
        let analysis = EmotionAnalysis::rank(&[0.25, 0.75], &labels, "m", at(0)).unwrap();

        assert_eq!(analysis.predictions.len(), 2);
        assert_eq!(analysis.emotion, "upset");
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let err = EmotionAnalysis::rank(&[1.0], &fer_labels(), "m", at(0)).unwrap_err();
        assert!(matches!(err, Error::LabelMismatch { scores: 1, labels: 7 }));

        let err = analyzer(Fixed(vec![0.0; 3])).analyze_image(&reddish()).unwrap_err();
        assert!(matches!(err, Error::LabelMismatch { scores: 3, labels: 7 }));
    }

    #[test]
    fn envelope_serializes_with_fixed_metadata() {
        let probs = [0.05, 0.02, 0.1, 0.6, 0.15, 0.07, 0.01];
        let analysis =
            EmotionAnalysis::rank(&probs, &fer_labels(), DEFAULT_MODEL_ID, at(250)).unwrap();
        let json = serde_json::to_value(&analysis).unwrap();

        assert_eq!(json["analysis_method"], "huggingface-vit");
        assert_eq!(json["model_used"], DEFAULT_MODEL_ID);
        assert_eq!(json["timestamp"], "2024-05-17T09:03:07.000250");
        assert_eq!(json["emotion"], "happy");
        assert_eq!(json["predictions"].as_array().unwrap().len(), 5);
        assert_eq!(json["predictions"][0]["emotion"], "happy");
    }

    #[test]
    fn whole_second_timestamps_have_no_fraction() {
        let analysis = EmotionAnalysis::rank(&[1.0; 7], &fer_labels(), "m", at(0)).unwrap();
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["timestamp"], "2024-05-17T09:03:07");
    }

    #[test]
    fn probabilities_sum_to_one() {
        let probs = analyzer(ChannelMeans).probabilities(&reddish()).unwrap();
        assert_eq!(probs.len(), 7);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn base64_analysis_is_deterministic() {
        let png = png_bytes(DynamicImage::ImageRgb8(reddish()));
        let payload = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &png);
        let analyzer = analyzer(ChannelMeans);

        let first = analyzer.analyze_base64(&payload).unwrap();
        let second = analyzer.analyze_base64(&payload).unwrap();

        assert_eq!(first.predictions, second.predictions);
        assert_eq!(first.predictions.len(), 5);
        // red minus green is the largest logit for this colour
        assert_eq!(first.emotion, "happy");
    }

    #[test]
    fn malformed_input_is_reported() {
        let analyzer = analyzer(ChannelMeans);

        assert!(matches!(analyzer.analyze_base64("%%%"), Err(Error::Base64(_))));
        assert!(matches!(analyzer.analyze_bytes(b"GIF89a"), Err(Error::Image(_))));
    }
}
