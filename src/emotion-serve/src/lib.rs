//! Facial expression analysis on top of a TensorFlow image classifier.
//!
//! An [`EmotionAnalyzer`] bundles the loaded model, its preprocessing and its
//! label set. It is built once and then shared read-only by every request.

pub mod analysis;
pub mod config;
pub mod decode;
pub mod error;
pub mod model;
pub mod preprocess;
pub mod timer;

pub use analysis::{
    EmotionAnalysis, EmotionAnalyzer, Prediction, ANALYSIS_METHOD, DEFAULT_MODEL_ID, TOP_K,
};
pub use config::{Labels, ModelDir, PreprocessorConfig};
pub use error::{Error, Result};
pub use model::{softmax, EmotionModel, SavedModel, SignatureConfig};
pub use preprocess::{PixelValues, Preprocessor};
pub use timer::Timer;
