//! Model directory layout and the JSON files that describe the model.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};

pub const MODEL_CONFIG: &str = "config.json";
pub const PREPROCESSOR_CONFIG: &str = "preprocessor_config.json";

/// Where `save_pretrained(saved_model=True)` puts the exported graph
pub const SAVED_MODEL_SUBDIR: &str = "saved_model/1";

const SAVED_MODEL_PB: &str = "saved_model.pb";

/// Fixed, index-ordered emotion names of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Labels(Vec<String>);

impl Labels {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::InvalidLabels("label set is empty".to_owned()));
        }
        Ok(Labels(names))
    }

    /// Build from an `id2label` map, whose keys must be exactly `0..n`.
    pub fn from_id2label(id2label: HashMap<String, String>) -> Result<Self> {
        let mut indexed = id2label
            .into_iter()
            .map(|(id, name)| {
                id.trim()
                    .parse::<usize>()
                    .map(|idx| (idx, name))
                    .map_err(|_| Error::InvalidLabels(format!("non-integer label id '{}'", id)))
            })
            .collect::<Result<Vec<_>>>()?;

        indexed.sort_by_key(|(idx, _)| *idx);

        for (expected, (idx, _)) in indexed.iter().enumerate() {
            if *idx != expected {
                return Err(Error::InvalidLabels(format!(
                    "label ids are not contiguous: expected {}, found {}",
                    expected, idx
                )));
            }
        }

        Labels::new(indexed.into_iter().map(|(_, name)| name).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct ModelConfig {
    id2label: HashMap<String, String>,
}

/// Target size of the resize step. Processors write either a bare integer or
/// an explicit height/width pair.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ImageSize {
    Square(u32),
    Exact { height: u32, width: u32 },
}

impl ImageSize {
    /// `(width, height)`
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            ImageSize::Square(side) => (side, side),
            ImageSize::Exact { height, width } => (width, height),
        }
    }
}

/// Image processor settings, with the ViT processor defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreprocessorConfig {
    pub do_resize: bool,
    pub size: ImageSize,
    /// PIL resampling filter code
    pub resample: u8,
    pub do_rescale: bool,
    pub rescale_factor: f32,
    pub do_normalize: bool,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        PreprocessorConfig {
            do_resize: true,
            size: ImageSize::Exact {
                height: 224,
                width: 224,
            },
            resample: 2,
            do_rescale: true,
            rescale_factor: 1.0 / 255.0,
            do_normalize: true,
            image_mean: [0.5; 3],
            image_std: [0.5; 3],
        }
    }
}

impl PreprocessorConfig {
    pub fn filter(&self) -> FilterType {
        match self.resample {
            0 => FilterType::Nearest,
            1 => FilterType::Lanczos3,
            3 => FilterType::CatmullRom,
            // bilinear; box and hamming have no direct counterpart either
            _ => FilterType::Triangle,
        }
    }
}

/// A model directory on disk: configs plus the exported SavedModel.
#[derive(Debug, Clone)]
pub struct ModelDir {
    root: PathBuf,
    saved_model: PathBuf,
}

impl ModelDir {
    pub fn open(root: &Path) -> Result<Self> {
        let config = root.join(MODEL_CONFIG);
        if !config.is_file() {
            return Err(Error::MissingArtifact(config));
        }

        let nested = root.join(SAVED_MODEL_SUBDIR);
        let saved_model = if nested.join(SAVED_MODEL_PB).is_file() {
            nested
        } else if root.join(SAVED_MODEL_PB).is_file() {
            root.to_path_buf()
        } else {
            return Err(Error::MissingArtifact(nested.join(SAVED_MODEL_PB)));
        };

        debug!("Using SavedModel at {}", saved_model.display());

        Ok(ModelDir {
            root: root.to_path_buf(),
            saved_model,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn saved_model(&self) -> &Path {
        &self.saved_model
    }

    pub fn labels(&self) -> Result<Labels> {
        let config: ModelConfig = read_json(&self.root.join(MODEL_CONFIG))?;
        Labels::from_id2label(config.id2label)
    }

    pub fn preprocessor_config(&self) -> Result<PreprocessorConfig> {
        let path = self.root.join(PREPROCESSOR_CONFIG);
        if !path.is_file() {
            warn!("{} not found, using default preprocessing", path.display());
            return Ok(PreprocessorConfig::default());
        }
        read_json(&path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
