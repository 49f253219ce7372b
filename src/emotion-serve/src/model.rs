use std::path::Path;

use log::info;
use tensorflow::{Graph, SavedModelBundle, SessionOptions, SessionRunArgs, Tensor};

use crate::error::{Error, Result};
use crate::preprocess::PixelValues;
use crate::timer::Timer;

/// Anything that maps model input to one unnormalized score per label.
pub trait EmotionModel: Send + Sync {
    fn logits(&self, pixels: &PixelValues) -> Result<Vec<f32>>;
}

/// Max-subtracted softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.iter().map(|&x| x / sum).collect()
}

/// Names used to find the graph's input and output tensors.
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    pub signature: String,
    pub input: String,
    pub output: String,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        SignatureConfig {
            signature: "serving_default".to_owned(),
            input: "pixel_values".to_owned(),
            output: "logits".to_owned(),
        }
    }
}

#[derive(Debug)]
struct Endpoint {
    operation: String,
    index: i32,
}

/// Image classification model exported as a TensorFlow SavedModel
pub struct SavedModel {
    /// TensorFlow model graph
    graph: Graph,

    /// Loaded bundle, owns the session
    bundle: SavedModelBundle,

    input: Endpoint,
    output: Endpoint,
}

impl SavedModel {
    pub fn load(export_dir: &Path, signature: &SignatureConfig) -> Result<Self> {
        let t = Timer::start("Loading SavedModel");

        let mut graph = Graph::new();
        let bundle =
            SavedModelBundle::load(&SessionOptions::new(), &["serve"], &mut graph, export_dir)?;

        let def = bundle
            .meta_graph_def()
            .get_signature(&signature.signature)
            .map_err(|_| Error::Signature(format!("no signature '{}'", signature.signature)))?;

        let input = def
            .get_input(&signature.input)
            .map(|info| Endpoint {
                operation: info.name().name.clone(),
                index: info.name().index,
            })
            .map_err(|_| Error::Signature(format!("no input '{}'", signature.input)))?;
        let output = def
            .get_output(&signature.output)
            .map(|info| Endpoint {
                operation: info.name().name.clone(),
                index: info.name().index,
            })
            .map_err(|_| Error::Signature(format!("no output '{}'", signature.output)))?;

        // both endpoints must resolve in the loaded graph
        graph.operation_by_name_required(&input.operation)?;
        graph.operation_by_name_required(&output.operation)?;

        for device in bundle.session.device_list()? {
            info!("Session device: {} ({})", device.name, device.device_type);
        }

        t.stop();

        Ok(SavedModel {
            graph,
            bundle,
            input,
            output,
        })
    }
}

impl EmotionModel for SavedModel {
    fn logits(&self, pixels: &PixelValues) -> Result<Vec<f32>> {
        let t = Timer::start("Running session");

        let input = Tensor::new(&pixels.shape()).with_values(pixels.as_slice())?;

        let mut args = SessionRunArgs::new();
        args.add_feed(
            &self.graph.operation_by_name_required(&self.input.operation)?,
            self.input.index,
            &input,
        );
        let result = args.request_fetch(
            &self.graph.operation_by_name_required(&self.output.operation)?,
            self.output.index,
        );

        self.bundle.session.run(&mut args)?;
        let output: Tensor<f32> = args.fetch(result)?;

        t.stop();

        // batch of one: the first row holds every class score
        let classes = output.dims().last().copied().unwrap_or(0) as usize;
        Ok(output[..classes].to_vec())
    }
}
