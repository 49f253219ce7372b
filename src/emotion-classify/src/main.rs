use std::error::Error;
use std::fs;
use std::path::PathBuf;

use emotion_serve::{
    EmotionAnalysis, EmotionAnalyzer, ModelDir, SignatureConfig, DEFAULT_MODEL_ID,
};
use log::info;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "emotion-classify",
    about = "CLI app to rank the facial expressions in an image"
)]
struct CmdArgs {
    #[structopt(
        parse(from_os_str),
        help = "Directory with config.json, preprocessor_config.json and the SavedModel"
    )]
    model_dir: PathBuf,

    #[structopt(help = "Image file, or http(s) URL to fetch it from")]
    image: String,

    #[structopt(long, help = "Model identifier reported in the result")]
    model_id: Option<String>,
}

fn is_url(image: &str) -> bool {
    image.starts_with("http://") || image.starts_with("https://")
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let dir = ModelDir::open(&args.model_dir)?;
    let model_id = args.model_id.as_deref().unwrap_or(DEFAULT_MODEL_ID);
    let analyzer = EmotionAnalyzer::load(&dir, model_id, &SignatureConfig::default())?;

    let analysis: EmotionAnalysis = if is_url(&args.image) {
        analyzer.analyze_url(&args.image)?
    } else {
        analyzer.analyze_bytes(&fs::read(&args.image)?)?
    };

    info!("{} ({:.2}%)", analysis.emotion, analysis.confidence * 100.0);
    println!("{}", serde_json::to_string_pretty(&analysis)?);

    Ok(())
}
