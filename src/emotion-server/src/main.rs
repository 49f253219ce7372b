use std::convert::Infallible;
use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use emotion_serve::{EmotionAnalyzer, ModelDir, SignatureConfig, DEFAULT_MODEL_ID};
use hyper::server::conn::AddrStream;
use hyper::service::make_service_fn;
use hyper::Server;
use log::{debug, info};
use structopt::StructOpt;

mod service;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "emotion-server",
    about = "HTTP service that ranks the facial expressions in an image"
)]
struct Opts {
    #[structopt(long, default_value = "127.0.0.1", help = "Address to listen on")]
    host: IpAddr,

    #[structopt(long, default_value = "8501", help = "Port to listen on")]
    port: u16,

    #[structopt(
        long,
        default_value = "model",
        parse(from_os_str),
        help = "Directory with config.json, preprocessor_config.json and the SavedModel"
    )]
    model_dir: PathBuf,

    #[structopt(long, help = "Model identifier reported in responses")]
    model_id: Option<String>,

    #[structopt(long, default_value = "serving_default", help = "SavedModel signature")]
    signature: String,

    #[structopt(long, default_value = "pixel_values", help = "Signature input key")]
    input: String,

    #[structopt(long, default_value = "logits", help = "Signature output key")]
    output: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let opts = Opts::from_args();

    let model_id = opts.model_id.as_deref().unwrap_or(DEFAULT_MODEL_ID);
    let signature = SignatureConfig {
        signature: opts.signature,
        input: opts.input,
        output: opts.output,
    };

    let dir = ModelDir::open(&opts.model_dir)?;
    let analyzer = Arc::new(EmotionAnalyzer::load(&dir, model_id, &signature)?);

    debug!("Loaded model in memory");

    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let service = service::service(Arc::clone(&analyzer));
        async move { Ok::<_, Infallible>(service) }
    });

    let addr = SocketAddr::new(opts.host, opts.port);
    let server = Server::try_bind(&addr)?
        .serve(make_service)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        });

    info!("Listening on http://{}", addr);
    server.await?;

    info!("Server stopped");
    Ok(())
}
