use std::convert::Infallible;
use std::sync::Arc;

use emotion_serve::{EmotionAnalyzer, EmotionModel};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{body, Body, Method, Request, Response, StatusCode};
use log::{error, info};
use serde::{Deserialize, Serialize};
use tower::util::BoxCloneService;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

pub const ANALYZE_PATH: &str = "/analyze-emotion";

pub type AnalyzeService = BoxCloneService<Request<Body>, Response<Body>, Infallible>;

#[derive(Deserialize)]
struct AnalyzeRequest {
    /// Base64 encoded image
    image: String,
}

#[derive(Serialize)]
struct Detail<'a> {
    detail: &'a str,
}

/// Request handler for one connection, with CORS open to every origin.
pub fn service<M>(analyzer: Arc<EmotionAnalyzer<M>>) -> AnalyzeService
where
    M: EmotionModel + 'static,
{
    let service = ServiceBuilder::new()
        .layer(CorsLayer::very_permissive())
        .service_fn(move |req| handle(req, Arc::clone(&analyzer)));

    BoxCloneService::new(service)
}

async fn handle<M>(
    req: Request<Body>,
    analyzer: Arc<EmotionAnalyzer<M>>,
) -> Result<Response<Body>, Infallible>
where
    M: EmotionModel + 'static,
{
    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, ANALYZE_PATH) => analyze(req, analyzer).await,
        (_, ANALYZE_PATH) => detail(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
        _ => detail(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

async fn analyze<M>(req: Request<Body>, analyzer: Arc<EmotionAnalyzer<M>>) -> Response<Body>
where
    M: EmotionModel + 'static,
{
    let raw = match body::to_bytes(req.into_body()).await {
        Ok(raw) => raw,
        Err(err) => {
            error!("Could not read request body: {}", err);
            return server_error();
        }
    };

    let request: AnalyzeRequest = match serde_json::from_slice(&raw) {
        Ok(request) => request,
        Err(err) => return detail(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string()),
    };

    let analysis =
        tokio::task::spawn_blocking(move || analyzer.analyze_base64(&request.image)).await;

    match analysis {
        Ok(Ok(analysis)) => {
            info!(
                "Detected '{}' with confidence {:.4}",
                analysis.emotion, analysis.confidence
            );
            json(StatusCode::OK, &analysis)
        }
        Ok(Err(err)) => {
            error!("Analysis failure: '{}'", err);
            server_error()
        }
        Err(err) => {
            error!("Analysis task failed: {}", err);
            server_error()
        }
    }
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            error!("Could not serialize response: {}", err);
            server_error()
        }
    }
}

fn detail(status: StatusCode, message: &str) -> Response<Body> {
    json(status, &Detail { detail: message })
}

fn server_error() -> Response<Body> {
    let mut response = Response::new(Body::from("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
