#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use partbridge_api::app::Services;
use partbridge_api::config::ServerConfig;
use partbridge_api::router::build_app_router;
use partbridge_core::converter::{
    ConversionError, ConversionResult, ConversionStage, Converter, ProgressSink,
};
use partbridge_core::job::JobSpec;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        ws_ping_interval_secs: 30,
        event_bus_capacity: 64,
        converter_program: "easyeda2kicad".to_string(),
    }
}

/// In-process converter: reports one stage and succeeds with a symbol path.
pub fn symbol_converter(
    spec: &JobSpec,
    progress: &ProgressSink,
) -> Result<ConversionResult, ConversionError> {
    progress.report(ConversionStage::Symbol, 60, "Symbol exported");
    Ok(ConversionResult {
        symbol_path: Some(format!("{}.kicad_sym", spec.output_prefix)),
        messages: vec!["Created Kicad symbol".to_string()],
        ..Default::default()
    })
}

/// Running services plus the router built on top of them.
pub struct TestApp {
    pub router: Router,
    pub services: Services,
}

impl TestApp {
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application with the production middleware stack and the
/// given converter standing in for `easyeda2kicad`.
pub async fn build_test_app_with(converter: Arc<dyn Converter>) -> TestApp {
    let services = Services::start(test_config(), converter).await;
    let router = build_app_router(services.state.clone());
    TestApp { router, services }
}

pub async fn build_test_app() -> TestApp {
    build_test_app_with(Arc::new(symbol_converter)).await
}

/// Send a GET request through the router.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body through the router.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

/// Send a POST request with an arbitrary body labelled as JSON.
pub async fn post_raw(app: Router, uri: &str, body: impl Into<String>) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
