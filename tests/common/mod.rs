//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use tower::ServiceExt;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use inference_api::config::AppConfig;
use inference_api::http::AppState;
use inference_api::lifecycle::startup::build_state;
use inference_api::model::{Classification, Classifier, Generation, Generator, ModelError, Models};
use inference_api::observability::{self, metrics::HttpMetrics, telemetry};

pub fn model_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models")
}

/// Default configuration pointed at the bundled models.
pub fn test_config() -> AppConfig {
    AppConfig {
        model_dir: model_dir(),
        ..AppConfig::default()
    }
}

pub fn state(config: AppConfig) -> AppState {
    build_state(config).unwrap()
}

/// State whose models always fail.
pub fn failing_state(config: AppConfig) -> AppState {
    let models = Models {
        classifier: Arc::new(Failing),
        generator: Arc::new(Failing),
    };
    let metrics = HttpMetrics::new(&config.app_name).unwrap();
    AppState::new(config, models, metrics)
}

pub struct Failing;

impl Classifier for Failing {
    fn classify(&self, _text: &str) -> Result<Classification, ModelError> {
        Err(ModelError::InputTooLong { tokens: 900, limit: 512 })
    }
}

impl Generator for Failing {
    fn generate(&self, _prompt: &str, max_length: usize) -> Result<Generation, ModelError> {
        Err(ModelError::ContextExceeded { requested: max_length, limit: 8 })
    }
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Response {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    Response {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

pub async fn get(router: &Router, uri: &str) -> Response {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// Value of the first sample of `name` carrying every label in `labels`.
pub fn metric_value(body: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    body.lines()
        .filter(|line| !line.starts_with('#'))
        .find(|line| {
            let metric = line.split(['{', ' ']).next().unwrap_or_default();
            metric == name
                && labels
                    .iter()
                    .all(|(k, v)| line.contains(&format!("{k}=\"{v}\"")))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

/// Log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// In-memory span export plus captured logs, installed for the current thread.
pub struct Observed {
    pub spans: InMemorySpanExporter,
    pub logs: CapturedLogs,
    provider: SdkTracerProvider,
    _guard: DefaultGuard,
}

impl Observed {
    pub fn install(config: &AppConfig) -> Self {
        let spans = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_resource(telemetry::resource(&config.app_name))
            .with_simple_exporter(spans.clone())
            .build();
        let logs = CapturedLogs::default();
        let guard = tracing::subscriber::set_default(observability::subscriber(
            config,
            &provider,
            logs.clone(),
        ));
        Self {
            spans,
            logs,
            provider,
            _guard: guard,
        }
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        let _ = self.provider.force_flush();
        self.spans.get_finished_spans().unwrap()
    }
}
