//! Configuration schema definitions.
//!
//! The environment variable backing each field is listed on the field.

use std::path::PathBuf;

use tracing::Level;

/// Root configuration for the inference service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name used in logs, metrics labels and the trace resource (`APP_NAME`).
    pub app_name: String,

    /// Port the HTTP listener binds on all interfaces (`EXPOSE_PORT`).
    pub expose_port: u16,

    /// OTLP gRPC collector endpoint for span export (`OTLP_GRPC_ENDPOINT`).
    pub otlp_grpc_endpoint: String,

    /// Skip per-request span creation (`DISABLE_TELEMETRY`).
    ///
    /// The tracer provider, exporter and log correlation are still set up.
    pub disable_telemetry: bool,

    /// Global log level (`LOG_LEVEL`).
    pub log_level: Level,

    /// Inject trace/span ids into log lines (`LOG_CORRELATION`).
    pub log_correlation: bool,

    /// Directory holding `sentiment.json` and `generator.json` (`MODEL_DIR`).
    pub model_dir: PathBuf,

    /// Tokio worker threads serving requests (`WORKERS`).
    pub workers: usize,
}

impl AppConfig {
    /// Path of the classifier weights.
    pub fn classifier_path(&self) -> PathBuf {
        self.model_dir.join("sentiment.json")
    }

    /// Path of the generator weights.
    pub fn generator_path(&self) -> PathBuf {
        self.model_dir.join("generator.json")
    }

    /// Socket address the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.expose_port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "api".to_string(),
            expose_port: 8000,
            otlp_grpc_endpoint: "http://tempo:4317".to_string(),
            disable_telemetry: false,
            log_level: Level::INFO,
            log_correlation: true,
            model_dir: PathBuf::from("/workspace/models"),
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
