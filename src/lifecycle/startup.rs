//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the models named by the configuration
//! - Build the metrics registry
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::AppConfig;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::model::{ModelError, Models};
use crate::observability::metrics::HttpMetrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load models: {0}")]
    Model(#[from] ModelError),

    #[error("failed to build metrics registry: {0}")]
    Metrics(#[from] BuildError),

    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Everything the router needs, built from configuration.
pub fn build_state(config: AppConfig) -> Result<AppState, StartupError> {
    let models = Models::load(&config.classifier_path(), &config.generator_path())?;
    let metrics = HttpMetrics::new(&config.app_name)?;
    Ok(AppState::new(config, models, metrics))
}

/// Start the service and serve until `shutdown` fires.
pub async fn run(config: AppConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    let stop = shutdown.subscribe();
    let address = config.bind_address();

    tracing::info!(
        app_name = %config.app_name,
        model_dir = %config.model_dir.display(),
        workers = config.workers,
        "Starting inference API"
    );

    let state = build_state(config)?;

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    tracing::info!(address = %address, "Listening for connections");

    HttpServer::new(state)
        .run(listener, stop)
        .await
        .map_err(StartupError::Serve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_model_dir_is_a_model_error() {
        let config = AppConfig {
            model_dir: PathBuf::from("/nonexistent/models"),
            ..AppConfig::default()
        };
        let err = build_state(config).err().unwrap();
        assert!(matches!(err, StartupError::Model(ModelError::Io { .. })));
        assert!(err.to_string().starts_with("failed to load models"));
    }

    #[test]
    fn bundled_models_build_state() {
        let config = AppConfig {
            model_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models"),
            ..AppConfig::default()
        };
        let state = build_state(config).unwrap();
        assert_eq!(state.config.app_name, "api");
    }
}
