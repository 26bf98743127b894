//! Inference API server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ x-request-id ──▶ request span ──▶ access log ──▶ metrics ──▶ panic guard
//!                                                                                 │
//!                                                        /predict/  /generate/  /metrics
//!                                                            │           │          │
//!                                                            ▼           ▼          ▼
//!                                                       Classifier   Generator   registry
//!                                                       (blocking pool)          snapshot
//!
//!     Cross-cutting: config (env) · logging (stdout) · OTLP span export · lifecycle
//! ```
//!
//! Exits with status 1 if startup fails.

use std::process::ExitCode;
use std::sync::Arc;

use inference_api::config::AppConfig;
use inference_api::lifecycle::{signals, startup, Shutdown, StartupError};
use inference_api::observability;

fn main() -> ExitCode {
    let (config, warnings) = AppConfig::from_env();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            // Logging is not installed yet.
            eprintln!("{}", StartupError::Runtime(e));
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let observability = observability::init(&config);
        for warning in &warnings {
            tracing::warn!(var = warning.var, "{warning}");
        }

        let shutdown = Arc::new(Shutdown::new());
        let signal_task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { signals::forward_to(&shutdown).await })
        };

        let result = startup::run(config, &shutdown).await;
        signal_task.abort();

        if let Err(e) = &result {
            tracing::error!(error = %e, "Inference API failed");
        }

        // Provider shutdown blocks until the exporter drains.
        if let Err(e) = tokio::task::spawn_blocking(move || observability.shutdown()).await {
            tracing::error!(error = %e, "Span flush task failed");
        }

        match result {
            Ok(()) => {
                tracing::info!("Shutdown complete");
                ExitCode::SUCCESS
            }
            Err(_) => ExitCode::FAILURE,
        }
    })
}
