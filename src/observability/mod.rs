//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → telemetry.rs (root span per request, unless DISABLE_TELEMETRY)
//!     → metrics.rs   (counters, in-progress gauge, latency histogram)
//!     → logging.rs   (access line + handler events, trace-correlated)
//!
//! Consumers:
//!     → stdout (one line per event)
//!     → GET /metrics (OpenMetrics scrape)
//!     → OTLP gRPC collector (batched span export)
//! ```
//!
//! # Design Decisions
//! - One `tracing` registry carries both log output and the OpenTelemetry bridge
//! - The tracer provider and exporter are always installed; only the
//!   per-request span middleware depends on `disable_telemetry`
//! - Instrumentation failures are logged and never change a response

pub mod logging;
pub mod metrics;
pub mod telemetry;

use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::AppConfig;

/// Build the full subscriber: OpenTelemetry bridge plus the filtered log stream.
pub fn subscriber<W>(
    config: &AppConfig,
    provider: &SdkTracerProvider,
    writer: W,
) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(telemetry::layer(provider))
        .with(logging::layer(config, writer))
}

/// Process-wide observability handles that must outlive the server.
pub struct Observability {
    provider: SdkTracerProvider,
}

/// Install logging and tracing for the process.
///
/// Runs before anything else logs. Failure to reach or configure the
/// collector is reported but never fatal.
pub fn init(config: &AppConfig) -> Observability {
    let resource = telemetry::resource(&config.app_name);
    let (provider, exporter_error) = match telemetry::otlp_exporter(&config.otlp_grpc_endpoint) {
        Ok(exporter) => (telemetry::tracer_provider(resource, exporter), None),
        Err(e) => (SdkTracerProvider::builder().with_resource(resource).build(), Some(e)),
    };
    telemetry::install_global(&provider);

    if let Err(e) = subscriber(config, &provider, std::io::stdout).try_init() {
        tracing::warn!(error = %e, "Global subscriber already installed, keeping it");
    }

    if let Some(e) = exporter_error {
        tracing::error!(error = %e, "Span export disabled");
    }

    tracing::info!(
        service = %config.app_name,
        endpoint = %config.otlp_grpc_endpoint,
        log_level = %config.log_level,
        log_correlation = config.log_correlation,
        request_spans = !config.disable_telemetry,
        "Observability initialized"
    );

    Observability { provider }
}

impl Observability {
    /// Flush queued spans and stop the exporter. Best effort.
    pub fn shutdown(self) {
        match telemetry::shutdown(&self.provider) {
            Ok(()) => tracing::info!("Tracer provider shut down"),
            Err(e) => tracing::error!(error = %e, "Tracer provider shutdown failed"),
        }
    }
}
