//! OpenTelemetry span export and per-request spans.

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{TraceContextExt, TracerProvider as _};
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{SdkTracerProvider, SpanExporter};
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tracing::field::Empty;
use tracing::{Instrument, Level, Subscriber};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::http::ErrorKind;
use crate::observability::metrics::route_of;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("cannot build OTLP exporter for {endpoint}: {message}")]
    Exporter { endpoint: String, message: String },

    #[error("tracer provider shutdown failed: {0}")]
    Shutdown(String),
}

/// Resource attached to every exported span.
pub fn resource(app_name: &str) -> Resource {
    Resource::builder()
        .with_service_name(app_name.to_string())
        .with_attribute(KeyValue::new("compose_service", app_name.to_string()))
        .build()
}

/// OTLP gRPC exporter. Must be called from within a Tokio runtime.
pub fn otlp_exporter(endpoint: &str) -> Result<opentelemetry_otlp::SpanExporter, TelemetryError> {
    opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
}

/// Provider exporting through a batch processor on the SDK's background worker.
pub fn tracer_provider<E>(resource: Resource, exporter: E) -> SdkTracerProvider
where
    E: SpanExporter + 'static,
{
    SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build()
}

/// Register the provider and the W3C trace context propagator process-wide.
pub fn install_global(provider: &SdkTracerProvider) {
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());
}

/// Bridge from `tracing` spans to OpenTelemetry.
///
/// Only spans carrying `otel.*` or `http.*` fields are exported, plus
/// `ERROR` events as span events.
pub fn layer<S>(provider: &SdkTracerProvider) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_opentelemetry::layer()
        .with_tracer(provider.tracer(env!("CARGO_PKG_NAME")))
        .with_filter(filter_fn(|meta| {
            if meta.is_event() {
                return *meta.level() == Level::ERROR;
            }
            meta.fields().iter().any(|field| {
                let name = field.name();
                name.starts_with("otel.") || name.starts_with("http.")
            })
        }))
}

pub fn shutdown(provider: &SdkTracerProvider) -> Result<(), TelemetryError> {
    provider
        .shutdown()
        .map_err(|e| TelemetryError::Shutdown(e.to_string()))
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Remote parent from `traceparent`/`tracestate`, if any.
pub fn extract_context(headers: &HeaderMap) -> Context {
    TraceContextPropagator::new().extract(&HeaderExtractor(headers))
}

/// Root server span around the rest of the stack.
pub async fn trace_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let route = route_of(&request);

    let span = tracing::info_span!(
        "HTTP request",
        otel.name = %format!("{method} {route}"),
        otel.kind = "server",
        otel.status_code = Empty,
        http.request.method = %method,
        http.route = %route,
        url.path = %request.uri().path(),
        http.response.status_code = Empty,
        "error.type" = Empty,
    );

    let parent = extract_context(request.headers());
    if parent.span().span_context().is_valid() {
        span.set_parent(parent);
    }

    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    span.record("http.response.status_code", i64::from(status.as_u16()));
    if status.is_server_error() {
        span.record("otel.status_code", "ERROR");
        match response.extensions().get::<ErrorKind>() {
            Some(kind) => span.record("error.type", kind.as_str()),
            None => span.record("error.type", status.as_str()),
        };
    }

    response
}
