//! Structured logging.
//!
//! # Responsibilities
//! - Render one line per event, correlated with the active trace
//! - Force noisy third-party namespaces down to `error`
//! - Drop metrics-scrape lines from the access log
//!
//! Line shape:
//! ```text
//! 2024-05-01T12:00:00.000000Z INFO [access] [src/http/middleware/access_log.rs:42] [trace_id=… span_id=… resource.service.name=api] - 10.0.0.7:51234 - "GET /predict/?message=hi HTTP/1.1" 200 request_id=…
//! ```

use std::any::TypeId;
use std::fmt::{self, Write as _};

use opentelemetry::trace::{SpanId, TraceContextExt, TraceId};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::subscriber::Interest;
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_opentelemetry::OtelData;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, MakeWriter};
use tracing_subscriber::layer::{Context, Filter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::config::AppConfig;

/// Target of the per-request access log stream.
pub const ACCESS_LOG_TARGET: &str = "access";

/// Access lines containing this are scrape traffic.
pub const SCRAPE_ROUTE_SIGNATURE: &str = "GET /metrics";

/// Namespaces held at `error` regardless of the configured level.
pub const NOISY_TARGETS: &[&str] = &[
    "tokenizers",
    "candle_core",
    "candle_nn",
    "hf_hub",
    "ort",
    "h2",
    "hyper_util",
    "tonic",
    "tower",
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
];

/// True when an access-log message describes a metrics scrape.
pub fn is_scrape_noise(message: &str) -> bool {
    message.contains(SCRAPE_ROUTE_SIGNATURE)
}

/// `EnvFilter` directives for the global level plus the forced noisy overrides.
pub fn level_directives(level: Level) -> String {
    let mut directives = level.to_string().to_lowercase();
    for target in NOISY_TARGETS {
        let _ = write!(directives, ",{target}=error");
    }
    directives
}

/// The log-stream layer: correlated formatter, level filter and scrape filter.
pub fn layer<S, W>(config: &AppConfig, writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let fmt = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(CorrelatedFormat::new(&config.app_name, config.log_correlation))
        .with_writer(writer);

    DropScrapes::new(fmt).with_filter(LogFilter::new(config.log_level))
}

/// Per-layer level filter for the log stream.
///
/// Spans are always admitted so the formatter can see the active trace even
/// when span levels are below the configured event level.
pub struct LogFilter {
    levels: EnvFilter,
}

impl LogFilter {
    pub fn new(level: Level) -> Self {
        Self {
            levels: EnvFilter::new(level_directives(level)),
        }
    }
}

impl<S> Filter<S> for LogFilter
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn enabled(&self, meta: &Metadata<'_>, cx: &Context<'_, S>) -> bool {
        meta.is_span() || <EnvFilter as Filter<S>>::enabled(&self.levels, meta, cx)
    }

    fn callsite_enabled(&self, meta: &'static Metadata<'static>) -> Interest {
        if meta.is_span() {
            Interest::always()
        } else {
            <EnvFilter as Filter<S>>::callsite_enabled(&self.levels, meta)
        }
    }
}

/// Skips access-log events for metrics scrapes before they reach `inner`.
///
/// The check runs in `on_event`: a per-layer `Filter::event_enabled` rejection
/// leaves the thread-local filter state dirty when no other layer takes the event.
pub struct DropScrapes<L> {
    inner: L,
}

impl<L> DropScrapes<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

fn is_scrape_access(event: &Event<'_>) -> bool {
    if event.metadata().target() != ACCESS_LOG_TARGET {
        return false;
    }
    let mut message = MessageVisitor::default();
    event.record(&mut message);
    is_scrape_noise(&message.0)
}

impl<S, L> Layer<S> for DropScrapes<L>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    L: Layer<S>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        self.inner.on_new_span(attrs, id, ctx);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        self.inner.on_record(id, values, ctx);
    }

    fn on_follows_from(&self, span: &Id, follows: &Id, ctx: Context<'_, S>) {
        self.inner.on_follows_from(span, follows, ctx);
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if !is_scrape_access(event) {
            self.inner.on_event(event, ctx);
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        self.inner.on_enter(id, ctx);
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        self.inner.on_exit(id, ctx);
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        self.inner.on_close(id, ctx);
    }

    fn on_id_change(&self, old: &Id, new: &Id, ctx: Context<'_, S>) {
        self.inner.on_id_change(old, new, ctx);
    }

    unsafe fn downcast_raw(&self, id: TypeId) -> Option<*const ()> {
        if id == TypeId::of::<Self>() {
            Some(self as *const Self as *const ())
        } else {
            self.inner.downcast_raw(id)
        }
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        }
    }
}

/// Event formatter that prefixes each line with trace correlation fields.
pub struct CorrelatedFormat {
    service_name: String,
    correlate: bool,
    timer: SystemTime,
}

impl CorrelatedFormat {
    pub fn new(service_name: &str, correlate: bool) -> Self {
        Self {
            service_name: service_name.to_string(),
            correlate,
            timer: SystemTime,
        }
    }
}

impl<S, N> FormatEvent<S, N> for CorrelatedFormat
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    N: for<'w> FormatFields<'w> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();

        self.timer.format_time(&mut writer)?;
        write!(
            writer,
            " {} [{}] [{}:{}]",
            meta.level(),
            meta.target(),
            meta.file().unwrap_or("unknown"),
            meta.line().unwrap_or(0)
        )?;

        if self.correlate {
            let (trace_id, span_id) = match active_trace(ctx) {
                Some((trace_id, span_id)) => (trace_id.to_string(), span_id.to_string()),
                None => (String::new(), String::new()),
            };
            write!(
                writer,
                " [trace_id={trace_id} span_id={span_id} resource.service.name={}]",
                self.service_name
            )?;
        }

        write!(writer, " - ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Ids of the nearest enclosing span tracked by the OpenTelemetry layer.
fn active_trace<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<(TraceId, SpanId)>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    N: for<'w> FormatFields<'w> + 'static,
{
    let current = ctx.lookup_current()?;
    current.scope().find_map(|span| {
        let extensions = span.extensions();
        let otel = extensions.get::<OtelData>()?;
        let span_id = otel.builder.span_id?;

        let parent = otel.parent_cx.span();
        let parent_context = parent.span_context();
        let trace_id = if parent_context.is_valid() {
            parent_context.trace_id()
        } else {
            otel.builder.trace_id?
        };
        Some((trace_id, span_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(config: &AppConfig, f: impl FnOnce()) -> String {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::registry().with(layer(config, buffer.clone()));
        tracing::subscriber::with_default(subscriber, f);
        buffer.contents()
    }

    #[test]
    fn scrape_predicate_matches_metrics_route_only() {
        assert!(is_scrape_noise(r#"10.0.0.1:5000 - "GET /metrics HTTP/1.1" 200"#));
        assert!(!is_scrape_noise(r#"10.0.0.1:5000 - "GET /predict/?message=hi HTTP/1.1" 200"#));
        assert!(!is_scrape_noise(r#"10.0.0.1:5000 - "POST /metrics HTTP/1.1" 405"#));
    }

    #[test]
    fn directives_force_noisy_targets_to_error() {
        let directives = level_directives(Level::DEBUG);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains(",tonic=error"));
        assert!(directives.contains(",tokenizers=error"));
    }

    #[test]
    fn access_scrape_lines_are_dropped() {
        let out = capture(&AppConfig::default(), || {
            tracing::info!(target: ACCESS_LOG_TARGET, "- - \"GET /metrics HTTP/1.1\" 200");
            tracing::info!(target: ACCESS_LOG_TARGET, "- - \"GET /predict/ HTTP/1.1\" 400");
            tracing::info!("GET /metrics mentioned outside the access log");
        });
        assert!(!out.contains("\"GET /metrics HTTP/1.1\""));
        assert!(out.contains("\"GET /predict/ HTTP/1.1\" 400"));
        assert!(out.contains("mentioned outside the access log"));
    }

    #[test]
    fn lines_after_a_dropped_scrape_still_print() {
        let out = capture(&AppConfig::default(), || {
            tracing::info!(target: ACCESS_LOG_TARGET, "- - \"GET /metrics HTTP/1.1\" 200");
            tracing::info!("first line after scrape");
            tracing::info!("second line after scrape");
            tracing::info!(target: ACCESS_LOG_TARGET, "- - \"GET /metrics HTTP/1.1\" 200");
            tracing::warn!(target: ACCESS_LOG_TARGET, "- - \"GET /generate/ HTTP/1.1\" 500");
        });
        assert!(out.contains("first line after scrape"));
        assert!(out.contains("second line after scrape"));
        assert!(out.contains("\"GET /generate/ HTTP/1.1\" 500"));
        assert!(!out.contains("/metrics"));
    }

    #[test]
    fn lines_are_plain_text() {
        let out = capture(&AppConfig::default(), || {
            tracing::info!(target: ACCESS_LOG_TARGET, request_id = "abc", "- - \"GET /predict/ HTTP/1.1\" 200");
        });
        assert!(!out.contains('\u{1b}'));
        assert!(out.ends_with("200 request_id=\"abc\"\n"));
    }

    #[test]
    fn noisy_target_below_error_is_dropped() {
        let out = capture(&AppConfig::default(), || {
            tracing::warn!(target: "tonic", "transport hiccup");
            tracing::error!(target: "tonic", "transport down");
        });
        assert!(!out.contains("transport hiccup"));
        assert!(out.contains("transport down"));
    }

    #[test]
    fn lines_without_span_have_blank_correlation() {
        let out = capture(&AppConfig::default(), || tracing::info!(answer = 42, "hello"));
        assert!(out.contains(" INFO ["));
        assert!(out.contains("[trace_id= span_id= resource.service.name=api] - hello answer=42"));
    }

    #[test]
    fn correlation_block_can_be_disabled() {
        let config = AppConfig {
            log_correlation: false,
            ..AppConfig::default()
        };
        let out = capture(&config, || tracing::info!("plain"));
        assert!(!out.contains("trace_id="));
        assert!(out.contains("] - plain"));
    }
}
