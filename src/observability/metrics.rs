//! HTTP metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, route, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_requests_in_progress` (gauge): requests currently being served
//! - `http_exceptions_total` (counter): 5xx responses by error kind
//! - `app_info` (gauge): constant 1, carries `app_name`
//!
//! Every series carries the global `app_name` label.
//!
//! # Design Decisions
//! - The recorder is owned by `HttpMetrics`, never installed globally, so
//!   several apps (and tests) can live in one process
//! - Histogram buckets match the common Prometheus client defaults
//! - The exporter speaks Prometheus text 0.0.4; `render` rewrites it into
//!   OpenMetrics (no blank lines, counter families named without `_total`,
//!   `# EOF` terminator)

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    with_local_recorder, Unit,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::http::ErrorKind;

pub const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// `path` label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

const REQUESTS_TOTAL: &str = "http_requests_total";
const REQUEST_DURATION: &str = "http_request_duration_seconds";
const REQUESTS_IN_PROGRESS: &str = "http_requests_in_progress";
const EXCEPTIONS_TOTAL: &str = "http_exceptions_total";
const APP_INFO: &str = "app_info";

/// Registry of HTTP metrics for one application.
pub struct HttpMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl HttpMetrics {
    pub fn new(app_name: &str) -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets(LATENCY_BUCKETS)?
            .add_global_label("app_name", app_name)
            .build_recorder();
        let handle = recorder.handle();

        let metrics = Self { recorder, handle };
        metrics.record(|| {
            describe_counter!(REQUESTS_TOTAL, "Total HTTP requests by method, path and status code");
            describe_histogram!(
                REQUEST_DURATION,
                Unit::Seconds,
                "HTTP request latency by method, path and status code"
            );
            describe_gauge!(REQUESTS_IN_PROGRESS, "HTTP requests currently being served");
            describe_counter!(EXCEPTIONS_TOTAL, "HTTP requests that ended in a server-side error");
            describe_gauge!(APP_INFO, "Application information");
            gauge!(APP_INFO).set(1.0);
        });
        Ok(metrics)
    }

    fn record<T>(&self, f: impl FnOnce() -> T) -> T {
        with_local_recorder(&self.recorder, f)
    }

    pub fn request_started(&self, method: &str, path: &str) {
        self.record(|| {
            gauge!(REQUESTS_IN_PROGRESS, "method" => method.to_string(), "path" => path.to_string())
                .increment(1.0);
        });
    }

    pub fn request_finished(
        &self,
        method: &str,
        path: &str,
        status: StatusCode,
        elapsed: Duration,
        error: Option<ErrorKind>,
    ) {
        let labels = [
            ("method", method.to_string()),
            ("path", path.to_string()),
            ("status_code", status.as_str().to_string()),
        ];

        self.record(|| {
            gauge!(REQUESTS_IN_PROGRESS, "method" => method.to_string(), "path" => path.to_string())
                .decrement(1.0);
            counter!(REQUESTS_TOTAL, &labels).increment(1);
            histogram!(REQUEST_DURATION, &labels).record(elapsed.as_secs_f64());

            if let Some(kind) = error.filter(|_| status.is_server_error()) {
                counter!(
                    EXCEPTIONS_TOTAL,
                    "method" => method.to_string(),
                    "path" => path.to_string(),
                    "exception_type" => kind.as_str()
                )
                .increment(1);
            }
        });
    }

    /// Full registry snapshot in OpenMetrics text format.
    pub fn render(&self) -> String {
        to_openmetrics(&self.handle.render())
    }
}

/// Split a `# HELP` / `# TYPE` line into keyword, metric name and the rest
/// (leading space included).
fn metadata_line(line: &str) -> Option<(&str, &str, &str)> {
    let rest = line.strip_prefix("# ")?;
    let (keyword, rest) = rest.split_once(' ')?;
    if keyword != "HELP" && keyword != "TYPE" {
        return None;
    }
    let (name, tail) = rest.split_at(rest.find(' ').unwrap_or(rest.len()));
    Some((keyword, name, tail))
}

fn to_openmetrics(text: &str) -> String {
    let counters: HashSet<&str> = text
        .lines()
        .filter_map(|line| match metadata_line(line)? {
            ("TYPE", name, " counter") => Some(name),
            _ => None,
        })
        .collect();

    let mut body = String::with_capacity(text.len() + 8);
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        match metadata_line(line) {
            Some((keyword, name, tail)) if counters.contains(name) => {
                let family = name.strip_suffix("_total").unwrap_or(name);
                body.push_str("# ");
                body.push_str(keyword);
                body.push(' ');
                body.push_str(family);
                body.push_str(tail);
            }
            _ => body.push_str(line),
        }
        body.push('\n');
    }
    body.push_str("# EOF\n");
    body
}

/// Route template of the request, or [`UNMATCHED_ROUTE`].
pub fn route_of(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

/// Keeps the in-progress gauge balanced when a request future is dropped.
struct InFlight<'a> {
    metrics: &'a HttpMetrics,
    method: &'a str,
    path: &'a str,
    start: Instant,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self, response: &Response) {
        self.finished = true;
        self.metrics.request_finished(
            self.method,
            self.path,
            response.status(),
            self.start.elapsed(),
            response.extensions().get::<ErrorKind>().copied(),
        );
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics.record(|| {
                gauge!(
                    REQUESTS_IN_PROGRESS,
                    "method" => self.method.to_string(),
                    "path" => self.path.to_string()
                )
                .decrement(1.0);
            });
        }
    }
}

pub async fn track_metrics(
    State(metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = route_of(&request);

    metrics.request_started(&method, &path);
    let in_flight = InFlight {
        metrics: &metrics,
        method: &method,
        path: &path,
        start: Instant::now(),
        finished: false,
    };

    let response = next.run(request).await;
    in_flight.finish(&response);
    response
}

/// `GET /metrics`
pub async fn scrape(State(metrics): State<Arc<HttpMetrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
        metrics.render(),
    )
}
