//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the inference and scrape handlers
//! - Wire up middleware (request ID, tracing, access log, metrics, panic guard)
//! - Serve on a bound listener until shutdown is signalled
//!
//! # Middleware order (outermost first)
//! ```text
//! set x-request-id → propagate x-request-id → request span (unless disabled)
//!     → access log → metrics → panic guard → handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::AppConfig;
use crate::http::error::panic_response;
use crate::http::handlers::{generate, predict};
use crate::http::middleware::access_log;
use crate::http::request::{propagate_request_id, set_request_id};
use crate::model::Models;
use crate::observability::metrics::{scrape, track_metrics, HttpMetrics};
use crate::observability::telemetry::trace_request;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub models: Models,
    pub metrics: Arc<HttpMetrics>,
}

impl AppState {
    pub fn new(config: AppConfig, models: Models, metrics: HttpMetrics) -> Self {
        Self {
            config: Arc::new(config),
            models,
            metrics: Arc::new(metrics),
        }
    }
}

impl FromRef<AppState> for Models {
    fn from_ref(state: &AppState) -> Self {
        state.models.clone()
    }
}

impl FromRef<AppState> for Arc<HttpMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

/// The full application: routes plus the instrumentation stack.
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/predict/", get(predict))
        .route("/generate/", get(generate))
        .route("/metrics", get(scrape))
        .with_state(state.clone());

    instrument(routes, &state)
}

/// Wrap `router` in the middleware every route gets.
pub fn instrument(router: Router, state: &AppState) -> Router {
    let router = router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_metrics,
        ))
        .layer(middleware::from_fn(access_log));

    let router = if state.config.disable_telemetry {
        router
    } else {
        router.layer(middleware::from_fn(trace_request))
    };

    router
        .layer(propagate_request_id())
        .layer(set_request_id())
}

/// HTTP server for the inference API.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
