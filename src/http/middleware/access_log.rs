//! Access log.
//!
//! One `info` line per request on the `access` target:
//! `<client> - "<METHOD> <path?query> <version>" <status>`.
//! Scrape lines are dropped later by the log filter, not here.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::request::RequestIdExt;
use crate::observability::logging::ACCESS_LOG_TARGET;

pub async fn access_log(request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    let request_id = request.request_id().unwrap_or("-").to_string();
    let method = request.method().clone();
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let version = request.version();

    let response = next.run(request).await;

    tracing::info!(
        target: ACCESS_LOG_TARGET,
        request_id = %request_id,
        "{client} - \"{method} {target} {version:?}\" {}",
        response.status().as_u16()
    );

    response
}
