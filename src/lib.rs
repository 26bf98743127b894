//! HTTP inference API with built-in observability.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod observability;

pub use config::AppConfig;
pub use http::{build_router, AppState, HttpServer};
pub use lifecycle::Shutdown;
