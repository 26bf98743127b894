//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (assign / propagate x-request-id)
//!     → middleware/ (access log)
//!     → handlers.rs (validate, run model on the blocking pool)
//!     → error.rs (ApiError → status + {"detail"} body)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod server;

pub use error::{ApiError, ErrorKind};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{build_router, instrument, AppState, HttpServer};
