//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment
//!     → loader.rs (lookup & lenient coercion)
//!     → AppConfig (immutable) + Vec<ConfigWarning>
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - Every field has a documented default
//! - A value that fails to parse falls back to its default and produces a
//!   warning instead of aborting startup

pub mod loader;
pub mod schema;

pub use loader::ConfigWarning;
pub use schema::AppConfig;
