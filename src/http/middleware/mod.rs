//! Request middleware applied to every route.

pub mod access_log;

pub use access_log::access_log;
