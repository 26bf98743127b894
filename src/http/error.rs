//! Error-to-response mapping at the HTTP boundary.

use std::any::Any;

use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::model::ModelError;

/// Classification of a failed request.
///
/// Attached to error responses as an extension so the metrics and tracing
/// middleware can label the failure without parsing the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InferenceFailure,
    Panic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::InferenceFailure => "InferenceFailure",
            ErrorKind::Panic => "Panic",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    InferenceFailure(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::InvalidInput(_) => ErrorKind::InvalidInput,
            ApiError::InferenceFailure(_) => ErrorKind::InferenceFailure,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::InferenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text returned to the client. Inference failures expose the raw error.
    pub fn detail(&self) -> &str {
        match self {
            ApiError::InvalidInput(detail) | ApiError::InferenceFailure(detail) => detail,
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        ApiError::InferenceFailure(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

fn error_response(status: StatusCode, kind: ErrorKind, detail: &str) -> Response {
    let mut response = (status, Json(ErrorBody { detail })).into_response();
    response.extensions_mut().insert(kind);
    response
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(self.status(), self.kind(), self.detail())
    }
}

/// Text carried by a panic payload, when it has one.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Response for a handler that panicked. Used with `CatchPanicLayer::custom`.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(panic = panic_message(payload.as_ref()), "Request handler panicked");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Panic,
        "Internal Server Error",
    )
}
