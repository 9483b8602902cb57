//! The HTTP boundary's only error type. Every internal crate keeps its own
//! `thiserror` enum; handlers translate those into one of these two shapes
//! rather than leaking internal error types across the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GobinError {
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error")]
    Internal,
}

impl GobinError {
    pub fn bad_request(message: impl Into<String>) -> Response {
        GobinError::BadRequest(message.into()).into_response()
    }

    pub fn internal() -> Response {
        GobinError::Internal.into_response()
    }
}

impl IntoResponse for GobinError {
    fn into_response(self) -> Response {
        match self {
            GobinError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            GobinError::Internal => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
