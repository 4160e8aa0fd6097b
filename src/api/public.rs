//! Public API types

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};

// Errors

#[derive(Debug)]
pub enum ApiError {
    /// The caller sent something we can't work with. The message is
    /// returned as is so it must not contain internal details.
    InvalidInput(String),
    /// Anything else that fails before streaming starts.
    Unexpected(anyhow::Error),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

/// Convert `ApiError` into an Axum compatible response.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(message) => {
                tracing::warn!("Rejected request: {}", message);
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Unexpected(err) => {
                // Always log the error, never return it
                tracing::error!("{:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("Server error while processing the AI request."),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Enables using `?` on functions that return `Result<_,
/// anyhow::Error>` to turn them into `Result<_, ApiError>`
impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Unexpected(err.into())
    }
}

// Re-export public types from each route

pub mod ai_stream {
    pub use crate::api::routes::ai_stream::public::*;
}
