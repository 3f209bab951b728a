use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::resolver::ResolveError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidBody(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
            ApiError::Resolve(ResolveError::InvalidQuery(e)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Resolve(ResolveError::NotReady) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service is loading data".to_string(),
            ),
            ApiError::Resolve(ResolveError::Store(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, status = %status, "Lookup failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Lookup rejected");
        }

        (status, Json(json!({ "errorMessage": message }))).into_response()
    }
}
