//! Error types for the compliance API

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use compliance_graph::GraphError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Graph(GraphError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Graph(GraphError::Validation(rejection.body_text()))
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Graph(err) => match err {
                GraphError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                GraphError::ReferenceNotFound { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "REFERENCE_NOT_FOUND")
                }
                GraphError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                GraphError::StoreUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
                }
                GraphError::Corrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CORRUPT_RECORD"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", code, self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
