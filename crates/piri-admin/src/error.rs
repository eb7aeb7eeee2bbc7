//! The admin surface's single error type: maps every collaborator's error
//! onto the status codes and plain-text bodies spec.md §6/§7 call for
//! (400, 403, 404, 409, 500, 503).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("caller does not own this resource")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("a settlement or withdrawal is already in flight")]
    Conflict,
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !status.is_client_error() || status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::warn!(error = %self, %status, "admin request failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl From<piri_config::ConfigRegistryError> for ApiError {
    fn from(e: piri_config::ConfigRegistryError) -> Self {
        use piri_config::ConfigRegistryError::*;
        match e {
            UnknownKey(k) => ApiError::BadRequest(format!("unknown config key: {k}")),
            ValidationError { key, cause } => ApiError::BadRequest(format!("{key}: {cause}")),
            DuplicateKey(_) | PersistError(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<piri_settlement::SettlementError> for ApiError {
    fn from(e: piri_settlement::SettlementError) -> Self {
        use piri_settlement::SettlementError::*;
        match e {
            Forbidden => ApiError::Forbidden,
            Conflict => ApiError::Conflict,
            BadRequest(msg) => ApiError::BadRequest(msg),
            Chain(err) => ApiError::Unavailable(err.to_string()),
            Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}
