use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use tandem_delivery::{DeliveryError, StoreError};
use tandem_types::api::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("error").to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::InvalidRequest(msg) => ApiError::InvalidRequest(msg),
            e @ DeliveryError::ConversationNotFound(_) => ApiError::NotFound(e.to_string()),
            e @ DeliveryError::NotParticipant { .. } => ApiError::Forbidden(e.to_string()),
            DeliveryError::Store(e @ StoreError::Timeout { .. }) => {
                error!("{}", e);
                ApiError::Timeout("storage did not respond in time".into())
            }
            DeliveryError::Store(e) => {
                // Backend details stay in the log.
                error!("Store failure: {}", e);
                ApiError::Internal("internal storage error".into())
            }
        }
    }
}
