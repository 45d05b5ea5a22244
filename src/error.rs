use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Sign in required")]
    AuthenticationRequired,

    #[error("Not found")]
    NotFound,

    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Image exceeds the size limit")]
    ImageTooLarge,

    #[error("Image rejected by moderation")]
    ModerationRejected,

    #[error("Service misconfigured: {0}")]
    Misconfigured(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::NotFound | AppError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::ImageTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ModerationRejected => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(StoreError::PermissionDenied) => StatusCode::FORBIDDEN,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Misconfigured { .. }
            | AppError::Store(StoreError::Unavailable(_))
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
