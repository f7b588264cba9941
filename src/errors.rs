//! Request-boundary error type.
//!
//! Every failure a handler can produce is converted into one of these
//! variants and rendered as a JSON envelope; nothing propagates to the
//! runtime as an unhandled fault. User-facing messages are Spanish, matching
//! the front-end this proxy serves.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::storage_service::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing request input (bad multipart shape, missing key).
    #[error("{0}")]
    InvalidInput(String),

    /// Uploaded file exceeds the size limit.
    #[error("El archivo supera el tamaño máximo de 50MB")]
    PayloadTooLarge,

    /// Declared MIME type is not on the allow-list.
    #[error("Tipo de archivo no permitido: {0}")]
    UnsupportedType(String),

    /// No route (or no object) matches the request.
    #[error("Ruta no encontrada")]
    NotFound,

    /// Unexpected backend failure; detail is carried in the response body.
    #[error("Error interno del servidor")]
    Backend(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::PayloadTooLarge | Self::UnsupportedType(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Backend(err) => {
                tracing::error!("request failed: {:#}", err);
                json!({
                    "success": false,
                    "error": self.to_string(),
                    "details": format!("{err:#}"),
                })
            }
            _ => json!({
                "success": false,
                "error": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TooLarge { .. } => Self::PayloadTooLarge,
            StorageError::InvalidKey => {
                Self::InvalidInput("Clave de archivo no válida".to_string())
            }
            StorageError::NotFound { .. } => Self::NotFound,
            StorageError::Sqlx(err) => Self::Backend(err.into()),
            StorageError::Io(err) => Self::Backend(err.into()),
        }
    }
}
