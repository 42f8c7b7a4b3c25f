//! Error handling for the Commerce Management Platform
//!
//! Provides consistent error responses in Spanish and English

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_es: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Action '{action}' is not allowed while the order is {current_state}")]
    IllegalState {
        current_state: String,
        action: String,
    },

    #[error(
        "Cannot receive {requested} units: ordered {ordered}, received {received}, pending {pending}"
    )]
    OverReceipt {
        ordered: i32,
        received: i32,
        pending: i32,
        requested: i32,
    },

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    // Concurrency errors
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Build a field validation error with bilingual messages
    pub fn validation(field: &str, message: &str, message_es: &str) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.to_string(),
            message_es: message_es.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_es: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Validation {
                field,
                message,
                message_es,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message_en: message.clone(),
                    message_es: message_es.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message_en: msg.clone(),
                    message_es: format!("Datos inválidos: {}", msg),
                    field: None,
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message_en: format!("{} not found", resource),
                    message_es: format!("No se encontró {}", resource),
                    field: None,
                },
            ),
            AppError::IllegalState {
                current_state,
                action,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "ILLEGAL_STATE".to_string(),
                    message_en: format!(
                        "Action '{}' is not allowed while the order is in state '{}'",
                        action, current_state
                    ),
                    message_es: format!(
                        "La acción '{}' no está permitida para una orden en estado '{}'",
                        action, current_state
                    ),
                    field: None,
                },
            ),
            AppError::OverReceipt {
                ordered,
                received,
                pending,
                requested,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "OVER_RECEIPT".to_string(),
                    message_en: format!(
                        "Cannot receive {} units. Ordered: {}, already received: {}, pending: {}",
                        requested, ordered, received, pending
                    ),
                    message_es: format!(
                        "No se pueden recibir {} unidades. Ordenado: {}, ya recibido: {}, pendiente: {}",
                        requested, ordered, received, pending
                    ),
                    field: None,
                },
            ),
            AppError::InsufficientStock(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INSUFFICIENT_STOCK".to_string(),
                    message_en: msg.clone(),
                    message_es: format!("Stock insuficiente: {}", msg),
                    field: None,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "CONFLICT".to_string(),
                    message_en: format!("Concurrent update conflict: {}", msg),
                    message_es: format!("Conflicto de actualización concurrente: {}", msg),
                    field: None,
                },
            ),
            // Serialization failures that escaped the retry loops still
            // surface as conflicts, not internal errors
            AppError::DatabaseError(sqlx::Error::Database(db_err))
                if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")) =>
            {
                (
                    StatusCode::CONFLICT,
                    ErrorDetail {
                        code: "CONFLICT".to_string(),
                        message_en: "The operation conflicted with a concurrent update".to_string(),
                        message_es: "La operación entró en conflicto con una actualización concurrente"
                            .to_string(),
                        field: None,
                    },
                )
            }
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message_en: "A database error occurred".to_string(),
                    message_es: "Ocurrió un error de base de datos".to_string(),
                    field: None,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message_en: msg.clone(),
                    message_es: "Ocurrió un error interno del servidor".to_string(),
                    field: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message_en: "An internal server error occurred".to_string(),
                    message_es: "Ocurrió un error interno del servidor".to_string(),
                    field: None,
                },
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

impl From<shared::ReceiptError> for AppError {
    fn from(err: shared::ReceiptError) -> Self {
        match err {
            shared::ReceiptError::InvalidQuantity => AppError::Validation {
                field: "quantity".to_string(),
                message: "Quantity to receive must be greater than zero".to_string(),
                message_es: "La cantidad a recibir debe ser mayor que cero".to_string(),
            },
            shared::ReceiptError::OverReceipt {
                ordered,
                received,
                pending,
                requested,
            } => AppError::OverReceipt {
                ordered,
                received,
                pending,
                requested,
            },
        }
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
