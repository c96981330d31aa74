use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::models::OrderStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<String>),

    #[error("authentication required")]
    Unauthorized,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("admin access required")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("cart is empty")]
    EmptyCart,

    #[error("insufficient stock for {0}")]
    InsufficientStock(String),

    #[error("order cannot move from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("internal error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    PasswordHash,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::EmptyCart => StatusCode::BAD_REQUEST,
            AppError::InsufficientStock { .. } | AppError::InvalidStatusTransition { .. } => {
                StatusCode::CONFLICT
            }
            AppError::Database { .. } | AppError::PasswordHash => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if let AppError::Database(e) = &self {
            warn!("database error: {e}");
        }

        let mut body = json!({ "error": self.to_string() });
        if let AppError::Validation(messages) = &self {
            body["details"] = json!(messages);
        }

        (status, Json(body)).into_response()
    }
}
