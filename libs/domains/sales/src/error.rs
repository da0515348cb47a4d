use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use sea_orm::DbErr;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Shortfall;

pub const UPSTREAM_UNAVAILABLE_MESSAGE: &str = "Error querying stock service.";

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The stock service could not be queried; nothing was persisted.
    #[error("Stock service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("insufficient stock for {} item(s)", .0.len())]
    InsufficientStock(Vec<Shortfall>),

    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order request cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type OrderResult<T> = Result<T, OrderError>;

/// Convert OrderError to AppError for standardized error responses
impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(msg) => AppError::BadRequest(msg),
            OrderError::UpstreamUnavailable(cause) => {
                tracing::warn!(error = %cause, "Stock query failed");
                AppError::BadGateway(UPSTREAM_UNAVAILABLE_MESSAGE.to_string())
            }
            OrderError::InsufficientStock(shortfalls) => {
                let details: Vec<Value> = shortfalls
                    .iter()
                    .map(|s| Value::String(s.to_string()))
                    .collect();
                AppError::BadRequestWithDetails("insufficient stock".to_string(), Value::Array(details))
            }
            OrderError::NotFound(id) => AppError::NotFound(format!("Order {} not found", id)),
            OrderError::Cancelled => {
                AppError::ServiceUnavailable("Request cancelled during shutdown".to_string())
            }
            OrderError::Database(e) => AppError::Database(e),
            OrderError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
