use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("Product not found: {0}")]
    NotFound(Uuid),

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub type StockResult<T> = Result<T, StockError>;

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::NotFound(id) => AppError::NotFound(format!("Product {} not found", id)),
            StockError::InvalidQuantity(q) => {
                AppError::BadRequest(format!("Quantity must be positive, got {}", q))
            }
            StockError::Database(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for StockError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
