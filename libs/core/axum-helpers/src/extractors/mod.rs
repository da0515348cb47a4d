//! Custom extractors for Axum handlers.
//!
//! Each extractor rejects with [`AppError`](crate::errors::AppError), so
//! failures render the same JSON error body as handler errors.

pub mod bearer_token;
pub mod uuid_path;
pub mod validated_json;

pub use bearer_token::BearerToken;
pub use uuid_path::UuidPath;
pub use validated_json::ValidatedJson;
