//! JSON extractor with automatic validation using the validator crate.

use crate::errors::AppError;
use axum::extract::{FromRequest, Json, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSON extractor that runs [`Validate::validate`] on the body.
///
/// Malformed JSON rejects with `JSON_EXTRACTION`; validation failures reject
/// with `VALIDATION_ERROR` and the field errors in `details`.
///
/// ```ignore
/// #[derive(Deserialize, Validate)]
/// struct CreateOrder {
///     #[validate(length(min = 1))]
///     items: Vec<Item>,
/// }
///
/// async fn create(ValidatedJson(payload): ValidatedJson<CreateOrder>) -> StatusCode {
///     StatusCode::CREATED
/// }
/// ```
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state).await?;
        data.validate()?;
        Ok(ValidatedJson(data))
    }
}
