use axum::{Json, Router, extract::State, routing::get};
use axum_helpers::{
    UuidPath,
    errors::responses::{BadRequestUuidResponse, InternalServerErrorResponse, NotFoundResponse},
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::{StockError, StockResult};
use crate::ledger::StockLedger;
use crate::models::Product;

pub const TAG: &str = "products";

/// OpenAPI documentation for the Products API
#[derive(OpenApi)]
#[openapi(
    paths(get_product),
    components(
        schemas(Product),
        responses(NotFoundResponse, BadRequestUuidResponse, InternalServerErrorResponse)
    ),
    tags(
        (name = TAG, description = "Stock lookups used by order intake")
    )
)]
pub struct ApiDoc;

/// Create the product router (`/{id}`), to be nested under `/products`.
pub fn router<L: StockLedger + 'static>(ledger: Arc<L>) -> Router {
    Router::new()
        .route("/{id}", get(get_product::<L>))
        .with_state(ledger)
}

/// Get a product with its current stock level
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product found", body = Product),
        (status = 400, response = BadRequestUuidResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn get_product<L: StockLedger>(
    State(ledger): State<Arc<L>>,
    UuidPath(id): UuidPath,
) -> StockResult<Json<Product>> {
    let product = ledger
        .get_product(id)
        .await?
        .ok_or(StockError::NotFound(id))?;
    Ok(Json(product))
}
