use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use axum_helpers::{
    BearerToken, UuidPath, ValidatedJson,
    errors::responses::{
        BadGatewayResponse, BadRequestUuidResponse, BadRequestValidationResponse,
        InternalServerErrorResponse, NotFoundResponse,
    },
};
use tokio::sync::watch;
use utoipa::OpenApi;

use crate::error::OrderResult;
use crate::models::{CreateOrder, CreateOrderItem, OrderLine, OrderResponse, OrderStatus};
use crate::notifier::SaleNotifier;
use crate::repository::OrderRepository;
use crate::service::OrderService;
use crate::stock_query::StockQuery;

pub const TAG: &str = "orders";

/// OpenAPI documentation for the Orders API
#[derive(OpenApi)]
#[openapi(
    paths(create_order, get_order),
    components(
        schemas(OrderResponse, OrderLine, OrderStatus, CreateOrder, CreateOrderItem),
        responses(
            NotFoundResponse,
            BadRequestValidationResponse,
            BadRequestUuidResponse,
            BadGatewayResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = TAG, description = "Order intake endpoints")
    )
)]
pub struct ApiDoc;

struct OrderState<R, Q, N> {
    service: OrderService<R, Q, N>,
    /// Flips to `true` on shutdown; aborts in-flight stock queries and publishes.
    shutdown: watch::Receiver<bool>,
}

impl<R, Q, N> Clone for OrderState<R, Q, N> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Create the order router (`/` and `/{id}`), to be nested under `/orders`.
pub fn router<R, Q, N>(service: OrderService<R, Q, N>, shutdown: watch::Receiver<bool>) -> Router
where
    R: OrderRepository + 'static,
    Q: StockQuery + 'static,
    N: SaleNotifier + 'static,
{
    Router::new()
        .route("/", axum::routing::post(create_order))
        .route("/{id}", get(get_order))
        .with_state(OrderState { service, shutdown })
}

/// Create an order after checking stock for every item
#[utoipa::path(
    post,
    path = "/api/orders",
    tag = TAG,
    request_body = CreateOrder,
    responses(
        (status = 201, description = "Order confirmed", body = OrderResponse,
            headers(("Location" = String, description = "URL of the new order"))),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, description = "Missing bearer token"),
        (status = 502, response = BadGatewayResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn create_order<R, Q, N>(
    State(state): State<OrderState<R, Q, N>>,
    credential: BearerToken,
    ValidatedJson(input): ValidatedJson<CreateOrder>,
) -> OrderResult<impl IntoResponse>
where
    R: OrderRepository,
    Q: StockQuery,
    N: SaleNotifier,
{
    let order = state
        .service
        .create_order(input, credential.as_str(), state.shutdown.clone())
        .await?;

    let location = format!("/api/orders/{}", order.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(OrderResponse::from(order)),
    ))
}

/// Get an order by ID
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 400, response = BadRequestUuidResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn get_order<R, Q, N>(
    State(state): State<OrderState<R, Q, N>>,
    UuidPath(id): UuidPath,
) -> OrderResult<Json<OrderResponse>>
where
    R: OrderRepository,
    Q: StockQuery,
    N: SaleNotifier,
{
    let order = state.service.get_order(id).await?;
    Ok(Json(order.into()))
}
