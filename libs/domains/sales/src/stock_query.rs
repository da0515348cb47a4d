//! Synchronous stock lookup against the stock service.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_parse_or_default, env_required};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::models::StockAvailability;

/// Availability and current price of one product, queried on behalf of the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockQuery: Send + Sync {
    /// Any transport failure or non-2xx answer is [`OrderError::UpstreamUnavailable`].
    async fn availability(&self, product_id: Uuid, credential: &str)
    -> OrderResult<StockAvailability>;
}

/// Where the stock service lives.
#[derive(Clone, Debug)]
pub struct StockServiceConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl StockServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl FromEnv for StockServiceConfig {
    /// - `STOCK_SERVICE_BASE_URL` (required)
    /// - `STOCK_SERVICE_TIMEOUT_SECS` (10)
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs: u64 = env_parse_or_default("STOCK_SERVICE_TIMEOUT_SECS", "10")?;
        Ok(Self {
            base_url: env_required("STOCK_SERVICE_BASE_URL")?,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// The subset of the stock service's product body this client reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductStock {
    stock_quantity: i32,
    price: Decimal,
}

/// [`StockQuery`] over HTTP: `GET {base_url}/api/products/{id}`.
#[derive(Clone, Debug)]
pub struct HttpStockQuery {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStockQuery {
    pub fn new(config: &StockServiceConfig) -> OrderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OrderError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn product_url(&self, product_id: Uuid) -> String {
        format!("{}/api/products/{}", self.base_url, product_id)
    }
}

#[async_trait]
impl StockQuery for HttpStockQuery {
    async fn availability(
        &self,
        product_id: Uuid,
        credential: &str,
    ) -> OrderResult<StockAvailability> {
        let response = self
            .client
            .get(self.product_url(product_id))
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| OrderError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrderError::UpstreamUnavailable(format!(
                "stock service answered {} for product {}",
                status, product_id
            )));
        }

        let product: ProductStock = response
            .json()
            .await
            .map_err(|e| OrderError::UpstreamUnavailable(format!("invalid body: {}", e)))?;

        tracing::debug!(
            product_id = %product_id,
            available = product.stock_quantity,
            "Queried stock"
        );

        Ok(StockAvailability {
            available: product.stock_quantity,
            unit_price: product.price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
    use axum::routing::get;
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};

    const KNOWN: Uuid = Uuid::from_u128(0x0194a3c0_0000_7000_8000_000000000001);

    async fn product(
        Path(id): Path<Uuid>,
        headers: HeaderMap,
    ) -> Result<Json<Value>, StatusCode> {
        if headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some("Bearer caller-token")
        {
            return Err(StatusCode::UNAUTHORIZED);
        }
        if id != KNOWN {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(Json(json!({
            "id": id,
            "name": "Keyboard",
            "description": null,
            "price": "49.90",
            "stockQuantity": 7
        })))
    }

    async fn spawn_stock_service() -> String {
        let app = Router::new().route("/api/products/{id}", get(product));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_reads_availability_and_price() {
        let base_url = spawn_stock_service().await;
        let query = HttpStockQuery::new(&StockServiceConfig::new(base_url)).unwrap();

        let stock = query.availability(KNOWN, "caller-token").await.unwrap();

        assert_eq!(
            stock,
            StockAvailability {
                available: 7,
                unit_price: dec!(49.90),
            }
        );
    }

    #[tokio::test]
    async fn test_forwards_caller_credential() {
        let base_url = spawn_stock_service().await;
        let query = HttpStockQuery::new(&StockServiceConfig::new(base_url)).unwrap();

        let result = query.availability(KNOWN, "someone-else").await;

        assert!(matches!(result, Err(OrderError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_non_success_is_upstream_unavailable() {
        let base_url = spawn_stock_service().await;
        let query = HttpStockQuery::new(&StockServiceConfig::new(base_url)).unwrap();

        let result = query.availability(Uuid::now_v7(), "caller-token").await;

        assert!(matches!(result, Err(OrderError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_upstream_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = StockServiceConfig::new(format!("http://{}", addr));
        let query = HttpStockQuery::new(&config).unwrap();

        let result = query.availability(KNOWN, "caller-token").await;

        assert!(matches!(result, Err(OrderError::UpstreamUnavailable(_))));
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("STOCK_SERVICE_BASE_URL", Some("http://stock:8081")),
                ("STOCK_SERVICE_TIMEOUT_SECS", None),
            ],
            || {
                let config = StockServiceConfig::from_env().unwrap();
                assert_eq!(config.base_url, "http://stock:8081");
                assert_eq!(config.timeout, Duration::from_secs(10));
            },
        );

        temp_env::with_var_unset("STOCK_SERVICE_BASE_URL", || {
            assert!(StockServiceConfig::from_env().is_err());
        });
    }
}
