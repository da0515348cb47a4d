//! Sales API - Entry Point
//!
//! Order intake over HTTP; confirmed orders are announced on the broker.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    sales_api::run().await
}
