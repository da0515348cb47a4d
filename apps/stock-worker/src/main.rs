//! Stock Worker - Entry Point
//!
//! Consumes sale notifications and serves stock lookups.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    stock_worker::run().await
}
