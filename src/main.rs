//! HTTP server for the item order book exchange.
//!
//! Limits come from `MAX_ORDERS_PER_PRICE`, `MAX_MAKERS_PER_MATCH` and
//! `MAX_OVERFLOW_STEPS`; the listening port from `PORT` (default 8080).

use std::sync::Arc;

use item_lob::{api, EngineConfig, Exchange};
use log::{error, info};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let _ = env_logger::try_init();
    let config = EngineConfig::from_env();
    let exchange = match Exchange::new(config.clone()) {
        Ok(exchange) => Arc::new(exchange),
        Err(e) => {
            error!("invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let app = api::create_router(exchange);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("bind");
    info!(
        "listening addr={} max_orders_per_price={} max_makers_per_match={} max_overflow_steps={}",
        addr, config.max_orders_per_price, config.max_makers_per_match, config.max_overflow_steps
    );
    axum::serve(listener, app.into_make_service())
        .await
        .expect("serve");
}
