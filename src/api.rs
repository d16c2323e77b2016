//! REST API over an [`Exchange`].
//!
//! Used by the binary and by integration tests. Create with [`create_router`].
//! Uses Extension for state so the router is `Router<()>` and works with `into_make_service()`.
//! Errors come back as `{"error": "..."}`: 404 for unknown orders or items, 400 otherwise.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::engine::Exchange;
use crate::error::BookError;
use crate::types::{
    AccountId, ItemId, LimitOrderRequest, MarketOrderRequest, OrderId, OrderLocator, Price,
    Quantity, Side,
};

/// Shared app state: one exchange per process.
#[derive(Clone)]
pub struct AppState {
    pub(crate) exchange: Arc<Exchange>,
}

/// Builds the REST router. Returns `Router<()>` so you can call `.into_make_service()` for `axum::serve`.
pub fn create_router(exchange: Arc<Exchange>) -> Router<()> {
    let state = AppState { exchange };
    Router::new()
        .route("/health", get(health))
        .route("/orders", post(place_limit_orders))
        .route("/orders/market", post(place_market_order))
        .route("/orders/cancel", post(cancel_orders))
        .route("/claims", post(claim))
        .route("/claims/units", post(claim_units))
        .route("/items/:item_id/best", get(best_prices))
        .route("/items/:item_id/levels/:side/:price", get(price_level))
        .route("/admin/token-policy", post(set_token_policy))
        .route("/admin/max-orders-per-price", post(set_max_orders_per_price))
        .layer(Extension(state))
}

fn error_response(e: BookError) -> Response {
    let status = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

fn respond<T: Serialize>(result: Result<T, BookError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

fn parse_side(raw: &str) -> Option<Side> {
    match raw.to_ascii_lowercase().as_str() {
        "buy" | "bid" => Some(Side::Buy),
        "sell" | "ask" => Some(Side::Sell),
        _ => None,
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Deserialize)]
struct PlaceLimitBody {
    maker: AccountId,
    orders: Vec<LimitOrderRequest>,
}

async fn place_limit_orders(
    Extension(state): Extension<AppState>,
    Json(body): Json<PlaceLimitBody>,
) -> Response {
    #[derive(Serialize)]
    struct Out {
        outcomes: Vec<crate::PlaceOutcome>,
    }
    respond(
        state
            .exchange
            .place_limit_orders(body.maker, &body.orders)
            .map(|outcomes| Out { outcomes }),
    )
}

#[derive(Deserialize)]
struct PlaceMarketBody {
    taker: AccountId,
    order: MarketOrderRequest,
}

async fn place_market_order(
    Extension(state): Extension<AppState>,
    Json(body): Json<PlaceMarketBody>,
) -> Response {
    respond(state.exchange.place_market_order(body.taker, &body.order))
}

#[derive(Deserialize)]
struct CancelBody {
    maker: AccountId,
    order_ids: Vec<OrderId>,
    locators: Vec<OrderLocator>,
}

async fn cancel_orders(
    Extension(state): Extension<AppState>,
    Json(body): Json<CancelBody>,
) -> Response {
    #[derive(Serialize)]
    struct Out {
        cancelled: Vec<crate::CancelOutcome>,
    }
    respond(
        state
            .exchange
            .cancel_orders(body.maker, &body.order_ids, &body.locators)
            .map(|cancelled| Out { cancelled }),
    )
}

#[derive(Deserialize)]
struct ClaimBody {
    caller: AccountId,
    order_ids: Vec<OrderId>,
}

async fn claim(Extension(state): Extension<AppState>, Json(body): Json<ClaimBody>) -> Response {
    respond(state.exchange.claim(body.caller, &body.order_ids))
}

#[derive(Deserialize)]
struct ClaimUnitsBody {
    caller: AccountId,
    item_id: ItemId,
    order_ids: Vec<OrderId>,
}

async fn claim_units(
    Extension(state): Extension<AppState>,
    Json(body): Json<ClaimUnitsBody>,
) -> Response {
    respond(
        state
            .exchange
            .claim_units(body.caller, body.item_id, &body.order_ids),
    )
}

async fn best_prices(
    Extension(state): Extension<AppState>,
    Path(item_id): Path<u64>,
) -> Response {
    let item_id = ItemId(item_id);
    if state.exchange.token_policy(item_id).is_none() {
        return error_response(BookError::UnknownItem { item_id });
    }
    #[derive(Serialize)]
    struct Out {
        bid: Option<Price>,
        ask: Option<Price>,
    }
    let out = Out {
        bid: state.exchange.best_bid(item_id),
        ask: state.exchange.best_ask(item_id),
    };
    (StatusCode::OK, Json(out)).into_response()
}

async fn price_level(
    Extension(state): Extension<AppState>,
    Path((item_id, side, price)): Path<(u64, String, Price)>,
) -> Response {
    let item_id = ItemId(item_id);
    let Some(side) = parse_side(&side) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("unknown side {}", side) })),
        )
            .into_response();
    };
    #[derive(Serialize)]
    struct Out {
        exists: bool,
        orders: Vec<crate::RestingOrderView>,
    }
    let out = Out {
        exists: state.exchange.price_level_exists(side, item_id, price),
        orders: state.exchange.orders_at_price(side, item_id, price),
    };
    (StatusCode::OK, Json(out)).into_response()
}

#[derive(Deserialize)]
struct TokenPolicyBody {
    actor: AccountId,
    item_id: ItemId,
    tick: Price,
    min_rest_quantity: Quantity,
}

async fn set_token_policy(
    Extension(state): Extension<AppState>,
    Json(body): Json<TokenPolicyBody>,
) -> Response {
    respond(
        state
            .exchange
            .set_token_policy(body.actor, body.item_id, body.tick, body.min_rest_quantity)
            .map(|()| serde_json::json!({ "ok": true })),
    )
}

#[derive(Deserialize)]
struct MaxOrdersBody {
    actor: AccountId,
    max_orders_per_price: usize,
}

async fn set_max_orders_per_price(
    Extension(state): Extension<AppState>,
    Json(body): Json<MaxOrdersBody>,
) -> Response {
    respond(
        state
            .exchange
            .set_max_orders_per_price(body.actor, body.max_orders_per_price)
            .map(|()| serde_json::json!({ "ok": true })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_parse_case_insensitively() {
        assert_eq!(parse_side("BUY"), Some(Side::Buy));
        assert_eq!(parse_side("ask"), Some(Side::Sell));
        assert_eq!(parse_side("hold"), None);
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = error_response(BookError::UnknownOrder { order_id: OrderId(1) });
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = error_response(BookError::NothingToClaim);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
