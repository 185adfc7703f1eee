//! Order placement, cached per product for five minutes.

use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use larder_core::CacheKey;
use serde::{Deserialize, Serialize};

use crate::constants::{ORDER_NAMESPACE, ORDER_QUOTA, ORDER_TTL};
use crate::middleware::{
    assign_cache_key, cache_guard_middleware, rate_limit_middleware, CacheAsideGuard,
    CacheGuardState, KeyAssignment,
};
use crate::origin::Order;
use crate::routes::write_back;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order: Order,
}

/// GET /order/:productId
pub async fn place_order(
    State(guard): State<CacheAsideGuard>,
    Path(product_id): Path<String>,
) -> Json<OrderResponse> {
    let order = Order::place(&product_id);
    tracing::info!(product_id = %product_id, order_id = order.id, "Order placed");

    let key = CacheKey::entity(ORDER_NAMESPACE, &product_id);
    write_back(&guard, &key, &order, ORDER_TTL).await;
    Json(OrderResponse { order })
}

pub fn create_router(state: &AppState) -> Router {
    Router::new()
        .route("/order/:productId", get(place_order))
        .route_layer(from_fn_with_state(
            CacheGuardState::per_request(state.guard.clone()),
            cache_guard_middleware,
        ))
        .route_layer(from_fn_with_state(
            KeyAssignment::new(ORDER_NAMESPACE, "productId"),
            assign_cache_key,
        ))
        .route_layer(from_fn_with_state(
            state.rate_limit(ORDER_QUOTA),
            rate_limit_middleware,
        ))
        .with_state(state.clone())
}
