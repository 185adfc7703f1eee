//! Product routes: the index, the product collection and product detail.
//!
//! Collection and detail are cache-aside: the guard answers hits, the
//! handlers below only run on a miss and write their result back.

use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use larder_core::CacheKey;
use serde::{Deserialize, Serialize};

use crate::constants::{
    INDEX_QUOTA, PRODUCTS_KEY, PRODUCTS_QUOTA, PRODUCTS_TTL, PRODUCT_DETAIL_QUOTA,
    PRODUCT_DETAIL_TTL, PRODUCT_NAMESPACE,
};
use crate::middleware::{
    assign_cache_key, cache_guard_middleware, rate_limit_middleware, CacheAsideGuard,
    CacheGuardState, KeyAssignment,
};
use crate::origin::{Product, ProductDetail};
use crate::routes::write_back;
use crate::state::{AppState, SharedCatalog};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductsResponse {
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductResponse {
    pub product: ProductDetail,
}

/// GET /
pub async fn index() -> &'static str {
    "Server is running"
}

/// GET /products
pub async fn list_products(
    State(catalog): State<SharedCatalog>,
    State(guard): State<CacheAsideGuard>,
) -> Json<ProductsResponse> {
    let products = catalog.list_products().await;
    write_back(&guard, &CacheKey::new(PRODUCTS_KEY), &products, PRODUCTS_TTL).await;
    Json(ProductsResponse { products })
}

/// GET /product/:id
pub async fn product_detail(
    State(catalog): State<SharedCatalog>,
    State(guard): State<CacheAsideGuard>,
    Path(id): Path<String>,
) -> Json<ProductResponse> {
    let product = catalog.product_detail(&id).await;
    let key = CacheKey::entity(PRODUCT_NAMESPACE, &id);
    write_back(&guard, &key, &product, PRODUCT_DETAIL_TTL).await;
    Json(ProductResponse { product })
}

pub fn create_router(state: &AppState) -> Router {
    let index = Router::new()
        .route("/", get(index))
        .route_layer(from_fn_with_state(
            state.rate_limit(INDEX_QUOTA),
            rate_limit_middleware,
        ));

    let collection = Router::new()
        .route("/products", get(list_products))
        .route_layer(from_fn_with_state(
            CacheGuardState::fixed(state.guard.clone(), PRODUCTS_KEY),
            cache_guard_middleware,
        ))
        .route_layer(from_fn_with_state(
            state.rate_limit(PRODUCTS_QUOTA),
            rate_limit_middleware,
        ));

    let detail = Router::new()
        .route("/product/:id", get(product_detail))
        .route_layer(from_fn_with_state(
            CacheGuardState::per_request(state.guard.clone()),
            cache_guard_middleware,
        ))
        .route_layer(from_fn_with_state(
            KeyAssignment::new(PRODUCT_NAMESPACE, "id"),
            assign_cache_key,
        ))
        .route_layer(from_fn_with_state(
            state.rate_limit(PRODUCT_DETAIL_QUOTA),
            rate_limit_middleware,
        ));

    index
        .merge(collection)
        .merge(detail)
        .with_state(state.clone())
}
