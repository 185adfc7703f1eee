//! Larder API Server Entry Point
//!
//! Bootstraps configuration, connects the shared store and starts the Axum
//! HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use larder_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, SimulatedCatalog, StoreBackend,
};
use larder_storage::{InMemoryStore, RedisStore, SharedStore};

use larder_api::telemetry::{init_tracer, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env()?;

    let store: SharedStore = match api_config.store_backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&api_config.redis_url).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; state is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };
    tracing::info!(backend = store.backend_name(), "Store connected");

    let catalog = Arc::new(SimulatedCatalog::new(api_config.origin_latency));
    let addr = api_config.bind_addr()?;

    let state = AppState::new(store, catalog, api_config);
    let app = create_api_router(state)?;

    tracing::info!(%addr, "Starting Larder API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Larder API server stopped");
    Ok(())
}
