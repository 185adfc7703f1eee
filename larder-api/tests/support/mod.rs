//! Shared fixtures for the router-level tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use larder_api::{
    create_api_router, ApiConfig, AppState, Product, ProductCatalog, ProductDetail,
    SimulatedCatalog,
};
use larder_storage::{InMemoryStore, SharedStore};
use tower::ServiceExt;

/// Origin that counts how often it is reached.
pub struct CountingCatalog {
    inner: SimulatedCatalog,
    list_calls: AtomicUsize,
    detail_calls: AtomicUsize,
}

impl CountingCatalog {
    pub fn new() -> Self {
        Self {
            inner: SimulatedCatalog::new(Duration::ZERO),
            list_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductCatalog for CountingCatalog {
    async fn list_products(&self) -> Vec<Product> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_products().await
    }

    async fn product_detail(&self, id: &str) -> ProductDetail {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.product_detail(id).await
    }
}

/// A router over a fresh in-memory store.
pub struct TestApp {
    pub router: Router,
    pub store: InMemoryStore,
    pub catalog: Arc<CountingCatalog>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(ApiConfig::default())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let store = InMemoryStore::new();
        let shared: SharedStore = Arc::new(store.clone());
        let catalog = Arc::new(CountingCatalog::new());
        let state = AppState::new(shared, catalog.clone(), config);
        let router = match create_api_router(state) {
            Ok(router) => router,
            Err(e) => panic!("Failed to build router: {}", e),
        };

        Self {
            router,
            store,
            catalog,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, &[], None).await
    }

    /// Send a request, optionally as coming from `peer`, and read the whole
    /// body (which completes the request for the audit log).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        peer: Option<SocketAddr>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = match builder.body(Body::empty()) {
            Ok(request) => request,
            Err(e) => panic!("Failed to build request: {}", e),
        };
        if let Some(addr) = peer {
            request.extensions_mut().insert(ConnectInfo(addr));
        }

        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(e) => panic!("Request failed: {:?}", e),
        };
        let status = response.status();
        let headers = response.headers().clone();
        let body = match axum::body::to_bytes(response.into_body(), usize::MAX).await {
            Ok(body) => body,
            Err(e) => panic!("Failed to read body: {:?}", e),
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub fn peer(last_octet: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, last_octet], 40_000))
}
