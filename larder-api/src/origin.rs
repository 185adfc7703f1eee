//! Slow origin behind the cache.
//!
//! The catalog stands in for an expensive upstream: every lookup sleeps for
//! the configured latency before answering.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};

/// One entry of the product collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub price: u64,
}

/// Product detail. `id` echoes the requested path segment; `price` is null
/// when the id is not a finite number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub id: String,
    pub name: String,
    pub price: Option<i64>,
}

/// Order placed for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Milliseconds since the Unix epoch at creation.
    pub id: i64,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    /// `productId * 100`, null when the id is not a finite number.
    #[serde(serialize_with = "serialize_amount")]
    pub total: Option<f64>,
    pub status: String,
    pub timestamp: String,
}

impl Order {
    /// Build a fresh order for `product_id`.
    pub fn place(product_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis(),
            product_id: product_id.to_string(),
            product_name: format!("Product {}", product_id),
            quantity: 1,
            total: numeric_id(product_id)
                .map(|n| n * 100.0)
                .filter(|total| total.is_finite()),
            status: "ordered".to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Numeric value of an id segment; decimals and negatives count.
fn numeric_id(id: &str) -> Option<f64> {
    id.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Whole amounts go out as integers, fractional ones as floats.
fn serialize_amount<S>(amount: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    match amount {
        Some(v) if v.fract() == 0.0 && v.abs() < MAX_EXACT => {
            serializer.serialize_i64(*v as i64)
        }
        Some(v) => serializer.serialize_f64(*v),
        None => serializer.serialize_none(),
    }
}

/// Upstream the cached routes fall through to.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn list_products(&self) -> Vec<Product>;

    async fn product_detail(&self, id: &str) -> ProductDetail;
}

/// Catalog answering after a fixed delay.
///
/// Detail prices are random on every call, which makes cached and fresh
/// answers easy to tell apart.
#[derive(Debug, Clone)]
pub struct SimulatedCatalog {
    latency: Duration,
}

impl SimulatedCatalog {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ProductCatalog for SimulatedCatalog {
    async fn list_products(&self) -> Vec<Product> {
        self.delay().await;
        vec![Product {
            id: 1,
            name: "Product 1".to_string(),
            price: 100,
        }]
    }

    async fn product_detail(&self, id: &str) -> ProductDetail {
        self.delay().await;
        let price = numeric_id(id).map(|n| {
            let factor: f64 = rand::rng().random();
            (factor * n * 100.0).floor() as i64
        });
        ProductDetail {
            id: id.to_string(),
            name: format!("Product {}", id),
            price,
        }
    }
}
