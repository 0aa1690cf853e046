//! Vector store abstraction.
//!
//! The [`VectorStore`] trait covers the three store capabilities the engine
//! relies on: collection bootstrap, batched similarity search, and
//! cursor-style structural scans. Implementations must be `Send + Sync`.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`collection_exists`](VectorStore::collection_exists) | Check a collection |
//! | [`create_collection`](VectorStore::create_collection) | Create with cosine distance |
//! | [`query_batch`](VectorStore::query_batch) | N similarity queries, one round trip |
//! | [`scroll`](VectorStore::scroll) | Unranked filtered scan |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::predicate::Filter;

/// One similarity query inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub filter: Option<Filter>,
    pub limit: usize,
}

/// A ranked hit from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: Value,
    pub score: f32,
    #[serde(default)]
    pub payload: Value,
}

/// An unranked record from a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Value,
    #[serde(default)]
    pub payload: Value,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Create a collection of `vector_size`-dimensional cosine vectors.
    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<()>;

    /// Run every request against `collection` in one round trip.
    ///
    /// Returns one hit list per request, in request order.
    async fn query_batch(
        &self,
        collection: &str,
        requests: &[QueryRequest],
    ) -> Result<Vec<Vec<ScoredPoint>>>;

    /// Return up to `limit` records matching `filter`, unranked.
    async fn scroll(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Record>>;
}

/// Create `collection` if it does not exist yet. Returns `true` if created.
pub async fn ensure_collection(
    store: &dyn VectorStore,
    collection: &str,
    vector_size: usize,
) -> Result<bool> {
    if store.collection_exists(collection).await? {
        return Ok(false);
    }
    store.create_collection(collection, vector_size).await?;
    info!(collection, vector_size, "created collection");
    Ok(true)
}
