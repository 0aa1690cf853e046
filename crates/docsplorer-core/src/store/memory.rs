//! In-memory [`VectorStore`] implementation for tests and local runs.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Similarity
//! search is brute-force cosine over every stored vector that passes the
//! filter; scans return matching records in insertion order.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{QueryRequest, Record, ScoredPoint, VectorStore};
use crate::embedding::cosine_similarity;
use crate::predicate::Filter;

struct StoredPoint {
    id: Value,
    vector: Vec<f32>,
    payload: Value,
}

struct Collection {
    vector_size: usize,
    points: Vec<StoredPoint>,
}

/// In-memory store keyed by collection name.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a point, creating the collection on first use.
    ///
    /// Fails if the vector length disagrees with the collection's size.
    pub fn insert(
        &self,
        collection: &str,
        id: impl Into<Value>,
        vector: Vec<f32>,
        payload: Value,
    ) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let entry = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                vector_size: vector.len(),
                points: Vec::new(),
            });
        if entry.vector_size != vector.len() {
            bail!(
                "vector size {} does not match collection '{}' size {}",
                vector.len(),
                collection,
                entry.vector_size
            );
        }
        entry.points.push(StoredPoint {
            id: id.into(),
            vector,
            payload,
        });
        Ok(())
    }

    /// Number of points in a collection (0 if missing).
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, |col| col.points.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let collections = self
            .collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(collections.contains_key(collection))
    }

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        if collections.contains_key(collection) {
            bail!("collection '{}' already exists", collection);
        }
        collections.insert(
            collection.to_string(),
            Collection {
                vector_size,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn query_batch(
        &self,
        collection: &str,
        requests: &[QueryRequest],
    ) -> Result<Vec<Vec<ScoredPoint>>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let col = collections
            .get(collection)
            .ok_or_else(|| anyhow!("collection '{}' not found", collection))?;

        let responses = requests
            .iter()
            .map(|req| {
                let mut hits: Vec<ScoredPoint> = col
                    .points
                    .iter()
                    .filter(|p| req.filter.as_ref().map_or(true, |f| f.matches(&p.payload)))
                    .map(|p| ScoredPoint {
                        id: p.id.clone(),
                        score: cosine_similarity(&req.vector, &p.vector),
                        payload: p.payload.clone(),
                    })
                    .collect();
                hits.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                hits.truncate(req.limit);
                hits
            })
            .collect();

        Ok(responses)
    }

    async fn scroll(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Record>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let col = collections
            .get(collection)
            .ok_or_else(|| anyhow!("collection '{}' not found", collection))?;

        Ok(col
            .points
            .iter()
            .filter(|p| filter.matches(&p.payload))
            .take(limit)
            .map(|p| Record {
                id: p.id.clone(),
                payload: p.payload.clone(),
            })
            .collect())
    }
}
