//! Qdrant store over its REST API.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | exists | `GET /collections/{name}/exists` |
//! | create | `PUT /collections/{name}` |
//! | batch query | `POST /collections/{name}/points/query/batch` |
//! | scroll | `POST /collections/{name}/points/scroll` |
//!
//! The credential, when present, is sent in the `api-key` header. Every
//! request is bounded by the client timeout; nothing is retried.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use docsplorer_core::predicate::Filter;
use docsplorer_core::store::{QueryRequest, Record, ScoredPoint, VectorStore};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::connection::ConnectionProfile;

pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct BatchQuery<'a> {
    searches: Vec<QueryBody<'a>>,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Filter>,
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<Record>,
}

impl QdrantStore {
    pub fn connect(profile: &ConnectionProfile, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!profile.verify_tls)
            .build()
            .context("Failed to build Qdrant HTTP client")?;

        Ok(Self {
            client,
            base_url: profile.url.clone(),
            api_key: profile.api_key.clone(),
        })
    }

    fn collection_url(&self, collection: &str, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, collection, suffix)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .with_context(|| format!("Qdrant {} request failed", what))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Qdrant {} returned {}: {}", what, status, body);
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let response = self
            .send(
                self.client.get(self.collection_url(collection, "/exists")),
                "collection exists",
            )
            .await?;
        let body: Envelope<ExistsResult> = response
            .json()
            .await
            .context("Failed to parse Qdrant exists response")?;
        Ok(body.result.exists)
    }

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<()> {
        let body = json!({ "vectors": { "size": vector_size, "distance": "Cosine" } });
        self.send(
            self.client
                .put(self.collection_url(collection, ""))
                .json(&body),
            "create collection",
        )
        .await?;
        Ok(())
    }

    async fn query_batch(
        &self,
        collection: &str,
        requests: &[QueryRequest],
    ) -> Result<Vec<Vec<ScoredPoint>>> {
        let body = BatchQuery {
            searches: requests
                .iter()
                .map(|r| QueryBody {
                    query: &r.vector,
                    filter: r.filter.as_ref(),
                    limit: r.limit,
                    with_payload: true,
                })
                .collect(),
        };
        debug!(collection, queries = requests.len(), "sending batch query");

        let response = self
            .send(
                self.client
                    .post(self.collection_url(collection, "/points/query/batch"))
                    .json(&body),
                "batch query",
            )
            .await?;
        let body: Envelope<Vec<QueryResult>> = response
            .json()
            .await
            .context("Failed to parse Qdrant batch query response")?;
        Ok(body.result.into_iter().map(|r| r.points).collect())
    }

    async fn scroll(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Record>> {
        let body = json!({
            "filter": filter,
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        let response = self
            .send(
                self.client
                    .post(self.collection_url(collection, "/points/scroll"))
                    .json(&body),
                "scroll",
            )
            .await?;
        let body: Envelope<ScrollResult> = response
            .json()
            .await
            .context("Failed to parse Qdrant scroll response")?;
        Ok(body.result.points)
    }
}
