//! Ollama embedding client.
//!
//! One `POST {url}/api/embeddings` per string with body
//! `{"model": ..., "prompt": ...}`; the response carries
//! `{"embedding": [...]}`. An optional credential is sent as a bearer token.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use docsplorer_core::embedding::Embedder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;

pub struct OllamaEmbedder {
    client: Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}/api/embeddings", config.url.trim_end_matches('/')),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest {
                model,
                prompt: text,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Embedding service returned {}: {}", status, body);
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        if body.embedding.is_empty() {
            bail!("Embedding service returned an empty vector for model '{}'", model);
        }
        Ok(body.embedding)
    }
}
