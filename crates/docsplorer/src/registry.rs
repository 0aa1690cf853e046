//! Process-wide client registry.
//!
//! Holds at most one pooled store per [`Environment`] and one embedding
//! client, each created lazily on first use and cached for the registry's
//! lifetime. Concurrent first access constructs a client once. Exclusive
//! stores for sessions with custom connection parameters are built fresh
//! and owned by the caller.
//!
//! Construction goes through connector functions so tests can substitute
//! in-memory backends.

use docsplorer_core::embedding::Embedder;
use docsplorer_core::store::VectorStore;
use docsplorer_core::{SearchError, SearchResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::config::{Config, EmbeddingConfig, Environment, StoreConfig};
use crate::connection::{resolve, ConnectionOverrides, ConnectionProfile};
use crate::embedding::OllamaEmbedder;
use crate::qdrant::QdrantStore;

pub type StoreConnector =
    Arc<dyn Fn(&ConnectionProfile) -> anyhow::Result<Box<dyn VectorStore>> + Send + Sync>;
pub type EmbedderConnector =
    Arc<dyn Fn(&EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> + Send + Sync>;

/// Which lazily-created clients exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStatus {
    pub store: bool,
    pub embedding: bool,
}

pub struct ClientRegistry {
    store: StoreConfig,
    embedding: EmbeddingConfig,
    development: OnceCell<Arc<dyn VectorStore>>,
    production: OnceCell<Arc<dyn VectorStore>>,
    embedder: OnceCell<Arc<dyn Embedder>>,
    connect_store: StoreConnector,
    connect_embedder: EmbedderConnector,
}

impl ClientRegistry {
    /// Registry backed by Qdrant and Ollama.
    pub fn new(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.store.timeout_secs);
        let connect_store: StoreConnector = Arc::new(
            move |profile: &ConnectionProfile| -> anyhow::Result<Box<dyn VectorStore>> {
                Ok(Box::new(QdrantStore::connect(profile, timeout)?))
            },
        );
        let connect_embedder: EmbedderConnector = Arc::new(
            |config: &EmbeddingConfig| -> anyhow::Result<Arc<dyn Embedder>> {
                Ok(Arc::new(OllamaEmbedder::new(config)?))
            },
        );
        Self::with_connectors(config, connect_store, connect_embedder)
    }

    pub fn with_connectors(
        config: &Config,
        connect_store: StoreConnector,
        connect_embedder: EmbedderConnector,
    ) -> Self {
        Self {
            store: config.store.clone(),
            embedding: config.embedding.clone(),
            development: OnceCell::new(),
            production: OnceCell::new(),
            embedder: OnceCell::new(),
            connect_store,
            connect_embedder,
        }
    }

    pub fn store_settings(&self) -> &StoreConfig {
        &self.store
    }

    fn pool(&self, environment: Environment) -> &OnceCell<Arc<dyn VectorStore>> {
        match environment {
            Environment::Development => &self.development,
            Environment::Production => &self.production,
        }
    }

    /// The pooled store for `environment`.
    pub async fn shared(&self, environment: Environment) -> SearchResult<Arc<dyn VectorStore>> {
        let store = self
            .pool(environment)
            .get_or_try_init(|| async {
                let profile = resolve(None, environment, &self.store)?;
                let store = self.connect(&profile)?;
                info!(
                    environment = %environment,
                    host = %profile.host,
                    "created pooled store client"
                );
                Ok::<_, SearchError>(Arc::from(store))
            })
            .await?;
        Ok(store.clone())
    }

    /// A new store client owned by the caller.
    pub fn exclusive(&self, overrides: &ConnectionOverrides) -> SearchResult<Box<dyn VectorStore>> {
        let profile = resolve(Some(overrides), Environment::Development, &self.store)?;
        let store = self.connect(&profile)?;
        info!(host = %profile.host, "created exclusive store client");
        Ok(store)
    }

    /// The process-wide embedding client.
    pub async fn embedder(&self) -> SearchResult<Arc<dyn Embedder>> {
        let embedder = self
            .embedder
            .get_or_try_init(|| async {
                let embedder = (self.connect_embedder)(&self.embedding).map_err(|e| {
                    error!(error = %e, "failed to create embedding client");
                    SearchError::EmbeddingUnavailable(e.to_string())
                })?;
                info!(url = %self.embedding.url, "created embedding client");
                Ok::<_, SearchError>(embedder)
            })
            .await?;
        Ok(embedder.clone())
    }

    pub fn status(&self) -> RegistryStatus {
        RegistryStatus {
            store: self.development.initialized() || self.production.initialized(),
            embedding: self.embedder.initialized(),
        }
    }

    fn connect(&self, profile: &ConnectionProfile) -> SearchResult<Box<dyn VectorStore>> {
        (self.connect_store)(profile).map_err(|e| {
            error!(host = %profile.host, error = %e, "failed to create store client");
            SearchError::StoreUnavailable(e.to_string())
        })
    }
}
