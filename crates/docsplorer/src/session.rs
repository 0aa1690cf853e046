//! Per-request search sessions.
//!
//! A [`SearchSession`] binds one collection to a store client and the
//! shared embedding client. Sessions without custom connection parameters
//! borrow the pooled client for their environment; sessions with custom
//! parameters own an exclusive client that is released when the session
//! is dropped.

use docsplorer_core::context::MAX_PAGE_NUMBER;
use docsplorer_core::embedding::Embedder;
use docsplorer_core::search::{batch_search, SearchHit, SearchParams, SearchRequest};
use docsplorer_core::store::{ensure_collection, VectorStore};
use docsplorer_core::{SearchError, SearchResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::{Config, Environment};
use crate::connection::ConnectionOverrides;
use crate::filenames::{search_filenames, FilenameSearch};
use crate::registry::ClientRegistry;

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub use_production: bool,
    pub overrides: ConnectionOverrides,
    /// Falls back to `search.context_window`.
    pub context_window: Option<u32>,
}

pub enum StoreHandle {
    Shared(Arc<dyn VectorStore>),
    Exclusive(Box<dyn VectorStore>),
}

impl StoreHandle {
    pub fn store(&self) -> &dyn VectorStore {
        match self {
            StoreHandle::Shared(store) => store.as_ref(),
            StoreHandle::Exclusive(store) => store.as_ref(),
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, StoreHandle::Exclusive(_))
    }
}

pub struct SearchSession {
    collection: String,
    store: StoreHandle,
    embedder: Arc<dyn Embedder>,
    context_window: u32,
    default_model: String,
}

impl SearchSession {
    /// Open a session on `collection`, creating the collection if missing.
    pub async fn open(
        registry: &ClientRegistry,
        config: &Config,
        collection: &str,
        options: SessionOptions,
    ) -> SearchResult<Self> {
        if collection.trim().is_empty() {
            return Err(SearchError::Config(
                "collection name must not be empty".to_string(),
            ));
        }
        let custom = !options.overrides.is_empty();
        if custom && options.use_production {
            return Err(SearchError::Config(
                "custom connection parameters cannot be combined with use_production".to_string(),
            ));
        }

        let store = if custom {
            StoreHandle::Exclusive(registry.exclusive(&options.overrides)?)
        } else {
            let environment = if options.use_production {
                Environment::Production
            } else {
                Environment::Development
            };
            StoreHandle::Shared(registry.shared(environment).await?)
        };
        let embedder = registry.embedder().await?;

        let vector_size = registry.store_settings().default_vector_size;
        ensure_collection(store.store(), collection, vector_size)
            .await
            .map_err(|e| {
                error!(collection, error = %e, "failed to prepare collection");
                SearchError::StoreUnavailable(e.to_string())
            })?;

        let context_window = options
            .context_window
            .unwrap_or(config.search.context_window)
            .min(MAX_PAGE_NUMBER as u32);
        debug!(collection, exclusive = custom, context_window, "opened search session");

        Ok(Self {
            collection: collection.to_string(),
            store,
            embedder,
            context_window,
            default_model: config.embedding.model.clone(),
        })
    }

    pub fn context_window(&self) -> u32 {
        self.context_window
    }

    pub fn is_exclusive(&self) -> bool {
        self.store.is_exclusive()
    }

    /// Batch semantic search with context expansion.
    pub async fn search(
        &self,
        queries: &[String],
        filter: Option<&Value>,
        limit: usize,
        embedding_model: Option<&str>,
    ) -> SearchResult<Vec<Vec<SearchHit>>> {
        let model = embedding_model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.default_model);
        let request = SearchRequest {
            collection: &self.collection,
            queries,
            filter,
            params: SearchParams {
                limit,
                context_window: self.context_window,
                embedding_model: model.to_string(),
            },
        };
        batch_search(self.store.store(), self.embedder.as_ref(), &request).await
    }

    pub async fn search_filenames(
        &self,
        query: &str,
        limit: usize,
    ) -> SearchResult<FilenameSearch> {
        search_filenames(self.store.store(), &self.collection, query, limit).await
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        if self.store.is_exclusive() {
            debug!(collection = %self.collection, "released exclusive store client");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::connection::ConnectionProfile;
    use async_trait::async_trait;
    use docsplorer_core::predicate::Filter;
    use docsplorer_core::store::memory::InMemoryStore;
    use docsplorer_core::store::{QueryRequest, Record, ScoredPoint};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, model: &str, _text: &str) -> anyhow::Result<Vec<f32>> {
            if model == "missing-model" {
                anyhow::bail!("model '{}' not found", model);
            }
            Ok(vec![1.0, 0.0])
        }
    }

    /// Shares one in-memory store behind every client the registry hands out
    /// and counts live exclusive clients.
    struct TrackedStore {
        inner: Arc<InMemoryStore>,
        live: Arc<AtomicUsize>,
    }

    impl Drop for TrackedStore {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl VectorStore for TrackedStore {
        async fn collection_exists(&self, c: &str) -> anyhow::Result<bool> {
            self.inner.collection_exists(c).await
        }
        async fn create_collection(&self, c: &str, n: usize) -> anyhow::Result<()> {
            self.inner.create_collection(c, n).await
        }
        async fn query_batch(
            &self,
            c: &str,
            r: &[QueryRequest],
        ) -> anyhow::Result<Vec<Vec<ScoredPoint>>> {
            self.inner.query_batch(c, r).await
        }
        async fn scroll(&self, c: &str, f: &Filter, l: usize) -> anyhow::Result<Vec<Record>> {
            self.inner.scroll(c, f, l).await
        }
    }

    struct Fixture {
        registry: ClientRegistry,
        config: Config,
        store: Arc<InMemoryStore>,
        live: Arc<AtomicUsize>,
        created: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        for n in 0..5u64 {
            store
                .insert(
                    "manuals",
                    n,
                    if n == 2 { vec![1.0, 0.0] } else { vec![0.0, 1.0] },
                    json!({
                        "pagecontent": format!("page {}", n),
                        "metadata": { "filename": "Guide", "page_number": n }
                    }),
                )
                .unwrap();
        }
        let live = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(AtomicUsize::new(0));
        let config = Config::default();

        let (inner, live_c, created_c) = (store.clone(), live.clone(), created.clone());
        let registry = ClientRegistry::with_connectors(
            &config,
            Arc::new(
                move |_: &ConnectionProfile| -> anyhow::Result<Box<dyn VectorStore>> {
                    created_c.fetch_add(1, Ordering::SeqCst);
                    live_c.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(TrackedStore {
                        inner: inner.clone(),
                        live: live_c.clone(),
                    }))
                },
            ),
            Arc::new(|_: &EmbeddingConfig| -> anyhow::Result<Arc<dyn Embedder>> {
                Ok(Arc::new(FixedEmbedder))
            }),
        );

        Fixture {
            registry,
            config,
            store,
            live,
            created,
        }
    }

    fn custom() -> SessionOptions {
        SessionOptions {
            overrides: ConnectionOverrides {
                url: Some("http://custom:6333".to_string()),
                ..ConnectionOverrides::default()
            },
            ..SessionOptions::default()
        }
    }

    #[tokio::test]
    async fn test_production_with_overrides_constructs_nothing() {
        let fx = fixture();
        let options = SessionOptions {
            use_production: true,
            ..custom()
        };
        let err = SearchSession::open(&fx.registry, &fx.config, "manuals", options)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SearchError::Config(_)));
        assert_eq!(fx.created.load(Ordering::SeqCst), 0);
        assert!(!fx.registry.status().embedding);
    }

    #[tokio::test]
    async fn test_exclusive_client_released_on_drop() {
        let fx = fixture();
        {
            let session = SearchSession::open(&fx.registry, &fx.config, "manuals", custom())
                .await
                .unwrap();
            assert!(session.is_exclusive());
            assert_eq!(fx.live.load(Ordering::SeqCst), 1);
        }
        assert_eq!(fx.live.load(Ordering::SeqCst), 0);

        // Released on the error path too.
        let session = SearchSession::open(&fx.registry, &fx.config, "manuals", custom())
            .await
            .unwrap();
        let err = session
            .search(&["x".to_string()], None, 1, Some("missing-model"))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Embedding(_)));
        drop(session);
        assert_eq!(fx.live.load(Ordering::SeqCst), 0);
        assert_eq!(fx.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pooled_sessions_share_one_client() {
        let fx = fixture();
        for _ in 0..3 {
            let session =
                SearchSession::open(&fx.registry, &fx.config, "manuals", SessionOptions::default())
                    .await
                    .unwrap();
            assert!(!session.is_exclusive());
        }
        assert_eq!(fx.created.load(Ordering::SeqCst), 1);
        assert!(fx.registry.status().store);
    }

    #[tokio::test]
    async fn test_open_creates_missing_collection() {
        let fx = fixture();
        assert!(!fx.store.collection_exists("fresh").await.unwrap());
        SearchSession::open(&fx.registry, &fx.config, "fresh", SessionOptions::default())
            .await
            .unwrap();
        assert!(fx.store.collection_exists("fresh").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_uses_session_window() {
        let fx = fixture();
        let options = SessionOptions {
            context_window: Some(1),
            ..SessionOptions::default()
        };
        let session = SearchSession::open(&fx.registry, &fx.config, "manuals", options)
            .await
            .unwrap();
        assert_eq!(session.context_window(), 1);

        let results = session
            .search(&["install".to_string()], None, 1, None)
            .await
            .unwrap();
        let body = serde_json::to_value(&results).unwrap();
        assert_eq!(body[0][0]["center_page"], json!(2));
        assert_eq!(body[0][0]["page_numbers"], json!([1, 2, 3]));
        assert_eq!(body[0][0]["combined_page"], json!("page 1 page 2 page 3"));
    }

    #[tokio::test]
    async fn test_window_defaults_and_clamps() {
        let fx = fixture();
        let session =
            SearchSession::open(&fx.registry, &fx.config, "manuals", SessionOptions::default())
                .await
                .unwrap();
        assert_eq!(session.context_window(), 5);

        let options = SessionOptions {
            context_window: Some(50_000),
            ..SessionOptions::default()
        };
        let session = SearchSession::open(&fx.registry, &fx.config, "manuals", options)
            .await
            .unwrap();
        assert_eq!(session.context_window(), MAX_PAGE_NUMBER as u32);
    }

    #[tokio::test]
    async fn test_filename_search_through_session() {
        let fx = fixture();
        let session = SearchSession::open(&fx.registry, &fx.config, "manuals", custom())
            .await
            .unwrap();
        let result = session.search_filenames("guide", 10).await.unwrap();
        assert_eq!(result.total_matches, 1);
        assert_eq!(result.filenames[0].filename, "Guide");
    }
}
