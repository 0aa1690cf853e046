//! Batched semantic search with context expansion.
//!
//! # Pipeline
//!
//! 1. Compile the filter once; it is shared by every query.
//! 2. Embed every query string in input order. One failure aborts the
//!    whole call before the store is contacted.
//! 3. Issue one batched similarity call carrying all vectors.
//! 4. For each query's hits, independently:
//!    - page-structured hit → expand the context window, drop pages already
//!      emitted for this query, emit a [`ContextWindow`];
//!    - malformed page hit → skip and log;
//!    - anything else → emit a [`GenericHit`].
//!
//! The output holds one result list per input query, in input order.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::context::expand_context;
use crate::embedding::Embedder;
use crate::error::{SearchError, SearchResult};
use crate::filter::compile_json;
use crate::payload::{classify, GenericRecord, PageLocator, PayloadShape};
use crate::store::{QueryRequest, ScoredPoint, VectorStore};

/// Per-call tuning shared by every query in a batch.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Maximum hits per query (≥ 1).
    pub limit: usize,
    /// Pages fetched on each side of a matched page.
    pub context_window: u32,
    /// Embedding model identifier passed to the embedder.
    pub embedding_model: String,
}

/// Bundles all inputs for a single batch search.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub collection: &'a str,
    pub queries: &'a [String],
    /// Raw filter specification, see [`crate::filter`].
    pub filter: Option<&'a Value>,
    pub params: SearchParams,
}

/// A page hit enriched with its deduplicated neighbouring pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextWindow {
    pub filename: String,
    /// Similarity of the original hit.
    pub score: f32,
    pub center_page: u64,
    /// Page texts joined with a single space, in page order.
    pub combined_page: String,
    pub page_numbers: Vec<u64>,
}

/// A hit on a record without page structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenericHit {
    pub score: f32,
    #[serde(flatten)]
    pub record: GenericRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchHit {
    Context(ContextWindow),
    Generic(GenericHit),
}

/// Why a hit was left out of the results.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedHit {
    pub reason: String,
}

/// Run a batch of semantic queries against `store`.
pub async fn batch_search(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    req: &SearchRequest<'_>,
) -> SearchResult<Vec<Vec<SearchHit>>> {
    if req.queries.is_empty() {
        return Err(SearchError::Config(
            "at least one search query is required".to_string(),
        ));
    }
    if req.params.limit == 0 {
        return Err(SearchError::Config("limit must be >= 1".to_string()));
    }

    let filter = compile_json(req.filter)?;

    let mut requests = Vec::with_capacity(req.queries.len());
    for query in req.queries {
        let vector = embedder
            .embed(&req.params.embedding_model, query)
            .await
            .map_err(|e| {
                error!(error = %e, "embedding generation failed");
                SearchError::Embedding(e.to_string())
            })?;
        debug!(query = %preview(query), dims = vector.len(), "generated query embedding");
        requests.push(QueryRequest {
            vector,
            filter: filter.clone(),
            limit: req.params.limit,
        });
    }

    let responses = store
        .query_batch(req.collection, &requests)
        .await
        .map_err(|e| {
            error!(collection = req.collection, error = %e, "batch search failed");
            SearchError::SearchFailed(e.to_string())
        })?;

    if responses.len() != requests.len() {
        error!(
            expected = requests.len(),
            got = responses.len(),
            "batch search returned wrong number of responses"
        );
        return Err(SearchError::SearchFailed(format!(
            "expected {} responses, got {}",
            requests.len(),
            responses.len()
        )));
    }

    let mut results = Vec::with_capacity(responses.len());
    for hits in &responses {
        results.push(shape_query_hits(store, req, hits).await);
    }
    Ok(results)
}

/// Shape one query's hit list. Seen pages are tracked per query only.
async fn shape_query_hits(
    store: &dyn VectorStore,
    req: &SearchRequest<'_>,
    hits: &[ScoredPoint],
) -> Vec<SearchHit> {
    let mut seen: HashSet<PageLocator> = HashSet::new();
    let mut shaped = Vec::with_capacity(hits.len());

    for hit in hits {
        match shape_hit(store, req, hit, &mut seen).await {
            Ok(result) => shaped.push(result),
            Err(skipped) => {
                warn!(
                    id = %hit.id,
                    reason = %skipped.reason,
                    "skipping malformed page-based payload"
                );
            }
        }
    }
    shaped
}

async fn shape_hit(
    store: &dyn VectorStore,
    req: &SearchRequest<'_>,
    hit: &ScoredPoint,
    seen: &mut HashSet<PageLocator>,
) -> Result<SearchHit, SkippedHit> {
    let locator = match classify(&hit.payload) {
        PayloadShape::Page(locator) => locator,
        PayloadShape::Generic(record) => {
            return Ok(SearchHit::Generic(GenericHit {
                score: hit.score,
                record,
            }))
        }
        PayloadShape::Malformed(reason) => return Err(SkippedHit { reason }),
    };

    let pages = expand_context(
        store,
        req.collection,
        &locator.filename,
        locator.page_number,
        req.params.context_window,
    )
    .await;

    let unique: Vec<_> = pages
        .into_iter()
        .filter(|page| seen.insert(page.locator.clone()))
        .collect();

    Ok(SearchHit::Context(ContextWindow {
        filename: locator.filename,
        score: hit.score,
        center_page: locator.page_number,
        combined_page: unique
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        page_numbers: unique.iter().map(|p| p.locator.page_number).collect(),
    }))
}

fn preview(query: &str) -> String {
    query.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Filter;
    use crate::store::memory::InMemoryStore;
    use crate::store::Record;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps known queries to fixed vectors; fails on `"boom"`.
    struct ScriptedEmbedder {
        calls: AtomicUsize,
    }

    impl ScriptedEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for ScriptedEmbedder {
        async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match text {
                "boom" => bail!("model not loaded"),
                "release" => Ok(vec![0.0, 1.0]),
                _ => Ok(vec![1.0, 0.0]),
            }
        }
    }

    /// Wraps a store and counts batched calls.
    struct CountingStore {
        inner: InMemoryStore,
        batches: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for CountingStore {
        async fn collection_exists(&self, c: &str) -> Result<bool> {
            self.inner.collection_exists(c).await
        }
        async fn create_collection(&self, c: &str, n: usize) -> Result<()> {
            self.inner.create_collection(c, n).await
        }
        async fn query_batch(
            &self,
            c: &str,
            r: &[QueryRequest],
        ) -> Result<Vec<Vec<ScoredPoint>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.inner.query_batch(c, r).await
        }
        async fn scroll(&self, c: &str, f: &Filter, l: usize) -> Result<Vec<Record>> {
            self.inner.scroll(c, f, l).await
        }
    }

    fn page(filename: &str, n: u64) -> Value {
        json!({
            "pagecontent": format!("text {}", n),
            "metadata": { "filename": filename, "page_number": n }
        })
    }

    /// Pages 0..=20 of Notes_RevB; page 10 is the closest match for
    /// "security fixes" and page 12 the runner-up.
    fn notes_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        for n in 0..=20u64 {
            let vector = match n {
                10 => vec![1.0, 0.0],
                12 => vec![0.9, 0.1],
                _ => vec![0.0, 1.0],
            };
            store.insert("content", n, vector, page("Notes_RevB", n)).unwrap();
        }
        store
    }

    fn request<'a>(
        queries: &'a [String],
        filter: Option<&'a Value>,
        limit: usize,
        window: u32,
    ) -> SearchRequest<'a> {
        SearchRequest {
            collection: "content",
            queries,
            filter,
            params: SearchParams {
                limit,
                context_window: window,
                embedding_model: "test-model".to_string(),
            },
        }
    }

    fn context(hit: &SearchHit) -> &ContextWindow {
        match hit {
            SearchHit::Context(c) => c,
            SearchHit::Generic(_) => panic!("expected context hit"),
        }
    }

    #[tokio::test]
    async fn test_single_query_with_filename_filter() {
        let store = notes_store();
        let embedder = ScriptedEmbedder::new();
        let queries = vec!["security fixes".to_string()];
        let filter = json!({ "metadata.filename": { "match_text": "Notes_RevB" } });

        let results = batch_search(&store, &embedder, &request(&queries, Some(&filter), 1, 1))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].len(), 1);
        let hit = context(&results[0][0]);
        assert_eq!(hit.filename, "Notes_RevB");
        assert_eq!(hit.center_page, 10);
        assert_eq!(hit.page_numbers, vec![9, 10, 11]);
        assert_eq!(hit.combined_page, "text 9 text 10 text 11");
        assert!((hit.score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_overlapping_windows_are_deduplicated_within_a_query() {
        let store = notes_store();
        let embedder = ScriptedEmbedder::new();
        let queries = vec!["security fixes".to_string()];

        let results = batch_search(&store, &embedder, &request(&queries, None, 2, 2))
            .await
            .unwrap();

        let first = context(&results[0][0]);
        let second = context(&results[0][1]);
        assert_eq!(first.center_page, 10);
        assert_eq!(first.page_numbers, vec![8, 9, 10, 11, 12]);
        // Window 10..14 overlaps on 10, 11, 12: the first hit keeps them.
        assert_eq!(second.center_page, 12);
        assert_eq!(second.page_numbers, vec![13, 14]);
        // The second hit keeps its own score.
        assert!(second.score < first.score);
    }

    #[tokio::test]
    async fn test_seen_pages_reset_between_queries() {
        let store = notes_store();
        let embedder = ScriptedEmbedder::new();
        let queries = vec!["security fixes".to_string(), "security fixes".to_string()];

        let results = batch_search(&store, &embedder, &request(&queries, None, 1, 1))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(context(&results[0][0]).page_numbers, vec![9, 10, 11]);
        assert_eq!(context(&results[1][0]).page_numbers, vec![9, 10, 11]);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_the_batch() {
        let store = CountingStore {
            inner: notes_store(),
            batches: AtomicUsize::new(0),
        };
        let embedder = ScriptedEmbedder::new();
        let queries = vec!["a".to_string(), "boom".to_string(), "c".to_string()];

        let err = batch_search(&store, &embedder, &request(&queries, None, 1, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Embedding(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.batches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_filter_aborts_before_embedding() {
        let store = notes_store();
        let embedder = ScriptedEmbedder::new();
        let queries = vec!["a".to_string()];
        let filter = json!({ "metadata.filename": "not-an-object" });

        let err = batch_search(&store, &embedder, &request(&queries, Some(&filter), 1, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::InvalidFilter(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_search_failed() {
        let store = InMemoryStore::new();
        let embedder = ScriptedEmbedder::new();
        let queries = vec!["a".to_string()];

        let err = batch_search(&store, &embedder, &request(&queries, None, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::SearchFailed(_)));
    }

    #[tokio::test]
    async fn test_rejects_empty_queries_and_zero_limit() {
        let store = notes_store();
        let embedder = ScriptedEmbedder::new();

        let err = batch_search(&store, &embedder, &request(&[], None, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));

        let queries = vec!["a".to_string()];
        let err = batch_search(&store, &embedder, &request(&queries, None, 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[tokio::test]
    async fn test_malformed_hits_are_skipped_and_generic_hits_kept() {
        let store = InMemoryStore::new();
        store
            .insert(
                "content",
                1,
                vec![1.0, 0.0],
                json!({ "metadata": { "filename": "f", "page_number": "three" } }),
            )
            .unwrap();
        store
            .insert(
                "content",
                2,
                vec![0.9, 0.1],
                json!({ "source": "ECOS_9.3.6", "metadata": { "kind": "filename" } }),
            )
            .unwrap();
        store.insert("content", 3, vec![0.8, 0.2], page("f", 4)).unwrap();

        let embedder = ScriptedEmbedder::new();
        let queries = vec!["anything".to_string()];
        let results = batch_search(&store, &embedder, &request(&queries, None, 3, 0))
            .await
            .unwrap();

        let hits = &results[0];
        assert_eq!(hits.len(), 2);
        match &hits[0] {
            SearchHit::Generic(g) => {
                assert_eq!(g.record.filename, Some(json!("ECOS_9.3.6")));
                let body = serde_json::to_value(g).unwrap();
                assert_eq!(body["filename"], json!("ECOS_9.3.6"));
                assert_eq!(body["metadata"]["kind"], json!("filename"));
            }
            SearchHit::Context(_) => panic!("expected generic hit"),
        }
        assert_eq!(context(&hits[1]).page_numbers, vec![4]);
    }

    #[tokio::test]
    async fn test_results_follow_query_order() {
        let store = InMemoryStore::new();
        store.insert("content", 1, vec![1.0, 0.0], json!({ "source": "a" })).unwrap();
        store.insert("content", 2, vec![0.0, 1.0], json!({ "source": "b" })).unwrap();

        let embedder = ScriptedEmbedder::new();
        let queries = vec!["release".to_string(), "other".to_string()];
        let results = batch_search(&store, &embedder, &request(&queries, None, 1, 0))
            .await
            .unwrap();

        let first = serde_json::to_value(&results[0][0]).unwrap();
        let second = serde_json::to_value(&results[1][0]).unwrap();
        assert_eq!(first["filename"], json!("b"));
        assert_eq!(second["filename"], json!("a"));
    }
}
