//! # Docsplorer Core
//!
//! Store-agnostic query orchestration for Docsplorer: the filter model and
//! compiler, the native filter tree, payload shaping, the [`store::VectorStore`]
//! and [`embedding::Embedder`] traits, context expansion, and the batch
//! search pipeline.
//!
//! This crate contains no HTTP client, configuration, or runtime
//! dependencies. The application crate supplies concrete stores (Qdrant)
//! and embedders (Ollama); tests use [`store::memory::InMemoryStore`].
//!
//! ```text
//! queries ──▶ embed (1 call / query) ──┐
//! filter  ──▶ compile (once) ──────────┼──▶ query_batch (1 round trip)
//!                                      │            │
//!                                      │            ▼
//!                                      │   classify payload per hit
//!                                      │     ├─ page    ──▶ expand ± window, dedup
//!                                      │     ├─ generic ──▶ reduced record
//!                                      │     └─ malformed ─▶ skip
//! ```

pub mod context;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod payload;
pub mod predicate;
pub mod search;
pub mod store;

pub use error::{SearchError, SearchResult};
