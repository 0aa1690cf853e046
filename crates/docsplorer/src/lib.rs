//! # Docsplorer
//!
//! Semantic search over page-structured documents held in a Qdrant
//! collection. Queries are embedded with Ollama, searched in one batched
//! round trip, and each page hit is widened into a window of neighbouring
//! pages from the same file.
//!
//! The engine itself lives in [`docsplorer_core`]; this crate supplies
//! configuration, connection resolution, the client registry, concrete
//! store and embedder implementations, and the HTTP API.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML / environment configuration and startup validation |
//! | [`connection`] | Per-field connection precedence and TLS policy |
//! | [`registry`] | Pooled and exclusive store clients, shared embedder |
//! | [`session`] | Per-request session bound to one collection |
//! | [`qdrant`] | Qdrant REST store |
//! | [`embedding`] | Ollama embedder |
//! | [`filenames`] | Filename lookup |
//! | [`server`] | axum router and handlers |

pub mod config;
pub mod connection;
pub mod embedding;
pub mod filenames;
pub mod qdrant;
pub mod registry;
pub mod server;
pub mod session;
