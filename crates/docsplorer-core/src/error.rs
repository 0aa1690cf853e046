//! Error taxonomy for the search pipeline.
//!
//! Every caller-visible failure maps to exactly one [`SearchError`] variant.
//! Server-side variants carry internal detail for logging only; the HTTP
//! layer replaces it with [`SearchError::public_message`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// Conflicting or invalid session / request parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// The filter specification could not be compiled.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The vector store client could not be created or reached at setup.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// The embedding client could not be created.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A query string failed to embed; the whole batch is aborted.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The batched search or its post-processing failed.
    #[error("search failed: {0}")]
    SearchFailed(String),
}

pub type SearchResult<T> = Result<T, SearchError>;

impl SearchError {
    /// True for faults caused by caller input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SearchError::Config(_) | SearchError::InvalidFilter(_))
    }

    /// Message safe to return to callers.
    ///
    /// Client errors echo their detail; server errors never expose
    /// backing-service internals.
    pub fn public_message(&self) -> String {
        match self {
            SearchError::Config(_) | SearchError::InvalidFilter(_) => self.to_string(),
            SearchError::StoreUnavailable(_) => "Database connection error".to_string(),
            SearchError::EmbeddingUnavailable(_) => "Embedding service unavailable".to_string(),
            SearchError::Embedding(_) => "Failed to process query".to_string(),
            SearchError::SearchFailed(_) => "Search operation failed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(SearchError::Config("x".into()).is_client_error());
        assert!(SearchError::InvalidFilter("x".into()).is_client_error());
        assert!(!SearchError::SearchFailed("x".into()).is_client_error());
        assert!(!SearchError::Embedding("x".into()).is_client_error());
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = SearchError::SearchFailed("connection reset by 10.0.0.7:6333".into());
        assert!(!err.public_message().contains("10.0.0.7"));

        let err = SearchError::InvalidFilter("condition for 'a' must be an object".into());
        assert!(err.public_message().contains("'a'"));
    }
}
