//! Filename lookup.
//!
//! A text match on `metadata.filename` over an unranked scan. The scan
//! over-fetches (three records per requested filename) since many records
//! share a file, then keeps the first occurrence of each filename.

use docsplorer_core::payload::FILENAME_PATH;
use docsplorer_core::predicate::{lookup, FieldCondition, Filter};
use docsplorer_core::store::VectorStore;
use docsplorer_core::{SearchError, SearchResult};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error};

pub const MAX_FILENAME_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilenameMatch {
    pub filename: String,
    /// Always `None`: scans carry no similarity score.
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilenameSearch {
    pub query: String,
    pub total_matches: usize,
    pub filenames: Vec<FilenameMatch>,
}

pub async fn search_filenames(
    store: &dyn VectorStore,
    collection: &str,
    query: &str,
    limit: usize,
) -> SearchResult<FilenameSearch> {
    if query.trim().is_empty() {
        return Err(SearchError::Config("query must not be empty".to_string()));
    }
    if !(1..=MAX_FILENAME_LIMIT).contains(&limit) {
        return Err(SearchError::Config(format!(
            "limit must be between 1 and {}",
            MAX_FILENAME_LIMIT
        )));
    }

    let filter = Filter::must(vec![FieldCondition::text(FILENAME_PATH, query).into()]);
    let records = store
        .scroll(collection, &filter, limit * 3)
        .await
        .map_err(|e| {
            error!(collection, error = %e, "filename scan failed");
            SearchError::SearchFailed(e.to_string())
        })?;
    debug!(collection, scanned = records.len(), "filename scan complete");

    let mut seen = HashSet::new();
    let filenames: Vec<FilenameMatch> = records
        .iter()
        .filter_map(|r| lookup(&r.payload, FILENAME_PATH).and_then(|v| v.as_str()))
        .filter(|name| seen.insert(name.to_string()))
        .take(limit)
        .map(|name| FilenameMatch {
            filename: name.to_string(),
            score: None,
        })
        .collect();

    Ok(FilenameSearch {
        query: query.to_string(),
        total_matches: filenames.len(),
        filenames,
    })
}
