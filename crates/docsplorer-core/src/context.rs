//! Context expansion around a matched page.
//!
//! Given a hit on page `c` of file `f`, fetch the pages
//! `[max(0, c - w), min(MAX_PAGE_NUMBER, c + w)]` of the same file with a
//! structural scan, keep only page-structured records, and return them in
//! ascending page order. Failures degrade to an empty window.

use tracing::{debug, error};

use crate::payload::{page_record, PageRecord, FILENAME_PATH, PAGE_NUMBER_PATH};
use crate::predicate::{FieldCondition, Filter, Range};
use crate::store::VectorStore;

/// Highest page index a window may reach.
pub const MAX_PAGE_NUMBER: u64 = 1000;

/// Scan limit multiplier over the window size. The filename condition is a
/// text match, so files whose names contain `filename` share the scan.
const CANDIDATE_FACTOR: usize = 4;

/// Inclusive page bounds of a window, clamped to `[0, MAX_PAGE_NUMBER]`.
pub fn page_window(center: u64, window: u32) -> (u64, u64) {
    let window = u64::from(window);
    (
        center.saturating_sub(window),
        center.saturating_add(window).min(MAX_PAGE_NUMBER),
    )
}

/// Scan filter selecting pages `lo..=hi` of `filename`.
pub fn window_filter(filename: &str, lo: u64, hi: u64) -> Filter {
    Filter::must(vec![
        FieldCondition::text(FILENAME_PATH, filename).into(),
        FieldCondition::range(
            PAGE_NUMBER_PATH,
            Range {
                gte: Some(lo as f64),
                lte: Some(hi as f64),
            },
        )
        .into(),
    ])
}

/// Fetch the context window around `center` for `filename`.
///
/// Scans up to `CANDIDATE_FACTOR * (2 * window + 1)` candidates, keeps
/// page-structured records whose filename equals `filename`, sorts by page
/// number and keeps the first record per page. Store errors are logged and
/// yield an empty window.
pub async fn expand_context(
    store: &dyn VectorStore,
    collection: &str,
    filename: &str,
    center: u64,
    window: u32,
) -> Vec<PageRecord> {
    let (lo, hi) = page_window(center, window);
    let max_pages = 2 * window as usize + 1;
    let scan_limit = max_pages.saturating_mul(CANDIDATE_FACTOR);
    debug!(file = filename, center, lo, hi, "fetching context");

    let records = match store
        .scroll(collection, &window_filter(filename, lo, hi), scan_limit)
        .await
    {
        Ok(records) => records,
        Err(e) => {
            error!(page = center, error = %e, "context retrieval failed");
            return Vec::new();
        }
    };
    debug!(retrieved = records.len(), "scrolled context candidates");

    let mut pages: Vec<PageRecord> = records
        .iter()
        .filter_map(|r| page_record(&r.payload))
        .filter(|p| p.locator.filename == filename)
        .collect();
    pages.sort_by_key(|p| p.locator.page_number);
    pages.dedup_by_key(|p| p.locator.page_number);
    debug!(valid = pages.len(), "valid pages after filtering");
    pages
}
