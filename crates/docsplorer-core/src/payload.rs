//! Record payload classification.
//!
//! Collections are not tagged with a schema. Whether a record is a page of a
//! source file is decided structurally, for every record, from the fields it
//! carries:
//!
//! ```json
//! { "pagecontent": "…", "metadata": { "filename": "ECOS_9.3.6", "page_number": 10 } }
//! ```
//!
//! Anything else is a generic record.

use serde::Serialize;
use serde_json::Value;

/// Payload key holding a page's text.
pub const TEXT_FIELD: &str = "pagecontent";
/// Payload key of the nested metadata object.
pub const METADATA_FIELD: &str = "metadata";
/// Payload path of the file identifier.
pub const FILENAME_PATH: &str = "metadata.filename";
/// Payload path of the page number.
pub const PAGE_NUMBER_PATH: &str = "metadata.page_number";

/// Position of a page inside a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageLocator {
    pub filename: String,
    pub page_number: u64,
}

/// A fully page-structured record: locator plus non-empty text.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub locator: PageLocator,
    pub text: String,
}

/// Best-effort view of a record that is not page-structured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenericRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Outcome of classifying a search hit's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadShape {
    /// Carries a well-typed file/page locator.
    Page(PageLocator),
    /// No page locator; shaped without context expansion.
    Generic(GenericRecord),
    /// Declares a page locator but its fields are missing or mistyped.
    Malformed(String),
}

/// Classify a hit payload.
///
/// A payload whose `metadata` declares both `filename` and `page_number`
/// is treated as a page; if those fields are mistyped the hit is
/// [`PayloadShape::Malformed`] so the caller can skip it.
pub fn classify(payload: &Value) -> PayloadShape {
    let declares_page = payload
        .get(METADATA_FIELD)
        .and_then(Value::as_object)
        .is_some_and(|meta| meta.contains_key("filename") && meta.contains_key("page_number"));

    if !declares_page {
        return PayloadShape::Generic(generic_record(payload));
    }

    match page_locator(payload) {
        Ok(locator) => PayloadShape::Page(locator),
        Err(reason) => PayloadShape::Malformed(reason),
    }
}

/// Extract a typed page locator.
pub fn page_locator(payload: &Value) -> Result<PageLocator, String> {
    let meta = payload
        .get(METADATA_FIELD)
        .and_then(Value::as_object)
        .ok_or_else(|| "missing metadata object".to_string())?;

    let filename = match meta.get("filename") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => return Err(format!("metadata.filename is not a string: {}", other)),
        None => return Err("missing metadata.filename".to_string()),
    };

    let page_number = match meta.get("page_number") {
        Some(value) => value.as_u64().ok_or_else(|| {
            format!("metadata.page_number is not a non-negative integer: {}", value)
        })?,
        None => return Err("missing metadata.page_number".to_string()),
    };

    Ok(PageLocator {
        filename,
        page_number,
    })
}

/// The page-structure predicate: returns the record only if every
/// page field is present and correctly typed and the text is non-empty.
pub fn page_record(payload: &Value) -> Option<PageRecord> {
    let text = payload.get(TEXT_FIELD)?.as_str()?;
    if text.is_empty() {
        return None;
    }
    let locator = page_locator(payload).ok()?;
    Some(PageRecord {
        locator,
        text: text.to_string(),
    })
}

/// Reduced view of a generic payload: `source` (falling back to the text
/// field) as the filename, plus `metadata` when present.
pub fn generic_record(payload: &Value) -> GenericRecord {
    let filename = payload
        .get("source")
        .or_else(|| payload.get(TEXT_FIELD))
        .cloned();
    GenericRecord {
        filename,
        metadata: payload.get(METADATA_FIELD).cloned(),
    }
}
