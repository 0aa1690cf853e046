//! Declarative filter specifications and their compilation.
//!
//! Callers describe filters as a JSON object keyed by dot-addressed payload
//! paths. Each value is exactly one condition:
//!
//! | Shape | Meaning |
//! |-------|---------|
//! | `{"match_text": "a"}` | full-text match |
//! | `{"match_text": ["a", "b"]}` | full-text match on any of the values |
//! | `{"match_value": 3}` | exact equality |
//! | `{"match_value": [1, 2]}` | equality with any of the values |
//! | `{"gte": 2020, "lte": 2024}` | inclusive numeric range (either bound optional) |
//!
//! All fields combine with AND. Parsing happens once at the boundary
//! ([`FilterSpec::from_json`]); structurally broken input is rejected with
//! [`SearchError::InvalidFilter`] before any network call. Compilation
//! ([`FilterSpec::compile`]) never fails: empty lists and unrecognised
//! condition objects are skipped with a warning, and inverted ranges are
//! compiled as given.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{SearchError, SearchResult};
use crate::predicate::{Condition, FieldCondition, Filter, Range};

/// One value or a list of alternatives (OR).
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// A parsed per-field condition.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    MatchText(OneOrMany<String>),
    MatchValue(OneOrMany<Value>),
    Range { gte: Option<f64>, lte: Option<f64> },
    /// A condition object carrying none of the recognised keys.
    Unrecognized(Value),
}

/// A parsed filter specification, in field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    fields: Vec<(String, FieldFilter)>,
}

impl FilterSpec {
    /// Parse a JSON filter specification. `null` is an empty spec.
    pub fn from_json(value: &Value) -> SearchResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => {
                let fields = map
                    .iter()
                    .map(|(path, condition)| {
                        Ok((path.clone(), parse_condition(path, condition)?))
                    })
                    .collect::<SearchResult<Vec<_>>>()?;
                Ok(Self { fields })
            }
            other => Err(SearchError::InvalidFilter(format!(
                "filter must be an object keyed by field path, got {}",
                json_kind(other)
            ))),
        }
    }

    pub fn fields(&self) -> &[(String, FieldFilter)] {
        &self.fields
    }

    /// Compile into the store's native filter tree.
    ///
    /// Returns `None` when no condition survives (no filtering).
    pub fn compile(&self) -> Option<Filter> {
        let mut must: Vec<Condition> = Vec::new();

        for (path, condition) in &self.fields {
            match condition {
                FieldFilter::MatchText(OneOrMany::One(text)) => {
                    must.push(FieldCondition::text(path, text.clone()).into());
                }
                FieldFilter::MatchText(OneOrMany::Many(texts)) => {
                    if texts.is_empty() {
                        warn!(field = %path, "empty array for match_text, skipping");
                        continue;
                    }
                    let should = texts
                        .iter()
                        .map(|t| FieldCondition::text(path, t.clone()).into())
                        .collect();
                    must.push(Filter::should(should).into());
                }
                FieldFilter::MatchValue(OneOrMany::One(value)) => {
                    must.push(FieldCondition::value(path, value.clone()).into());
                }
                FieldFilter::MatchValue(OneOrMany::Many(values)) => {
                    if values.is_empty() {
                        warn!(field = %path, "empty array for match_value, skipping");
                        continue;
                    }
                    must.push(FieldCondition::any(path, values.clone()).into());
                }
                FieldFilter::Range { gte, lte } => {
                    if let (Some(lo), Some(hi)) = (gte, lte) {
                        if lo > hi {
                            warn!(
                                field = %path,
                                gte = *lo,
                                lte = *hi,
                                "inverted range, filter will match nothing"
                            );
                        }
                    }
                    let range = Range {
                        gte: *gte,
                        lte: *lte,
                    };
                    must.push(FieldCondition::range(path, range).into());
                }
                FieldFilter::Unrecognized(raw) => {
                    warn!(field = %path, condition = %raw, "unknown condition type, skipping");
                }
            }
        }

        if must.is_empty() {
            return None;
        }
        debug!(conditions = must.len(), "built filter");
        Some(Filter::must(must))
    }
}

/// Parse an optional JSON spec and compile it in one step.
///
/// Parsing is all-or-nothing: any malformed field aborts with
/// [`SearchError::InvalidFilter`] and nothing is compiled.
pub fn compile_json(spec: Option<&Value>) -> SearchResult<Option<Filter>> {
    match spec {
        None => Ok(None),
        Some(value) => {
            let parsed = FilterSpec::from_json(value).map_err(|e| {
                warn!(filter = %value, error = %e, "filter processing failed");
                e
            })?;
            Ok(parsed.compile())
        }
    }
}

fn parse_condition(path: &str, condition: &Value) -> SearchResult<FieldFilter> {
    let Value::Object(map) = condition else {
        return Err(SearchError::InvalidFilter(format!(
            "condition for '{}' must be an object, got {}",
            path,
            json_kind(condition)
        )));
    };

    if let Some(value) = map.get("match_text") {
        return parse_match_text(path, value).map(FieldFilter::MatchText);
    }
    if let Some(value) = map.get("match_value") {
        return parse_match_value(path, value).map(FieldFilter::MatchValue);
    }
    if map.contains_key("gte") || map.contains_key("lte") {
        return Ok(FieldFilter::Range {
            gte: parse_bound(path, map, "gte")?,
            lte: parse_bound(path, map, "lte")?,
        });
    }
    Ok(FieldFilter::Unrecognized(condition.clone()))
}

fn parse_match_text(path: &str, value: &Value) -> SearchResult<OneOrMany<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| scalar_text(path, item))
            .collect::<SearchResult<Vec<_>>>()
            .map(OneOrMany::Many),
        other => scalar_text(path, other).map(OneOrMany::One),
    }
}

fn parse_match_value(path: &str, value: &Value) -> SearchResult<OneOrMany<Value>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| scalar_value(path, item))
            .collect::<SearchResult<Vec<_>>>()
            .map(OneOrMany::Many),
        other => scalar_value(path, other).map(OneOrMany::One),
    }
}

/// Text conditions accept any scalar and match on its string form.
fn scalar_text(path: &str, value: &Value) -> SearchResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(SearchError::InvalidFilter(format!(
            "match_text for '{}' must be a scalar or list of scalars, got {}",
            path,
            json_kind(other)
        ))),
    }
}

fn scalar_value(path: &str, value: &Value) -> SearchResult<Value> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(value.clone()),
        other => Err(SearchError::InvalidFilter(format!(
            "match_value for '{}' must be a scalar or list of scalars, got {}",
            path,
            json_kind(other)
        ))),
    }
}

fn parse_bound(path: &str, map: &Map<String, Value>, name: &str) -> SearchResult<Option<f64>> {
    match map.get(name) {
        None => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            SearchError::InvalidFilter(format!(
                "{} for '{}' must be a number, got {}",
                name,
                path,
                json_kind(value)
            ))
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
