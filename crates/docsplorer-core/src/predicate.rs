//! Native filter tree understood by the vector store.
//!
//! These types serialise to (and deserialise from) Qdrant's filter JSON:
//!
//! ```json
//! { "must": [
//!     { "key": "metadata.filename", "match": { "text": "Notes_RevB" } },
//!     { "should": [ { "key": "metadata.category", "match": { "text": "devops" } },
//!                   { "key": "metadata.category", "match": { "text": "cloud" } } ] },
//!     { "key": "metadata.page_number", "range": { "gte": 9, "lte": 11 } }
//! ] }
//! ```
//!
//! [`Filter::matches`] evaluates the same tree against a JSON payload so that
//! in-process stores behave like the real engine for the subset used here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Boolean filter: every `must` condition holds and, if any `should`
/// conditions are present, at least one of them holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Condition>,
}

/// A single term of a [`Filter`]: a field predicate or a nested filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Field(FieldCondition),
    Nested(Filter),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    /// Dot-addressed payload path, e.g. `metadata.filename`.
    pub key: String,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<Match>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Match {
    /// Full-text match.
    Text { text: String },
    /// Field equals any of the listed values.
    Any { any: Vec<Value> },
    /// Exact equality.
    Value { value: Value },
}

/// Inclusive numeric range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl Filter {
    pub fn must(conditions: Vec<Condition>) -> Self {
        Self {
            must: conditions,
            should: Vec::new(),
        }
    }

    pub fn should(conditions: Vec<Condition>) -> Self {
        Self {
            must: Vec::new(),
            should: conditions,
        }
    }

    /// Evaluate the filter against a record payload.
    pub fn matches(&self, payload: &Value) -> bool {
        self.must.iter().all(|c| c.matches(payload))
            && (self.should.is_empty() || self.should.iter().any(|c| c.matches(payload)))
    }
}

impl Condition {
    pub fn matches(&self, payload: &Value) -> bool {
        match self {
            Condition::Field(field) => field.matches(payload),
            Condition::Nested(filter) => filter.matches(payload),
        }
    }
}

impl From<FieldCondition> for Condition {
    fn from(field: FieldCondition) -> Self {
        Condition::Field(field)
    }
}

impl From<Filter> for Condition {
    fn from(filter: Filter) -> Self {
        Condition::Nested(filter)
    }
}

impl FieldCondition {
    pub fn text(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            matcher: Some(Match::Text { text: text.into() }),
            range: None,
        }
    }

    pub fn value(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            matcher: Some(Match::Value { value }),
            range: None,
        }
    }

    pub fn any(key: impl Into<String>, any: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            matcher: Some(Match::Any { any }),
            range: None,
        }
    }

    pub fn range(key: impl Into<String>, range: Range) -> Self {
        Self {
            key: key.into(),
            matcher: None,
            range: Some(range),
        }
    }

    /// A field matches when it exists and every attached predicate holds.
    /// Array-valued fields match if any element does.
    pub fn matches(&self, payload: &Value) -> bool {
        let Some(found) = lookup(payload, &self.key) else {
            return false;
        };
        let candidates: Vec<&Value> = match found {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        candidates.iter().any(|candidate| {
            let match_ok = self
                .matcher
                .as_ref()
                .map_or(true, |m| m.matches(candidate));
            let range_ok = self.range.as_ref().map_or(true, |r| r.contains(candidate));
            match_ok && range_ok
        })
    }
}

impl Match {
    fn matches(&self, candidate: &Value) -> bool {
        match self {
            Match::Text { text } => {
                let Some(haystack) = candidate.as_str() else {
                    return false;
                };
                let haystack = haystack.to_lowercase();
                text.to_lowercase()
                    .split_whitespace()
                    .all(|token| haystack.contains(token))
            }
            Match::Value { value } => scalar_eq(candidate, value),
            Match::Any { any } => any.iter().any(|v| scalar_eq(candidate, v)),
        }
    }
}

impl Range {
    fn contains(&self, candidate: &Value) -> bool {
        let Some(n) = candidate.as_f64() else {
            return false;
        };
        self.gte.map_or(true, |lo| n >= lo) && self.lte.map_or(true, |hi| n <= hi)
    }
}

/// Resolve a dot-addressed path inside a JSON object.
pub fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(payload, |current, segment| current.get(segment))
}

/// Scalar equality with numbers compared by value (`3 == 3.0`).
fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => a == b,
    }
}
