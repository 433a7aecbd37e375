//! Dot-path predicate evaluation over JSON-compatible metadata documents.

use serde_json::Value;
use std::collections::BTreeMap;

/// A flat map of dot-paths to expected values, AND-combined.
///
/// A missing path is a no-match, not an error. Array values match either by
/// whole-array equality or by membership (`expected` is a scalar present in
/// the array). Nested object values match if every key of `expected` is
/// present in `actual` with a matching value (extra keys in `actual` are
/// ignored).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    entries: BTreeMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: BTreeMap<String, Value>) -> Self {
        Self { entries }
    }

    pub fn with(mut self, path: impl Into<String>, expected: Value) -> Self {
        self.entries.insert(path.into(), expected);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate the filter against a metadata document. `None` (no filter)
    /// is handled by the caller, not here; an empty filter is vacuously true.
    pub fn matches(&self, doc: &Value) -> bool {
        self.entries
            .iter()
            .all(|(path, expected)| match get_path(doc, path) {
                Some(actual) => value_matches(expected, actual),
                None => false,
            })
    }
}

/// Walk a dot-path through nested objects and (by numeric segment) arrays.
fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => {
                let idx: usize = segment.parse().ok()?;
                arr.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Structural equality, array membership, and recursive (subset) object
/// comparison, per the filter's value-equality semantics.
fn value_matches(expected: &Value, actual: &Value) -> bool {
    match expected {
        Value::Object(emap) => match actual {
            Value::Object(amap) => emap
                .iter()
                .all(|(k, v)| amap.get(k).is_some_and(|av| value_matches(v, av))),
            _ => false,
        },
        _ if expected == actual => true,
        _ => match actual {
            Value::Array(arr) => arr.contains(expected),
            _ => false,
        },
    }
}
