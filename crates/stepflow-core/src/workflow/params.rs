//! Placeholder resolution for step configuration trees.
//!
//! Step configs are free-form JSON trees whose string leaves may be
//! `{{ dotted.path }}` placeholders referencing the execution context
//! (e.g. `{{ steps.fetch.output.total }}` or `{{ variables.order_id }}`).
//! Resolution substitutes the referenced value with its original JSON type;
//! a whole-object reference stays an object, a number stays a number.
//!
//! Resolution is side-effect-free: the input tree and the context are never
//! mutated, and `resolve` always returns a freshly built tree.

use serde_json::Value;

/// Sentinel substituted for placeholders whose path does not exist in the
/// context. Not an error: the invoked capability decides how to react.
pub const UNDEFINED: &str = "__undefined__";

/// Resolve every `{{ path }}` placeholder in `parameters` against `context`,
/// returning a new tree.
///
/// Only string leaves whose trimmed form is exactly one placeholder are
/// substituted; strings with surrounding text, and all non-string leaves,
/// pass through unchanged. Objects and arrays are resolved recursively.
pub fn resolve(parameters: &Value, context: &Value) -> Value {
    match parameters {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, context)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve(v, context)).collect())
        }
        Value::String(s) => match placeholder_path(s) {
            Some(path) => lookup_path(context, path)
                .cloned()
                .unwrap_or_else(|| Value::String(UNDEFINED.to_string())),
            None => parameters.clone(),
        },
        other => other.clone(),
    }
}

/// Extract the dotted path from a string that is exactly one placeholder
/// (after trimming), e.g. `"  {{ steps.a.output }} "` -> `"steps.a.output"`.
fn placeholder_path(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    let path = inner.trim();
    if path.is_empty() { None } else { Some(path) }
}

/// Walk a dotted path through nested JSON objects.
///
/// Array segments are supported via numeric path components
/// (e.g. `steps.fetch.output.items.0`).
pub fn lookup_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
