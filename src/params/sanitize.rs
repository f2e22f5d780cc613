//! Value sanitization applied to every mapped parameter.
//!
//! Multi-selects hand over `{value, label}` pairs; remote functions want bare
//! scalars, and an empty selection must mean "no filter".

use serde_json::Value;

/// - `[]` → `null`
/// - `[{value, label}, ...]` → `[value, ...]`, repeated while the values are
///   themselves `{value, label}` pairs
/// - anything else unchanged
///
/// Idempotent: sanitizing a sanitized value is a no-op.
pub fn sanitize_value(value: Value) -> Value {
    let mut value = value;
    loop {
        match value {
            Value::Array(items) if items.is_empty() => return Value::Null,
            Value::Array(items) if items.iter().all(is_labeled_option) => {
                value = Value::Array(
                    items
                        .into_iter()
                        .map(|item| match item {
                            Value::Object(mut fields) => {
                                fields.remove("value").unwrap_or(Value::Null)
                            }
                            other => other,
                        })
                        .collect(),
                );
            }
            other => return other,
        }
    }
}

fn is_labeled_option(item: &Value) -> bool {
    item.as_object()
        .is_some_and(|fields| fields.contains_key("value") && fields.contains_key("label"))
}

/// Values dropped when no descriptor restricts the parameter set.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
