//! Valid values for each dimension filter, loaded once from the bootstrap call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::state::Dimension;

/// One selectable entry of a multi-select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOption {
    pub value: Value,
    pub label: String,
}

impl FilterOption {
    /// Accepts `{value, label}` objects and bare scalars.
    fn from_json(raw: Value) -> Option<Self> {
        match raw {
            Value::Object(mut fields) => {
                let value = fields.remove("value")?;
                let label = match fields.remove("label") {
                    Some(Value::String(label)) => label,
                    Some(other) if !other.is_null() => other.to_string(),
                    _ => scalar_label(&value),
                };
                Some(Self { value, label })
            }
            Value::Null | Value::Array(_) => None,
            scalar => Some(Self {
                label: scalar_label(&scalar),
                value: scalar,
            }),
        }
    }
}

fn scalar_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Option lists keyed by dimension. Missing dimensions have no options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    by_dimension: BTreeMap<Dimension, Vec<FilterOption>>,
}

impl FilterOptions {
    /// Parse `{dimension-name: [values...]}`.
    ///
    /// Unknown dimension names and malformed entries are skipped; a payload
    /// that is not an object yields no options.
    pub fn from_payload(payload: Value) -> Self {
        let Value::Object(fields) = payload else {
            tracing::warn!("filter options payload is not an object, ignoring");
            return Self::default();
        };

        let mut by_dimension = BTreeMap::new();
        for (name, values) in fields {
            let dimension = match name.parse::<Dimension>() {
                Ok(dimension) => dimension,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping filter options");
                    continue;
                }
            };
            let Value::Array(values) = values else {
                continue;
            };
            let options: Vec<FilterOption> =
                values.into_iter().filter_map(FilterOption::from_json).collect();
            by_dimension.insert(dimension, options);
        }
        Self { by_dimension }
    }

    pub fn get(&self, dimension: Dimension) -> &[FilterOption] {
        self.by_dimension
            .get(&dimension)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_dimension.values().all(Vec::is_empty)
    }
}
