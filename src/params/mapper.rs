//! Parameter Mapper - FilterState + overrides → remote named parameters
//!
//! ```text
//! FilterState ──to_generic_params()──┐
//!                                    ├─ translate key ─ sanitize ─ date check ─┐
//! per-call overrides ────────────────┘                                        │
//!                                                                             ▼
//!                       known descriptor:   keep allow-listed keys, then defaults
//!                       unknown function:   keep every non-blank key
//! ```
//!
//! Overrides are merged after the filter-derived keys, so an override always
//! wins over the filter value it translates to.

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;

use super::descriptor::{DescriptorRegistry, QueryDescriptor};
use super::sanitize::{is_blank, sanitize_value};
use crate::error::MappingError;
use crate::filters::{format_param_date, parse_civil_date, FilterState};

/// Generic filter key → remote parameter name.
///
/// Keys missing from this table are sent under their own name, which lets
/// overrides address a remote parameter directly (`p_top_n`).
const TRANSLATIONS: &[(&str, &str)] = &[
    ("start_date", "p_start_date"),
    ("end_date", "p_end_date"),
    ("previous_start_date", "p_prev_start_date"),
    ("previous_end_date", "p_prev_end_date"),
    ("supervisors", "p_supervisors"),
    ("sellers", "p_sellers"),
    ("regions", "p_regions"),
    ("customer_groups", "p_customer_groups"),
    ("clients", "p_clients"),
    ("products", "p_products"),
    ("search_term", "p_search"),
    ("exclude_employees", "p_exclude_employees"),
    ("curated_groups_only", "p_curated_only"),
    ("limit", "p_limit"),
    ("offset", "p_offset"),
];

pub fn translate_key(key: &str) -> Cow<'_, str> {
    TRANSLATIONS
        .iter()
        .find(|(generic, _)| *generic == key)
        .map(|(_, remote)| Cow::Borrowed(*remote))
        .unwrap_or(Cow::Borrowed(key))
}

/// Maps filter state onto the parameter contract of a remote function.
#[derive(Clone)]
pub struct ParameterMapper {
    registry: Arc<DescriptorRegistry>,
}

impl ParameterMapper {
    pub fn new(registry: Arc<DescriptorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    /// Build the named-parameter object for `function`.
    ///
    /// Deterministic: the same inputs always produce the same object, so the
    /// serialized result doubles as a change fingerprint.
    pub fn map(
        &self,
        function: &str,
        filters: &FilterState,
        overrides: &Map<String, Value>,
    ) -> Result<Map<String, Value>, MappingError> {
        let generic = filters.to_generic_params();
        match self.registry.get(function) {
            Some(descriptor) => map_with_descriptor(descriptor, generic, overrides),
            None => {
                tracing::trace!(function, "no descriptor registered, passing generic filters through");
                map_passthrough(function, generic, overrides)
            }
        }
    }
}

fn map_with_descriptor(
    descriptor: &QueryDescriptor,
    generic: Map<String, Value>,
    overrides: &Map<String, Value>,
) -> Result<Map<String, Value>, MappingError> {
    descriptor.validate()?;

    let mut params = Map::new();
    let merged = generic
        .into_iter()
        .chain(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    for (key, value) in merged {
        let name = translate_key(&key);
        if !descriptor.accepts(&name) {
            continue;
        }
        let value = normalize(&name, value)?;
        params.insert(name.into_owned(), value);
    }

    for (name, default) in &descriptor.defaults {
        if !params.contains_key(name) {
            params.insert(name.clone(), default.clone());
        }
    }
    Ok(params)
}

fn map_passthrough(
    function: &str,
    generic: Map<String, Value>,
    overrides: &Map<String, Value>,
) -> Result<Map<String, Value>, MappingError> {
    if function.trim().is_empty() {
        return Err(MappingError::InvalidDescriptor(
            "function name is empty".to_string(),
        ));
    }

    let mut params = Map::new();
    let merged = generic
        .into_iter()
        .chain(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    for (key, value) in merged {
        let name = translate_key(&key).into_owned();
        let value = normalize(&name, value)?;
        if is_blank(&value) {
            // a blank override still clears the filter-derived value
            params.remove(&name);
            continue;
        }
        params.insert(name, value);
    }
    Ok(params)
}

/// Sanitize arrays and pin date parameters to `YYYY-MM-DD`.
fn normalize(name: &str, value: Value) -> Result<Value, MappingError> {
    let value = sanitize_value(value);
    if !name.ends_with("_date") {
        return Ok(value);
    }
    match value {
        Value::String(raw) => parse_civil_date(&raw)
            .map(|date| Value::String(format_param_date(date)))
            .ok_or(MappingError::InvalidDate {
                param: name.to_string(),
                value: raw,
            }),
        other => Ok(other),
    }
}
