//! Query descriptors and the registry that holds them
//!
//! A descriptor names one remote function and the parameter contract it
//! accepts. Descriptors are static: loaded from YAML at startup and never
//! changed afterwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{ConfigError, MappingError};

/// Built-in descriptor set
const BUILTIN_DESCRIPTORS: &str = include_str!("../../config/query_descriptors.yaml");

/// One callable remote function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Remote function name
    pub name: String,
    /// Parameter allow-list (remote names, e.g. `p_start_date`)
    #[serde(default)]
    pub params: Vec<String>,
    /// Applied only when a key is absent after mapping
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl QueryDescriptor {
    pub fn new<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            defaults: Map::new(),
        }
    }

    pub fn with_default(mut self, param: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(param.into(), value.into());
        self
    }

    pub fn accepts(&self, param: &str) -> bool {
        self.params.iter().any(|p| p == param)
    }

    /// Checked on every mapping; a malformed descriptor fails only the
    /// request that uses it.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.name.trim().is_empty() {
            return Err(MappingError::InvalidDescriptor(
                "function name is empty".to_string(),
            ));
        }
        if let Some(stray) = self.defaults.keys().find(|k| !self.accepts(k)) {
            return Err(MappingError::InvalidDescriptor(format!(
                "{}: default for '{}' which is not an accepted parameter",
                self.name, stray
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DescriptorFile {
    descriptors: Vec<QueryDescriptor>,
}

/// Descriptors keyed by function name.
#[derive(Debug, Clone, Default)]
pub struct DescriptorRegistry {
    descriptors: HashMap<String, QueryDescriptor>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The descriptor set shipped in `config/query_descriptors.yaml`.
    pub fn builtin() -> Self {
        Self::from_yaml_str(BUILTIN_DESCRIPTORS).unwrap_or_else(|e| {
            tracing::error!(error = %e, "built-in query descriptors are invalid");
            Self::default()
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: DescriptorFile = serde_yaml::from_str(yaml)?;
        let mut registry = Self::new();
        for descriptor in file.descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn register(&mut self, descriptor: QueryDescriptor) -> Result<(), ConfigError> {
        if self.descriptors.contains_key(&descriptor.name) {
            return Err(ConfigError::DuplicateDescriptor(descriptor.name));
        }
        self.descriptors.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&QueryDescriptor> {
        self.descriptors.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_descriptors_parse_and_validate() {
        let registry = DescriptorRegistry::builtin();
        assert!(registry.len() >= 5);
        for name in registry.names() {
            registry.get(name).unwrap().validate().unwrap();
        }
        let clients = registry.get("get_client_list").unwrap();
        assert!(clients.accepts("p_offset"));
        assert_eq!(clients.defaults["p_limit"], json!(1000));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let yaml = r#"
descriptors:
  - name: get_x
  - name: get_x
    params: [p_a]
"#;
        let err = DescriptorRegistry::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDescriptor(name) if name == "get_x"));
    }

    #[test]
    fn default_outside_allow_list_is_invalid() {
        let descriptor = QueryDescriptor::new("get_x", ["p_a"]).with_default("p_b", 1);
        assert!(matches!(
            descriptor.validate(),
            Err(MappingError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = DescriptorRegistry::from_file("/nonexistent/descriptors.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/descriptors.yaml"));
    }
}
