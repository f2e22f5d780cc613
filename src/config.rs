//! Runtime configuration
//!
//! Read from the environment (a `.env` file is honoured):
//!
//! | variable                 | default              |
//! |--------------------------|----------------------|
//! | `DASHQ_RPC_URL`          | required for HTTP    |
//! | `DASHQ_API_KEY`          | none                 |
//! | `DASHQ_TIMEOUT_MS`       | 30000                |
//! | `DASHQ_PAGE_SIZE`        | 1000                 |
//! | `DASHQ_OPTIONS_FUNCTION` | `get_filter_options` |
//! | `DASHQ_DESCRIPTORS`      | built-in set         |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::executor::{QueryExecutor, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT};
use crate::params::{DescriptorRegistry, ParameterMapper};
use crate::remote::{HttpRemoteCaller, RemoteCaller};

pub const DEFAULT_OPTIONS_FUNCTION: &str = "get_filter_options";

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub rpc_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub page_size: usize,
    pub options_function: String,
    pub descriptors_path: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            options_function: DEFAULT_OPTIONS_FUNCTION.to_string(),
            descriptors_path: None,
        }
    }
}

impl OrchestratorConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.rpc_url = read("DASHQ_RPC_URL");
        config.api_key = read("DASHQ_API_KEY");
        if let Some(ms) = read("DASHQ_TIMEOUT_MS") {
            let ms = parse_positive("DASHQ_TIMEOUT_MS", &ms)?;
            config.timeout = Duration::from_millis(ms as u64);
        }
        if let Some(size) = read("DASHQ_PAGE_SIZE") {
            config.page_size = parse_positive("DASHQ_PAGE_SIZE", &size)?;
        }
        if let Some(function) = read("DASHQ_OPTIONS_FUNCTION") {
            config.options_function = function;
        }
        config.descriptors_path = read("DASHQ_DESCRIPTORS").map(PathBuf::from);

        Ok(config)
    }

    /// Descriptors from `DASHQ_DESCRIPTORS`, or the built-in set.
    pub fn descriptor_registry(&self) -> Result<DescriptorRegistry, ConfigError> {
        match &self.descriptors_path {
            Some(path) => DescriptorRegistry::from_file(path),
            None => Ok(DescriptorRegistry::builtin()),
        }
    }

    pub fn http_caller(&self) -> Result<HttpRemoteCaller, ConfigError> {
        let url = self.rpc_url.as_deref().ok_or_else(|| ConfigError::Env {
            name: "DASHQ_RPC_URL".to_string(),
            reason: "not set".to_string(),
        })?;
        Ok(HttpRemoteCaller::new(url, self.api_key.clone()))
    }

    /// Executor over `caller` using this configuration's descriptors and timeout.
    pub fn executor(&self, caller: Arc<dyn RemoteCaller>) -> Result<QueryExecutor, ConfigError> {
        let registry = Arc::new(self.descriptor_registry()?);
        tracing::info!(descriptors = registry.len(), timeout_ms = self.timeout.as_millis() as u64, "query executor configured");
        Ok(QueryExecutor::new(caller, ParameterMapper::new(registry)).with_default_timeout(self.timeout))
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::Env {
            name: name.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Env {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}
