//! dashboard-query - Analytical Query Orchestration
//!
//! Dashboard pages render charts and tables backed by remote functions. Each
//! page calls a different function with a different parameter shape, while
//! all pages share one filter state that changes independently. This crate
//! sits between the two:
//!
//! - `filters/`  - shared filter state, previous-period derivation, the store
//!   that broadcasts changes, bootstrap option lists
//! - `params/`   - query descriptors and the mapper from filters to named
//!   parameters (sanitization, defaults, date pinning)
//! - `remote/`   - the remote-function seam and its HTTP implementation
//! - `executor/` - request preparation, timeout race, single-flight slot,
//!   offset/limit pagination
//! - `fallback`  - live result vs substitute dataset
//! - `hook`      - the per-page binding producing `QueryState`
//!
//! # Architecture
//!
//! ```text
//! FilterStore ──change──▶ hook driver ──map──▶ ParameterMapper
//!                              │
//!                              ├──supersede + issue──▶ QueryExecutor ──▶ RemoteCaller
//!                              │                                              │
//!                              ◀──────────── FallbackResolver ◀───settled─────┘
//!                              │
//!                              ▼
//!              QueryState {data, loading, error, is_mock, pagination}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dashboard_query::{FilterPatch, FilterStore, OrchestratorConfig, QueryContext, QueryOptions};
//!
//! let config = OrchestratorConfig::from_env()?;
//! let caller = Arc::new(config.http_caller()?);
//! let store = FilterStore::bootstrap(today, caller.as_ref(), &config.options_function).await;
//! let context = QueryContext::new(store.clone(), config.executor(caller)?);
//!
//! let mut kpis = context.bind(QueryOptions::remote("get_sales_kpis").fallback(demo_kpis));
//! let state = kpis.settled().await;
//!
//! store.update_filters(FilterPatch::new().select(Dimension::Sellers, [12, 13]));
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod filters;
pub mod hook;
pub mod params;
pub mod remote;

// Re-export main types
pub use config::OrchestratorConfig;
pub use error::{ConfigError, ErrorKind, MappingError, QueryError, RemoteError};
pub use executor::{PageWindow, Pagination, QueryExecutor, QueryRequest, DEFAULT_PAGE_SIZE};
pub use fallback::{FallbackNotice, FallbackResolver};
pub use filters::{DateRange, Dimension, FilterOptions, FilterPatch, FilterState, FilterStore};
pub use hook::{QueryContext, QueryHandle, QueryOptions, QueryState};
pub use params::{DescriptorRegistry, ParameterMapper, QueryDescriptor};
pub use remote::{HttpRemoteCaller, RemoteCaller, RemoteOutcome};
