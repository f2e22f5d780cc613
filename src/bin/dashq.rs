//! Dashboard query CLI
//!
//! Inspect how filters map onto remote parameters and call remote functions
//! the way a dashboard page would.
//!
//! # Usage
//!
//! ```bash
//! # Show the parameters get_sales_kpis would receive (no network)
//! dashq params get_sales_kpis --from 2025-02-01 --to 2025-02-28 --select sellers=12,13
//!
//! # Call a function and print the resulting query state
//! DASHQ_RPC_URL=https://db.example.com dashq call get_client_list --page-size 500
//!
//! # Bootstrap option lists
//! dashq options
//! ```

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dashboard_query::{
    DateRange, Dimension, FilterPatch, FilterState, FilterStore, OrchestratorConfig, QueryContext,
    QueryOptions,
};

#[derive(Parser)]
#[command(name = "dashq")]
#[command(version)]
#[command(about = "Map dashboard filters to remote function calls and run them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Compact JSON output
    #[arg(long, global = true)]
    compact: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the mapped parameters for a function without calling it
    Params {
        function: String,
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Call a function and print the resulting query state
    Call {
        function: String,
        #[command(flatten)]
        filters: FilterArgs,

        /// JSON file used as fallback data
        #[arg(long)]
        fallback: Option<PathBuf>,

        /// Paginate with DASHQ_PAGE_SIZE
        #[arg(long)]
        paginate: bool,

        /// Paginate with this page size
        #[arg(long)]
        page_size: Option<usize>,

        /// Per-call timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Load the valid values for each filter dimension
    Options,

    /// List known query descriptors
    Descriptors,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Range start (YYYY-MM-DD); defaults to the first of this month
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Range end (YYYY-MM-DD); defaults to today
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Dimension selection, e.g. `sellers=12,13`
    #[arg(long = "select", value_name = "DIM=V1,V2")]
    selections: Vec<String>,

    #[arg(long)]
    search: Option<String>,

    /// Turn on a toggle, e.g. `exclude_employees`
    #[arg(long = "toggle", value_name = "NAME")]
    toggles: Vec<String>,

    /// Call-specific parameter, e.g. `p_top_n=5` (value parsed as JSON when possible)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

impl FilterArgs {
    fn filter_state(&self, today: NaiveDate) -> Result<FilterState> {
        let default = DateRange::month_to_date(today);
        let range = DateRange::new(
            self.from.unwrap_or(default.from()),
            self.to.unwrap_or(default.to()),
        )?;

        let mut patch = FilterPatch::new();
        for selection in &self.selections {
            let (dimension, values) = split_pair(selection)?;
            let dimension: Dimension = dimension.parse()?;
            let values: Vec<Value> = values
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(parse_scalar)
                .collect();
            patch = patch.select(dimension, values);
        }
        if let Some(term) = &self.search {
            patch = patch.search(term.clone());
        }
        for toggle in &self.toggles {
            patch = patch.toggle(toggle.clone(), true);
        }

        let mut state = FilterState::with_range(range);
        state.apply(patch);
        Ok(state)
    }

    fn overrides(&self) -> Result<Map<String, Value>> {
        let mut overrides = Map::new();
        for param in &self.params {
            let (key, value) = split_pair(param)?;
            overrides.insert(key.to_string(), parse_scalar(value));
        }
        Ok(overrides)
    }
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{raw}'"))
}

/// `12` → number, `true` → bool, anything unparseable → string.
fn parse_scalar(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard_query=info,dashq=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = OrchestratorConfig::from_env().context("reading configuration")?;
    let today = chrono::Local::now().date_naive();

    let output = match cli.command {
        Commands::Params { function, filters } => {
            let registry = Arc::new(config.descriptor_registry()?);
            if registry.get(&function).is_none() {
                tracing::warn!(function = %function, "no descriptor, parameters pass through unfiltered");
            }
            let mapper = dashboard_query::ParameterMapper::new(registry);
            let params = mapper.map(&function, &filters.filter_state(today)?, &filters.overrides()?)?;
            Value::Object(params)
        }

        Commands::Call {
            function,
            filters,
            fallback,
            paginate,
            page_size,
            timeout_ms,
        } => {
            let caller = Arc::new(config.http_caller()?);
            let executor = config.executor(caller)?;
            let store = FilterStore::new(filters.filter_state(today)?);
            let context = QueryContext::new(store, executor).with_page_size(config.page_size);

            let mut options = QueryOptions::remote(function);
            options.overrides = filters.overrides()?;
            if let Some(path) = fallback {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading fallback {}", path.display()))?;
                options = options.fallback(serde_json::from_str(&raw)?);
            }
            if paginate {
                options = options.paginate();
            }
            if let Some(limit) = page_size {
                options = options.page_size(limit);
            }
            if let Some(ms) = timeout_ms {
                options = options.timeout(Duration::from_millis(ms));
            }

            let mut handle = context.bind(options);
            let state = handle.settled().await;
            serde_json::to_value(&state)?
        }

        Commands::Options => {
            let caller = config.http_caller()?;
            let store = FilterStore::new(FilterState::new(today));
            store
                .load_filter_options(&caller, &config.options_function)
                .await?;
            serde_json::to_value(store.options())?
        }

        Commands::Descriptors => {
            let registry = config.descriptor_registry()?;
            if registry.is_empty() {
                bail!("no query descriptors configured");
            }
            Value::from(registry.names())
        }
    };

    let rendered = if cli.compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{rendered}");
    Ok(())
}
