//! Shared filter model: reporting windows, dimension selections, the store
//! that broadcasts changes, and the bootstrap option lists.

pub mod dates;
pub mod options;
pub mod state;
pub mod store;

pub use dates::{format_param_date, parse_civil_date, DateRange, InvertedRange};
pub use options::{FilterOption, FilterOptions};
pub use state::{toggles, Dimension, FilterPatch, FilterState, UnknownDimension};
pub use store::{FilterStore, FilterWatcher, Subscription};
