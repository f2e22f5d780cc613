//! Filter state shared by every dashboard page
//!
//! `FilterState` is the single source of truth for query shaping. It is only
//! ever replaced through [`FilterState::apply`], which keeps
//! `previous_date_range` in step with `date_range`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::dates::DateRange;

/// Multi-select restriction applied to analytical queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Supervisors,
    Sellers,
    Regions,
    CustomerGroups,
    Clients,
    Products,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Supervisors,
        Dimension::Sellers,
        Dimension::Regions,
        Dimension::CustomerGroups,
        Dimension::Clients,
        Dimension::Products,
    ];

    /// Generic filter key used in the parameter projection
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Supervisors => "supervisors",
            Dimension::Sellers => "sellers",
            Dimension::Regions => "regions",
            Dimension::CustomerGroups => "customer_groups",
            Dimension::Clients => "clients",
            Dimension::Products => "products",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter dimension '{0}'")]
pub struct UnknownDimension(pub String);

impl FromStr for Dimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supervisors" => Ok(Dimension::Supervisors),
            "sellers" => Ok(Dimension::Sellers),
            "regions" => Ok(Dimension::Regions),
            "customer_groups" | "customerGroups" => Ok(Dimension::CustomerGroups),
            "clients" => Ok(Dimension::Clients),
            "products" => Ok(Dimension::Products),
            other => Err(UnknownDimension(other.to_string())),
        }
    }
}

/// Well-known boolean toggles. Toggles are keyed by name, so pages may add
/// their own without touching this list.
pub mod toggles {
    pub const EXCLUDE_EMPLOYEES: &str = "exclude_employees";
    pub const CURATED_GROUPS_ONLY: &str = "curated_groups_only";
}

/// Current filter selection.
///
/// A dimension mapped to `None` carries no restriction. An empty selection is
/// equivalent and is stored as `None`, so "nothing selected" can never turn
/// into "match nothing".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    date_range: DateRange,
    previous_date_range: DateRange,
    dimensions: BTreeMap<Dimension, Option<Vec<Value>>>,
    search_term: Option<String>,
    toggles: BTreeMap<String, bool>,
}

impl FilterState {
    /// Default window: first day of `today`'s month through `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self::with_range(DateRange::month_to_date(today))
    }

    pub fn with_range(date_range: DateRange) -> Self {
        Self {
            date_range,
            previous_date_range: date_range.previous_period(),
            dimensions: Dimension::ALL.iter().map(|d| (*d, None)).collect(),
            search_term: None,
            toggles: BTreeMap::new(),
        }
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn previous_date_range(&self) -> DateRange {
        self.previous_date_range
    }

    pub fn dimension(&self, dimension: Dimension) -> Option<&[Value]> {
        self.dimensions
            .get(&dimension)
            .and_then(|values| values.as_deref())
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref()
    }

    pub fn toggle(&self, name: &str) -> bool {
        self.toggles.get(name).copied().unwrap_or(false)
    }

    /// Shallow-merge a patch. Only the fields the patch sets are touched.
    pub fn apply(&mut self, patch: FilterPatch) {
        if let Some(range) = patch.date_range {
            self.date_range = range;
            self.previous_date_range = range.previous_period();
        }
        for (dimension, selection) in patch.dimensions {
            let selection = selection.filter(|values| !values.is_empty());
            self.dimensions.insert(dimension, selection);
        }
        if let Some(term) = patch.search_term {
            self.search_term = term.filter(|t| !t.trim().is_empty());
        }
        for (name, enabled) in patch.toggles {
            if is_reserved_key(&name) {
                tracing::warn!(toggle = %name, "toggle name collides with a filter key, ignored");
                continue;
            }
            self.toggles.insert(name, enabled);
        }
    }

    /// Flatten into the generic key space consumed by the parameter mapper.
    ///
    /// Every dimension is present (as `null` when unrestricted) so that
    /// descriptor defaults only ever fill keys the filter model does not know.
    pub fn to_generic_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("start_date".into(), self.date_range.from_param().into());
        params.insert("end_date".into(), self.date_range.to_param().into());
        params.insert(
            "previous_start_date".into(),
            self.previous_date_range.from_param().into(),
        );
        params.insert(
            "previous_end_date".into(),
            self.previous_date_range.to_param().into(),
        );
        for (dimension, selection) in &self.dimensions {
            let value = selection
                .as_ref()
                .map(|values| Value::Array(values.clone()))
                .unwrap_or(Value::Null);
            params.insert(dimension.as_str().into(), value);
        }
        params.insert(
            "search_term".into(),
            self.search_term
                .as_ref()
                .map(|t| Value::String(t.clone()))
                .unwrap_or(Value::Null),
        );
        for (name, enabled) in &self.toggles {
            params
                .entry(name.clone())
                .or_insert(Value::Bool(*enabled));
        }
        params
    }
}

/// Generic keys owned by the date window, dimensions, search and paging.
/// Toggles may not use them.
const RESERVED_KEYS: &[&str] = &[
    "start_date",
    "end_date",
    "previous_start_date",
    "previous_end_date",
    "search_term",
    "limit",
    "offset",
];

fn is_reserved_key(name: &str) -> bool {
    RESERVED_KEYS.contains(&name) || Dimension::ALL.iter().any(|d| d.as_str() == name)
}

/// Partial update for [`FilterState`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPatch {
    pub date_range: Option<DateRange>,
    pub dimensions: BTreeMap<Dimension, Option<Vec<Value>>>,
    /// `Some(None)` clears the search term
    pub search_term: Option<Option<String>>,
    pub toggles: BTreeMap<String, bool>,
}

impl FilterPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn select<I, V>(mut self, dimension: Dimension, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.dimensions.insert(dimension, Some(values));
        self
    }

    pub fn clear(mut self, dimension: Dimension) -> Self {
        self.dimensions.insert(dimension, None);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(Some(term.into()));
        self
    }

    pub fn clear_search(mut self) -> Self {
        self.search_term = Some(None);
        self
    }

    pub fn toggle(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.toggles.insert(name.into(), enabled);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.date_range.is_none()
            && self.dimensions.is_empty()
            && self.search_term.is_none()
            && self.toggles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn date_patch_recomputes_previous_range() {
        let mut state = FilterState::new(d(2025, 3, 10));
        state.apply(FilterPatch::new().date_range(DateRange::new(d(2025, 2, 1), d(2025, 2, 28)).unwrap()));

        assert_eq!(state.previous_date_range().from(), d(2025, 1, 4));
        assert_eq!(state.previous_date_range().to(), d(2025, 1, 31));
    }

    #[test]
    fn empty_selection_is_stored_as_unrestricted() {
        let mut state = FilterState::new(d(2025, 3, 10));
        state.apply(FilterPatch::new().select(Dimension::Sellers, Vec::<Value>::new()));
        assert_eq!(state.dimension(Dimension::Sellers), None);
        assert_eq!(state.to_generic_params()["sellers"], Value::Null);
    }

    #[test]
    fn patch_leaves_untouched_fields_alone() {
        let mut state = FilterState::new(d(2025, 3, 10));
        state.apply(
            FilterPatch::new()
                .select(Dimension::Regions, ["north"])
                .search("acme")
                .toggle(toggles::EXCLUDE_EMPLOYEES, true),
        );
        let before = state.date_range();

        state.apply(FilterPatch::new().select(Dimension::Products, [json!(7)]));

        assert_eq!(state.date_range(), before);
        assert_eq!(state.dimension(Dimension::Regions), Some(&[json!("north")][..]));
        assert_eq!(state.search_term(), Some("acme"));
        assert!(state.toggle(toggles::EXCLUDE_EMPLOYEES));
    }

    #[test]
    fn blank_search_clears_term() {
        let mut state = FilterState::new(d(2025, 3, 10));
        state.apply(FilterPatch::new().search("acme"));
        state.apply(FilterPatch::new().search("   "));
        assert_eq!(state.search_term(), None);
    }

    #[test]
    fn generic_projection_has_every_key() {
        let state = FilterState::new(d(2025, 3, 10));
        let params = state.to_generic_params();
        assert_eq!(params["start_date"], "2025-03-01");
        assert_eq!(params["end_date"], "2025-03-10");
        assert_eq!(params["previous_start_date"], "2025-02-19");
        assert_eq!(params["previous_end_date"], "2025-02-28");
        for dimension in Dimension::ALL {
            assert_eq!(params[dimension.as_str()], Value::Null);
        }
        assert_eq!(params["search_term"], Value::Null);
    }

    #[test]
    fn toggle_cannot_shadow_a_filter_key() {
        let mut state = FilterState::new(d(2025, 3, 10));
        state.apply(
            FilterPatch::new()
                .select(Dimension::Sellers, [12])
                .toggle("sellers", true)
                .toggle("start_date", false)
                .toggle(toggles::CURATED_GROUPS_ONLY, true),
        );

        let params = state.to_generic_params();
        assert_eq!(params["sellers"], json!([12]));
        assert_eq!(params["start_date"], "2025-03-01");
        assert_eq!(params[toggles::CURATED_GROUPS_ONLY], json!(true));
        assert!(!state.toggle("sellers"));
    }

    #[test]
    fn dimension_names_round_trip() {
        for dimension in Dimension::ALL {
            assert_eq!(dimension.as_str().parse::<Dimension>().unwrap(), dimension);
        }
        assert!("warehouses".parse::<Dimension>().is_err());
    }
}
