//! Reporting windows
//!
//! All dates are civil calendar dates (`NaiveDate`). They never pass through a
//! timestamp, so a window picked as 2025-03-01..2025-03-31 is sent as exactly
//! those strings whatever offset the process runs under.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format used for every date parameter sent to a remote function.
pub const PARAM_DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive date window. Invariant: `from <= to`, also on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

/// Rejected window (`from` after `to`)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("date range starts after it ends: {from} > {to}")]
pub struct InvertedRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = InvertedRange;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.from, raw.to)
    }
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, InvertedRange> {
        if from > to {
            return Err(InvertedRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// First day of `today`'s month through `today`.
    pub fn month_to_date(today: NaiveDate) -> Self {
        let from = today.with_day(1).unwrap_or(today);
        Self { from, to: today }
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Number of whole days covered, both ends included.
    pub fn len_days(&self) -> u64 {
        // from <= to, so the difference is never negative
        (self.to - self.from).num_days().unsigned_abs() + 1
    }

    /// Window of equal length ending the day before `from`.
    ///
    /// 2025-02-01..2025-02-28 (28 days) → 2025-01-04..2025-01-31.
    pub fn previous_period(&self) -> Self {
        let to = self.from.pred_opt().unwrap_or(NaiveDate::MIN);
        let from = to
            .checked_sub_days(Days::new(self.len_days() - 1))
            .unwrap_or(NaiveDate::MIN);
        Self { from, to }
    }

    pub fn from_param(&self) -> String {
        format_param_date(self.from)
    }

    pub fn to_param(&self) -> String {
        format_param_date(self.to)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from_param(), self.to_param())
    }
}

pub fn format_param_date(date: NaiveDate) -> String {
    date.format(PARAM_DATE_FORMAT).to_string()
}

/// Reduce a date or timestamp string to the civil date it was written with.
///
/// `2025-02-01`, `2025-02-01T23:30:00-03:00` and `2025-02-01 23:30:00` all
/// yield 2025-02-01. The offset is ignored rather than applied.
pub fn parse_civil_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10)?;
    let date = NaiveDate::parse_from_str(head, PARAM_DATE_FORMAT).ok()?;
    match trimmed.as_bytes().get(10) {
        None | Some(b'T') | Some(b't') | Some(b' ') => Some(date),
        Some(_) => None,
    }
}
