//! Offset/limit continuation state.

use serde::{Deserialize, Serialize};

/// Page size used when a caller does not fix one.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Offset/limit of one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
}

impl PageWindow {
    pub fn first(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
        }
    }
}

/// Pagination as seen by consumers. Always present, even before the first
/// response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::initial(DEFAULT_PAGE_SIZE)
    }
}

impl Pagination {
    pub fn initial(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
            has_more: false,
        }
    }

    /// Window for the page after the one last fetched.
    pub fn next_window(&self) -> PageWindow {
        PageWindow {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }

    /// State after `rows` came back for `window`.
    ///
    /// `has_more` is a heuristic: a full page means there may be another.
    /// When the total is an exact multiple of the page size this costs one
    /// extra fetch that comes back empty.
    pub fn after_page(window: PageWindow, rows: usize) -> Self {
        Self {
            offset: window.offset,
            limit: window.limit,
            has_more: rows >= window.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_first_page_without_continuation() {
        let p = Pagination::default();
        assert_eq!(p.offset, 0);
        assert_eq!(p.limit, DEFAULT_PAGE_SIZE);
        assert!(!p.has_more);
    }

    #[test]
    fn full_page_signals_more() {
        let first = PageWindow::first(1000);
        let p = Pagination::after_page(first, 1000);
        assert!(p.has_more);
        assert_eq!(p.next_window(), PageWindow { offset: 1000, limit: 1000 });

        let p = Pagination::after_page(p.next_window(), 500);
        assert!(!p.has_more);
        assert_eq!(p.offset, 1000);
    }

    #[test]
    fn exact_multiple_costs_one_empty_fetch() {
        let p = Pagination::after_page(PageWindow::first(10), 10);
        assert!(p.has_more);
        let p = Pagination::after_page(p.next_window(), 0);
        assert!(!p.has_more);
    }

    #[test]
    fn zero_limit_is_clamped() {
        assert_eq!(PageWindow::first(0).limit, 1);
        assert_eq!(Pagination::initial(0).limit, 1);
    }
}
