//! Query windows, pagination and sort direction

use crate::error::{Result, StateError};
use crate::sample::Timestamp;
use serde::{Deserialize, Serialize};

/// Time range a query is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Lower bound
    pub from: Timestamp,
    /// Upper bound
    pub to: Timestamp,
}

impl Window {
    /// Create a window, rejecting `from > to`
    pub fn new(from: Timestamp, to: Timestamp) -> Result<Self> {
        let window = Self { from, to };
        window.validate()?;
        Ok(window)
    }

    /// Window from `from` until `now`
    pub fn until_now(from: Timestamp, now: Timestamp) -> Result<Self> {
        Self::new(from, now)
    }

    /// Everything strictly before `to`
    pub fn before(to: Timestamp) -> Self {
        Self {
            from: Timestamp::MIN_UTC,
            to,
        }
    }

    /// The whole log
    pub fn unbounded() -> Self {
        Self {
            from: Timestamp::MIN_UTC,
            to: Timestamp::MAX_UTC,
        }
    }

    /// Check `from <= to`
    pub fn validate(&self) -> Result<()> {
        if self.from > self.to {
            return Err(StateError::InvalidWindow(format!(
                "window start {} is after its end {}",
                self.from.to_rfc3339(),
                self.to.to_rfc3339()
            )));
        }
        Ok(())
    }

    /// Half-open membership `[from, to)`
    pub fn contains_half_open(&self, ts: Timestamp) -> bool {
        ts >= self.from && ts < self.to
    }

    /// Closed membership `[from, to]`
    pub fn contains_closed(&self, ts: Timestamp) -> bool {
        ts >= self.from && ts <= self.to
    }

    /// Window length, zero when degenerate
    pub fn length(&self) -> chrono::Duration {
        (self.to - self.from).max(chrono::Duration::zero())
    }
}

/// Sort direction for result pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first
    Asc,
    /// Largest first
    #[default]
    Desc,
}

impl SortDirection {
    /// Parse "1"/"asc" and "-1"/"desc"
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "asc" | "ascending" => Some(SortDirection::Asc),
            "-1" | "desc" | "descending" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    /// Apply the direction to an ascending ordering
    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Column and direction a result page is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec<C> {
    /// Column to compare
    pub column: C,
    /// Direction of the comparison
    #[serde(default)]
    pub direction: SortDirection,
}

impl<C> SortSpec<C> {
    /// Ascending on `column`
    pub fn asc(column: C) -> Self {
        Self {
            column,
            direction: SortDirection::Asc,
        }
    }

    /// Descending on `column`
    pub fn desc(column: C) -> Self {
        Self {
            column,
            direction: SortDirection::Desc,
        }
    }
}

/// Skip/limit pagination request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of rows to skip
    pub skip: usize,
    /// Maximum number of rows to return
    pub limit: usize,
}

impl PageRequest {
    /// Create a page request
    pub fn new(skip: usize, limit: usize) -> Self {
        Self { skip, limit }
    }

    /// Build from a 1-based page number; page 0 is treated as page 1
    pub fn from_page(page: usize, limit: usize) -> Self {
        let page = page.max(1);
        Self {
            skip: (page - 1).saturating_mul(limit),
            limit,
        }
    }

    /// Reject a zero limit
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(StateError::InvalidWindow(
                "page limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the `index`-th emitted row belongs to this page
    pub fn contains(&self, index: usize) -> bool {
        index >= self.skip && index < self.skip.saturating_add(self.limit)
    }
}

/// A bounded page of results with the total number of rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Total rows matching the query, across all pages
    pub total: usize,
    /// Rows of the requested page
    pub items: Vec<T>,
}
