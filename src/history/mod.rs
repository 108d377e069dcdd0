//! History interval reconstruction
//!
//! Rebuilds the spans during which keys were active from a single
//! newest-first scan of the log. Pagination happens while intervals are
//! emitted, so memory stays bounded by the page size plus one entry per
//! key with a run in progress, however many samples the window holds.

/// Per-key open-run bookkeeping
pub mod tracker;

pub use tracker::{Interval, IntervalTracker};

use crate::error::{ErrorContext, Result};
use crate::sample::{SampleKind, Timestamp};
use crate::store::{self, BoxCursor, SampleLog, ScanFilter, ScanOrder};
use crate::window::{PageRequest, SortSpec, Window};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Kinds included in a history query unless the caller says otherwise
pub const DEFAULT_HISTORY_KINDS: [SampleKind; 2] = [SampleKind::Default, SampleKind::Alert];

/// Which samples a history query covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Time bounds, inclusive on both ends
    pub window: Window,
    /// Category restriction; `"all"` or absent means every category
    #[serde(default)]
    pub category: Option<String>,
    /// Case-insensitive substring the key must contain
    #[serde(default)]
    pub search: Option<String>,
    /// Explicit key set
    #[serde(default)]
    pub keys: Option<Vec<String>>,
    /// Kinds to include
    #[serde(default = "default_kinds")]
    pub kinds: Vec<SampleKind>,
}

fn default_kinds() -> Vec<SampleKind> {
    DEFAULT_HISTORY_KINDS.to_vec()
}

impl HistoryQuery {
    /// Query every default and alert key inside `window`
    pub fn new(window: Window) -> Self {
        Self {
            window,
            category: None,
            search: None,
            keys: None,
            kinds: default_kinds(),
        }
    }

    /// Restrict to a category
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restrict to keys containing `search`
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Restrict to a key set
    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the kinds to include
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = SampleKind>,
    {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Translate into a store filter
    pub fn to_scan_filter(&self) -> Result<ScanFilter> {
        let mut filter = ScanFilter::new(self.window)
            .with_category(self.category.as_deref())
            .with_search(self.search.as_deref())?
            .with_kinds(self.kinds.iter().copied());
        if let Some(keys) = &self.keys {
            filter = filter.with_keys(keys.iter().cloned());
        }
        Ok(filter)
    }
}

/// Column a history page can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryColumn {
    /// Key name
    Key,
    /// Run start
    #[default]
    Start,
    /// Run end
    End,
    /// Category
    Category,
    /// Kind
    Kind,
}

impl std::str::FromStr for HistoryColumn {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key" | "vid" => Ok(HistoryColumn::Key),
            "start" => Ok(HistoryColumn::Start),
            "end" => Ok(HistoryColumn::End),
            "category" => Ok(HistoryColumn::Category),
            "kind" | "type" => Ok(HistoryColumn::Kind),
            other => Err(format!("unknown history column '{}'", other)),
        }
    }
}

impl Default for SortSpec<HistoryColumn> {
    fn default() -> Self {
        SortSpec::desc(HistoryColumn::Start)
    }
}

/// Scan counters reported with each page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Samples pulled from the cursor
    pub samples_scanned: u64,
    /// Largest number of keys tracked at once
    pub peak_open_keys: usize,
}

/// One page of reconstructed intervals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Intervals emitted across the whole window
    pub count: usize,
    /// Intervals of the requested page, sorted
    pub intervals: Vec<Interval>,
    /// Scan counters
    pub stats: ScanStats,
}

/// Keeps the emitted rows that fall inside the requested page
#[derive(Debug)]
struct PageCollector {
    page: PageRequest,
    emitted: usize,
    rows: Vec<Interval>,
}

impl PageCollector {
    fn new(page: PageRequest) -> Self {
        Self {
            page,
            emitted: 0,
            rows: Vec::with_capacity(page.limit.min(1024)),
        }
    }

    fn offer(&mut self, interval: Interval) {
        if self.page.contains(self.emitted) {
            self.rows.push(interval);
        }
        self.emitted += 1;
    }
}

fn compare_ts(a: Option<Timestamp>, b: Option<Timestamp>) -> Ordering {
    a.cmp(&b)
}

/// Order two intervals by `sort`, breaking ties on key then start
pub fn compare_intervals(a: &Interval, b: &Interval, sort: SortSpec<HistoryColumn>) -> Ordering {
    let primary = match sort.column {
        HistoryColumn::Key => a.key.cmp(&b.key),
        HistoryColumn::Start => compare_ts(a.start, b.start),
        HistoryColumn::End => compare_ts(a.end, b.end),
        HistoryColumn::Category => a.category.cmp(&b.category),
        HistoryColumn::Kind => a.kind.as_str().cmp(b.kind.as_str()),
    };
    sort.direction
        .apply(primary)
        .then_with(|| a.key.cmp(&b.key))
        .then_with(|| compare_ts(a.start, b.start))
}

/// Reconstructs activity intervals from the sample log
pub struct HistoryReconstructor<S: SampleLog> {
    store: Arc<S>,
}

impl<S: SampleLog> HistoryReconstructor<S> {
    /// Create a reconstructor reading from `store`
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Build one page of intervals for `query`
    ///
    /// The window and page are validated before the scan opens. The cursor
    /// is closed exactly once whether the scan completes, fails or is
    /// cancelled, and nothing is returned unless it completes.
    pub async fn history(
        &self,
        query: &HistoryQuery,
        page: PageRequest,
        sort: SortSpec<HistoryColumn>,
        cancel: &CancellationToken,
    ) -> Result<HistoryPage> {
        query.window.validate()?;
        page.validate()?;
        let filter = query.to_scan_filter()?;

        let mut cursor = self
            .store
            .stream_scan(&filter, ScanOrder::Desc)
            .await
            .context("history scan")?;
        let outcome = scan(&mut cursor, page, cancel).await;
        cursor.close().await;
        let (collector, stats) = outcome?;

        let mut intervals = collector.rows;
        intervals.sort_by(|a, b| compare_intervals(a, b, sort));
        Ok(HistoryPage {
            count: collector.emitted,
            intervals,
            stats,
        })
    }
}

async fn scan(
    cursor: &mut BoxCursor,
    page: PageRequest,
    cancel: &CancellationToken,
) -> Result<(PageCollector, ScanStats)> {
    let mut tracker = IntervalTracker::new();
    let mut collector = PageCollector::new(page);
    let mut samples_scanned = 0u64;

    while let Some(sample) = store::pull(cursor, cancel).await? {
        samples_scanned += 1;
        if let Some(interval) = tracker.push(&sample) {
            collector.offer(interval);
        }
    }

    let peak_open_keys = tracker.peak_open_keys();
    Ok((
        collector,
        ScanStats {
            samples_scanned,
            peak_open_keys,
        },
    ))
}
