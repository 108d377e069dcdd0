//! Latest-state aggregation
//!
//! Point lookups of the most recent value per key, and the listing of keys
//! whose latest value is currently `true`.

use crate::error::Result;
use crate::sample::{Sample, SampleKind, Scalar};
use crate::store::{self, BoxCursor, SampleLog, ScanFilter, ScanOrder};
use crate::window::{Page, PageRequest, SortSpec, Window};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Communication and machine indicators of a station
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationState {
    /// Communication indicator is currently true
    pub communicating: bool,
    /// Machine indicator is currently true
    pub running: bool,
}

/// Restricts which keys an active listing covers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveFilter {
    /// Only keys of this kind
    #[serde(default)]
    pub kind: Option<SampleKind>,
    /// Only keys of this category; `"all"` means every category
    #[serde(default)]
    pub category: Option<String>,
    /// Only these keys
    #[serde(default)]
    pub keys: Option<Vec<String>>,
}

impl ActiveFilter {
    /// Keys of one kind
    pub fn of_kind(kind: SampleKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    fn to_scan_filter(&self) -> ScanFilter {
        let mut filter = ScanFilter::new(Window::unbounded()).with_category(self.category.as_deref());
        if let Some(kind) = self.kind {
            filter = filter.with_kinds([kind]);
        }
        if let Some(keys) = &self.keys {
            filter = filter.with_keys(keys.iter().cloned());
        }
        filter
    }
}

/// Column an active listing can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActiveColumn {
    /// Key name
    Key,
    /// Instant the key became active
    #[default]
    Timestamp,
    /// Category
    Category,
    /// Kind
    Kind,
}

impl std::str::FromStr for ActiveColumn {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key" | "vid" => Ok(ActiveColumn::Key),
            "timestamp" | "date" => Ok(ActiveColumn::Timestamp),
            "category" => Ok(ActiveColumn::Category),
            "kind" | "type" => Ok(ActiveColumn::Kind),
            other => Err(format!("unknown active column '{}'", other)),
        }
    }
}

impl Default for SortSpec<ActiveColumn> {
    fn default() -> Self {
        SortSpec::desc(ActiveColumn::Timestamp)
    }
}

fn compare_samples(a: &Sample, b: &Sample, sort: SortSpec<ActiveColumn>) -> Ordering {
    let primary = match sort.column {
        ActiveColumn::Key => a.key.cmp(&b.key),
        ActiveColumn::Timestamp => a.timestamp.cmp(&b.timestamp),
        ActiveColumn::Category => a.category.cmp(&b.category),
        ActiveColumn::Kind => a.kind.cmp(&b.kind),
    };
    sort.direction.apply(primary).then_with(|| a.key.cmp(&b.key))
}

/// Head of the active listing of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePreview {
    /// Number of keys currently active
    pub total: usize,
    /// Most recently activated keys
    pub samples: Vec<Sample>,
}

/// Answers "what is the value right now" questions
pub struct LatestStateAggregator<S: SampleLog> {
    store: Arc<S>,
}

impl<S: SampleLog> LatestStateAggregator<S> {
    /// Create an aggregator reading from `store`
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Value of the most recent sample of `key`
    pub async fn current_value(&self, key: &str) -> Result<Option<Scalar>> {
        let keys = [key.to_string()];
        let mut latest = self.store.latest_per_key(&keys).await?;
        Ok(latest.remove(key).flatten().map(|s| s.value))
    }

    /// Latest value of every key, in one round trip
    pub async fn current_values(&self, keys: &[String]) -> Result<BTreeMap<String, Option<Scalar>>> {
        let latest = self.store.latest_per_key(keys).await?;
        Ok(keys
            .iter()
            .map(|key| {
                let value = latest.get(key).and_then(|s| s.as_ref()).map(|s| s.value);
                (key.clone(), value)
            })
            .collect())
    }

    /// Whether the latest value of `key` is `true`
    pub async fn is_active(&self, key: &str) -> Result<bool> {
        Ok(self
            .current_value(key)
            .await?
            .is_some_and(|v| v.is_active()))
    }

    /// Compose a station's indicators from its two keys
    pub async fn station_state(&self, communication_key: &str, machine_key: &str) -> Result<StationState> {
        let keys = [communication_key.to_string(), machine_key.to_string()];
        let latest = self.current_values(&keys).await?;
        let active = |key: &str| {
            latest
                .get(key)
                .copied()
                .flatten()
                .is_some_and(|v| v.is_active())
        };
        Ok(StationState {
            communicating: active(communication_key),
            running: active(machine_key),
        })
    }

    /// Keys whose latest matching sample is `true`
    ///
    /// One newest-first scan keeps the first sample seen per key; only the
    /// requested page is kept and sorted.
    pub async fn active_now(
        &self,
        filter: &ActiveFilter,
        page: PageRequest,
        sort: SortSpec<ActiveColumn>,
        cancel: &CancellationToken,
    ) -> Result<Page<Sample>> {
        page.validate()?;
        let scan_filter = filter.to_scan_filter();
        let mut cursor = self.store.stream_scan(&scan_filter, ScanOrder::Desc).await?;
        let outcome = scan_active(&mut cursor, page, cancel).await;
        cursor.close().await;
        let (total, mut items) = outcome?;
        items.sort_by(|a, b| compare_samples(a, b, sort));
        Ok(Page { total, items })
    }

    /// First `size` active keys of `kind`, most recent first
    pub async fn active_preview(
        &self,
        kind: SampleKind,
        size: usize,
        cancel: &CancellationToken,
    ) -> Result<ActivePreview> {
        let page = self
            .active_now(
                &ActiveFilter::of_kind(kind),
                PageRequest::new(0, size.max(1)),
                SortSpec::default(),
                cancel,
            )
            .await?;
        let mut samples = page.items;
        samples.truncate(size);
        Ok(ActivePreview {
            total: page.total,
            samples,
        })
    }
}

async fn scan_active(
    cursor: &mut BoxCursor,
    page: PageRequest,
    cancel: &CancellationToken,
) -> Result<(usize, Vec<Sample>)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut total = 0usize;
    let mut items = Vec::new();

    while let Some(sample) = store::pull(cursor, cancel).await? {
        if seen.contains(&sample.key) {
            continue;
        }
        seen.insert(sample.key.clone());
        if !sample.is_active() {
            continue;
        }
        if page.contains(total) {
            items.push(sample);
        }
        total += 1;
    }
    Ok((total, items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use crate::sample::{SampleBuilder, Timestamp};
    use crate::store::InMemorySampleLog;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn t(minutes: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn s(key: &str, minutes: i64, value: impl Into<Scalar>, kind: SampleKind) -> Sample {
        SampleBuilder::new(key)
            .timestamp(t(minutes))
            .value(value)
            .category(if key.starts_with("oven") { "line-2" } else { "line-1" })
            .kind(kind)
            .build()
    }

    fn fixture() -> LatestStateAggregator<InMemorySampleLog> {
        let log = InMemorySampleLog::from_samples(vec![
            s("press-1/alarm", 1, true, SampleKind::Alert),
            s("press-1/alarm", 5, false, SampleKind::Alert),
            s("press-2/alarm", 2, true, SampleKind::Alert),
            s("oven-1/alarm", 3, true, SampleKind::Alert),
            s("oven-1/fault", 4, true, SampleKind::Default),
            s("press-1/comm", 0, true, SampleKind::Other),
            s("press-1/running", 0, true, SampleKind::Other),
            s("press-1/running", 6, false, SampleKind::Other),
            s("press-1/hours", 7, 12.5, SampleKind::Other),
        ]);
        LatestStateAggregator::new(Arc::new(log))
    }

    #[tokio::test]
    async fn test_current_value() {
        let latest = fixture();
        assert_eq!(
            latest.current_value("press-1/alarm").await.unwrap(),
            Some(Scalar::Bool(false))
        );
        assert_eq!(
            latest.current_value("press-1/hours").await.unwrap(),
            Some(Scalar::Number(12.5))
        );
        assert_eq!(latest.current_value("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_current_values_keeps_absent_keys() {
        let latest = fixture();
        let keys = vec!["press-2/alarm".to_string(), "ghost".to_string()];
        let values = latest.current_values(&keys).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["press-2/alarm"], Some(Scalar::Bool(true)));
        assert_eq!(values["ghost"], None);
    }

    #[tokio::test]
    async fn test_station_state() {
        let latest = fixture();
        let state = latest
            .station_state("press-1/comm", "press-1/running")
            .await
            .unwrap();
        assert_eq!(
            state,
            StationState {
                communicating: true,
                running: false
            }
        );
        assert!(!latest.is_active("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_active_now_uses_latest_sample_per_key() {
        let latest = fixture();
        let cancel = CancellationToken::new();
        let page = latest
            .active_now(
                &ActiveFilter::of_kind(SampleKind::Alert),
                PageRequest::new(0, 10),
                SortSpec::default(),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        let keys: Vec<_> = page.items.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["oven-1/alarm", "press-2/alarm"]);

        let line_2 = latest
            .active_now(
                &ActiveFilter {
                    category: Some("line-2".into()),
                    ..ActiveFilter::default()
                },
                PageRequest::new(0, 10),
                SortSpec::asc(ActiveColumn::Key),
                &cancel,
            )
            .await
            .unwrap();
        let keys: Vec<_> = line_2.items.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["oven-1/alarm", "oven-1/fault"]);
    }

    #[tokio::test]
    async fn test_active_preview_is_bounded() {
        let latest = fixture();
        let preview = latest
            .active_preview(SampleKind::Alert, 1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(preview.total, 2);
        assert_eq!(preview.samples.len(), 1);
        assert_eq!(preview.samples[0].key, "oven-1/alarm");
    }

    #[tokio::test]
    async fn test_offline_store_propagates() {
        let log = Arc::new(InMemorySampleLog::new());
        log.set_available(false);
        let latest = LatestStateAggregator::new(log);
        let err = latest.current_value("a").await.unwrap_err();
        assert!(matches!(err, StateError::StoreUnavailable(_)));
    }
}
