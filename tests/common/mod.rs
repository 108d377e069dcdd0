//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use statewatch_rs::store::BoxCursor;
use statewatch_rs::{
    Result, Sample, SampleCursor, SampleKind, SampleLog, ScanFilter, ScanOrder, StateError,
    Timestamp, Window,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const ALARM_KEY: &str = "line-1/press-1/alarm";

/// Fixed origin for synthetic timelines
pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// `t0` plus whole minutes
pub fn at(minutes: i64) -> Timestamp {
    t0() + Duration::minutes(minutes)
}

/// Sample log that synthesises `pairs` on/off cycles of one key on demand
///
/// Cycle `i` turns the key on at minute `2i` and off at minute `2i + 1`.
/// Nothing is materialised: each cursor computes samples from an index.
#[derive(Debug, Clone)]
pub struct SyntheticLog {
    pairs: usize,
    stall_after: Option<usize>,
    fail_after: Option<usize>,
    closes: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl SyntheticLog {
    pub fn new(pairs: usize) -> Self {
        Self {
            pairs,
            stall_after: None,
            fail_after: None,
            closes: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cursors never answer after yielding `n` samples
    pub fn stall_after(mut self, n: usize) -> Self {
        self.stall_after = Some(n);
        self
    }

    /// Cursors fail with `StoreUnavailable` after yielding `n` samples
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Number of `close()` calls across all cursors
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of cursors opened
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn len(&self) -> usize {
        self.pairs * 2
    }

    fn sample(index: usize) -> Sample {
        Sample {
            key: ALARM_KEY.to_string(),
            timestamp: at(index as i64),
            value: (index % 2 == 0).into(),
            category: "line-1".to_string(),
            kind: SampleKind::Alert,
        }
    }

    fn cursor(&self, order: ScanOrder, keep: Box<dyn Fn(&Sample) -> bool + Send>) -> BoxCursor {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Box::new(SyntheticCursor {
            remaining: self.len(),
            total: self.len(),
            order,
            keep,
            yielded: 0,
            stall_after: self.stall_after,
            fail_after: self.fail_after,
            closed: false,
            closes: self.closes.clone(),
        })
    }
}

#[async_trait]
impl SampleLog for SyntheticLog {
    async fn range_scan(&self, key: &str, window: Window, order: ScanOrder) -> Result<BoxCursor> {
        let key = key.to_string();
        Ok(self.cursor(
            order,
            Box::new(move |s| s.key == key && window.contains_half_open(s.timestamp)),
        ))
    }

    async fn latest_per_key(&self, keys: &[String]) -> Result<HashMap<String, Option<Sample>>> {
        let last = self.len().checked_sub(1).map(Self::sample);
        Ok(keys
            .iter()
            .map(|k| {
                let latest = last.clone().filter(|s| &s.key == k);
                (k.clone(), latest)
            })
            .collect())
    }

    async fn stream_scan(&self, filter: &ScanFilter, order: ScanOrder) -> Result<BoxCursor> {
        let filter = filter.clone();
        Ok(self.cursor(order, Box::new(move |s| filter.matches(s))))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct SyntheticCursor {
    remaining: usize,
    total: usize,
    order: ScanOrder,
    keep: Box<dyn Fn(&Sample) -> bool + Send>,
    yielded: usize,
    stall_after: Option<usize>,
    fail_after: Option<usize>,
    closed: bool,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl SampleCursor for SyntheticCursor {
    async fn next(&mut self) -> Result<Option<Sample>> {
        if self.closed {
            return Ok(None);
        }
        if self.stall_after == Some(self.yielded) {
            std::future::pending::<()>().await;
        }
        if self.fail_after == Some(self.yielded) {
            return Err(StateError::StoreUnavailable("connection reset".to_string()));
        }
        while self.remaining > 0 {
            self.remaining -= 1;
            let index = match self.order {
                ScanOrder::Asc => self.total - 1 - self.remaining,
                ScanOrder::Desc => self.remaining,
            };
            let sample = SyntheticLog::sample(index);
            if (self.keep)(&sample) {
                self.yielded += 1;
                return Ok(Some(sample));
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        self.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
