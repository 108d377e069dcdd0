//! Chart series extraction

use crate::error::Result;
use crate::sample::{Scalar, Timestamp};
use crate::store::{self, SampleLog, ScanOrder};
use crate::window::Window;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One plotted sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Recording instant
    pub timestamp: Timestamp,
    /// Observed value
    pub value: Scalar,
}

/// Samples of one key over a window, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Key the series was read from
    pub name: String,
    /// Points in timestamp order
    pub points: Vec<SeriesPoint>,
}

/// Reads chart series from a sample log
pub struct SeriesReader<S: SampleLog> {
    store: Arc<S>,
}

impl<S: SampleLog> SeriesReader<S> {
    /// Create a reader over `store`
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Samples of `key` within `[window.from, window.to)`
    pub async fn series(&self, key: &str, window: Window, cancel: &CancellationToken) -> Result<Series> {
        window.validate()?;
        let cursor = self.store.range_scan(key, window, ScanOrder::Asc).await?;
        let points = store::collect(cursor, cancel)
            .await?
            .into_iter()
            .map(|s| SeriesPoint {
                timestamp: s.timestamp,
                value: s.value,
            })
            .collect();
        Ok(Series {
            name: key.to_string(),
            points,
        })
    }
}
