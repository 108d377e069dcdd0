//! Sample log adapter
//!
//! Thin read interface over the external time-series store. Every call may
//! suspend while the store responds; scans hand back a pull-based cursor
//! that yields samples in strict timestamp order (ties broken by insertion
//! order) and must be closed explicitly once the consumer is done with it.
//!
//! The store handle is constructed by the process entry point and injected
//! into each component; nothing here owns a global connection.

pub mod filter;
pub mod memory;

pub use filter::{KeyPattern, ScanFilter};
pub use memory::InMemorySampleLog;

use crate::error::{Result, StateError};
use crate::sample::Sample;
use crate::window::Window;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Time ordering of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOrder {
    /// Oldest first
    Asc,
    /// Newest first
    Desc,
}

/// Single-pass, pull-based sequence of samples
///
/// A cursor is not restartable; a fresh one is opened per scan. `next`
/// returns `Ok(None)` once the sequence is exhausted or after `close`.
#[async_trait]
pub trait SampleCursor: Send {
    /// Pull the next sample
    async fn next(&mut self) -> Result<Option<Sample>>;

    /// Release store-side resources; further `next` calls yield `None`
    async fn close(&mut self);
}

/// Boxed cursor returned by [`SampleLog`] scans
pub type BoxCursor = Box<dyn SampleCursor>;

/// Read interface over the append-only sample log
#[async_trait]
pub trait SampleLog: Send + Sync + 'static {
    /// Samples of one key within `[window.from, window.to)`
    async fn range_scan(&self, key: &str, window: Window, order: ScanOrder) -> Result<BoxCursor>;

    /// Most recent sample of each key, in one round trip
    ///
    /// Every requested key is present in the returned map; keys without
    /// samples map to `None`.
    async fn latest_per_key(&self, keys: &[String]) -> Result<HashMap<String, Option<Sample>>>;

    /// One cursor over every sample matching `filter`, across keys
    async fn stream_scan(&self, filter: &ScanFilter, order: ScanOrder) -> Result<BoxCursor>;

    /// Release the store handle
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Get store name for logs
    fn name(&self) -> &str {
        "SampleLog"
    }
}

/// Pull the next sample unless the caller cancels first
///
/// The cursor is left open; the consumer closes it on every exit path.
pub async fn pull(cursor: &mut BoxCursor, cancel: &CancellationToken) -> Result<Option<Sample>> {
    if cancel.is_cancelled() {
        return Err(StateError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StateError::Cancelled),
        next = cursor.next() => next,
    }
}

/// Read the head of a cursor and close it
pub async fn first(mut cursor: BoxCursor, cancel: &CancellationToken) -> Result<Option<Sample>> {
    let head = pull(&mut cursor, cancel).await;
    cursor.close().await;
    head
}

/// Drain a cursor into memory; only for scans known to be small
pub async fn collect(mut cursor: BoxCursor, cancel: &CancellationToken) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    loop {
        match pull(&mut cursor, cancel).await {
            Ok(Some(sample)) => samples.push(sample),
            Ok(None) => break,
            Err(e) => {
                cursor.close().await;
                return Err(e);
            }
        }
    }
    cursor.close().await;
    Ok(samples)
}
