//! State-interval accumulation
//!
//! Answers "for how long has `key` held `reference` since the counter was
//! anchored?". The value in effect at the anchor comes from the last sample
//! strictly before it; samples at or after the anchor are walked oldest
//! first, adding the span between consecutive events whenever the running
//! value equals the reference, plus the still-open tail up to now.

/// Counter units and formatting
pub mod unit;

pub use unit::CounterUnit;

use crate::clock::Clock;
use crate::error::{ErrorContext, Result};
use crate::sample::{Sample, Scalar, Timestamp};
use crate::store::{self, SampleLog, ScanOrder};
use crate::window::Window;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Parameters of a duration counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulationRequest {
    /// Key being timed
    pub key: String,
    /// Value that counts as accumulating
    pub reference: Scalar,
    /// When the counter was created or last reset
    pub anchor: Timestamp,
    /// Presentation unit
    #[serde(default)]
    pub unit: CounterUnit,
}

impl AccumulationRequest {
    /// Create a request timing `reference` on `key` since `anchor`
    pub fn new(
        key: impl Into<String>,
        reference: impl Into<Scalar>,
        anchor: Timestamp,
        unit: CounterUnit,
    ) -> Self {
        Self {
            key: key.into(),
            reference: reference.into(),
            anchor,
            unit,
        }
    }
}

/// Accumulated duration of a counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulation {
    /// Key the counter is attached to
    pub key: String,
    /// Presentation unit
    pub unit: CounterUnit,
    /// Whole minutes accumulated
    pub total_minutes: u64,
    /// `total_minutes` rendered in `unit`
    pub formatted: String,
}

impl Accumulation {
    /// Build from whole minutes
    pub fn from_minutes(key: impl Into<String>, unit: CounterUnit, total_minutes: u64) -> Self {
        Self {
            key: key.into(),
            unit,
            total_minutes,
            formatted: unit.format(total_minutes),
        }
    }
}

/// Running cursor over an ascending sample sequence
///
/// Pure state machine; the async driver feeds it samples at or after the
/// anchor in timestamp order.
#[derive(Debug, Clone)]
pub struct DurationAccumulator {
    reference: Scalar,
    anchor: Timestamp,
    prior: Option<Scalar>,
    cursor: Option<(Timestamp, Scalar)>,
    total: Duration,
    samples_seen: usize,
}

impl DurationAccumulator {
    /// Start accumulating from `anchor`, given the value in effect before it
    pub fn new(reference: Scalar, anchor: Timestamp, prior: Option<Scalar>) -> Self {
        // Without prior history the reference value is assumed from the anchor.
        // With a different prior value, wait for the first transition into it.
        let cursor = match prior {
            None => Some((anchor, reference)),
            Some(value) if value == reference => Some((anchor, reference)),
            Some(_) => None,
        };
        Self {
            reference,
            anchor,
            prior,
            cursor,
            total: Duration::zero(),
            samples_seen: 0,
        }
    }

    /// Feed the next sample in ascending order
    pub fn push(&mut self, sample: &Sample) {
        self.samples_seen += 1;
        match self.cursor {
            None => {
                if sample.value == self.reference {
                    self.cursor = Some((sample.timestamp, sample.value));
                }
            }
            Some((since, value)) => {
                if value == self.reference {
                    self.total += (sample.timestamp - since).max(Duration::zero());
                }
                self.cursor = Some((sample.timestamp, sample.value));
            }
        }
    }

    /// Number of samples fed so far
    pub fn samples_seen(&self) -> usize {
        self.samples_seen
    }

    /// Close the open tail at `now` and return the accumulated duration
    ///
    /// The result is clamped to `[0, now - anchor]`.
    pub fn finish(self, now: Timestamp) -> Duration {
        let elapsed = (now - self.anchor).max(Duration::zero());

        let total = if self.samples_seen == 0 {
            match self.prior {
                Some(value) if value == self.reference => elapsed,
                _ => Duration::zero(),
            }
        } else {
            let tail = match self.cursor {
                Some((since, value)) if value == self.reference => {
                    (now - since).max(Duration::zero())
                }
                _ => Duration::zero(),
            };
            self.total + tail
        };

        total.clamp(Duration::zero(), elapsed)
    }
}

/// Floor a duration to whole minutes, negative durations count as zero
pub fn whole_minutes(duration: Duration) -> u64 {
    (duration.num_milliseconds().max(0) / MILLIS_PER_MINUTE) as u64
}

/// Minutes carried by a gauge counter's latest value, read as hours
pub fn gauge_minutes(latest: Option<Scalar>) -> u64 {
    let hours = latest.map(|v| v.as_f64()).unwrap_or(0.0);
    if !hours.is_finite() || hours <= 0.0 {
        return 0;
    }
    (hours * 60.0).floor() as u64
}

/// Computes duration counters against a sample log
pub struct StateIntervalAccumulator<S: SampleLog> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: SampleLog> StateIntervalAccumulator<S> {
    /// Create an accumulator reading from `store`
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Accumulated time `request.key` held `request.reference` since the anchor
    pub async fn accumulate(
        &self,
        request: &AccumulationRequest,
        cancel: &CancellationToken,
    ) -> Result<Accumulation> {
        let now = self.clock.now();
        let duration = self.accumulated_duration(request, now, cancel).await?;
        Ok(Accumulation::from_minutes(
            request.key.clone(),
            request.unit,
            whole_minutes(duration),
        ))
    }

    /// Raw accumulated duration as of `now`
    pub async fn accumulated_duration(
        &self,
        request: &AccumulationRequest,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Duration> {
        let prior_cursor = self
            .store
            .range_scan(&request.key, Window::before(request.anchor), ScanOrder::Desc)
            .await
            .with_context(|| format!("value of {} before anchor", request.key))?;
        let prior = store::first(prior_cursor, cancel).await?;

        let mut acc =
            DurationAccumulator::new(request.reference, request.anchor, prior.map(|s| s.value));

        // Samples stamped after `now` are not part of the counted span
        let window = Window {
            from: request.anchor,
            to: now.max(request.anchor),
        };
        let mut cursor = self
            .store
            .range_scan(&request.key, window, ScanOrder::Asc)
            .await
            .with_context(|| format!("samples of {} since anchor", request.key))?;
        loop {
            match store::pull(&mut cursor, cancel).await {
                Ok(Some(sample)) => acc.push(&sample),
                Ok(None) => break,
                Err(e) => {
                    cursor.close().await;
                    return Err(e);
                }
            }
        }
        cursor.close().await;

        Ok(acc.finish(now))
    }
}
