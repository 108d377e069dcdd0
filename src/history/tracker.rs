use crate::sample::{Sample, SampleKind, Scalar, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A reconstructed span during which a key held its active value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Key the interval belongs to
    pub key: String,
    /// First instant of the run; `None` when it predates the window
    pub start: Option<Timestamp>,
    /// Instant the run ended; `None` while still active
    pub end: Option<Timestamp>,
    /// Value held during the run
    pub value: Scalar,
    /// Category of the closing sample
    pub category: String,
    /// Kind of the closing sample
    pub kind: SampleKind,
}

impl Interval {
    /// Length of the run when both bounds are known
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Deactivation seen while scanning backward, waiting for its activation
#[derive(Debug, Clone)]
struct Closing {
    end: Timestamp,
    category: String,
    kind: SampleKind,
}

/// Per-key open-run state for a newest-to-oldest scan
///
/// Holds at most one entry per key, whatever the number of samples fed.
#[derive(Debug, Default)]
pub struct IntervalTracker {
    open: HashMap<String, Closing>,
    peak_open: usize,
}

impl IntervalTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next sample, newest first
    ///
    /// An activation closes the run its key has open and emits it at once.
    /// An activation with nothing open is dropped: either the run ends past
    /// the window, or it repeats an activation already emitted. An older
    /// deactivation replaces the tentative end. Non-boolean samples are
    /// ignored.
    pub fn push(&mut self, sample: &Sample) -> Option<Interval> {
        let active = sample.value.as_bool()?;
        if active {
            let closing = self.open.remove(&sample.key)?;
            return Some(Interval {
                key: sample.key.clone(),
                start: Some(sample.timestamp),
                end: Some(closing.end),
                value: Scalar::Bool(true),
                category: closing.category,
                kind: closing.kind,
            });
        }

        self.open.insert(
            sample.key.clone(),
            Closing {
                end: sample.timestamp,
                category: sample.category.clone(),
                kind: sample.kind,
            },
        );
        self.peak_open = self.peak_open.max(self.open.len());
        None
    }

    /// Keys currently holding an open entry
    pub fn open_keys(&self) -> usize {
        self.open.len()
    }

    /// Largest number of simultaneously open keys seen
    pub fn peak_open_keys(&self) -> usize {
        self.peak_open
    }
}
