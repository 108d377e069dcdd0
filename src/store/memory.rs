//! In-memory sample log
//!
//! Keeps samples ordered by `(timestamp, insertion order)` and serves scans
//! through a bounded channel fed by a producer task. The producer reads the
//! log one batch at a time under a short read lock and resumes from the last
//! position it examined, so a consumer that pulls slowly holds the producer
//! back and a cursor never holds more than one batch of the log.

use crate::error::{Result, StateError};
use crate::sample::{Sample, Timestamp};
use crate::store::{BoxCursor, SampleCursor, SampleLog, ScanFilter, ScanOrder};
use crate::window::Window;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Default channel capacity between producer task and cursor
pub const DEFAULT_CURSOR_BATCH_SIZE: usize = 256;

/// Place of a stored sample in scan order
type Position = (Timestamp, u64);

#[derive(Debug)]
struct Stored {
    seq: u64,
    sample: Sample,
}

impl Stored {
    fn position(&self) -> Position {
        (self.sample.timestamp, self.seq)
    }
}

#[derive(Debug, Default)]
struct LogInner {
    /// All samples, ordered by timestamp then insertion
    ordered: Vec<Arc<Stored>>,
    /// Per-key view with the same ordering
    by_key: BTreeMap<String, Vec<Arc<Stored>>>,
    next_seq: u64,
}

/// What a cursor walks, fixed when it opens
#[derive(Debug, Clone)]
enum ScanSource {
    /// One key over a half-open window
    Key(String, Window),
    /// Every key through a filter with a closed window
    Filtered(ScanFilter),
}

#[derive(Debug)]
struct ScanPlan {
    source: ScanSource,
    order: ScanOrder,
    /// Samples appended after the cursor opened stay invisible to it
    high_water: u64,
}

impl ScanPlan {
    fn window(&self) -> Window {
        match &self.source {
            ScanSource::Key(_, window) => *window,
            ScanSource::Filtered(filter) => filter.window,
        }
    }

    fn admits(&self, stored: &Stored) -> bool {
        if stored.seq >= self.high_water {
            return false;
        }
        match &self.source {
            ScanSource::Key(_, window) => window.contains_half_open(stored.sample.timestamp),
            ScanSource::Filtered(filter) => filter.matches(&stored.sample),
        }
    }
}

/// One producer step
#[derive(Debug)]
struct Batch {
    samples: Vec<Sample>,
    resume: Option<Position>,
    exhausted: bool,
}

impl LogInner {
    fn entries(&self, source: &ScanSource) -> &[Arc<Stored>] {
        match source {
            ScanSource::Key(key, _) => self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[]),
            ScanSource::Filtered(_) => &self.ordered,
        }
    }

    /// Up to `max` admitted samples following `resume` in scan order
    fn next_batch(&self, plan: &ScanPlan, resume: Option<Position>, max: usize) -> Batch {
        let entries = self.entries(&plan.source);
        let window = plan.window();
        let walk: Box<dyn Iterator<Item = &Arc<Stored>> + '_> = match plan.order {
            ScanOrder::Asc => {
                let start = match resume {
                    Some(pos) => entries.partition_point(|e| e.position() <= pos),
                    None => entries.partition_point(|e| e.sample.timestamp < window.from),
                };
                Box::new(entries[start..].iter())
            }
            ScanOrder::Desc => {
                let end = match resume {
                    Some(pos) => entries.partition_point(|e| e.position() < pos),
                    None => entries.partition_point(|e| e.sample.timestamp <= window.to),
                };
                Box::new(entries[..end].iter().rev())
            }
        };

        let mut samples = Vec::new();
        let mut last = resume;
        for stored in walk.take_while(|e| window.contains_closed(e.sample.timestamp)) {
            last = Some(stored.position());
            if plan.admits(stored) {
                samples.push(stored.sample.clone());
                if samples.len() == max {
                    return Batch {
                        samples,
                        resume: last,
                        exhausted: false,
                    };
                }
            }
        }
        Batch {
            samples,
            resume: last,
            exhausted: true,
        }
    }
}

/// Sample log held in process memory
#[derive(Debug)]
pub struct InMemorySampleLog {
    inner: Arc<RwLock<LogInner>>,
    available: AtomicBool,
    batch_size: usize,
    cursors_opened: AtomicU64,
    samples_served: Arc<AtomicU64>,
}

impl Default for InMemorySampleLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySampleLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(LogInner::default())),
            available: AtomicBool::new(true),
            batch_size: DEFAULT_CURSOR_BATCH_SIZE,
            cursors_opened: AtomicU64::new(0),
            samples_served: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set the producer batch size and cursor channel capacity (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Create a log holding `samples`
    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = Sample>,
    {
        let log = Self::new();
        log.extend(samples);
        log
    }

    /// Parse one JSON sample per line; blank lines are skipped
    pub fn from_jsonl<R: BufRead>(reader: R) -> Result<Self> {
        let log = Self::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let sample: Sample = serde_json::from_str(&line).map_err(|e| {
                StateError::Configuration(format!("sample log line {}: {}", lineno + 1, e))
            })?;
            log.append(sample);
        }
        Ok(log)
    }

    /// Append a sample
    pub fn append(&self, sample: Sample) {
        let mut inner = self.inner.write();
        let stored = Arc::new(Stored {
            seq: inner.next_seq,
            sample,
        });
        inner.next_seq += 1;

        let ts = stored.sample.timestamp;
        let pos = inner.ordered.partition_point(|s| s.sample.timestamp <= ts);
        inner.ordered.insert(pos, stored.clone());

        let per_key = inner.by_key.entry(stored.sample.key.clone()).or_default();
        let pos = per_key.partition_point(|s| s.sample.timestamp <= ts);
        per_key.insert(pos, stored);
    }

    /// Append many samples
    pub fn extend<I>(&self, samples: I)
    where
        I: IntoIterator<Item = Sample>,
    {
        for sample in samples {
            self.append(sample);
        }
    }

    /// Number of stored samples
    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    /// Whether the log holds no sample
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Simulate the store going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of cursors opened so far
    pub fn cursors_opened(&self) -> u64 {
        self.cursors_opened.load(Ordering::Relaxed)
    }

    /// Samples read out of the log by cursor producers so far
    pub fn samples_served(&self) -> u64 {
        self.samples_served.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StateError::StoreUnavailable(
                "in-memory sample log is offline".to_string(),
            ))
        }
    }

    fn open_cursor(&self, source: ScanSource, order: ScanOrder) -> BoxCursor {
        let id = self.cursors_opened.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel::<Result<Sample>>(self.batch_size);
        let plan = ScanPlan {
            source,
            order,
            high_water: self.inner.read().next_seq,
        };
        let inner = self.inner.clone();
        let served = self.samples_served.clone();
        let batch_size = self.batch_size;

        let task = tokio::spawn(async move {
            trace!(cursor = id, ?order, "cursor producer started");
            let mut resume = None;
            loop {
                let batch = inner.read().next_batch(&plan, resume, batch_size);
                served.fetch_add(batch.samples.len() as u64, Ordering::Relaxed);
                for sample in batch.samples {
                    if tx.send(Ok(sample)).await.is_err() {
                        debug!(cursor = id, "cursor closed by consumer before exhaustion");
                        return;
                    }
                }
                if batch.exhausted {
                    break;
                }
                resume = batch.resume;
            }
            trace!(cursor = id, "cursor producer exhausted");
        });

        Box::new(ChannelCursor {
            rx: Some(rx),
            task: Some(task),
        })
    }
}

#[async_trait]
impl SampleLog for InMemorySampleLog {
    async fn range_scan(&self, key: &str, window: Window, order: ScanOrder) -> Result<BoxCursor> {
        self.check_available()?;
        window.validate()?;
        Ok(self.open_cursor(ScanSource::Key(key.to_string(), window), order))
    }

    async fn latest_per_key(&self, keys: &[String]) -> Result<HashMap<String, Option<Sample>>> {
        self.check_available()?;
        let inner = self.inner.read();
        Ok(keys
            .iter()
            .map(|key| {
                let latest = inner
                    .by_key
                    .get(key)
                    .and_then(|samples| samples.last())
                    .map(|s| s.sample.clone());
                (key.clone(), latest)
            })
            .collect())
    }

    async fn stream_scan(&self, filter: &ScanFilter, order: ScanOrder) -> Result<BoxCursor> {
        self.check_available()?;
        filter.window.validate()?;
        Ok(self.open_cursor(ScanSource::Filtered(filter.clone()), order))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Cursor draining a producer task's channel
struct ChannelCursor {
    rx: Option<mpsc::Receiver<Result<Sample>>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl SampleCursor for ChannelCursor {
    async fn next(&mut self) -> Result<Option<Sample>> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };
        match rx.recv().await {
            Some(item) => item.map(Some),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ChannelCursor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
