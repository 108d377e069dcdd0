//! Time-series state accounting
//!
//! Reads an append-only log of timestamped samples and answers three kinds
//! of questions about it: what each key's value is right now, for how long a
//! key has held a value since a counter was anchored, and during which spans
//! keys were active inside a window.
//!
//! # Example
//!
//! ```no_run
//! use statewatch_rs::{
//!     AccumulationRequest, CounterUnit, InMemorySampleLog, Sample, StateEngine,
//! };
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let now = Utc::now();
//! let log = InMemorySampleLog::from_samples(vec![
//!     Sample::new("press-1/running", now - Duration::hours(3), true),
//! ]);
//!
//! let engine = StateEngine::builder().store(Arc::new(log)).build()?;
//!
//! let request = AccumulationRequest::new(
//!     "press-1/running",
//!     true,
//!     now - Duration::hours(2),
//!     CounterUnit::Hour,
//! );
//! let counter = engine
//!     .get_accumulated_duration(&request, &CancellationToken::new())
//!     .await?;
//! tracing::info!("running for {}", counter.formatted);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

// Re-export commonly used items
pub use accumulator::{Accumulation, AccumulationRequest, CounterUnit};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{CounterSpec, StateEngine, StateEngineBuilder};
pub use error::{ErrorContext, ErrorSeverity, Result, StateError};
pub use history::{HistoryColumn, HistoryPage, HistoryQuery, Interval, ScanStats};
pub use latest::{ActiveColumn, ActiveFilter, ActivePreview, StationState};
pub use sample::{Sample, SampleBuilder, SampleKind, Scalar, Timestamp};
pub use series::{Series, SeriesPoint};
pub use store::{InMemorySampleLog, SampleCursor, SampleLog, ScanFilter, ScanOrder};
pub use window::{Page, PageRequest, SortDirection, SortSpec, Window};

/// Error types
pub mod error;

/// Sample model
pub mod sample;

/// Time sources
pub mod clock;

/// Windows, pagination and sorting
pub mod window;

/// Sample log adapter and the in-memory store
pub mod store;

/// Latest-state aggregation
pub mod latest;

/// Duration counters
pub mod accumulator;

/// History interval reconstruction
pub mod history;

/// Chart series
pub mod series;

/// Engine configuration
pub mod config;

/// Caller-facing engine
pub mod engine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber with default settings
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
