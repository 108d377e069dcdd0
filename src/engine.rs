//! Caller-facing state engine
//!
//! Wires the aggregator, accumulator and reconstructor to one injected
//! store handle, applies configured page limits and the scan deadline, and
//! is the only layer that logs.

use crate::accumulator::{
    gauge_minutes, Accumulation, AccumulationRequest, CounterUnit, StateIntervalAccumulator,
};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{Result, StateError};
use crate::history::{HistoryColumn, HistoryPage, HistoryQuery, HistoryReconstructor};
use crate::latest::{
    ActiveColumn, ActiveFilter, ActivePreview, LatestStateAggregator, StationState,
};
use crate::sample::{Sample, SampleKind, Scalar};
use crate::series::{Series, SeriesReader};
use crate::store::SampleLog;
use crate::window::{Page, PageRequest, SortSpec, Window};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// One counter of a dashboard batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CounterSpec {
    /// Time spent at a reference value since an anchor
    Duration(AccumulationRequest),
    /// Latest numeric value of a key, read as hours
    Gauge {
        /// Key holding the gauge
        key: String,
        /// Presentation unit
        #[serde(default)]
        unit: CounterUnit,
    },
}

/// Builder for [`StateEngine`]
pub struct StateEngineBuilder<S: SampleLog> {
    store: Option<Arc<S>>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl<S: SampleLog> Default for StateEngineBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SampleLog> StateEngineBuilder<S> {
    /// Create a builder with default configuration and the wall clock
    pub fn new() -> Self {
        Self {
            store: None,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the sample log every query reads from
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<StateEngine<S>> {
        let store = self
            .store
            .ok_or_else(|| StateError::Configuration("no sample log configured".to_string()))?;
        self.config.validate()?;
        debug!(store = store.name(), "state engine ready");
        Ok(StateEngine {
            latest: LatestStateAggregator::new(store.clone()),
            accumulator: StateIntervalAccumulator::new(store.clone(), self.clock.clone()),
            history: HistoryReconstructor::new(store.clone()),
            series: SeriesReader::new(store.clone()),
            store,
            config: self.config,
            clock: self.clock,
        })
    }
}

/// Read-only state accounting over a sample log
pub struct StateEngine<S: SampleLog> {
    store: Arc<S>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    latest: LatestStateAggregator<S>,
    accumulator: StateIntervalAccumulator<S>,
    history: HistoryReconstructor<S>,
    series: SeriesReader<S>,
}

impl<S: SampleLog> StateEngine<S> {
    /// Create a builder
    pub fn builder() -> StateEngineBuilder<S> {
        StateEngineBuilder::new()
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying store handle
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current instant according to the engine's clock
    pub fn now(&self) -> crate::sample::Timestamp {
        self.clock.now()
    }

    /// Latest value of each key
    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    pub async fn get_current_state(&self, keys: &[String]) -> Result<BTreeMap<String, Option<Scalar>>> {
        let values = observe("current_state", self.latest.current_values(keys).await)?;
        debug!(
            present = values.values().filter(|v| v.is_some()).count(),
            "current state resolved"
        );
        Ok(values)
    }

    /// Latest value of one key
    pub async fn current_value(&self, key: &str) -> Result<Option<Scalar>> {
        observe("current_value", self.latest.current_value(key).await)
    }

    /// Communication and machine indicators of a station
    #[instrument(skip(self))]
    pub async fn station_state(&self, communication_key: &str, machine_key: &str) -> Result<StationState> {
        observe(
            "station_state",
            self.latest.station_state(communication_key, machine_key).await,
        )
    }

    /// Time `request.key` held `request.reference` since the anchor
    #[instrument(skip(self, request, cancel), fields(key = %request.key, unit = %request.unit))]
    pub async fn get_accumulated_duration(
        &self,
        request: &AccumulationRequest,
        cancel: &CancellationToken,
    ) -> Result<Accumulation> {
        let result = self
            .with_deadline("accumulated_duration", cancel, |token| async move {
                self.accumulator.accumulate(request, &token).await
            })
            .await;
        let accumulation = observe("accumulated_duration", result)?;
        debug!(total_minutes = accumulation.total_minutes, "counter computed");
        Ok(accumulation)
    }

    /// Gauge counter: the latest value of `key` read as hours
    #[instrument(skip(self))]
    pub async fn gauge_counter(&self, key: &str, unit: CounterUnit) -> Result<Accumulation> {
        let latest = observe("gauge_counter", self.latest.current_value(key).await)?;
        Ok(Accumulation::from_minutes(key, unit, gauge_minutes(latest)))
    }

    /// Evaluate a batch of counters concurrently, in input order
    #[instrument(skip(self, specs, cancel), fields(counters = specs.len()))]
    pub async fn get_counters(
        &self,
        specs: &[CounterSpec],
        cancel: &CancellationToken,
    ) -> Result<Vec<Accumulation>> {
        // Siblings stop pulling as soon as one counter fails
        let batch = cancel.child_token();
        let _abort_on_exit = batch.clone().drop_guard();
        let batch = &batch;

        try_join_all(specs.iter().map(|spec| async move {
            let result = match spec {
                CounterSpec::Duration(request) => {
                    self.get_accumulated_duration(request, batch).await
                }
                CounterSpec::Gauge { key, unit } => self.gauge_counter(key, *unit).await,
            };
            if result.is_err() {
                batch.cancel();
            }
            result
        }))
        .await
    }

    /// One page of reconstructed activity intervals
    #[instrument(skip(self, query, cancel))]
    pub async fn get_history(
        &self,
        query: &HistoryQuery,
        page: PageRequest,
        sort: SortSpec<HistoryColumn>,
        cancel: &CancellationToken,
    ) -> Result<HistoryPage> {
        let page = self.clamp_page(page);
        let result = self
            .with_deadline("history", cancel, |token| async move {
                self.history.history(query, page, sort, &token).await
            })
            .await;
        let history = observe("history", result)?;
        debug!(
            count = history.count,
            returned = history.intervals.len(),
            samples_scanned = history.stats.samples_scanned,
            peak_open_keys = history.stats.peak_open_keys,
            "history reconstructed"
        );
        Ok(history)
    }

    /// Keys whose latest value is `true`
    #[instrument(skip(self, filter, cancel))]
    pub async fn get_active_now(
        &self,
        filter: &ActiveFilter,
        page: PageRequest,
        sort: SortSpec<ActiveColumn>,
        cancel: &CancellationToken,
    ) -> Result<Page<Sample>> {
        let page = self.clamp_page(page);
        let result = self
            .with_deadline("active_now", cancel, |token| async move {
                self.latest.active_now(filter, page, sort, &token).await
            })
            .await;
        let active = observe("active_now", result)?;
        debug!(total = active.total, returned = active.items.len(), "active keys listed");
        Ok(active)
    }

    /// Preview of the currently active keys of `kind`
    pub async fn active_preview(&self, kind: SampleKind, cancel: &CancellationToken) -> Result<ActivePreview> {
        let size = self.config.preview_size;
        let result = self
            .with_deadline("active_preview", cancel, |token| async move {
                self.latest.active_preview(kind, size, &token).await
            })
            .await;
        observe("active_preview", result)
    }

    /// Chart series of `key` over `window`
    #[instrument(skip(self, cancel))]
    pub async fn series(&self, key: &str, window: Window, cancel: &CancellationToken) -> Result<Series> {
        let result = self
            .with_deadline("series", cancel, |token| async move {
                self.series.series(key, window, &token).await
            })
            .await;
        let series = observe("series", result)?;
        debug!(points = series.points.len(), "series read");
        Ok(series)
    }

    /// Release the store handle
    pub async fn shutdown(&self) -> Result<()> {
        debug!(store = self.store.name(), "shutting down sample log");
        self.store.shutdown().await
    }

    fn clamp_page(&self, page: PageRequest) -> PageRequest {
        PageRequest {
            limit: page.limit.min(self.config.max_page_limit),
            ..page
        }
    }

    /// Run `op` under the configured scan deadline
    ///
    /// On expiry the operation's token is cancelled and the operation is
    /// still awaited so it can close its cursor; the expiry then surfaces as
    /// `StoreUnavailable` unless the caller cancelled as well.
    async fn with_deadline<T, F, Fut>(
        &self,
        op: &'static str,
        cancel: &CancellationToken,
        run: F,
    ) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = cancel.child_token();
        let work = run(token.clone());
        tokio::pin!(work);
        let deadline = tokio::time::sleep(self.config.scan_timeout);
        tokio::pin!(deadline);

        let mut expired = false;
        let result = loop {
            tokio::select! {
                result = &mut work => break result,
                _ = &mut deadline, if !expired => {
                    expired = true;
                    token.cancel();
                }
            }
        };

        match result {
            Err(StateError::Cancelled) if expired && !cancel.is_cancelled() => {
                Err(StateError::StoreUnavailable(format!(
                    "{} exceeded scan timeout of {:?}",
                    op, self.config.scan_timeout
                )))
            }
            other => other,
        }
    }
}

fn observe<T>(op: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_retryable() {
            warn!(op, error = %e, "sample log call failed");
        } else {
            debug!(op, error = %e, "request rejected");
        }
    }
    result
}
