// Copyright 2026 Polarmap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scheduled collection of named remote data sources.
//!
//! A [`DataCollector`] owns a set of registered [`SourceSpec`]s, each with a
//! fetch function, a refresh interval, and an optional list of declared
//! dependencies. [`DataCollector::update_all`] resolves every source once in
//! dependency order and then arms an independent recurring timer per source.
//! Consumers read cached values with [`DataCollector::get_data`]; reads never
//! block and never trigger a fetch.
//!
//! Fetch outcomes:
//! - success replaces the cached value wholesale and advances the update time
//! - failure keeps the last-known-good value and records the failure
//! - [`Fetched::Deferred`] means "dependency not ready, try again next tick"
//!   and advances nothing
//!
//! At most one fetch per source is in flight at any time: timer ticks that
//! would overlap are skipped, and manual [`DataCollector::update`] calls join
//! the in-flight attempt instead of starting a second one.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Refresh period used when a source does not override it.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration and registration errors raised synchronously by the
/// collector API. These are programming errors and are never retried.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("data source '{0}' is already registered")]
    DuplicateName(String),

    #[error("unknown data source '{0}'")]
    UnknownSource(String),

    #[error("dependency cycle among data sources: {0:?}")]
    DependencyCycle(Vec<String>),
}

/// Failure reported by a source's fetch function.
///
/// A fetch error never overwrites the cached value; the next scheduled tick
/// retries automatically.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or HTTP failure while talking to the provider.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider answered, but the payload could not be decoded.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Successful fetch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched<T> {
    /// A freshly resolved payload; replaces the cached value.
    Value(T),
    /// The source cannot resolve yet (e.g. an upstream source has no data).
    /// Neither the value nor the update time changes.
    Deferred,
}

/// Read-only view of sibling source values, captured just before a fetch.
///
/// Sources express dependencies by reading their upstream's current value
/// from here rather than reaching back into the collector.
pub struct SourceSnapshot<T> {
    values: HashMap<String, T>,
}

impl<T> SourceSnapshot<T> {
    /// Current value of the named source, if it has ever resolved.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&T> {
        self.values.get(name)
    }
}

impl<T> std::fmt::Debug for SourceSnapshot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSnapshot")
            .field("sources", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Input handed to a fetch function for one attempt.
pub struct FetchInput<T> {
    /// The source's own last successfully fetched value, if any.
    pub previous: Option<T>,
    /// Snapshot of every registered source's current value.
    pub sources: SourceSnapshot<T>,
}

impl<T> std::fmt::Debug for FetchInput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchInput")
            .field("has_previous", &self.previous.is_some())
            .field("sources", &self.sources)
            .finish()
    }
}

/// Boxed future returned by a fetch function.
pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<Fetched<T>, FetchError>> + Send>>;

type FetchFn<T> = Box<dyn Fn(FetchInput<T>) -> FetchFuture<T> + Send + Sync>;

/// A record of the most recent fetch failure, kept for observability.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Declaration of a data source: name, fetch function, refresh interval, and
/// declared dependencies.
///
/// ```
/// use std::time::Duration;
/// use polarmap_core::collector::{Fetched, FetchInput, SourceSpec};
///
/// let spec = SourceSpec::new("sun", |input: FetchInput<String>| async move {
///     match input.sources.get("weather") {
///         Some(weather) => Ok(Fetched::Value(format!("sun times near {weather}"))),
///         None => Ok(Fetched::Deferred),
///     }
/// })
/// .with_interval(Duration::from_secs(60))
/// .depends_on("weather");
/// ```
pub struct SourceSpec<T> {
    name: String,
    fetch: FetchFn<T>,
    interval: Duration,
    depends_on: Vec<String>,
}

impl<T> SourceSpec<T> {
    /// Declare a source with the default refresh interval.
    ///
    /// The fetch function receives a [`FetchInput`] per attempt and may
    /// resolve to a value, a deferral, or an error.
    pub fn new<F, Fut>(name: impl Into<String>, fetch: F) -> Self
    where
        F: Fn(FetchInput<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Fetched<T>, FetchError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            fetch: Box::new(move |input| Box::pin(fetch(input))),
            interval: DEFAULT_REFRESH_INTERVAL,
            depends_on: Vec::new(),
        }
    }

    /// Override the refresh interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Declare that this source reads another source's value.
    ///
    /// `update_all` orders the initial fetch pass so that dependencies
    /// resolve first.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }
}

impl<T> std::fmt::Debug for SourceSpec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSpec")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// Mutable per-source state; lock is held only for short copies, never
/// across an await.
struct SourceState<T> {
    value: Option<T>,
    last_updated: Option<DateTime<Utc>>,
    last_failure: Option<FailureRecord>,
    in_flight: bool,
}

struct DataSource<T> {
    name: String,
    depends_on: Vec<String>,
    fetch: FetchFn<T>,
    state: Mutex<SourceState<T>>,
    /// Bumped after every fetch attempt completes; manual updates that find
    /// a fetch already in flight await this instead of fetching again.
    completed_tx: watch::Sender<u64>,
    /// Refresh period, hot-reloadable while the timer runs.
    interval_tx: watch::Sender<Duration>,
}

struct Inner<T> {
    /// Registration order is preserved; it is the tie-break for the
    /// dependency ordering of `update_all`.
    sources: Mutex<Vec<Arc<DataSource<T>>>>,
    cancel: CancellationToken,
    timers_started: AtomicBool,
}

/// Owns the registered sources, drives the initial fetch pass, and schedules
/// recurring per-source refreshes.
pub struct DataCollector<T> {
    inner: Arc<Inner<T>>,
}

impl<T> std::fmt::Debug for DataCollector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.inner.sources.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("DataCollector")
            .field("source_count", &count)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for DataCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> DataCollector<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                sources: Mutex::new(Vec::new()),
                cancel: CancellationToken::new(),
                timers_started: AtomicBool::new(false),
            }),
        }
    }

    /// Register a data source.
    ///
    /// Fails with [`CollectorError::DuplicateName`] if the name is taken.
    ///
    /// Registration must happen before the first [`DataCollector::update_all`]
    /// call: that is what arms the recurring timers. A source registered
    /// afterwards can still be refreshed with [`DataCollector::update`], but
    /// it never gets a timer of its own.
    pub fn register(&self, spec: SourceSpec<T>) -> Result<(), CollectorError> {
        let mut sources = self.inner.sources.lock().expect("source list lock poisoned");

        if sources.iter().any(|s| s.name == spec.name) {
            return Err(CollectorError::DuplicateName(spec.name));
        }

        debug!(
            "registered data source '{}' (interval {:?}, depends on {:?})",
            spec.name, spec.interval, spec.depends_on
        );

        let (completed_tx, _) = watch::channel(0_u64);
        let (interval_tx, _) = watch::channel(spec.interval);

        sources.push(Arc::new(DataSource {
            name: spec.name,
            depends_on: spec.depends_on,
            fetch: spec.fetch,
            state: Mutex::new(SourceState {
                value: None,
                last_updated: None,
                last_failure: None,
                in_flight: false,
            }),
            completed_tx,
            interval_tx,
        }));

        Ok(())
    }

    /// Resolve every registered source once, in dependency order, then arm a
    /// recurring refresh timer per source.
    ///
    /// Sources are awaited strictly one after another, so a source that
    /// declared a dependency sees its upstream's freshly updated value.
    /// Returns once every source has attempted a fetch; individual failures
    /// are recorded, not raised.
    pub async fn update_all(&self) -> Result<(), CollectorError> {
        let ordered = self.fetch_order()?;

        for source in &ordered {
            refresh_or_join(&self.inner, source).await;
        }

        // Timers are armed exactly once, even if update_all is called again.
        if !self.inner.timers_started.swap(true, Ordering::SeqCst) {
            for source in ordered {
                spawn_refresh_timer(Arc::clone(&self.inner), source);
            }
        }

        Ok(())
    }

    /// Trigger an immediate, out-of-band refresh of a single source.
    ///
    /// If a fetch for this source is already in flight the request is
    /// coalesced: this call waits for the in-flight attempt to complete and
    /// does not start a second fetch.
    pub async fn update(&self, name: &str) -> Result<(), CollectorError> {
        let source = self.lookup(name)?;
        refresh_or_join(&self.inner, &source).await;
        Ok(())
    }

    /// Current cached value; `None` before the first successful fetch.
    /// Never blocks and never triggers a fetch.
    pub fn get_data(&self, name: &str) -> Result<Option<T>, CollectorError> {
        let source = self.lookup(name)?;
        let state = source.state.lock().expect("source state lock poisoned");
        Ok(state.value.clone())
    }

    /// Timestamp of the last successful fetch, if any.
    pub fn get_update_time(&self, name: &str) -> Result<Option<DateTime<Utc>>, CollectorError> {
        let source = self.lookup(name)?;
        let state = source.state.lock().expect("source state lock poisoned");
        Ok(state.last_updated)
    }

    /// Most recent fetch failure, if any, for observability.
    pub fn last_failure(&self, name: &str) -> Result<Option<FailureRecord>, CollectorError> {
        let source = self.lookup(name)?;
        let state = source.state.lock().expect("source state lock poisoned");
        Ok(state.last_failure.clone())
    }

    /// Override the refresh period for a source and re-arm its timer.
    ///
    /// An in-flight fetch is left undisturbed; the new period takes effect
    /// from now (next tick in `interval` from this call).
    pub fn set_custom_interval_for(
        &self,
        name: &str,
        interval: Duration,
    ) -> Result<(), CollectorError> {
        let source = self.lookup(name)?;
        source.interval_tx.send_replace(interval);
        Ok(())
    }

    /// Cancel all refresh timers. A fetch still in flight will complete but
    /// its result is discarded.
    pub fn shutdown(&self) {
        info!("shutting down data collector");
        self.inner.cancel.cancel();
    }

    fn lookup(&self, name: &str) -> Result<Arc<DataSource<T>>, CollectorError> {
        let sources = self.inner.sources.lock().expect("source list lock poisoned");
        sources
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| CollectorError::UnknownSource(name.to_string()))
    }

    /// Order sources so that declared dependencies come first (Kahn-style,
    /// stable by registration order among ready sources).
    fn fetch_order(&self) -> Result<Vec<Arc<DataSource<T>>>, CollectorError> {
        let sources = self.inner.sources.lock().expect("source list lock poisoned");

        for source in sources.iter() {
            for dep in &source.depends_on {
                if !sources.iter().any(|s| &s.name == dep) {
                    return Err(CollectorError::UnknownSource(dep.clone()));
                }
            }
        }

        let mut remaining: Vec<Arc<DataSource<T>>> = sources.clone();
        drop(sources);

        let mut ordered = Vec::with_capacity(remaining.len());
        let mut resolved: HashSet<String> = HashSet::new();

        while !remaining.is_empty() {
            let mut progressed = false;
            let mut i = 0;
            while i < remaining.len() {
                if remaining[i].depends_on.iter().all(|d| resolved.contains(d)) {
                    let source = remaining.remove(i);
                    resolved.insert(source.name.clone());
                    ordered.push(source);
                    progressed = true;
                } else {
                    i += 1;
                }
            }
            if !progressed {
                return Err(CollectorError::DependencyCycle(
                    remaining.iter().map(|s| s.name.clone()).collect(),
                ));
            }
        }

        Ok(ordered)
    }
}

impl<T> Drop for DataCollector<T> {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

/// Claim the source for a fetch, or join the fetch already in flight.
///
/// The completion channel is subscribed *before* the in-flight check: if the
/// running fetch finishes between the check and the wait, the bump is still
/// observed and the join cannot hang.
async fn refresh_or_join<T: Clone + Send + Sync + 'static>(
    inner: &Arc<Inner<T>>,
    source: &Arc<DataSource<T>>,
) {
    let mut completed_rx = source.completed_tx.subscribe();

    let claimed = {
        let mut state = source.state.lock().expect("source state lock poisoned");
        if state.in_flight {
            false
        } else {
            state.in_flight = true;
            true
        }
    };

    if claimed {
        run_fetch(inner, source).await;
    } else {
        debug!("coalescing refresh of '{}' into in-flight fetch", source.name);
        let _ = completed_rx.changed().await;
    }
}

/// Claim the source for a fetch, or skip entirely (timer-tick behavior).
async fn try_refresh<T: Clone + Send + Sync + 'static>(
    inner: &Arc<Inner<T>>,
    source: &Arc<DataSource<T>>,
) {
    let claimed = {
        let mut state = source.state.lock().expect("source state lock poisoned");
        if state.in_flight {
            false
        } else {
            state.in_flight = true;
            true
        }
    };

    if claimed {
        run_fetch(inner, source).await;
    } else {
        debug!("skipping timer tick for '{}': fetch already in flight", source.name);
    }
}

/// Execute one fetch attempt for a source whose `in_flight` flag is already
/// claimed, and publish the outcome.
async fn run_fetch<T: Clone + Send + Sync + 'static>(
    inner: &Arc<Inner<T>>,
    source: &Arc<DataSource<T>>,
) {
    let input = FetchInput {
        previous: {
            let state = source.state.lock().expect("source state lock poisoned");
            state.value.clone()
        },
        sources: snapshot(inner),
    };

    let result = (source.fetch)(input).await;

    {
        let mut state = source.state.lock().expect("source state lock poisoned");

        if inner.cancel.is_cancelled() {
            // The collector was torn down while this fetch was running.
            debug!("discarding fetch result for '{}' after shutdown", source.name);
        } else {
            match result {
                Ok(Fetched::Value(value)) => {
                    state.value = Some(value);
                    state.last_updated = Some(Utc::now());
                    state.last_failure = None;
                    debug!("source '{}' refreshed", source.name);
                }
                Ok(Fetched::Deferred) => {
                    debug!("source '{}' deferred: dependency not ready", source.name);
                }
                Err(e) => {
                    warn!("fetch for '{}' failed, keeping last-known value: {}", source.name, e);
                    state.last_failure = Some(FailureRecord {
                        at: Utc::now(),
                        message: e.to_string(),
                    });
                }
            }
        }

        state.in_flight = false;
    }

    source.completed_tx.send_modify(|attempts| *attempts += 1);
}

fn snapshot<T: Clone>(inner: &Inner<T>) -> SourceSnapshot<T> {
    let sources = inner.sources.lock().expect("source list lock poisoned");
    let mut values = HashMap::with_capacity(sources.len());
    for source in sources.iter() {
        let state = source.state.lock().expect("source state lock poisoned");
        if let Some(value) = state.value.clone() {
            values.insert(source.name.clone(), value);
        }
    }
    SourceSnapshot { values }
}

/// Arm the recurring refresh timer for one source.
///
/// The first tick fires one full period after arming; the initial fetch pass
/// has already run by then. A period change on the watch channel rebuilds
/// the ticker without firing an immediate tick.
fn spawn_refresh_timer<T: Clone + Send + Sync + 'static>(
    inner: Arc<Inner<T>>,
    source: Arc<DataSource<T>>,
) {
    tokio::spawn(async move {
        let mut interval_rx = source.interval_tx.subscribe();
        let mut period = *interval_rx.borrow_and_update();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    try_refresh(&inner, &source).await;
                }

                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    period = *interval_rx.borrow_and_update();
                    info!("re-arming refresh timer for '{}' at {:?}", source.name, period);
                    ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                }

                () = inner.cancel.cancelled() => {
                    debug!("refresh timer for '{}' stopped", source.name);
                    return;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{advance, sleep};

    fn constant_source(name: &str, value: i32) -> SourceSpec<i32> {
        SourceSpec::new(name, move |_input| async move { Ok(Fetched::Value(value)) })
    }

    fn counting_source(name: &str, counter: Arc<AtomicUsize>) -> SourceSpec<i32> {
        SourceSpec::new(name, move |_input| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) as i32;
                Ok(Fetched::Value(n + 1))
            }
        })
    }

    async fn yield_to_timers() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let collector: DataCollector<i32> = DataCollector::new();
        collector.register(constant_source("weather", 1)).unwrap();

        let err = collector.register(constant_source("weather", 2)).unwrap_err();
        assert!(matches!(err, CollectorError::DuplicateName(name) if name == "weather"));
    }

    #[tokio::test]
    async fn test_unknown_source_rejected() {
        let collector: DataCollector<i32> = DataCollector::new();

        assert!(matches!(
            collector.get_data("nope"),
            Err(CollectorError::UnknownSource(_))
        ));
        assert!(matches!(
            collector.update("nope").await,
            Err(CollectorError::UnknownSource(_))
        ));
    }

    #[tokio::test]
    async fn test_get_data_before_first_fetch_is_none() {
        let collector: DataCollector<i32> = DataCollector::new();
        collector.register(constant_source("weather", 1)).unwrap();

        assert_eq!(collector.get_data("weather").unwrap(), None);
        assert_eq!(collector.get_update_time("weather").unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_all_resolves_dependencies_first() {
        let collector: DataCollector<i32> = DataCollector::new();

        // Registered before its dependency on purpose; declared order wins.
        collector
            .register(
                SourceSpec::new("sun", |input: FetchInput<i32>| async move {
                    match input.sources.get("weather") {
                        Some(weather) => Ok(Fetched::Value(weather + 1)),
                        None => Ok(Fetched::Deferred),
                    }
                })
                .depends_on("weather"),
            )
            .unwrap();
        collector.register(constant_source("weather", 10)).unwrap();

        collector.update_all().await.unwrap();

        assert_eq!(collector.get_data("weather").unwrap(), Some(10));
        assert_eq!(collector.get_data("sun").unwrap(), Some(11));
    }

    #[tokio::test]
    async fn test_undeclared_dependency_name_rejected() {
        let collector: DataCollector<i32> = DataCollector::new();
        collector
            .register(constant_source("sun", 1).depends_on("weather"))
            .unwrap();

        let err = collector.update_all().await.unwrap_err();
        assert!(matches!(err, CollectorError::UnknownSource(name) if name == "weather"));
    }

    #[tokio::test]
    async fn test_dependency_cycle_rejected() {
        let collector: DataCollector<i32> = DataCollector::new();
        collector.register(constant_source("a", 1).depends_on("b")).unwrap();
        collector.register(constant_source("b", 2).depends_on("a")).unwrap();

        let err = collector.update_all().await.unwrap_err();
        assert!(matches!(err, CollectorError::DependencyCycle(names) if names.len() == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_updates_coalesce_into_one_fetch() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetches_clone = Arc::clone(&fetches);

        let collector: DataCollector<i32> = DataCollector::new();
        collector
            .register(SourceSpec::new("slow", move |_input| {
                let fetches = Arc::clone(&fetches_clone);
                async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(50)).await;
                    Ok(Fetched::Value(7))
                }
            }))
            .unwrap();

        let (a, b) = tokio::join!(collector.update("slow"), collector.update("slow"));
        a.unwrap();
        b.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(collector.get_data("slow").unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_failure_keeps_stale_value_and_update_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let collector: DataCollector<i32> = DataCollector::new();
        collector
            .register(SourceSpec::new("flaky", move |_input| {
                let calls = Arc::clone(&calls_clone);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Ok(Fetched::Value(5))
                    } else {
                        Err(FetchError::Transport("connection refused".to_string()))
                    }
                }
            }))
            .unwrap();

        collector.update("flaky").await.unwrap();
        let value_before = collector.get_data("flaky").unwrap();
        let time_before = collector.get_update_time("flaky").unwrap();
        assert_eq!(value_before, Some(5));
        assert!(time_before.is_some());

        collector.update("flaky").await.unwrap();

        assert_eq!(collector.get_data("flaky").unwrap(), value_before);
        assert_eq!(collector.get_update_time("flaky").unwrap(), time_before);

        let failure = collector.last_failure("flaky").unwrap().unwrap();
        assert!(failure.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_deferral_advances_nothing_until_upstream_ready() {
        let weather_calls = Arc::new(AtomicUsize::new(0));
        let weather_calls_clone = Arc::clone(&weather_calls);
        let sun_real_fetches = Arc::new(AtomicUsize::new(0));
        let sun_real_fetches_clone = Arc::clone(&sun_real_fetches);

        let collector: DataCollector<i32> = DataCollector::new();
        // Weather fails on its first attempt, succeeds afterwards.
        collector
            .register(SourceSpec::new("weather", move |_input| {
                let calls = Arc::clone(&weather_calls_clone);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(FetchError::Transport("timeout".to_string()))
                    } else {
                        Ok(Fetched::Value(20))
                    }
                }
            }))
            .unwrap();
        collector
            .register(
                SourceSpec::new("sun", move |input: FetchInput<i32>| {
                    let real = Arc::clone(&sun_real_fetches_clone);
                    async move {
                        match input.sources.get("weather") {
                            Some(weather) => {
                                real.fetch_add(1, Ordering::SeqCst);
                                Ok(Fetched::Value(weather + 1))
                            }
                            None => Ok(Fetched::Deferred),
                        }
                    }
                })
                .depends_on("weather"),
            )
            .unwrap();

        collector.update_all().await.unwrap();

        // First pass: weather failed, sun deferred.
        assert_eq!(collector.get_data("sun").unwrap(), None);
        assert_eq!(collector.get_update_time("sun").unwrap(), None);
        assert_eq!(sun_real_fetches.load(Ordering::SeqCst), 0);

        collector.update("weather").await.unwrap();
        collector.update("sun").await.unwrap();

        assert_eq!(collector.get_data("sun").unwrap(), Some(21));
        assert_eq!(sun_real_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_refreshes_on_interval() {
        let fetches = Arc::new(AtomicUsize::new(0));

        let collector: DataCollector<i32> = DataCollector::new();
        collector
            .register(
                counting_source("ticker", Arc::clone(&fetches))
                    .with_interval(Duration::from_secs(5)),
            )
            .unwrap();

        collector.update_all().await.unwrap();
        yield_to_timers().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        advance(Duration::from_secs(5)).await;
        yield_to_timers().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        advance(Duration::from_secs(5)).await;
        yield_to_timers().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_registered_after_start_has_no_timer() {
        let fetches = Arc::new(AtomicUsize::new(0));

        let collector: DataCollector<i32> = DataCollector::new();
        collector.register(constant_source("weather", 1)).unwrap();
        collector.update_all().await.unwrap();

        collector
            .register(
                counting_source("late", Arc::clone(&fetches))
                    .with_interval(Duration::from_secs(5)),
            )
            .unwrap();

        advance(Duration::from_secs(20)).await;
        yield_to_timers().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 0);

        // Manual refreshes still work for a late registration.
        collector.update("late").await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(collector.get_data("late").unwrap(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_interval_rearms_timer() {
        let fetches = Arc::new(AtomicUsize::new(0));

        let collector: DataCollector<i32> = DataCollector::new();
        collector
            .register(
                counting_source("ticker", Arc::clone(&fetches))
                    .with_interval(Duration::from_secs(60)),
            )
            .unwrap();

        collector.update_all().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        collector
            .set_custom_interval_for("ticker", Duration::from_secs(1))
            .unwrap();
        yield_to_timers().await;
        // Re-arming alone must not fire an immediate tick.
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        advance(Duration::from_secs(1)).await;
        yield_to_timers().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_tick_skipped_while_fetch_in_flight() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetches_clone = Arc::clone(&fetches);

        let collector: DataCollector<i32> = DataCollector::new();
        collector
            .register(
                SourceSpec::new("slow", move |_input| {
                    let fetches = Arc::clone(&fetches_clone);
                    async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_secs(8)).await;
                        Ok(Fetched::Value(1))
                    }
                })
                .with_interval(Duration::from_secs(5)),
            )
            .unwrap();

        collector.update_all().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // Kick off a manual refresh that stays in flight across a timer tick.
        let manual = tokio::spawn({
            let inner = Arc::clone(&collector.inner);
            async move {
                let source = {
                    let sources = inner.sources.lock().unwrap();
                    Arc::clone(&sources[0])
                };
                refresh_or_join(&inner, &source).await;
            }
        });
        yield_to_timers().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        // Timer tick at t+5s lands inside the 8s fetch and must be skipped.
        advance(Duration::from_secs(5)).await;
        yield_to_timers().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);

        manual.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_late_fetch_result() {
        let collector: DataCollector<i32> = DataCollector::new();
        collector
            .register(SourceSpec::new("slow", |_input| async {
                sleep(Duration::from_secs(10)).await;
                Ok(Fetched::Value(99))
            }))
            .unwrap();

        let (update_result, ()) = tokio::join!(collector.update("slow"), async {
            sleep(Duration::from_secs(1)).await;
            collector.shutdown();
        });
        update_result.unwrap();

        // The fetch completed after teardown; its result was dropped.
        assert_eq!(collector.get_data("slow").unwrap(), None);
        assert_eq!(collector.get_update_time("slow").unwrap(), None);
    }
}
