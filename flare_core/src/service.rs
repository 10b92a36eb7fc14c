/**
 * The error reporting service. Owns the queues, the dedup cache, the
 * provider chain and the background worker.
 *
 * Lifecycle:
 * 1. Build one service at start-up (`ErrorReportingService::new()` or the
 *    builder) and hand clones of it to whoever reports errors.
 * 2. `initialize(patch)` resolves the configuration, installs the default
 *    providers if none were registered, starts the batch timer and
 *    re-queues reports persisted during a previous offline period.
 * 3. `report_error` samples, deduplicates and enqueues. Reaching the batch
 *    size wakes the worker; otherwise the timer picks the report up.
 * 4. `flush()` drains on the calling thread; the `Guard` does this on drop.
 *
 * Cloning is cheap and every clone talks to the same state.
 *
 * Lock order: dispatch → state → config. The providers and worker locks
 * are only held long enough to clone what they guard; no lock except
 * `dispatch` is held while a provider runs.
 */
use std::cell::Cell;
use std::cmp::Reverse;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError, Weak};
use std::thread;

use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigPatch, ReportingConfig};
use crate::dedup::DedupCache;
use crate::error::Result;
use crate::protocol::constants::OFFLINE_STORAGE_KEY;
use crate::protocol::types::ErrorReport;
use crate::providers::{default_providers, ReportingProvider};
use crate::queue::ReportQueues;
use crate::random::{MutexRng, RandomSource};
use crate::storage::JsonStore;
use crate::transport::{Trigger, Worker, WorkerMsg};

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

/**
 * What `report_error` did with a report.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Appended to the pending queue.
    Queued,

    /// Dropped by the sampling draw.
    Sampled,

    /// Dropped because an identical report is inside the dedup window.
    Duplicate,
}

/**
 * Result of dispatching one batch.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The pending queue was empty.
    Empty,

    /// Offline: the batch was moved to the offline queue untouched.
    Deferred(usize),

    /// `provider` accepted `accepted` of the `size` reports; lower
    /// priority providers were not consulted.
    Delivered {
        provider: String,
        accepted: usize,
        size: usize,
    },

    /// No enabled provider accepted any report; the batch is gone.
    Dropped(usize),
}

/**
 * Totals over the batches processed by one `flush()`.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub batches: usize,
    /// Reports accepted by the provider that took their batch.
    pub accepted: usize,
    pub deferred: usize,
    pub dropped: usize,
}

impl FlushSummary {
    fn record(&mut self, outcome: &BatchOutcome) {
        match outcome {
            BatchOutcome::Empty => return,
            BatchOutcome::Deferred(n) => self.deferred += n,
            BatchOutcome::Delivered { accepted, .. } => self.accepted += accepted,
            BatchOutcome::Dropped(n) => self.dropped += n,
        }
        self.batches += 1;
    }
}

/**
 * Snapshot returned by `get_stats()`.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingStats {
    pub queue_size: usize,
    pub offline_queue_size: usize,
    pub providers: Vec<ProviderStat>,
    pub is_online: bool,
    pub deduplication_cache_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStat {
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct State {
    queues: ReportQueues,
    dedup: DedupCache,
    online: bool,
}

struct Shared {
    config: RwLock<ReportingConfig>,
    providers: RwLock<Vec<Arc<dyn ReportingProvider>>>,
    state: Mutex<State>,
    /// Held for the whole of a dispatch; serializes timer, batch-full and
    /// manual flushes.
    dispatch: Mutex<()>,
    worker: Mutex<Option<Worker>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

/// Poisoning only means a provider panicked mid-dispatch; the data is
/// still consistent because reports are moved, not edited.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/**
 * Builds an `ErrorReportingService` with non-default collaborators.
 *
 * # Example
 * ```ignore
 * let service = ErrorReportingService::builder()
 *     .online(false)
 *     .provider(Arc::new(MyProvider))
 *     .build();
 * ```
 */
pub struct ServiceBuilder {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    online: bool,
    providers: Vec<Arc<dyn ReportingProvider>>,
}

impl ServiceBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Initial connectivity, as reported by the environment at start-up.
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ReportingProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> ErrorReportingService {
        let mut providers = self.providers;
        providers.sort_by_key(|p| Reverse(p.priority()));

        ErrorReportingService {
            shared: Arc::new(Shared {
                config: RwLock::new(ReportingConfig::default()),
                providers: RwLock::new(providers),
                state: Mutex::new(State {
                    queues: ReportQueues::new(),
                    dedup: DedupCache::new(),
                    online: self.online,
                }),
                dispatch: Mutex::new(()),
                worker: Mutex::new(None),
                clock: self.clock,
                random: self.random,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorReportingService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ErrorReportingService {
    shared: Arc<Shared>,
}

impl Default for ErrorReportingService {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReportingService {
    /// A service with the system clock, a seeded RNG, online, no providers.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ServiceBuilder {
        ServiceBuilder {
            clock: Arc::new(SystemClock),
            random: Arc::new(MutexRng::new()),
            online: true,
            providers: Vec::new(),
        }
    }

    /**
     * Resolves `patch` over the defaults and starts the service.
     *
     * # Steps
     * 1. Merge and validate the configuration.
     * 2. Install the default providers if none are registered.
     * 3. Start (or replace) the batch timer.
     * 4. Re-queue reports persisted during a previous offline period and
     *    ask the worker to flush them.
     *
     * Calling it again re-resolves the configuration from the defaults and
     * replaces the timer; registered providers are kept.
     */
    pub fn initialize(&self, patch: &ConfigPatch) -> Result<()> {
        let config = ReportingConfig::default().merge(patch);
        config.validate()?;

        *self.shared.config.write().unwrap_or_else(|p| p.into_inner()) = config.clone();

        {
            let mut providers = self.shared.providers.write().unwrap_or_else(|p| p.into_inner());
            if providers.is_empty() {
                *providers = default_providers(&config);
                providers.sort_by_key(|p| Reverse(p.priority()));
            }
        }

        self.start_worker(&config)?;

        let restored = if config.enable_offline_support {
            self.restore_persisted(&config)
        } else {
            0
        };

        tracing::info!(
            batch_size = config.batch_size,
            batch_interval_ms = config.batch_interval.as_millis() as u64,
            environment = %config.environment,
            restored,
            "Error reporting initialized"
        );

        if restored > 0 {
            self.request(WorkerMsg::Flush);
        }

        Ok(())
    }

    /**
     * Samples, deduplicates and enqueues `report`.
     *
     * Never blocks on providers. When the pending queue reaches the batch
     * size the worker is asked to dispatch a batch right away; before
     * `initialize` there is no worker and the report simply waits.
     */
    pub fn report_error(&self, report: ErrorReport) -> Admission {
        let (enable_sampling, sampling_rate, window, batch_size) = {
            let config = self.shared.config.read().unwrap_or_else(|p| p.into_inner());
            (
                config.enable_sampling,
                config.sampling_rate,
                config.deduplication_window,
                config.batch_size,
            )
        };

        if enable_sampling && self.shared.random.next_f64() >= sampling_rate {
            return Admission::Sampled;
        }

        let key = report.dedup_key();
        let now = self.shared.clock.now_epoch_ms();

        let pending = {
            let mut state = lock(&self.shared.state);
            if !state.dedup.admit(&key, now, window) {
                tracing::trace!(key = %key, "Duplicate report suppressed");
                return Admission::Duplicate;
            }
            state.queues.push(report)
        };

        if pending >= batch_size {
            self.request(WorkerMsg::BatchFull);
        }

        Admission::Queued
    }

    /**
     * Registers a provider and re-sorts the chain by descending priority.
     *
     * A provider with the same name is replaced. Equal priorities keep
     * their registration order.
     */
    pub fn add_provider(&self, provider: Arc<dyn ReportingProvider>) {
        let mut providers = self.shared.providers.write().unwrap_or_else(|p| p.into_inner());
        providers.retain(|p| p.name() != provider.name());
        providers.push(provider);
        providers.sort_by_key(|p| Reverse(p.priority()));
    }

    /// Removes the provider called `name`. Returns whether one was removed.
    pub fn remove_provider(&self, name: &str) -> bool {
        let mut providers = self.shared.providers.write().unwrap_or_else(|p| p.into_inner());
        let before = providers.len();
        providers.retain(|p| p.name() != name);
        providers.len() != before
    }

    /**
     * Dispatches one batch from the front of the pending queue on the
     * calling thread, waiting for any dispatch already in flight.
     */
    pub fn process_batch(&self) -> BatchOutcome {
        self.shared.process_batch()
    }

    /**
     * Drains the pending queue now, batch by batch, on the calling thread.
     *
     * Only the batches present when the call starts are processed, so a
     * steady stream of new reports cannot keep it running forever.
     */
    pub fn flush(&self) -> FlushSummary {
        self.shared.flush()
    }

    /**
     * Read-only snapshot of queue sizes, providers and connectivity.
     */
    pub fn get_stats(&self) -> ReportingStats {
        let providers = self
            .providers()
            .iter()
            .map(|p| ProviderStat {
                name: p.name().to_string(),
                enabled: p.enabled(),
                priority: p.priority(),
            })
            .collect();

        let state = lock(&self.shared.state);
        ReportingStats {
            queue_size: state.queues.pending_len(),
            offline_queue_size: state.queues.offline_len(),
            providers,
            is_online: state.online,
            deduplication_cache_size: state.dedup.len(),
        }
    }

    /// Current resolved configuration.
    pub fn config(&self) -> ReportingConfig {
        self.shared.config.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /**
     * Merges `patch` over the current configuration.
     *
     * A changed batch interval restarts the running timer with the new
     * period; the old ticker is replaced, never duplicated.
     */
    pub fn update_config(&self, patch: &ConfigPatch) -> Result<()> {
        let (old_interval, new_interval) = {
            let mut config = self.shared.config.write().unwrap_or_else(|p| p.into_inner());
            let merged = config.merge(patch);
            merged.validate()?;
            let old = config.batch_interval;
            *config = merged;
            (old, config.batch_interval)
        };

        if old_interval != new_interval {
            if let Some(worker) = self.worker() {
                worker.reschedule(new_interval);
            }
        }

        Ok(())
    }

    /**
     * Empties both queues and the dedup cache and stops the timer.
     *
     * The persisted offline mirror is removed as well.
     */
    pub fn clear_cache(&self) {
        self.shutdown();

        let mut state = lock(&self.shared.state);
        state.queues.clear();
        state.dedup.clear();
        self.shared.persist_offline(&state);
    }

    /**
     * Feeds a connectivity signal from the environment.
     *
     * Going offline changes nothing in the queues. Coming back online moves
     * every offline report to the front of the pending queue (in order,
     * ahead of anything reported while offline) and asks for a flush.
     */
    pub fn set_online(&self, online: bool) {
        let restored = {
            let mut state = lock(&self.shared.state);
            let was_online = std::mem::replace(&mut state.online, online);
            match (was_online, online) {
                (false, true) => {}
                (true, false) => {
                    tracing::info!("Connectivity lost; batches will be held offline");
                    return;
                }
                _ => return,
            }
            let restored = state.queues.restore_offline();
            self.shared.persist_offline(&state);
            restored
        };

        tracing::info!(restored, "Connectivity restored; flushing offline reports");
        self.request(WorkerMsg::Flush);
    }

    pub fn is_online(&self) -> bool {
        lock(&self.shared.state).online
    }

    /// Stops the batch timer. Queued reports stay where they are.
    pub fn shutdown(&self) {
        let worker = lock(&self.shared.worker).take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    /// Whether a batch timer is currently running.
    pub fn is_running(&self) -> bool {
        lock(&self.shared.worker).is_some()
    }

    /// Providers in dispatch order.
    pub fn providers(&self) -> Vec<Arc<dyn ReportingProvider>> {
        self.shared.providers.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn start_worker(&self, config: &ReportingConfig) -> Result<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let worker = Worker::spawn(config.batch_interval, move |trigger| {
            if let Some(shared) = weak.upgrade() {
                shared.on_trigger(trigger);
            }
        })?;

        let old = lock(&self.shared.worker).replace(worker);
        if let Some(old) = old {
            old.stop();
        }
        Ok(())
    }

    /// A handle to the running worker, taken without holding the lock.
    fn worker(&self) -> Option<Worker> {
        lock(&self.shared.worker).clone()
    }

    fn request(&self, msg: WorkerMsg) {
        if let Some(worker) = self.worker() {
            worker.request(msg);
        }
    }

    /// Moves the persisted offline mirror to the front of the pending queue.
    fn restore_persisted(&self, config: &ReportingConfig) -> usize {
        let store = JsonStore::new(&config.storage_dir);
        let persisted = match store.read_list(OFFLINE_STORAGE_KEY) {
            Ok(reports) => reports,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read persisted offline reports");
                return 0;
            }
        };

        let mut state = lock(&self.shared.state);
        /* Reports still held in memory are already part of the mirror. */
        let restored: Vec<ErrorReport> = persisted
            .into_iter()
            .filter(|r| {
                !state.queues.offline_reports().any(|o| o.id == r.id)
                    && !state.queues.pending_reports().any(|p| p.id == r.id)
            })
            .collect();
        let count = restored.len();
        state.queues.prepend(restored);
        self.shared.persist_offline(&state);
        count
    }
}

impl Shared {
    fn on_trigger(&self, trigger: Trigger) {
        match trigger {
            Trigger::Timer => match self.dispatch.try_lock() {
                Ok(_guard) => {
                    self.dispatch_one();
                }
                Err(TryLockError::Poisoned(p)) => {
                    let _guard = p.into_inner();
                    self.dispatch_one();
                }
                Err(TryLockError::WouldBlock) => {
                    tracing::trace!("Dispatch in flight; skipping timer tick");
                }
            },
            Trigger::BatchFull => self.dispatch_full_batches(),
            Trigger::Flush => {
                self.flush();
            }
        }
    }

    fn batch_size(&self) -> usize {
        self.config.read().unwrap_or_else(|p| p.into_inner()).batch_size
    }

    fn pending_len(&self) -> usize {
        lock(&self.state).queues.pending_len()
    }

    fn process_batch(&self) -> BatchOutcome {
        let _guard = lock(&self.dispatch);
        self.dispatch_one()
    }

    /**
     * Dispatches batches while a full one is waiting.
     *
     * Wake-ups pile up during bursts; by the time one is handled the batch
     * it announced may already be gone, so the threshold is checked again
     * under the dispatch lock and a partial batch is left for the timer.
     */
    fn dispatch_full_batches(&self) {
        let _guard = lock(&self.dispatch);
        while self.pending_len() >= self.batch_size() {
            if self.dispatch_one() == BatchOutcome::Empty {
                break;
            }
        }
    }

    fn flush(&self) -> FlushSummary {
        let _guard = lock(&self.dispatch);

        let batches = self.pending_len().div_ceil(self.batch_size());

        let mut summary = FlushSummary::default();
        for _ in 0..batches {
            let outcome = self.dispatch_one();
            if outcome == BatchOutcome::Empty {
                break;
            }
            summary.record(&outcome);
        }

        if summary.batches > 0 {
            tracing::debug!(
                batches = summary.batches,
                accepted = summary.accepted,
                deferred = summary.deferred,
                dropped = summary.dropped,
                "Flush complete"
            );
        }
        summary
    }

    /**
     * Takes one batch and runs it down the provider chain.
     *
     * Caller must hold `dispatch`.
     */
    fn dispatch_one(&self) -> BatchOutcome {
        let batch_size = self.batch_size();

        let batch = {
            let mut state = lock(&self.state);
            let batch = state.queues.take_batch(batch_size);
            if batch.is_empty() {
                return BatchOutcome::Empty;
            }

            /*
             * Checked under the same lock as the drain so a concurrent
             * `set_online(true)` either sees this batch in the offline
             * queue or happens before we read the flag.
             */
            if !state.online {
                let size = batch.len();
                state.queues.defer_offline(batch);
                self.persist_offline(&state);
                tracing::debug!(size, "Offline; batch deferred");
                return BatchOutcome::Deferred(size);
            }
            batch
        };

        let providers = self.providers.read().unwrap_or_else(|p| p.into_inner()).clone();

        for provider in providers.iter().filter(|p| p.enabled()) {
            let accepted = fan_out(provider.as_ref(), &batch);
            if accepted > 0 {
                tracing::debug!(
                    provider = provider.name(),
                    accepted,
                    size = batch.len(),
                    "Batch delivered"
                );
                return BatchOutcome::Delivered {
                    provider: provider.name().to_string(),
                    accepted,
                    size: batch.len(),
                };
            }
        }

        tracing::debug!(size = batch.len(), "No provider accepted the batch; dropping it");
        BatchOutcome::Dropped(batch.len())
    }

    /**
     * Mirrors the offline queue to disk when offline support is on.
     *
     * Caller holds the state lock, which keeps writes in queue order.
     */
    fn persist_offline(&self, state: &State) {
        let config = self.config.read().unwrap_or_else(|p| p.into_inner());
        if !config.enable_offline_support {
            return;
        }

        let store = JsonStore::new(&config.storage_dir);
        let result = if state.queues.offline_len() == 0 {
            store.remove(OFFLINE_STORAGE_KEY)
        } else {
            let snapshot: Vec<ErrorReport> = state.queues.offline_reports().cloned().collect();
            store.write_list(OFFLINE_STORAGE_KEY, &snapshot)
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Could not persist offline queue");
        }
    }
}

// ---------------------------------------------------------------------------
// Provider fan-out
// ---------------------------------------------------------------------------

/// Threads calling one provider at the same time, at most.
const MAX_FAN_OUT: usize = 8;

thread_local! {
    static IN_PROVIDER: Cell<bool> = const { Cell::new(false) };
}

/**
 * Whether the current thread is inside a `ReportingProvider::report` call
 * made by a dispatch.
 *
 * The panic hook uses it to avoid reporting a provider's own panic back
 * into the provider chain.
 */
pub fn in_provider_call() -> bool {
    IN_PROVIDER.with(Cell::get)
}

/**
 * Hands every report of `batch` to `provider` concurrently and counts the
 * acceptances once all calls have returned.
 *
 * At most `MAX_FAN_OUT` scoped threads share the batch, each taking the
 * next unclaimed report until none are left.
 */
fn fan_out(provider: &dyn ReportingProvider, batch: &[ErrorReport]) -> usize {
    if let [only] = batch {
        return call_provider(provider, only) as usize;
    }

    let next = AtomicUsize::new(0);
    let accepted = AtomicUsize::new(0);
    let drain = || {
        while let Some(report) = batch.get(next.fetch_add(1, Ordering::Relaxed)) {
            if call_provider(provider, report) {
                accepted.fetch_add(1, Ordering::Relaxed);
            }
        }
    };

    thread::scope(|scope| {
        let mut spawned = 0;
        for _ in 0..batch.len().min(MAX_FAN_OUT) {
            let lane = thread::Builder::new()
                .name("flare-dispatch".into())
                .spawn_scoped(scope, &drain);
            if lane.is_ok() {
                spawned += 1;
            }
        }
        /* Could not spawn anything: run it inline instead. */
        if spawned == 0 {
            drain();
        }
    });

    accepted.into_inner()
}

/// A panicking provider counts as a refusal.
fn call_provider(provider: &dyn ReportingProvider, report: &ErrorReport) -> bool {
    IN_PROVIDER.with(|flag| flag.set(true));
    let result = catch_unwind(AssertUnwindSafe(|| provider.report(report)));
    IN_PROVIDER.with(|flag| flag.set(false));

    result.unwrap_or_else(|_| {
        tracing::warn!(provider = provider.name(), report_id = %report.id, "Provider panicked");
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::random::FixedRandom;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        name: &'static str,
        priority: i32,
        accept: bool,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(name: &'static str, priority: i32, accept: bool) -> Arc<Self> {
            Arc::new(Self { name, priority, accept, calls: AtomicUsize::new(0) })
        }
    }

    impl ReportingProvider for Counting {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn report(&self, _report: &ErrorReport) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.accept
        }
    }

    struct Panicking;

    impl ReportingProvider for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn priority(&self) -> i32 {
            10
        }
        fn report(&self, _report: &ErrorReport) -> bool {
            panic!("provider blew up");
        }
    }

    fn report(message: &str) -> ErrorReport {
        ErrorReport::builder(message).category("test").build()
    }

    #[test]
    fn test_fan_out_counts_acceptances() {
        let provider = Counting::new("c", 1, true);
        let batch: Vec<_> = (0..5).map(|i| report(&format!("m{i}"))).collect();
        assert_eq!(fan_out(provider.as_ref(), &batch), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_panicking_provider_falls_through() {
        let fallback = Counting::new("fallback", 1, true);
        let service = ErrorReportingService::builder()
            .provider(Arc::new(Panicking))
            .provider(fallback.clone())
            .build();

        service.report_error(report("a"));
        service.report_error(report("b"));

        let outcome = service.process_batch();
        assert_eq!(
            outcome,
            BatchOutcome::Delivered { provider: "fallback".into(), accepted: 2, size: 2 }
        );
    }

    #[test]
    fn test_sampling_draw_above_rate_drops() {
        let service = ErrorReportingService::builder()
            .random(Arc::new(FixedRandom(0.75)))
            .build();
        service.shared.config.write().unwrap().enable_sampling = true;
        service.shared.config.write().unwrap().sampling_rate = 0.5;

        assert_eq!(service.report_error(report("a")), Admission::Sampled);
        assert_eq!(service.get_stats().queue_size, 0);

        service.shared.config.write().unwrap().sampling_rate = 0.9;
        assert_eq!(service.report_error(report("a")), Admission::Queued);
    }

    #[test]
    fn test_sampling_disabled_ignores_draw() {
        let service = ErrorReportingService::builder()
            .random(Arc::new(FixedRandom(0.99)))
            .build();
        service.shared.config.write().unwrap().sampling_rate = 0.0;
        assert_eq!(service.report_error(report("a")), Admission::Queued);
    }

    #[test]
    fn test_dedup_uses_injected_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let service = ErrorReportingService::builder().clock(clock.clone()).build();

        assert_eq!(service.report_error(report("same")), Admission::Queued);
        clock.advance(Duration::from_secs(30));
        assert_eq!(service.report_error(report("same")), Admission::Duplicate);
        clock.advance(Duration::from_secs(31));
        assert_eq!(service.report_error(report("same")), Admission::Queued);
        assert_eq!(service.get_stats().queue_size, 2);
    }

    #[test]
    fn test_flush_summary_counts_batches() {
        let sink = Counting::new("sink", 1, true);
        let service = ErrorReportingService::builder().provider(sink.clone()).build();
        service.shared.config.write().unwrap().batch_size = 2;

        for i in 0..5 {
            service.report_error(report(&format!("m{i}")));
        }
        /* No worker yet: batch-full requests are no-ops. */
        assert_eq!(service.get_stats().queue_size, 5);

        let summary = service.flush();
        assert_eq!(summary, FlushSummary { batches: 3, accepted: 5, deferred: 0, dropped: 0 });
        assert_eq!(service.get_stats().queue_size, 0);
    }

    #[test]
    fn test_batch_full_leaves_partial_batch_pending() {
        let sink = Counting::new("sink", 1, true);
        let service = ErrorReportingService::builder().provider(sink.clone()).build();
        service.shared.config.write().unwrap().batch_size = 2;

        for m in ["one", "two", "three"] {
            service.report_error(report(m));
        }
        /* Both wake-ups sent by the second and third report. */
        service.shared.on_trigger(Trigger::BatchFull);
        service.shared.on_trigger(Trigger::BatchFull);

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.get_stats().queue_size, 1);
    }

    #[test]
    fn test_batch_full_drains_every_full_batch() {
        let sink = Counting::new("sink", 1, true);
        let service = ErrorReportingService::builder().provider(sink.clone()).build();
        service.shared.config.write().unwrap().batch_size = 2;

        for i in 0..7 {
            service.report_error(report(&format!("m{i}")));
        }
        service.shared.on_trigger(Trigger::BatchFull);

        assert_eq!(sink.calls.load(Ordering::SeqCst), 6);
        assert_eq!(service.get_stats().queue_size, 1);
    }

    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ReportingProvider for Gauge {
        fn name(&self) -> &str {
            "gauge"
        }
        fn priority(&self) -> i32 {
            1
        }
        fn report(&self, _report: &ErrorReport) -> bool {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn test_fan_out_caps_concurrency() {
        let gauge = Gauge { in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) };
        let batch: Vec<_> = (0..100).map(|i| report(&format!("m{i}"))).collect();

        assert_eq!(fan_out(&gauge, &batch), 100);
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!((1..=MAX_FAN_OUT).contains(&peak), "peak {peak}");
    }

    struct FlagWitness {
        flagged: AtomicUsize,
    }

    impl ReportingProvider for FlagWitness {
        fn name(&self) -> &str {
            "flag"
        }
        fn priority(&self) -> i32 {
            1
        }
        fn report(&self, _report: &ErrorReport) -> bool {
            if in_provider_call() {
                self.flagged.fetch_add(1, Ordering::SeqCst);
            }
            true
        }
    }

    #[test]
    fn test_provider_calls_are_flagged_on_every_path() {
        let provider = FlagWitness { flagged: AtomicUsize::new(0) };

        /* One report runs inline, several run on dispatch threads. */
        fan_out(&provider, &[report("solo")]);
        let batch: Vec<_> = (0..4).map(|i| report(&format!("m{i}"))).collect();
        fan_out(&provider, &batch);

        assert_eq!(provider.flagged.load(Ordering::SeqCst), 5);
        assert!(!in_provider_call());
    }

    #[test]
    fn test_add_provider_replaces_same_name() {
        let service = ErrorReportingService::new();
        service.add_provider(Counting::new("x", 1, true));
        service.add_provider(Counting::new("x", 5, true));
        let stats = service.get_stats();
        assert_eq!(stats.providers.len(), 1);
        assert_eq!(stats.providers[0].priority, 5);
    }
}
