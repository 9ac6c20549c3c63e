//! One refresh cycle: fan-out fetches, store results, fan-in, notify once.
//!
//! `run_cycle` pushes every key onto a job channel and starts a fixed number of scoped
//! worker threads that drain it. Each worker fetches a key, appends a successful sample to
//! the store, and reports the outcome on a result channel. `std::thread::scope` is the
//! fan-in barrier: it returns only once every worker has exited, i.e. once every dispatched
//! fetch has terminated. Only then is the report assembled and a single
//! `CycleCompleted` event published.
//!
//! A key's failure never affects other keys: fetch errors are values, and the
//! [`Fetcher`] bounds how long any one key can hold a worker.

use chrono::Utc;
use crossbeam_channel::unbounded;
use log::{error, info, warn};
use price_common::{FetchError, Key, Result, TrackerError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use crate::events::{EventBus, TrackerEvent};
use crate::fetcher::Fetcher;
use crate::model::CycleReport;
use crate::model::report::Outcome;
use crate::store::SeriesStore;

/// Default number of concurrent fetch workers per cycle.
pub const DEFAULT_WORKERS: usize = 8;

/// Runs refresh cycles against a store and publishes their completion.
pub struct CycleCoordinator {
    fetcher: Fetcher,
    store: Arc<SeriesStore>,
    events: Arc<EventBus>,
    workers: usize,
    in_flight: AtomicBool,
    cycles: AtomicU64,
}

/// Clears the in-flight flag when a cycle ends, including by panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CycleCoordinator {
    /// Create a coordinator that runs at most `workers` fetches at once.
    pub fn new(
        fetcher: Fetcher,
        store: Arc<SeriesStore>,
        events: Arc<EventBus>,
        workers: usize,
    ) -> Self {
        Self {
            fetcher,
            store,
            events,
            workers: workers.max(1),
            in_flight: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        }
    }

    /// Store the cycles write to.
    pub fn store(&self) -> &Arc<SeriesStore> {
        &self.store
    }

    /// Bus the completion events go to.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Number of cycles completed so far.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Number the next cycle run on this coordinator will carry.
    pub fn next_cycle(&self) -> u64 {
        self.cycles.load(Ordering::Acquire) + 1
    }

    /// Whether a cycle is currently running.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Fetch every key in `keys` concurrently and wait for all of them.
    ///
    /// Returns `CycleInProgress` if another cycle is still running on this coordinator.
    /// The report has exactly one entry per key, in the order given.
    pub fn run_cycle(&self, keys: &[Key]) -> Result<Arc<CycleReport>> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(TrackerError::CycleInProgress);
        }
        let _in_flight = InFlight(&self.in_flight);

        let cycle = self.next_cycle();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!("Cycle {}: fetching {} symbols", cycle, keys.len());

        let (job_tx, job_rx) = unbounded::<(usize, &Key)>();
        for job in keys.iter().enumerate() {
            job_tx
                .send(job)
                .map_err(|e| TrackerError::ChannelSend(e.to_string()))?;
        }
        drop(job_tx);

        let (done_tx, done_rx) = unbounded::<(usize, Outcome)>();
        let width = self.workers.min(keys.len());
        thread::scope(|scope| {
            for _ in 0..width {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (index, key) in job_rx.iter() {
                        let outcome = self.fetch_and_store(key);
                        // done_rx outlives the scope.
                        let _ = done_tx.send((index, outcome));
                    }
                });
            }
        });
        drop(done_tx);

        let mut slots: Vec<Option<Outcome>> = vec![None; keys.len()];
        for (index, outcome) in done_rx.try_iter() {
            slots[index] = Some(outcome);
        }
        let outcomes = keys
            .iter()
            .cloned()
            .zip(slots)
            .map(|(key, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    Err(FetchError::External("fetch worker exited without a result".to_string()))
                });
                (key, outcome)
            })
            .collect();

        let report = Arc::new(CycleReport::new(cycle, started_at, clock.elapsed(), outcomes));
        self.cycles.store(cycle, Ordering::Release);
        info!(
            "Cycle {} finished in {:?}: {}/{} symbols updated",
            cycle,
            report.elapsed,
            report.successes(),
            report.len()
        );
        self.events
            .publish(TrackerEvent::CycleCompleted(Arc::clone(&report)));
        Ok(report)
    }

    fn fetch_and_store(&self, key: &Key) -> Outcome {
        let sample = match self.fetcher.fetch(key) {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Fetch failed for {}: {}", key, e);
                return Err(e);
            }
        };

        match self.store.append(key, sample) {
            Ok(()) => Ok(sample),
            Err(e) => {
                error!("Sample for {} was fetched but not stored: {}", key, e);
                self.events.publish(TrackerEvent::StorageFailure {
                    key: key.clone(),
                    message: e.to_string(),
                });
                Err(FetchError::Storage(e.to_string()))
            }
        }
    }
}
