//! Periodic cycle driver.
//!
//! A single control thread owns the schedule:
//!
//! ```text
//! Idle -> Running(1) -> Waiting -> Running(2) -> Waiting -> ... -> Stopped
//! ```
//!
//! While `Running`, the thread is blocked inside [`CycleCoordinator::run_cycle`]; commands
//! sent in the meantime queue up on the command channel and are drained once the cycle
//! returns. Any number of `TriggerNow` commands collapse into one pending cycle, and a
//! `Stop` ends the loop after the in-flight cycle. While `Waiting`, the thread selects over
//! one recurring ticker and the command channel; the cycle fires when a tick observes the
//! deadline has passed, or immediately on `TriggerNow`.
//!
//! Callers interact through the cheap, thread-safe handle methods: [`Scheduler::state`]
//! and [`Scheduler::remaining_time`] only read shared fields and are safe to poll from a
//! UI refresh loop.

use crossbeam_channel::{Receiver, Sender, TryRecvError, select, tick, unbounded};
use log::{debug, error, info, warn};
use price_common::{Key, Result, TrackerError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use strum::Display;

use crate::coordinator::CycleCoordinator;
use crate::events::{EventBus, TrackerEvent};
use crate::model::TrackedSet;

/// Interval between cycles used by the desktop tracker.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
/// Countdown tick granularity.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SchedulerState {
    /// Created, not started.
    Idle,
    /// Running the coordinator cycle with this number (1-based).
    Running(u64),
    /// Counting down to the next cycle.
    Waiting,
    /// Terminal; no further cycles.
    Stopped,
}

enum Command {
    TriggerNow,
    Stop,
}

#[derive(Debug)]
struct Shared {
    state: SchedulerState,
    deadline: Option<Instant>,
}

/// Everything the control thread needs.
struct Control {
    coordinator: Arc<CycleCoordinator>,
    tracked: Arc<TrackedSet>,
    events: Arc<EventBus>,
    shared: Arc<Mutex<Shared>>,
    commands: Receiver<Command>,
    interval: Duration,
    tick: Duration,
}

/// Drives refresh cycles at a fixed interval.
pub struct Scheduler {
    coordinator: Arc<CycleCoordinator>,
    tracked: Arc<TrackedSet>,
    events: Arc<EventBus>,
    interval: Duration,
    tick: Duration,
    shared: Arc<Mutex<Shared>>,
    cmd_tx: Sender<Command>,
    cmd_rx: Receiver<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create an idle scheduler running a cycle every `interval`.
    pub fn new(
        coordinator: Arc<CycleCoordinator>,
        tracked: Arc<TrackedSet>,
        interval: Duration,
    ) -> Self {
        let events = Arc::clone(coordinator.events());
        let (cmd_tx, cmd_rx) = unbounded();
        Self {
            coordinator,
            tracked,
            events,
            interval,
            tick: DEFAULT_TICK.min(interval),
            shared: Arc::new(Mutex::new(Shared {
                state: SchedulerState::Idle,
                deadline: None,
            })),
            cmd_tx,
            cmd_rx,
            handle: Mutex::new(None),
        }
    }

    /// Override the countdown tick; clamped to the interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.min(self.interval).max(Duration::from_millis(1));
        self
    }

    /// Tracked keys this scheduler refreshes.
    pub fn tracked(&self) -> &Arc<TrackedSet> {
        &self.tracked
    }

    /// Start the control thread and run the first cycle right away.
    ///
    /// Calling `start` on a running or stopped scheduler does nothing.
    pub fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock()?;
        if handle.is_some() {
            return Ok(());
        }
        {
            let mut shared = self.shared.lock()?;
            if shared.state == SchedulerState::Stopped {
                warn!("Scheduler already stopped; not starting");
                return Ok(());
            }
            shared.state = SchedulerState::Running(self.coordinator.next_cycle());
        }

        let control = Control {
            coordinator: Arc::clone(&self.coordinator),
            tracked: Arc::clone(&self.tracked),
            events: Arc::clone(&self.events),
            shared: Arc::clone(&self.shared),
            commands: self.cmd_rx.clone(),
            interval: self.interval,
            tick: self.tick,
        };
        let spawned = thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || control.run());
        match spawned {
            Ok(control_thread) => *handle = Some(control_thread),
            Err(e) => {
                self.shared.lock()?.state = SchedulerState::Idle;
                return Err(e.into());
            }
        }
        info!("Scheduler started: every {:?}", self.interval);
        Ok(())
    }

    /// Run a cycle now.
    ///
    /// Starts the scheduler if it is idle, cuts the countdown short if it is waiting, and
    /// queues at most one follow-up cycle if a cycle is already running.
    pub fn trigger_now(&self) -> Result<()> {
        match self.state() {
            SchedulerState::Idle => self.start(),
            SchedulerState::Stopped => {
                debug!("Trigger ignored: scheduler stopped");
                Ok(())
            }
            SchedulerState::Running(_) | SchedulerState::Waiting => self
                .cmd_tx
                .send(Command::TriggerNow)
                .map_err(|e| TrackerError::ChannelSend(e.to_string())),
        }
    }

    /// Track `key` and refresh immediately.
    ///
    /// Returns `false` if the key was already tracked; a refresh is triggered either way.
    pub fn add_key(&self, key: Key) -> Result<bool> {
        let added = self.tracked.add(key.clone())?;
        if added {
            info!("Now tracking {}", key);
            self.events
                .publish(TrackerEvent::TrackedSetChanged(self.tracked.snapshot()));
        } else {
            debug!("{} is already tracked", key);
        }
        self.trigger_now()?;
        Ok(added)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Time left until the next scheduled cycle; zero unless waiting.
    pub fn remaining_time(&self) -> Duration {
        let shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        match (shared.state, shared.deadline) {
            (SchedulerState::Waiting, Some(deadline)) => {
                deadline.saturating_duration_since(Instant::now())
            }
            _ => Duration::ZERO,
        }
    }

    /// Stop scheduling; an in-flight cycle still completes.
    pub fn stop(&self) {
        {
            let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
            if shared.state == SchedulerState::Idle {
                shared.state = SchedulerState::Stopped;
                info!("Scheduler stopped before it started");
                return;
            }
        }
        // The control thread may already be gone; then there is nothing to stop.
        let _ = self.cmd_tx.send(Command::Stop);
    }

    /// Wait for the control thread to exit. Call after [`Self::stop`].
    pub fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

impl Control {
    fn run(self) {
        let ticker = tick(self.tick);
        let mut runs = 0u64;

        'cycles: loop {
            let cycle = self.coordinator.next_cycle();
            self.set(SchedulerState::Running(cycle), None);
            let keys = self.tracked.snapshot();
            match self.coordinator.run_cycle(&keys) {
                Ok(report) => {
                    runs += 1;
                    debug!("Cycle {} report: {} entries", report.cycle, report.len());
                }
                Err(e) => error!("Cycle {} failed to run: {}", cycle, e),
            }

            let mut pending = false;
            loop {
                match self.commands.try_recv() {
                    Ok(Command::TriggerNow) => pending = true,
                    Ok(Command::Stop) | Err(TryRecvError::Disconnected) => break 'cycles,
                    Err(TryRecvError::Empty) => break,
                }
            }
            if pending {
                debug!("Running coalesced trigger");
                continue;
            }

            let deadline = Instant::now() + self.interval;
            self.set(SchedulerState::Waiting, Some(deadline));
            loop {
                select! {
                    recv(ticker) -> _ => if Instant::now() >= deadline {
                        continue 'cycles;
                    },
                    recv(self.commands) -> cmd => match cmd {
                        Ok(Command::TriggerNow) => continue 'cycles,
                        Ok(Command::Stop) | Err(_) => break 'cycles,
                    },
                }
            }
        }

        self.set(SchedulerState::Stopped, None);
        self.events.publish(TrackerEvent::Shutdown);
        info!("Scheduler stopped after {} cycles", runs);
    }

    fn set(&self, state: SchedulerState, deadline: Option<Instant>) {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.state = state;
        shared.deadline = deadline;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::Fetcher;
    use crate::source::{PriceSource, SourceError};
    use crate::store::SeriesStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts calls and takes `delay` per quote.
    struct Counting {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl PriceSource for Counting {
        fn quote(&self, _key: &Key) -> std::result::Result<String, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(self.delay);
            Ok(format!("{}", 100 + n))
        }
    }

    // Field order matters: the scheduler must stop before the directory goes away.
    struct Harness {
        scheduler: Scheduler,
        events: Receiver<TrackerEvent>,
        source: Arc<Counting>,
        _dir: TempDir,
    }

    fn harness(interval: Duration, delay: Duration, keys: &[&str]) -> Harness {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            delay,
        });
        let store = Arc::new(SeriesStore::open(dir.path().join("data")).unwrap());
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        let fetcher = Fetcher::new(Arc::clone(&source) as Arc<dyn PriceSource>, Duration::from_secs(5));
        let coordinator = Arc::new(CycleCoordinator::new(fetcher, store, bus, 4));
        let tracked = Arc::new(TrackedSet::load(dir.path().join("config.json")));
        for key in keys {
            tracked.add(key.parse().unwrap()).unwrap();
        }
        let scheduler =
            Scheduler::new(coordinator, tracked, interval).with_tick(Duration::from_millis(5));
        Harness {
            scheduler,
            events,
            source,
            _dir: dir,
        }
    }

    fn next_completion(events: &Receiver<TrackerEvent>) -> Arc<crate::model::CycleReport> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(left) {
                Ok(TrackerEvent::CycleCompleted(report)) => return report,
                Ok(_) => continue,
                Err(e) => panic!("no cycle completed: {}", e),
            }
        }
    }

    fn wait_for_state(scheduler: &Scheduler, want: SchedulerState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while scheduler.state() != want {
            assert!(Instant::now() < deadline, "state stuck at {:?}", scheduler.state());
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn starts_idle_with_no_countdown() {
        let h = harness(Duration::from_secs(60), Duration::ZERO, &["AAPL"]);
        assert_eq!(h.scheduler.state(), SchedulerState::Idle);
        assert_eq!(h.scheduler.remaining_time(), Duration::ZERO);
    }

    #[test]
    fn runs_first_cycle_then_counts_down() {
        let h = harness(Duration::from_secs(60), Duration::ZERO, &["AAPL", "MSFT"]);
        h.scheduler.start().unwrap();

        let report = next_completion(&h.events);
        assert_eq!(report.len(), 2);
        wait_for_state(&h.scheduler, SchedulerState::Waiting);
        let remaining = h.scheduler.remaining_time();
        assert!(remaining > Duration::from_secs(55) && remaining <= Duration::from_secs(60));
    }

    #[test]
    fn repeats_at_the_interval() {
        let h = harness(Duration::from_millis(40), Duration::ZERO, &["AAPL"]);
        h.scheduler.start().unwrap();
        let first = next_completion(&h.events);
        let second = next_completion(&h.events);
        let third = next_completion(&h.events);
        assert!(first.cycle < second.cycle && second.cycle < third.cycle);
        let gap = (third.started_at - second.started_at).to_std().unwrap();
        assert!(gap >= Duration::from_millis(40));
    }

    #[test]
    fn running_state_carries_the_coordinator_cycle_number() {
        let h = harness(Duration::from_secs(60), Duration::from_millis(150), &["AAPL"]);
        let keys = h.scheduler.tracked().snapshot();
        assert_eq!(h.scheduler.coordinator.run_cycle(&keys).unwrap().cycle, 1);
        next_completion(&h.events);

        h.scheduler.start().unwrap();
        wait_for_state(&h.scheduler, SchedulerState::Running(2));
        assert_eq!(next_completion(&h.events).cycle, 2);
    }

    #[test]
    fn trigger_when_idle_starts_and_when_waiting_cuts_countdown() {
        let h = harness(Duration::from_secs(60), Duration::ZERO, &["AAPL"]);
        h.scheduler.trigger_now().unwrap();
        next_completion(&h.events);
        wait_for_state(&h.scheduler, SchedulerState::Waiting);

        h.scheduler.trigger_now().unwrap();
        let report = next_completion(&h.events);
        assert_eq!(report.cycle, 2);
        wait_for_state(&h.scheduler, SchedulerState::Waiting);
        assert!(h.scheduler.remaining_time() > Duration::from_secs(55));
    }

    #[test]
    fn triggers_during_a_cycle_are_coalesced() {
        let h = harness(Duration::from_secs(60), Duration::from_millis(150), &["AAPL"]);
        h.scheduler.start().unwrap();
        wait_for_state(&h.scheduler, SchedulerState::Running(1));
        for _ in 0..5 {
            h.scheduler.trigger_now().unwrap();
        }

        assert_eq!(next_completion(&h.events).cycle, 1);
        assert_eq!(next_completion(&h.events).cycle, 2);
        wait_for_state(&h.scheduler, SchedulerState::Waiting);
        thread::sleep(Duration::from_millis(200));
        assert!(h.events.try_iter().all(|e| !matches!(e, TrackerEvent::CycleCompleted(_))));
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn add_key_persists_notifies_and_refreshes() {
        let h = harness(Duration::from_secs(60), Duration::ZERO, &["AAPL"]);
        h.scheduler.start().unwrap();
        next_completion(&h.events);
        wait_for_state(&h.scheduler, SchedulerState::Waiting);

        assert!(h.scheduler.add_key("msft".parse().unwrap()).unwrap());
        let changed = loop {
            match h.events.recv_timeout(Duration::from_secs(5)).unwrap() {
                TrackerEvent::TrackedSetChanged(keys) => break keys,
                _ => continue,
            }
        };
        assert_eq!(changed.len(), 2);
        let report = next_completion(&h.events);
        assert_eq!(report.len(), 2);

        assert!(!h.scheduler.add_key("MSFT".parse().unwrap()).unwrap());
        assert_eq!(h.scheduler.tracked().len(), 2);
        let persisted = crate::config::TrackerConfig::load(h.scheduler.tracked().config_path().unwrap())
            .unwrap();
        assert_eq!(persisted.stocks.len(), 2);
    }

    #[test]
    fn stop_lets_the_running_cycle_finish() {
        let h = harness(Duration::from_millis(10), Duration::from_millis(150), &["AAPL"]);
        h.scheduler.start().unwrap();
        wait_for_state(&h.scheduler, SchedulerState::Running(1));
        h.scheduler.stop();
        h.scheduler.join();

        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        let events: Vec<TrackerEvent> = h.events.try_iter().collect();
        let completed = events
            .iter()
            .filter(|e| matches!(e, TrackerEvent::CycleCompleted(_)))
            .count();
        assert_eq!(completed, 1);
        assert!(matches!(events.last(), Some(TrackerEvent::Shutdown)));

        h.scheduler.trigger_now().unwrap();
        h.scheduler.start().unwrap();
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    }

    #[test]
    fn stop_before_start_is_terminal() {
        let h = harness(Duration::from_secs(1), Duration::ZERO, &["AAPL"]);
        h.scheduler.stop();
        h.scheduler.start().unwrap();
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    }
}
