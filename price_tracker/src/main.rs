//! Price Tracker: a daemon that polls a price for every tracked symbol at a fixed
//! interval, keeps a CSV history per symbol, and prints the latest prices after every
//! refresh cycle.
//!
//! Usage example (CLI):
//! ```bash
//! price_tracker --data-dir ./prices --interval-secs 300 --add aapl --add msft
//! price_tracker --source command --command ./quote.sh --symbols-file ./symbols.txt
//! ```
//!
//! Threads:
//! - the scheduler's control thread runs cycles; each cycle fans out to fetch workers;
//! - a display thread consumes `TrackerEvent`s and prints summaries, the way a chart or a
//!   symbol list would redraw;
//! - the main thread waits for Ctrl+C and reports the countdown to the next cycle.
#![warn(missing_docs)]
use clap::Parser;
use crossbeam_channel::{Receiver, bounded, select, tick};
use log::{debug, error, info, warn};
use price_common::{Key, Result, TrackerError};
use price_tracker::args::Args;
use price_tracker::source::{CommandSource, PriceSource, RandomWalkSource, SourceKind};
use price_tracker::{
    CycleCoordinator, EventBus, Fetcher, Scheduler, SeriesStore, SummaryView, TrackedSet,
    TrackerEvent,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), TrackerError> {
    init_logger();
    let args = Args::parse();

    let timeout = Duration::from_secs(args.timeout_secs.max(1));
    let source = build_source(&args, timeout)?;
    let store = Arc::new(SeriesStore::open(args.data_dir())?);
    let tracked = Arc::new(TrackedSet::load(args.config_path()));
    store.preload(tracked.snapshot().iter());

    let events = Arc::new(EventBus::new());
    let fetcher = Fetcher::new(source, timeout);
    let coordinator = Arc::new(CycleCoordinator::new(
        fetcher,
        Arc::clone(&store),
        Arc::clone(&events),
        args.workers,
    ));
    let scheduler = Scheduler::new(
        coordinator,
        Arc::clone(&tracked),
        Duration::from_secs(args.interval_secs.max(1)),
    );

    let summary = SummaryView::new(Arc::clone(&tracked), Arc::clone(&store));
    let updates = events.subscribe();
    let display = thread::Builder::new()
        .name("display".to_string())
        .spawn(move || display_loop(updates, summary, store))?;

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down tracker...");
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| TrackerError::Io(std::io::Error::other(e)))?;

    for key in args.startup_keys()? {
        scheduler.add_key(key)?;
    }
    if tracked.is_empty() {
        warn!("No symbols tracked yet; add some with --add or --symbols-file");
    }
    scheduler.start()?;
    info!("Tracker is running. Press Ctrl+C to exit.");

    let status = tick(Duration::from_secs(1));
    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(status) -> _ => {
                let remaining = scheduler.remaining_time().as_secs();
                debug!("Next update in: {:02}:{:02}", remaining / 60, remaining % 60);
            },
        }
    }

    scheduler.stop();
    scheduler.join();
    if display.join().is_err() {
        error!("Display thread panicked");
    }
    Ok(())
}

fn build_source(args: &Args, timeout: Duration) -> Result<Arc<dyn PriceSource>> {
    match args.source {
        SourceKind::Random => Ok(Arc::new(RandomWalkSource::new(args.decimal_comma))),
        SourceKind::Command => {
            let program = args.command.as_deref().ok_or_else(|| {
                TrackerError::Config("--source command requires --command <PROGRAM>".to_string())
            })?;
            Ok(Arc::new(
                CommandSource::new(program, args.command_args.clone()).with_timeout(timeout),
            ))
        }
    }
}

/// Redraw loop standing in for the chart and the symbol list.
///
/// Storage failures are alerted once per symbol until that symbol stores a sample again.
fn display_loop(updates: Receiver<TrackerEvent>, summary: SummaryView, store: Arc<SeriesStore>) {
    let mut alerted: HashSet<Key> = HashSet::new();

    for event in updates.iter() {
        match event {
            TrackerEvent::CycleCompleted(report) => {
                for (key, outcome) in report.iter() {
                    if outcome.is_ok() {
                        alerted.remove(key);
                    }
                }
                for (key, series) in store.all() {
                    debug!("Chart {}: {} points", key, series.len());
                }
                for line in summary.summaries() {
                    info!("{}", line);
                }
            }
            TrackerEvent::TrackedSetChanged(keys) => {
                let names: Vec<String> = keys.iter().map(ToString::to_string).collect();
                info!("Tracked symbols: {}", names.join(", "));
            }
            TrackerEvent::StorageFailure { key, message } => {
                if alerted.insert(key.clone()) {
                    error!("ALERT: prices for {} are not being saved: {}", key, message);
                }
            }
            TrackerEvent::Shutdown => break,
        }
    }
    info!("Display loop stopping...");
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
