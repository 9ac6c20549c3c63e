//! Price tracker engine.
//!
//! Periodically samples a quoted price for every tracked key, appends each sample to a
//! durable per-key time series, and tells downstream consumers when a refresh cycle is
//! complete. The building blocks, leaves first:
//!
//! - `store`: `SeriesStore`, the append-only CSV-backed series with an in-memory cache.
//! - `source`: the `PriceSource` boundary and the bundled sources.
//! - `fetcher`: `Fetcher`, one bounded, error-contained source call per key.
//! - `coordinator`: `CycleCoordinator`, concurrent fan-out/fan-in of one cycle.
//! - `scheduler`: `Scheduler`, the interval loop with on-demand triggers.
//! - `summary`: `SummaryView`, the "latest price" projection.
//! - `model`: `TrackedSet` and `CycleReport`.
//! - `events`: `EventBus` through which consumers learn about cycles and key changes.
//! - `config`: the persisted configuration document.
#![warn(missing_docs)]

pub mod args;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod fetcher;
pub mod model;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod summary;

pub use coordinator::CycleCoordinator;
pub use events::{EventBus, TrackerEvent};
pub use fetcher::Fetcher;
pub use model::{CycleReport, TrackedSet};
pub use scheduler::{Scheduler, SchedulerState};
pub use store::SeriesStore;
pub use summary::{Summary, SummaryView};
