//! Domain models shared by the scheduler, the coordinator and the summary view.
//!
//! - `tracked_set`: the ordered, persisted set of monitored keys.
//! - `report`: per-cycle outcome (`CycleReport`).

pub mod report;
pub mod tracked_set;

pub use report::CycleReport;
pub use tracked_set::TrackedSet;
