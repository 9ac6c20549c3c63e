//! Price sources: the external "current price of X" boundary.
//!
//! The engine never knows where a price comes from. It calls a [`PriceSource`], which
//! answers with the raw quoted text (locale formatting and all) or an error; parsing and
//! timeouts are handled by the [`Fetcher`](crate::fetcher::Fetcher).
//!
//! Two sources ship with the binary:
//! - `random_walk`: synthetic prices for demos and local runs.
//! - `command`: runs an external program per key and reads the price from its stdout.

use clap::ValueEnum;
use price_common::Key;
use strum::{Display, EnumString};

pub mod command;
pub mod random_walk;

pub use command::CommandSource;
pub use random_walk::RandomWalkSource;

/// Error type returned by a source; anything displayable will do.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// The external sampling function.
///
/// Implementations may block for seconds and may fail; they are always called from a
/// dedicated fetch thread.
pub trait PriceSource: Send + Sync + 'static {
    /// Return the current quoted price for `key` as text.
    fn quote(&self, key: &Key) -> Result<String, SourceError>;
}

/// Source selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display, EnumString)]
#[clap(rename_all = "lower")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SourceKind {
    /// Synthetic random-walk prices.
    Random,
    /// Prices printed by an external program.
    Command,
}
