//!
//! Common types and utilities shared by the price tracker crates.
//!
//! This crate aggregates:
//! - `error`: unified error type `TrackerError` and the per-fetch `FetchError`.
//! - `result`: handy `Result<T, TrackerError>` alias.
//! - `key`: normalized instrument keys and parsing helpers.
//! - `sample`: a single timestamped price observation and its CSV row form.
#![warn(missing_docs)]
pub mod error;
pub mod key;
pub mod result;
pub mod sample;

pub use error::{FetchError, TrackerError};
pub use key::Key;
pub use result::Result;
pub use sample::Sample;
