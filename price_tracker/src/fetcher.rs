//! Single-key price fetch with a bounded wait.
//!
//! The `Fetcher` is the only place that talks to a [`PriceSource`]. Each call runs the
//! source on its own short-lived thread and waits on a one-slot channel for at most the
//! configured timeout. Whatever happens (an error, a panic, garbage text, or no answer at
//! all) comes back as a [`FetchError`] value; nothing escapes this boundary.
//!
//! A source that overruns the timeout is abandoned: its thread finishes on its own and its
//! late answer is dropped with the channel. Sources that start processes bound them
//! themselves (see [`CommandSource`](crate::source::CommandSource)).

use crossbeam_channel::{RecvTimeoutError, bounded};
use log::{debug, warn};
use price_common::{FetchError, Key, Sample};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::source::PriceSource;

/// Default bound on a single source call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Invokes a [`PriceSource`] for one key and turns its answer into a [`Sample`].
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn PriceSource>,
    timeout: Duration,
}

impl Fetcher {
    /// Create a fetcher over `source` that waits at most `timeout` per call.
    pub fn new(source: Arc<dyn PriceSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Configured per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the current price of `key`.
    pub fn fetch(&self, key: &Key) -> Result<Sample, FetchError> {
        let (tx, rx) = bounded(1);
        let source = Arc::clone(&self.source);
        let owned_key = key.clone();

        thread::Builder::new()
            .name(format!("fetch-{}", key))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| source.quote(&owned_key)));
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(outcome);
            })
            .map_err(|e| FetchError::External(format!("cannot spawn fetch thread: {}", e)))?;

        let text = match rx.recv_timeout(self.timeout) {
            Ok(Ok(Ok(text))) => text,
            Ok(Ok(Err(e))) => return Err(FetchError::External(e.to_string())),
            Ok(Err(payload)) => return Err(FetchError::External(panic_message(payload))),
            Err(RecvTimeoutError::Timeout) => {
                warn!("Fetch for {} timed out after {:?}", key, self.timeout);
                return Err(FetchError::Timeout(self.timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(FetchError::External(
                    "source thread exited without an answer".to_string(),
                ));
            }
        };

        let value = parse_price(&text)?;
        debug!("Fetched {} = {}", key, value);
        Sample::now(value).ok_or_else(|| FetchError::Parse(text))
    }
}

/// Parse a price quoted with arbitrary locale formatting.
///
/// The text must hold exactly one number. Currency signs, letters and whitespace around
/// it are ignored; inside it only digits, `,`, `.` and whitespace (including non-breaking
/// spaces) used as a digit grouper before a run of three digits may appear. When both
/// `,` and `.` appear, the one that comes last is the decimal separator. A single
/// separator kind repeated more than once is a thousands grouper; a lone `,` is a decimal
/// comma.
pub fn parse_price(raw: &str) -> Result<f64, FetchError> {
    let parse_error = || FetchError::Parse(raw.to_string());
    let first = raw.find(|c: char| c.is_ascii_digit()).ok_or_else(parse_error)?;
    let last = raw.rfind(|c: char| c.is_ascii_digit()).ok_or_else(parse_error)?;

    let mut kept = String::with_capacity(last - first + 2);
    if raw[..first].ends_with('-') {
        kept.push('-');
    }
    // Digits in the current run, and whether that run follows a grouping space.
    let mut run = 0;
    let mut grouped = false;
    for c in raw[first..=last].chars() {
        if c.is_ascii_digit() {
            kept.push(c);
            run += 1;
            continue;
        }
        if run == 0 || (grouped && run != 3) {
            return Err(parse_error());
        }
        match c {
            ',' | '.' => {
                kept.push(c);
                grouped = false;
            }
            c if c.is_whitespace() => grouped = true,
            _ => return Err(parse_error()),
        }
        run = 0;
    }
    if grouped && run != 3 {
        return Err(parse_error());
    }

    let normalized = match (kept.rfind(','), kept.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (Some(_), None) if kept.matches(',').count() > 1 => kept.replace(',', ""),
        (Some(_), None) => kept.replace(',', "."),
        (None, Some(_)) if kept.matches('.').count() > 1 => kept.replace('.', ""),
        _ => kept,
    };

    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(parse_error()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("source panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("source panicked: {}", msg)
    } else {
        "source panicked".to_string()
    }
}
