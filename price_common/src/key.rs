//! Instrument keys and helpers for parsing them from files and CLI input.
//!
//! A `Key` is the normalized identifier of a tracked instrument: trimmed, uppercased and
//! non-empty. Keys also name the series files on disk, so only characters that are safe
//! in a file name are accepted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use crate::error::TrackerError;

/// Trait providing file parsing for keys.
pub trait KeyParser {
    /// Parses keys from a buffered reader.
    ///
    /// Each non-empty line may hold one or more keys separated by commas or spaces.
    /// Returns an error if any entry is not a valid key.
    fn parse_from_reader<R: BufRead>(reader: R) -> Result<Vec<Key>, TrackerError>;
}

impl KeyParser for Key {
    fn parse_from_reader<R: BufRead>(reader: R) -> Result<Vec<Self>, TrackerError> {
        let mut keys = Vec::new();

        for line_result in reader.lines() {
            let line = line_result?;
            for entry in line.split(|c: char| c == ',' || c.is_whitespace()) {
                if entry.is_empty() {
                    continue;
                }
                let key = entry.parse::<Self>()?;
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

/// Normalized identifier of a tracked instrument (e.g. `AAPL`, `BRK.B`, `^GSPC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Borrow the normalized symbol.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_allowed(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '=')
    }
}

impl FromStr for Key {
    type Err = TrackerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty()
            || normalized.starts_with('.')
            || !normalized.chars().all(Self::is_allowed)
        {
            return Err(TrackerError::InvalidKey(raw.to_string()));
        }
        Ok(Key(normalized))
    }
}

impl TryFrom<String> for Key {
    type Error = TrackerError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
