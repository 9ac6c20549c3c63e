//! Command-line arguments for the tracker daemon.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use price_common::key::KeyParser;
use price_common::{Key, Result, TrackerError};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;
use crate::source::SourceKind;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding one `<SYMBOL>.csv` series file per tracked symbol.
    #[clap(long, default_value = ".")]
    pub data_dir: String,

    /// Configuration document with the tracked symbols.
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Seconds between refresh cycles.
    #[clap(long, default_value_t = 15)]
    pub interval_secs: u64,

    /// Seconds to wait for a single price before giving up on it for this cycle.
    #[clap(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Maximum number of prices fetched at the same time.
    #[clap(long, default_value_t = crate::coordinator::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Where prices come from.
    #[clap(long, value_enum, default_value_t = SourceKind::Random)]
    pub source: SourceKind,

    /// Program printing the price of the symbol given as its last argument
    /// (required with `--source command`).
    #[clap(long)]
    pub command: Option<String>,

    /// Extra argument passed to `--command` before the symbol; repeatable.
    #[clap(long = "command-arg", allow_hyphen_values = true)]
    pub command_args: Vec<String>,

    /// Render random-walk prices with a decimal comma.
    #[clap(long)]
    pub decimal_comma: bool,

    /// Text file with symbols to start tracking.
    /// Symbols may be separated by commas, spaces, or new lines.
    #[clap(long)]
    pub symbols_file: Option<String>,

    /// Symbol to start tracking; repeatable.
    #[clap(long = "add")]
    pub add: Vec<String>,
}

impl Args {
    /// Series directory with CLI quoting stripped.
    pub fn data_dir(&self) -> PathBuf {
        normalize_path(&self.data_dir)
    }

    /// Configuration path with CLI quoting stripped.
    pub fn config_path(&self) -> PathBuf {
        normalize_path(&self.config)
    }

    /// Symbols requested on the command line and in `--symbols-file`, de-duplicated.
    pub fn startup_keys(&self) -> Result<Vec<Key>> {
        let mut keys: Vec<Key> = Vec::new();
        if let Some(path) = &self.symbols_file {
            let path = normalize_path(path);
            let file = File::open(&path).map_err(|e| {
                TrackerError::Config(format!("cannot open {}: {}", path.display(), e))
            })?;
            keys.extend(Key::parse_from_reader(BufReader::new(file))?);
        }
        for raw in &self.add {
            keys.push(raw.parse()?);
        }

        let mut unique = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        Ok(unique)
    }
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
///
/// This allows passing Windows paths in quotes without breaking parsing.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}
