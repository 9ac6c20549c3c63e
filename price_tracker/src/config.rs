//! Persisted configuration document.
//!
//! The tracked keys live in a small JSON file, kept compatible with the layout the desktop
//! tracker always used:
//!
//! ```json
//! {
//!     "stocks": [
//!         { "symbol": "AAPL" }
//!     ]
//! }
//! ```
//!
//! The document is rewritten wholesale on every change: serialized to a sibling temporary
//! file, synced, then renamed over the old one, so a crash never leaves half a document.

use log::warn;
use price_common::{Key, Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Default file name of the configuration document.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// One tracked instrument as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEntry {
    /// Instrument symbol.
    pub symbol: String,
}

/// On-disk configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracked instruments in insertion order.
    #[serde(default)]
    pub stocks: Vec<StockEntry>,
}

impl TrackerConfig {
    /// Build a document from an ordered key list.
    pub fn from_keys<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Self {
        Self {
            stocks: keys
                .into_iter()
                .map(|key| StockEntry {
                    symbol: key.to_string(),
                })
                .collect(),
        }
    }

    /// Normalized, de-duplicated keys; invalid symbols are skipped with a warning.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = Vec::with_capacity(self.stocks.len());
        for entry in &self.stocks {
            match entry.symbol.parse::<Key>() {
                Ok(key) if !keys.contains(&key) => keys.push(key),
                Ok(_) => {}
                Err(e) => warn!("Ignoring configured symbol: {}", e),
            }
        }
        keys
    }

    /// Read the document at `path`; a missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(TrackerError::Config(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        serde_json::from_str(&text)
            .map_err(|e| TrackerError::Config(format!("malformed {}: {}", path.display(), e)))
    }

    /// Like [`Self::load`], but any error falls back to an empty configuration.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("{}; starting with no tracked symbols", e);
            Self::default()
        })
    }

    /// Replace the document at `path` with this one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let to_config_error =
            |e: io::Error| TrackerError::Config(format!("cannot write {}: {}", path.display(), e));

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = Path::new(&tmp_name);

        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(tmp_path).map_err(to_config_error)?;
        file.write_all(json.as_bytes()).map_err(to_config_error)?;
        file.sync_all().map_err(to_config_error)?;
        fs::rename(tmp_path, path).map_err(to_config_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty_config() {
        let dir = TempDir::new().unwrap();
        let config = TrackerConfig::load(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert!(config.stocks.is_empty());
    }

    #[test]
    fn reads_documents_written_by_the_desktop_tracker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"{"stocks": [{"symbol": "AAPL"}, {"symbol": "petr4.sa"}, {"symbol": "aapl"}, {"symbol": ""}]}"#,
        )
        .unwrap();

        let keys = TrackerConfig::load(&path).unwrap().keys();
        let names: Vec<&str> = keys.iter().map(Key::as_str).collect();
        assert_eq!(names, vec!["AAPL", "PETR4.SA"]);
    }

    #[test]
    fn malformed_document_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(TrackerConfig::load(&path), Err(TrackerError::Config(_))));
        assert!(TrackerConfig::load_or_default(&path).stocks.is_empty());
    }

    #[test]
    fn save_then_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let keys: Vec<Key> = ["MSFT", "AAPL"].iter().map(|s| s.parse().unwrap()).collect();

        TrackerConfig::from_keys(&keys).save(&path).unwrap();
        assert_eq!(TrackerConfig::load(&path).unwrap().keys(), keys);
        assert!(!dir.path().join("config.json.tmp").exists());
    }
}
