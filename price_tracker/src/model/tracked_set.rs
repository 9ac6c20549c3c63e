//! The set of monitored keys.
//!
//! `TrackedSet` keeps keys in insertion order behind an `RwLock`: cycles and the summary
//! view take cheap snapshots under the read lock, while [`TrackedSet::add`] holds the
//! write lock across both the in-memory push and the configuration rewrite, so a reader
//! never observes a key that is not (being) persisted.

use log::{error, info};
use price_common::{Key, Result};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::config::TrackerConfig;

/// Ordered set of tracked keys, optionally persisted to a configuration file.
#[derive(Debug)]
pub struct TrackedSet {
    keys: RwLock<Vec<Key>>,
    config_path: Option<PathBuf>,
}

impl TrackedSet {
    /// Load the tracked set from the configuration document at `path`.
    ///
    /// A missing or malformed document yields an empty set; the next mutation rewrites it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let keys = TrackerConfig::load_or_default(&path).keys();
        info!("Tracking {} symbols from {}", keys.len(), path.display());
        Self {
            keys: RwLock::new(keys),
            config_path: Some(path),
        }
    }

    /// A tracked set that lives only in memory.
    pub fn in_memory(keys: impl IntoIterator<Item = Key>) -> Self {
        let mut unique = Vec::new();
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        Self {
            keys: RwLock::new(unique),
            config_path: None,
        }
    }

    /// Configuration document backing this set, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Add `key`; returns `false` if it was already tracked.
    ///
    /// If the configuration cannot be written the key is not added and the error is
    /// returned, so memory and disk stay in agreement.
    pub fn add(&self, key: Key) -> Result<bool> {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        if keys.contains(&key) {
            return Ok(false);
        }
        keys.push(key);

        if let Some(path) = &self.config_path {
            if let Err(e) = TrackerConfig::from_keys(keys.iter()).save(path) {
                error!("Failed to persist tracked symbols: {}", e);
                keys.pop();
                return Err(e);
            }
        }
        Ok(true)
    }

    /// Copy of the current keys in insertion order.
    pub fn snapshot(&self) -> Vec<Key> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `key` is tracked.
    pub fn contains(&self, key: &Key) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
