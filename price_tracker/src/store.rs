//! Durable, append-only per-key time series.
//!
//! Every key owns one CSV file under the store's data directory. The in-memory cache holds
//! the full series for each key that has been touched; it is filled lazily from disk and
//! only ever grows through [`SeriesStore::append`], which writes the row to disk before
//! the sample becomes visible in memory.
//!
//! Locking:
//! - the key → slot map sits behind an `RwLock` and is only write-locked to insert a slot;
//! - each slot has its own `Mutex`, held across the disk write and the memory push, so
//!   appends to one key are serialized while appends to different keys run in parallel.

use log::{debug, info, warn};
use price_common::sample::CSV_HEADER;
use price_common::{Key, Result, Sample, TrackerError};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::str;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Ordered history of samples for one key.
pub type Series = Vec<Sample>;

/// Cached series for one key; `None` until it has been read from disk.
type Slot = Arc<Mutex<Option<Series>>>;

/// In-memory + on-disk time-series store.
pub struct SeriesStore {
    data_dir: PathBuf,
    slots: RwLock<HashMap<Key, Slot>>,
}

impl SeriesStore {
    /// Open a store rooted at `data_dir`, creating the directory if needed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        info!("Series store opened at {}", data_dir.display());
        Ok(Self {
            data_dir,
            slots: RwLock::new(HashMap::new()),
        })
    }

    /// Directory holding the series files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File backing the series of `key`.
    pub fn path_for(&self, key: &Key) -> PathBuf {
        self.data_dir.join(format!("{}.csv", key))
    }

    /// Read the persisted series for `key` straight from disk.
    ///
    /// A missing file is an empty series. Rows that fail to parse, including rows that
    /// are not valid UTF-8, are skipped with a warning so a row torn by a crash does not
    /// hide the rest of the history.
    pub fn load(&self, key: &Key) -> Result<Series> {
        let path = self.path_for(key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(TrackerError::StorageRead { path, source }),
        };

        let mut series = Vec::new();
        for (index, bytes) in BufReader::new(file).split(b'\n').enumerate() {
            let bytes = bytes.map_err(|source| TrackerError::StorageRead {
                path: path.clone(),
                source,
            })?;
            let Ok(line) = str::from_utf8(&bytes) else {
                warn!("Skipping non-UTF-8 row {} in {}", index + 1, path.display());
                continue;
            };
            if line.trim().is_empty() || (index == 0 && line.trim() == CSV_HEADER) {
                continue;
            }
            match Sample::from_row(&line) {
                Some(sample) => series.push(sample),
                None => warn!(
                    "Skipping malformed row {} in {}: {:?}",
                    index + 1,
                    path.display(),
                    line
                ),
            }
        }
        debug!("Loaded {} samples for {}", series.len(), key);
        Ok(series)
    }

    /// Append `sample` to the series of `key`, durably.
    ///
    /// The row is written and synced before the sample is pushed into memory; if the
    /// write fails the cached series is unchanged and `StorageWrite` is returned.
    pub fn append(&self, key: &Key, sample: Sample) -> Result<()> {
        let slot = self.slot(key);
        let mut cached = lock(&slot);
        let series = self.ensure_loaded(key, &mut cached);

        let path = self.path_for(key);
        write_row(&path, &sample).map_err(|source| TrackerError::StorageWrite {
            path: path.clone(),
            source,
        })?;
        series.push(sample);
        debug!("Appended {} = {} ({} samples)", key, sample.value, series.len());
        Ok(())
    }

    /// Most recently appended sample for `key`, if any.
    pub fn latest(&self, key: &Key) -> Option<Sample> {
        let slot = self.slot(key);
        let mut cached = lock(&slot);
        self.ensure_loaded(key, &mut cached).last().copied()
    }

    /// Most recent sample for `key` without filling the cache.
    ///
    /// A key that is not cached yet is read from disk and stays uncached, so [`Self::all`]
    /// is unaffected.
    pub fn peek_latest(&self, key: &Key) -> Option<Sample> {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        if let Some(slot) = slot {
            if let Some(series) = lock(&slot).as_ref() {
                return series.last().copied();
            }
        }
        match self.load(key) {
            Ok(series) => series.last().copied(),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// Copy of the full series for `key`.
    pub fn series(&self, key: &Key) -> Series {
        let slot = self.slot(key);
        let mut cached = lock(&slot);
        self.ensure_loaded(key, &mut cached).clone()
    }

    /// Snapshot of every cached series, keyed and ordered by key.
    pub fn all(&self) -> BTreeMap<Key, Series> {
        let slots: Vec<(Key, Slot)> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        slots
            .into_iter()
            .filter_map(|(key, slot)| {
                let cached = lock(&slot);
                cached.as_ref().map(|series| (key, series.clone()))
            })
            .collect()
    }

    /// Warm the cache with the persisted history of `keys`.
    pub fn preload<'a>(&self, keys: impl IntoIterator<Item = &'a Key>) {
        for key in keys {
            let slot = self.slot(key);
            let mut cached = lock(&slot);
            let count = self.ensure_loaded(key, &mut cached).len();
            info!("History for {}: {} samples", key, count);
        }
    }

    fn slot(&self, key: &Key) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    fn ensure_loaded<'s>(&self, key: &Key, cached: &'s mut Option<Series>) -> &'s mut Series {
        cached.get_or_insert_with(|| {
            self.load(key).unwrap_or_else(|e| {
                warn!("{}; starting {} with an empty series", e, key);
                Vec::new()
            })
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append one row to `path`, writing the header first for a new file and terminating a
/// torn trailing row so the new row starts on its own line.
fn write_row(path: &Path, sample: &Sample) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;

    let len = file.metadata()?.len();
    let mut buf = String::new();
    if len == 0 {
        buf.push_str(CSV_HEADER);
        buf.push('\n');
    } else {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            buf.push('\n');
        }
    }
    buf.push_str(&sample.to_row());
    buf.push('\n');

    file.write_all(buf.as_bytes())?;
    file.sync_data()
}
