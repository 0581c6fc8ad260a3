#![forbid(unsafe_code)]

//! Key/value cache kept in memory and snapshotted to a JSON file.
//!
//! The crawler uses one cache for relation lists and one for node metadata so
//! that repeated runs never re-fetch what an earlier run already resolved.

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Inserts between automatic snapshots.
pub const DEFAULT_SNAPSHOT_EVERY: usize = 50;

#[derive(Debug)]
pub struct SnapshotStore<V> {
    entries: BTreeMap<String, V>,
    path: Option<PathBuf>,
    snapshot_every: usize,
    pending: usize,
}

impl<V> SnapshotStore<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Cache that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            entries: BTreeMap::new(),
            path: None,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
            pending: 0,
        }
    }

    /// Loads the snapshot at `path` if it exists; later snapshots go there.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            entries,
            path: Some(path.to_path_buf()),
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
            pending: 0,
        })
    }

    pub fn with_snapshot_every(mut self, inserts: usize) -> Self {
        self.snapshot_every = inserts.max(1);
        self
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }

    /// Stores `value`, snapshotting once enough inserts have accumulated.
    pub fn insert(&mut self, key: &str, value: V) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        self.pending += 1;
        if self.pending >= self.snapshot_every {
            self.save()?;
        }
        Ok(())
    }

    /// Writes the snapshot file (atomically) if the store has one.
    pub fn save(&mut self) -> Result<()> {
        self.pending = 0;
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer(&mut tmp, &self.entries)
            .with_context(|| format!("serializing {}", path.display()))?;
        tmp.flush()?;
        tmp.persist(path)
            .with_context(|| format!("writing {}", path.display()))?;
        debug!("snapshot of {} entries written to {}", self.entries.len(), path.display());
        Ok(())
    }
}
