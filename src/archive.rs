#![forbid(unsafe_code)]

//! Zip-backed [`BlobStore`] plus the naming rules for dated update archives.
//!
//! A channel is stored as one base archive (`Channel.zip`) and any number of
//! update archives written next to it (`Channel_2024-03-01T12-00-00.zip`).
//! Update archives only carry the videos that changed since the previous run.

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::store::BlobStore;

pub const ARCHIVE_EXTENSION: &str = "zip";
pub const PROVENANCE_SUFFIX: &str = ".prov";
/// Timestamp format used when naming new update archives.
pub const UPDATE_STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
/// Older archives used colons; still accepted when reading.
const LEGACY_STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A zip file on disk exposed through the [`BlobStore`] contract.
///
/// The entry list is cached on open; every read reopens the file so the
/// struct never holds a file handle between calls.
#[derive(Debug)]
pub struct ZipArchive {
    path: PathBuf,
    entries: BTreeSet<String>,
}

impl ZipArchive {
    /// Opens an archive for appending, creating an empty one when missing.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            ZipWriter::new(file)
                .finish()
                .with_context(|| format!("initializing {}", path.display()))?;
        }
        Self::open_existing(path)
    }

    /// Opens an archive that must already exist.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("archive {} does not exist", path.display());
        }
        let reader = open_reader(path)?;
        let entries = reader.file_names().map(str::to_string).collect();
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Replaces whatever is stored at `path` with a fresh, empty archive.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("removing {}", path.display()))?;
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn open_reader(path: &Path) -> Result<zip::ZipArchive<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("reading zip directory of {}", path.display()))
}

impl BlobStore for ZipArchive {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if !self.entries.contains(key) {
            return Ok(None);
        }
        let mut reader = open_reader(&self.path)?;
        let mut entry = reader
            .by_name(key)
            .with_context(|| format!("locating {key} in {}", self.path.display()))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("reading {key} from {}", self.path.display()))?;
        Ok(Some(data))
    }

    fn put(&mut self, key: &str, data: &[u8]) -> Result<()> {
        if self.entries.contains(key) {
            bail!("{key} already exists in {}", self.path.display());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("opening {} for append", self.path.display()))?;
        let mut writer = ZipWriter::new_append(file)
            .with_context(|| format!("appending to {}", self.path.display()))?;
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        writer
            .start_file(key, options)
            .with_context(|| format!("adding {key} to {}", self.path.display()))?;
        writer
            .write_all(data)
            .with_context(|| format!("writing {key} to {}", self.path.display()))?;
        writer
            .finish()
            .with_context(|| format!("finalizing {}", self.path.display()))?;
        self.entries.insert(key.to_string());
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Splits `Channel_2024-03-01T12-00-00.zip` into the base stem and the
/// parsed timestamp. Returns `None` for base archives and unrelated files.
pub fn parse_update_name(file_name: &str) -> Option<(&str, NaiveDateTime)> {
    let stem = file_name.strip_suffix(".zip")?;
    let (base, stamp) = stem.rsplit_once('_')?;
    if base.is_empty() {
        return None;
    }
    let parsed = NaiveDateTime::parse_from_str(stamp, UPDATE_STAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(stamp, LEGACY_STAMP_FORMAT))
        .ok()?;
    Some((base, parsed))
}

/// True for `*.zip` files that are not update archives.
pub fn is_base_archive(file_name: &str) -> bool {
    file_name.ends_with(".zip") && parse_update_name(file_name).is_none()
}

/// Path of a new update archive for `base`, stamped with the local time.
pub fn update_archive_path(base: &Path) -> Result<PathBuf> {
    let stem = archive_stem(base)?;
    let stamp = Local::now().format(UPDATE_STAMP_FORMAT);
    Ok(base.with_file_name(format!("{stem}_{stamp}.{ARCHIVE_EXTENSION}")))
}

/// File stem of an archive path (`Channel` for `.../Channel.zip`).
pub fn archive_stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))
}

/// Lists the update archives that belong to `base`, oldest first.
///
/// Candidates are siblings named `{stem}_{timestamp}.zip`; provenance
/// sidecars and archives of other channels sharing the prefix are ignored.
pub fn discover_update_archives(base: &Path) -> Result<Vec<PathBuf>> {
    let stem = archive_stem(base)?;
    let Some(dir) = base.parent() else {
        return Ok(Vec::new());
    };
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let base_name = base.file_name().map(|name| name.to_string_lossy().into_owned());
    let mut updates = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if Some(&name) == base_name.as_ref() || name.ends_with(PROVENANCE_SUFFIX) {
            continue;
        }
        if let Some((candidate, stamp)) = parse_update_name(&name)
            && candidate == stem
        {
            updates.push((stamp, name, entry.path()));
        }
    }
    updates.sort();
    Ok(updates.into_iter().map(|(_, _, path)| path).collect())
}
