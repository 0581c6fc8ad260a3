#![forbid(unsafe_code)]

//! `.prov` sidecars recording how an output file came to be.
//!
//! A sidecar sits next to its target (`Channel.zip.prov`) and holds a digest
//! of the target plus every activity that wrote to it, oldest first.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::archive::PROVENANCE_SUFFIX;

pub const AGENT: &str = concat!("ytharvest ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimarySource {
    pub name: String,
    pub url: String,
}

impl PrimarySource {
    pub fn youtube() -> Self {
        Self {
            name: "youtube".to_string(),
            url: "https://www.youtube.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub agent: String,
    pub activity: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_sources: Vec<PrimarySource>,
}

impl Activity {
    /// Starts an activity record; call [`Activity::finish`] once the target
    /// has been written.
    pub fn begin(activity: &str, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent: AGENT.to_string(),
            activity: activity.to_string(),
            description: description.into(),
            started_at: now,
            ended_at: now,
            sources: Vec::new(),
            primary_sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: &Path) -> Self {
        self.sources.push(source.display().to_string());
        self
    }

    pub fn with_primary_source(mut self, source: PrimarySource) -> Self {
        if !self.primary_sources.contains(&source) {
            self.primary_sources.push(source);
        }
        self
    }

    pub fn finish(mut self) -> Self {
        self.ended_at = Utc::now();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blake3: Option<String>,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

pub fn sidecar_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(PROVENANCE_SUFFIX);
    PathBuf::from(name)
}

impl Provenance {
    /// Loads the sidecar of `target`, or starts an empty one.
    pub fn load(target: &Path) -> Result<Self> {
        let path = sidecar_path(target);
        if path.exists() {
            let raw = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            return serde_json::from_slice(&raw)
                .with_context(|| format!("parsing {}", path.display()));
        }
        Ok(Self {
            target: target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            blake3: None,
            activities: Vec::new(),
        })
    }

    /// Re-hashes the target and writes the sidecar atomically.
    pub fn save(&mut self, target: &Path) -> Result<PathBuf> {
        let data = fs::read(target).with_context(|| format!("hashing {}", target.display()))?;
        self.blake3 = Some(blake3::hash(&data).to_hex().to_string());

        let path = sidecar_path(target);
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, self)
            .with_context(|| format!("serializing {}", path.display()))?;
        tmp.write_all(b"\n")?;
        tmp.persist(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

/// Appends `activity` to the sidecar of `target`.
pub fn record(target: &Path, activity: Activity) -> Result<PathBuf> {
    let mut provenance = Provenance::load(target)?;
    provenance.activities.push(activity.finish());
    provenance.save(target)
}
