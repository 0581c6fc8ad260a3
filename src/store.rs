#![forbid(unsafe_code)]

//! Key/value blob storage shared by every archive-backed component.
//!
//! Keys are path-like strings (`video_meta/<id>.json`). Entries are written
//! once; a second write to the same key is rejected so that an archive never
//! silently carries two versions of the same entry.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Minimal storage contract: get, put, contains and key listing.
pub trait BlobStore {
    /// Returns the raw bytes stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `data` under `key`. Fails when the key already exists.
    fn put(&mut self, key: &str, data: &[u8]) -> Result<()>;

    fn contains(&self, key: &str) -> bool;

    /// Every key currently stored, in lexical order.
    fn keys(&self) -> Vec<String>;

    /// Human readable name used in log lines.
    fn describe(&self) -> String;

    fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        Self: Sized,
        T: DeserializeOwned,
    {
        let Some(bytes) = self.get(key)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {key} in {}", self.describe()))?;
        Ok(Some(value))
    }

    fn put_json<T>(&mut self, key: &str, value: &T) -> Result<()>
    where
        Self: Sized,
        T: Serialize + ?Sized,
    {
        let bytes = to_indented_json(value)?;
        self.put(key, &bytes)
    }

    fn get_text(&self, key: &str) -> Result<Option<String>>
    where
        Self: Sized,
    {
        let Some(bytes) = self.get(key)? else {
            return Ok(None);
        };
        let text = String::from_utf8(bytes)
            .with_context(|| format!("{key} in {} is not UTF-8", self.describe()))?;
        Ok(Some(text))
    }

    fn put_text(&mut self, key: &str, text: &str) -> Result<()>
    where
        Self: Sized,
    {
        self.put(key, text.as_bytes())
    }

    /// Keys stored directly or transitively below `dir/`.
    fn list_dir(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.keys()
            .into_iter()
            .filter(|key| key.starts_with(&prefix) && key.len() > prefix.len())
            .collect()
    }

    fn has_dir(&self, dir: &str) -> bool {
        !self.list_dir(dir).is_empty()
    }
}

/// Serializes JSON with a stable four-space indentation.
pub fn to_indented_json<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .context("serializing archive entry")?;
    Ok(out)
}

/// In-memory store. Used for tests and for staging data before it is
/// flushed somewhere persistent.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    name: String,
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, data: &[u8]) -> Result<()> {
        if self.entries.contains_key(key) {
            bail!("{key} already exists in {}", self.name);
        }
        self.entries.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn describe(&self) -> String {
        format!("memory store {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn json_entries_use_four_space_indent() -> Result<()> {
        let mut store = MemoryStore::new("test");
        store.put_json("video_ids.json", &vec!["a", "b"])?;
        let text = store.get_text("video_ids.json")?.unwrap_or_default();
        assert_eq!(text, "[\n    \"a\",\n    \"b\"\n]");
        let ids: Vec<String> = store.get_json("video_ids.json")?.unwrap_or_default();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    }

    #[test]
    fn duplicate_keys_are_rejected() -> Result<()> {
        let mut store = MemoryStore::new("test");
        store.put_text("video_captions/a.txt", "hello")?;
        assert!(store.put_text("video_captions/a.txt", "again").is_err());
        assert_eq!(
            store.get_text("video_captions/a.txt")?.as_deref(),
            Some("hello")
        );
        Ok(())
    }

    #[test]
    fn list_dir_only_returns_children() -> Result<()> {
        let mut store = MemoryStore::new("test");
        store.put_json("video_meta/a.json", &json!({}))?;
        store.put_json("video_meta/b.json", &json!({}))?;
        store.put_json("video_metadata.json", &json!({}))?;
        assert_eq!(
            store.list_dir("video_meta"),
            vec!["video_meta/a.json".to_string(), "video_meta/b.json".to_string()]
        );
        assert!(store.has_dir("video_meta/"));
        assert!(!store.has_dir("playlists"));
        Ok(())
    }

    #[test]
    fn missing_entries_are_none() -> Result<()> {
        let store = MemoryStore::new("test");
        assert!(store.get_json::<Value>("channel_meta.json")?.is_none());
        assert!(store.get_text("nope.txt")?.is_none());
        Ok(())
    }
}
