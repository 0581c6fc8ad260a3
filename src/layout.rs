#![forbid(unsafe_code)]

//! Where things live: the project directory tree and the entry names used
//! inside channel archives.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::archive::is_base_archive;

pub const CHANNELS_SUBDIR: &str = "channels";
pub const VIDEOS_SUBDIR: &str = "videos";
pub const CHANNEL_NETWORKS_SUBDIR: &str = "channel_networks";
pub const VIDEO_NETWORKS_SUBDIR: &str = "video_networks";
pub const ANALYSIS_SUBDIR: &str = "analysis";
pub const ADDON_SUBDIR: &str = "addon";
pub const EXPORT_SUBDIR: &str = "export";

/// Entry names inside a channel or collection archive.
pub mod entry {
    pub const VIDEO_IDS: &str = "video_ids.json";
    pub const CHANNEL_META: &str = "channel_meta.json";
    pub const CHANNEL_COMMENTS: &str = "channel_comments.json";
    pub const PLAYLISTS: &str = "playlists.json";
    pub const USER_STATS: &str = "user_stats.json";

    pub const VIDEO_META_DIR: &str = "video_meta";
    pub const VIDEO_COMMENTS_DIR: &str = "video_comments";
    pub const VIDEO_CAPTIONS_DIR: &str = "video_captions";
    pub const PLAYLISTS_DIR: &str = "playlists";

    pub fn video_meta(video_id: &str) -> String {
        format!("{VIDEO_META_DIR}/{video_id}.json")
    }

    /// Top-level comment threads of a video.
    pub fn comment_threads(video_id: &str) -> String {
        format!("{VIDEO_COMMENTS_DIR}/{video_id}_threads.json")
    }

    /// Full reply lists for threads too long to be inlined.
    pub fn comment_replies(video_id: &str) -> String {
        format!("{VIDEO_COMMENTS_DIR}/{video_id}_comments.json")
    }

    pub fn caption(video_id: &str, extension: &str) -> String {
        format!("{VIDEO_CAPTIONS_DIR}/{video_id}.{extension}")
    }

    pub fn playlist_items(playlist_id: &str) -> String {
        format!("{PLAYLISTS_DIR}/{playlist_id}.json")
    }
}

/// Every directory of a harvesting project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub channels: PathBuf,
    pub videos: PathBuf,
    pub channel_networks: PathBuf,
    pub video_networks: PathBuf,
    pub analysis: PathBuf,
    pub addon: PathBuf,
    pub export: PathBuf,
}

/// One base channel archive found under `channels/<group>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelArchive {
    pub group: String,
    pub name: String,
    pub path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: &Path) -> Self {
        let root = root.to_path_buf();
        Self {
            channels: root.join(CHANNELS_SUBDIR),
            videos: root.join(VIDEOS_SUBDIR),
            channel_networks: root.join(CHANNEL_NETWORKS_SUBDIR),
            video_networks: root.join(VIDEO_NETWORKS_SUBDIR),
            analysis: root.join(ANALYSIS_SUBDIR),
            addon: root.join(ADDON_SUBDIR),
            export: root.join(EXPORT_SUBDIR),
            root,
        }
    }

    /// Creates every directory the tools write to.
    pub fn prepare(&self) -> Result<()> {
        for dir in [
            &self.channels,
            &self.videos,
            &self.channel_networks,
            &self.video_networks,
            &self.analysis,
            &self.addon,
            &self.export,
        ] {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn channel_group(&self, group: &str) -> PathBuf {
        self.channels.join(group)
    }

    pub fn video_collection(&self, name: &str) -> PathBuf {
        self.videos.join(format!("{name}.zip"))
    }

    pub fn comment_classifier(&self, project_name: &str) -> PathBuf {
        self.addon
            .join(format!("{project_name}_comment_classifier.json"))
    }

    /// Base channel archives, optionally restricted to one group, sorted by
    /// group then name. Update archives and sidecars are skipped.
    pub fn channel_archives(&self, group: Option<&str>) -> Result<Vec<ChannelArchive>> {
        let root = match group {
            Some(group) => self.channel_group(group),
            None => self.channels.clone(),
        };
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut archives = Vec::new();
        for entry in WalkDir::new(&root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !is_base_archive(&file_name) {
                continue;
            }
            let Some(name) = file_name.strip_suffix(".zip") else {
                continue;
            };
            let group = entry
                .path()
                .parent()
                .and_then(|parent| parent.strip_prefix(&self.channels).ok())
                .map(|relative| relative.to_string_lossy().into_owned())
                .unwrap_or_default();
            archives.push(ChannelArchive {
                group,
                name: name.to_string(),
                path: entry.path().to_path_buf(),
            });
        }
        archives.sort_by(|a, b| (&a.group, &a.name).cmp(&(&b.group, &b.name)));
        Ok(archives)
    }
}

/// Turns a channel title into a file stem that is safe on every platform.
pub fn sanitize_file_stem(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn prepare_creates_directories() -> Result<()> {
        let dir = tempdir()?;
        let paths = ProjectPaths::new(dir.path());
        paths.prepare()?;
        assert!(paths.channels.is_dir());
        assert!(paths.videos.is_dir());
        assert!(paths.channel_networks.is_dir());
        assert!(paths.video_networks.is_dir());
        assert!(paths.analysis.is_dir());
        assert!(paths.addon.is_dir());
        assert!(paths.export.is_dir());
        Ok(())
    }

    #[test]
    fn channel_archives_skip_updates_and_sidecars() -> Result<()> {
        let dir = tempdir()?;
        let paths = ProjectPaths::new(dir.path());
        let news = paths.channel_group("news");
        let games = paths.channel_group("games");
        fs::create_dir_all(&news)?;
        fs::create_dir_all(&games)?;
        for path in [
            news.join("Daily.zip"),
            news.join("Daily_2020-01-01T00-00-00.zip"),
            news.join("Daily.zip.prov"),
            games.join("Speedruns.zip"),
        ] {
            fs::write(path, b"")?;
        }

        let all = paths.channel_archives(None)?;
        let names: Vec<(&str, &str)> = all
            .iter()
            .map(|archive| (archive.group.as_str(), archive.name.as_str()))
            .collect();
        assert_eq!(names, vec![("games", "Speedruns"), ("news", "Daily")]);

        let news_only = paths.channel_archives(Some("news"))?;
        assert_eq!(news_only.len(), 1);
        assert_eq!(news_only[0].path, news.join("Daily.zip"));
        assert!(paths.channel_archives(Some("missing"))?.is_empty());
        Ok(())
    }

    #[test]
    fn entry_names_follow_layout() {
        assert_eq!(entry::video_meta("abc"), "video_meta/abc.json");
        assert_eq!(entry::comment_threads("abc"), "video_comments/abc_threads.json");
        assert_eq!(entry::comment_replies("abc"), "video_comments/abc_comments.json");
        assert_eq!(entry::caption("abc", "xml"), "video_captions/abc.xml");
        assert_eq!(entry::playlist_items("PL1"), "playlists/PL1.json");
    }

    #[test]
    fn sanitize_file_stem_replaces_separators() {
        assert_eq!(sanitize_file_stem("AC/DC: Live"), "AC_DC_ Live");
        assert_eq!(sanitize_file_stem("   "), "untitled");
    }
}
