#![forbid(unsafe_code)]

//! Reconstructs the current state of a channel from its base archive and the
//! update archives written after it.
//!
//! Every video id is mapped to the archive that holds its most recent data:
//! ids from the base `video_ids.json` map to the base, then each update
//! archive (oldest first) claims the ids it lists. All per-video lookups go
//! through that mapping.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::archive::{ZipArchive, discover_update_archives};
use crate::layout::entry;
use crate::model::{
    ChannelResource, Comment, CommentResource, CommentThread, ListResponse, PlaylistItemResource,
    PlaylistResource, Playlist, Video, VideoResource, flatten_threads,
};
use crate::store::BlobStore;

/// Caption flavours stored per video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionKind {
    Text,
    Xml,
}

impl CaptionKind {
    pub fn extension(self) -> &'static str {
        match self {
            CaptionKind::Text => "txt",
            CaptionKind::Xml => "xml",
        }
    }
}

/// Index of the archive a video resolves to: `0` is the base archive,
/// `n` is the n-th update archive.
pub type SourceIndex = usize;

/// Folds update id lists over the base ids. Returns the ids in first-seen
/// order and the archive each one resolves to.
pub fn resolve_sources(
    base_ids: &[String],
    update_ids: &[Vec<String>],
) -> (Vec<String>, HashMap<String, SourceIndex>) {
    let mut order = Vec::new();
    let mut sources = HashMap::new();
    for id in base_ids {
        if sources.insert(id.clone(), 0).is_none() {
            order.push(id.clone());
        }
    }
    for (position, ids) in update_ids.iter().enumerate() {
        for id in ids {
            if sources.insert(id.clone(), position + 1).is_none() {
                order.push(id.clone());
            }
        }
    }
    (order, sources)
}

/// Read-only view over a base archive and its updates.
pub struct ArchiveReader<S: BlobStore = ZipArchive> {
    base: S,
    updates: Vec<S>,
    video_ids: Vec<String>,
    sources: HashMap<String, SourceIndex>,
    videos: Vec<Video>,
    index: HashMap<String, usize>,
    playlists: Vec<Playlist>,
}

impl ArchiveReader<ZipArchive> {
    /// Opens `path` and every update archive found next to it.
    pub fn open(path: &Path) -> Result<Self> {
        let base = ZipArchive::open_existing(path)?;
        let mut updates = Vec::new();
        for update in discover_update_archives(path)? {
            updates.push(ZipArchive::open_existing(&update)?);
        }
        if !updates.is_empty() {
            info!("{}: applying {} update archive(s)", path.display(), updates.len());
        }
        Self::from_stores(base, updates)
    }
}

impl<S: BlobStore> ArchiveReader<S> {
    /// Builds the reconstructed view. `updates` must be ordered oldest first.
    pub fn from_stores(base: S, updates: Vec<S>) -> Result<Self> {
        let base_ids: Vec<String> = base
            .get_json(entry::VIDEO_IDS)?
            .with_context(|| format!("{} has no {}", base.describe(), entry::VIDEO_IDS))?;
        let mut update_ids = Vec::with_capacity(updates.len());
        for update in &updates {
            match update.get_json::<Vec<String>>(entry::VIDEO_IDS)? {
                Some(ids) => update_ids.push(ids),
                None => {
                    warn!("{} has no {}; ignoring it", update.describe(), entry::VIDEO_IDS);
                    update_ids.push(Vec::new());
                }
            }
        }
        let (video_ids, sources) = resolve_sources(&base_ids, &update_ids);

        let mut reader = Self {
            base,
            updates,
            video_ids,
            sources,
            videos: Vec::new(),
            index: HashMap::new(),
            playlists: Vec::new(),
        };
        reader.playlists = reader.load_playlists()?;
        reader.load_videos()?;
        Ok(reader)
    }

    fn store(&self, source: SourceIndex) -> &S {
        if source == 0 {
            &self.base
        } else {
            &self.updates[source - 1]
        }
    }

    fn store_for(&self, video_id: &str) -> Option<&S> {
        self.sources
            .get(video_id)
            .map(|source| self.store(*source))
    }

    fn load_playlists(&self) -> Result<Vec<Playlist>> {
        let Some(resources) = self
            .base
            .get_json::<Vec<PlaylistResource>>(entry::PLAYLISTS)?
        else {
            return Ok(Vec::new());
        };
        let mut playlists = Vec::with_capacity(resources.len());
        for resource in resources {
            let key = entry::playlist_items(&resource.id);
            let items = match self.base.get_json::<Vec<PlaylistItemResource>>(&key) {
                Ok(Some(items)) => items,
                Ok(None) => {
                    debug!("{}: no items stored for playlist {}", self.base.describe(), resource.id);
                    Vec::new()
                }
                Err(err) => {
                    warn!("{}: skipping playlist items: {err:#}", self.base.describe());
                    Vec::new()
                }
            };
            playlists.push(Playlist {
                id: resource.id,
                title: resource.snippet.title,
                video_ids: items
                    .into_iter()
                    .filter_map(|item| item.snippet.resource_id.video_id)
                    .collect(),
            });
        }
        Ok(playlists)
    }

    fn load_videos(&mut self) -> Result<()> {
        let mut videos = Vec::with_capacity(self.video_ids.len());
        for id in &self.video_ids {
            let Some(store) = self.store_for(id) else {
                continue;
            };
            let mut video = match load_video(store, id) {
                Ok(Some(video)) => video,
                Ok(None) => {
                    warn!("{}: no metadata for video {id}; skipping", store.describe());
                    continue;
                }
                Err(err) => {
                    warn!("{}: unreadable metadata for video {id}: {err:#}", store.describe());
                    continue;
                }
            };
            video.comments = match load_comments(store, id) {
                Ok(comments) => comments,
                Err(err) => {
                    warn!("{}: unreadable comments for video {id}: {err:#}", store.describe());
                    Vec::new()
                }
            };
            video.playlists = self
                .playlists
                .iter()
                .filter(|playlist| playlist.contains(id))
                .map(Playlist::to_ref)
                .collect();
            videos.push(video);
        }
        self.index = videos
            .iter()
            .enumerate()
            .map(|(position, video)| (video.id.clone(), position))
            .collect();
        self.videos = videos;
        Ok(())
    }

    /// All video ids after applying updates, base order first.
    pub fn video_ids(&self) -> &[String] {
        &self.video_ids
    }

    /// Which archive a video's data comes from.
    pub fn source_of(&self, video_id: &str) -> Option<SourceIndex> {
        self.sources.get(video_id).copied()
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    /// Videos whose metadata could be read.
    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn video(&self, video_id: &str) -> Option<&Video> {
        self.index
            .get(video_id)
            .and_then(|position| self.videos.get(*position))
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    /// Channel metadata from the base archive, if it was fetched.
    pub fn channel(&self) -> Result<Option<ChannelResource>> {
        let Some(response) = self
            .base
            .get_json::<ListResponse<ChannelResource>>(entry::CHANNEL_META)?
        else {
            return Ok(None);
        };
        Ok(response.items.into_iter().next())
    }

    /// Caption stored for `video_id` in the archive it resolves to.
    pub fn caption(&self, video_id: &str, kind: CaptionKind) -> Result<Option<String>> {
        let Some(store) = self.store_for(video_id) else {
            return Ok(None);
        };
        store.get_text(&entry::caption(video_id, kind.extension()))
    }

    /// Every stored caption of the given kind, keyed by video id.
    pub fn captions(&self, kind: CaptionKind) -> Result<BTreeMap<String, String>> {
        let mut captions = BTreeMap::new();
        for video in &self.videos {
            if let Some(text) = self.caption(&video.id, kind)? {
                captions.insert(video.id.clone(), text);
            }
        }
        Ok(captions)
    }

    pub fn videos_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Video> {
        self.videos.iter().filter(move |video| video.has_tag(tag))
    }

    pub fn videos_by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Video> {
        self.videos
            .iter()
            .filter(move |video| video.has_category(category))
    }

    /// Videos the given author commented on.
    pub fn videos_by_user<'a>(&'a self, author: &'a str) -> impl Iterator<Item = &'a Video> {
        self.videos
            .iter()
            .filter(move |video| video.comments.iter().any(|comment| comment.author == author))
    }

    pub fn all_comments(&self) -> impl Iterator<Item = (&Video, &Comment)> {
        self.videos
            .iter()
            .flat_map(|video| video.comments.iter().map(move |comment| (video, comment)))
    }

    pub fn all_comments_by_user<'a>(
        &'a self,
        author: &'a str,
    ) -> impl Iterator<Item = (&'a Video, &'a Comment)> {
        self.all_comments()
            .filter(move |(_, comment)| comment.author == author)
    }

    /// Number of distinct videos each author commented on, most active first.
    pub fn user_video_counts(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for video in &self.videos {
            for author in video.users() {
                *counts.entry(author).or_insert(0) += 1;
            }
        }
        let mut counts: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(author, count)| (author.to_string(), count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }
}

fn load_video<S: BlobStore>(store: &S, video_id: &str) -> Result<Option<Video>> {
    let Some(response) = store.get_json::<ListResponse<VideoResource>>(&entry::video_meta(video_id))?
    else {
        return Ok(None);
    };
    Ok(response.items.first().map(Video::from_resource))
}

fn load_comments<S: BlobStore>(store: &S, video_id: &str) -> Result<Vec<Comment>> {
    let Some(threads) = store.get_json::<Vec<CommentThread>>(&entry::comment_threads(video_id))?
    else {
        debug!("{}: no comments stored for video {video_id}", store.describe());
        return Ok(Vec::new());
    };
    let replies: HashMap<String, Vec<CommentResource>> =
        match store.get_json(&entry::comment_replies(video_id)) {
            Ok(replies) => replies.unwrap_or_default(),
            Err(err) => {
                warn!(
                    "{}: replies of video {video_id} unreadable, using inline replies: {err:#}",
                    store.describe()
                );
                HashMap::new()
            }
        };
    Ok(flatten_threads(&threads, &replies))
}
