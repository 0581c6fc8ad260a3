#![forbid(unsafe_code)]

//! Elasticsearch ingestion of videos and comments.
//!
//! Every run rebuilds `{prefix}_yt_videos` and `{prefix}_yt_comments` from
//! scratch. Videos are indexed one document at a time, comments in one bulk
//! request per video.

use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::RetryPolicy;
use crate::layout::ProjectPaths;
use crate::reader::{ArchiveReader, CaptionKind};
use crate::store::BlobStore;

pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";

/// Where documents end up. Implemented over HTTP by [`ElasticsearchClient`].
pub trait SearchBackend {
    /// Drops `index` if it exists and creates it with `mapping`.
    fn recreate_index(&mut self, index: &str, mapping: &Value) -> Result<()>;

    fn index_document(&mut self, index: &str, id: &str, document: &Value) -> Result<()>;

    /// Indexes `documents` in one request. Returns how many items the
    /// backend rejected.
    fn bulk_index(&mut self, index: &str, documents: &[(String, Value)]) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    pub videos: String,
    pub comments: String,
}

impl IndexNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            videos: format!("{prefix}_yt_videos"),
            comments: format!("{prefix}_yt_comments"),
        }
    }
}

pub fn video_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": {"type": "keyword"},
                "channel": {"type": "keyword"},
                "title": {"type": "text"},
                "description": {"type": "text"},
                "publication_date": {"type": "date"},
                "tags": {"type": "keyword"},
                "categories": {"type": "keyword"},
                "playlists": {"type": "keyword"},
                "duration": {"type": "integer"},
                "views": {"type": "long"},
                "likes": {"type": "long"},
                "dislikes": {"type": "long"},
                "favorites": {"type": "long"},
                "comment_count": {"type": "long"},
                "caption": {"type": "text"},
                "caption_len": {"type": "integer"},
                "users": {"type": "keyword"}
            }
        }
    })
}

pub fn comment_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "channel": {"type": "keyword"},
                "video_id": {"type": "keyword"},
                "video_title": {"type": "text"},
                "video_playlists": {"type": "keyword"},
                "classifiers": {"type": "keyword"},
                "user": {"type": "keyword"},
                "user_id": {"type": "keyword"},
                "likes": {"type": "integer"},
                "text": {"type": "text"},
                "text_len": {"type": "integer"},
                "reply_count": {"type": "integer"},
                "comment_thread": {"type": "keyword"},
                "timestamp": {"type": "date"},
                "top_level_comment": {"type": "boolean"}
            }
        }
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoDocument {
    pub id: String,
    pub channel: String,
    pub title: String,
    pub description: String,
    pub publication_date: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub playlists: Vec<String>,
    pub duration: u64,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
    pub favorites: Option<i64>,
    pub comment_count: Option<i64>,
    pub caption: Option<String>,
    pub caption_len: usize,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentDocument {
    pub video_id: String,
    pub channel: String,
    pub video_title: String,
    pub video_playlists: Vec<String>,
    pub classifiers: Option<Value>,
    pub user: String,
    pub user_id: Option<String>,
    pub text: String,
    pub text_len: usize,
    pub reply_count: i64,
    pub comment_thread: Option<String>,
    pub timestamp: String,
    pub likes: i64,
    pub top_level_comment: bool,
}

/// Extra labels per comment id, read from the project's addon directory.
#[derive(Debug, Clone, Default)]
pub struct CommentClassifiers(HashMap<String, Value>);

impl CommentClassifiers {
    /// Missing files yield an empty set.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let labels = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!("loaded comment classifiers from {}", path.display());
        Ok(Self(labels))
    }

    pub fn get(&self, comment_id: &str) -> Option<&Value> {
        self.0.get(comment_id)
    }

    pub fn insert(&mut self, comment_id: &str, labels: Value) {
        self.0.insert(comment_id.to_string(), labels);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub videos: usize,
    pub comments: usize,
    /// Comments the backend rejected inside otherwise successful bulk requests.
    pub failed_comments: usize,
}

impl IngestSummary {
    fn add(&mut self, other: IngestSummary) {
        self.videos += other.videos;
        self.comments += other.comments;
        self.failed_comments += other.failed_comments;
    }
}

/// Indexes every video and comment of one reconstructed archive.
pub fn ingest_reader<B, S>(
    backend: &mut B,
    retry: &RetryPolicy,
    indices: &IndexNames,
    channel: &str,
    reader: &ArchiveReader<S>,
    classifiers: &CommentClassifiers,
) -> Result<IngestSummary>
where
    B: SearchBackend,
    S: BlobStore,
{
    let mut summary = IngestSummary::default();
    for video in reader.videos() {
        let playlists: Vec<String> = video
            .playlists
            .iter()
            .map(|playlist| playlist.title.clone())
            .collect();
        let caption = match reader.caption(&video.id, CaptionKind::Text) {
            Ok(caption) => caption,
            Err(err) => {
                warn!("caption of {} unreadable: {err:#}", video.id);
                None
            }
        };
        let document = VideoDocument {
            id: video.id.clone(),
            channel: channel.to_string(),
            title: video.title.clone(),
            description: video.description.clone(),
            publication_date: Some(video.publication_date().to_string())
                .filter(|date| !date.is_empty()),
            tags: video.tags.clone(),
            categories: video.categories.clone(),
            playlists: playlists.clone(),
            duration: video.duration,
            views: video.views,
            likes: video.likes,
            dislikes: video.dislikes,
            favorites: video.favorites,
            comment_count: video.comment_count,
            caption_len: caption
                .as_deref()
                .map(|text| text.split_whitespace().count())
                .unwrap_or(0),
            caption,
            users: video.users().into_iter().map(str::to_string).collect(),
        };
        let document = serde_json::to_value(&document)?;
        retry.run(&format!("indexing video {}", video.id), || {
            backend.index_document(&indices.videos, &video.id, &document)
        })?;
        summary.videos += 1;

        let mut comments = Vec::with_capacity(video.comments.len());
        for comment in &video.comments {
            let document = CommentDocument {
                video_id: video.id.clone(),
                channel: channel.to_string(),
                video_title: video.title.clone(),
                video_playlists: playlists.clone(),
                classifiers: classifiers.get(&comment.id).cloned(),
                user: comment.author.clone(),
                user_id: comment.author_id.clone(),
                text: comment.text.clone(),
                text_len: comment.word_count(),
                reply_count: comment.reply_count,
                comment_thread: comment.comment_thread.clone(),
                timestamp: comment.timestamp.clone(),
                likes: comment.likes,
                top_level_comment: comment.is_top_level(),
            };
            comments.push((comment.id.clone(), serde_json::to_value(&document)?));
        }
        if !comments.is_empty() {
            let failed = retry.run(&format!("bulk indexing comments of {}", video.id), || {
                backend.bulk_index(&indices.comments, &comments)
            })?;
            if failed > 0 {
                warn!("{failed} comment(s) of {} rejected by {}", video.id, indices.comments);
            }
            summary.comments += comments.len().saturating_sub(failed);
            summary.failed_comments += failed;
        }
    }
    Ok(summary)
}

/// Rebuilds both indices and ingests `archives`, given as (channel, path).
pub fn ingest_archives<B: SearchBackend>(
    backend: &mut B,
    retry: &RetryPolicy,
    prefix: &str,
    archives: &[(String, PathBuf)],
    classifiers: &CommentClassifiers,
) -> Result<IngestSummary> {
    let indices = IndexNames::with_prefix(prefix);
    backend.recreate_index(&indices.videos, &video_mapping())?;
    backend.recreate_index(&indices.comments, &comment_mapping())?;

    let mut total = IngestSummary::default();
    for (channel, path) in archives {
        println!("Indexing {} into {}", path.display(), indices.videos);
        let reader = ArchiveReader::open(path)?;
        let summary = ingest_reader(backend, retry, &indices, channel, &reader, classifiers)?;
        info!(
            "{channel}: {} video(s), {} comment(s) indexed, {} rejected",
            summary.videos, summary.comments, summary.failed_comments
        );
        total.add(summary);
    }
    Ok(total)
}

/// Every base channel archive of the project as (channel, path).
pub fn channel_sources(paths: &ProjectPaths) -> Result<Vec<(String, PathBuf)>> {
    Ok(paths
        .channel_archives(None)?
        .into_iter()
        .map(|archive| (archive.name, archive.path))
        .collect())
}

/// The single archive of a video collection as (collection, path).
pub fn collection_sources(paths: &ProjectPaths, collection: &str) -> Result<Vec<(String, PathBuf)>> {
    let path = paths.video_collection(collection);
    if !path.is_file() {
        bail!("video collection {} does not exist", path.display());
    }
    Ok(vec![(collection.to_string(), path)])
}

#[derive(Serialize)]
struct BulkAction<'a> {
    index: BulkTarget<'a>,
}

#[derive(Serialize)]
struct BulkTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
}

/// Newline-delimited `_bulk` body indexing `documents` into `index`.
pub fn bulk_body(index: &str, documents: &[(String, Value)]) -> Result<String> {
    let mut body = String::new();
    for (id, document) in documents {
        body.push_str(&serde_json::to_string(&BulkAction {
            index: BulkTarget { index, id },
        })?);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}

/// Minimal Elasticsearch REST client.
pub struct ElasticsearchClient {
    agent: ureq::Agent,
    base_url: String,
}

impl ElasticsearchClient {
    pub fn new(url: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(120))
                .build(),
            base_url: url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn index_exists(&self, index: &str) -> Result<bool> {
        match self.agent.head(&self.url(index)).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(err) => Err(request_error(err, index)),
        }
    }
}

fn request_error(err: ureq::Error, what: &str) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            anyhow!(
                "elasticsearch request for {what} failed with HTTP {code}: {}",
                body.chars().take(300).collect::<String>()
            )
        }
        other => anyhow!(other).context(format!("elasticsearch request for {what}")),
    }
}

impl SearchBackend for ElasticsearchClient {
    fn recreate_index(&mut self, index: &str, mapping: &Value) -> Result<()> {
        if self.index_exists(index)? {
            self.agent
                .delete(&self.url(index))
                .call()
                .map_err(|err| request_error(err, index))?;
            info!("deleted index {index}");
        }
        self.agent
            .put(&self.url(index))
            .send_json(mapping.clone())
            .map_err(|err| request_error(err, index))?;
        info!("created index {index}");
        Ok(())
    }

    fn index_document(&mut self, index: &str, id: &str, document: &Value) -> Result<()> {
        self.agent
            .put(&self.url(&format!("{index}/_doc/{id}")))
            .send_json(document.clone())
            .map_err(|err| request_error(err, id))?;
        Ok(())
    }

    fn bulk_index(&mut self, index: &str, documents: &[(String, Value)]) -> Result<usize> {
        let body = bulk_body(index, documents)?;
        let response: Value = self
            .agent
            .post(&self.url("_bulk"))
            .set("Content-Type", "application/x-ndjson")
            .send_string(&body)
            .map_err(|err| request_error(err, "_bulk"))?
            .into_json()
            .context("decoding _bulk response")?;
        Ok(bulk_failures(&response))
    }
}

/// Number of items of a `_bulk` response that carry an error.
pub fn bulk_failures(response: &Value) -> usize {
    if response.get("errors").and_then(Value::as_bool) != Some(true) {
        return 0;
    }
    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return 0;
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter(|item| item.values().any(|result| result.get("error").is_some()))
        .count()
}
