#![forbid(unsafe_code)]

//! Pulls channel and video data from YouTube into archives.
//!
//! Fetching is resumable: anything already present in the target archive is
//! not requested again. Per-video failures (comments, captions, a single
//! metadata call) are logged and skipped; failing to list a channel's
//! uploads aborts that channel only.

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::api::{ChannelRef, DataApi, PageFetcher, RetryPolicy, list_all, resolve_channel_id};
use crate::archive::{ZipArchive, update_archive_path};
use crate::captions::{caption_text, extract_caption_url, watch_url};
use crate::layout::{ProjectPaths, entry, sanitize_file_stem};
use crate::model::{ChannelResource, CommentThread, ListResponse, VideoResource};
use crate::provenance::{self, Activity, PrimarySource};
use crate::reader::ArchiveReader;
use crate::store::{BlobStore, MemoryStore};

const CHANNEL_PARTS: &str = "contentDetails,snippet,statistics,topicDetails,brandingSettings";
const VIDEO_PARTS: &str = "id,recordingDetails,snippet,statistics,status,topicDetails,contentDetails";

/// Which optional pieces to fetch per video.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub comments: bool,
    pub captions: bool,
    /// Leave archives that already exist untouched.
    pub skip_existing: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            comments: true,
            captions: true,
            skip_existing: true,
        }
    }
}

/// Fetch driver bound to one client and retry policy.
pub struct Harvester<'a, C> {
    client: &'a C,
    retry: RetryPolicy,
    scrape_delay: Duration,
}

impl<'a, C> Harvester<'a, C>
where
    C: DataApi + PageFetcher,
{
    pub fn new(client: &'a C, retry: RetryPolicy, scrape_delay: Duration) -> Self {
        Self {
            client,
            retry,
            scrape_delay,
        }
    }

    pub fn client(&self) -> &'a C {
        self.client
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    fn list_once(&self, resource: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.retry
            .run(&format!("{resource} request"), || self.client.list(resource, params))
    }

    fn pause(&self) {
        if !self.scrape_delay.is_zero() {
            thread::sleep(self.scrape_delay);
        }
    }

    /// Raw `channels.list` response plus its first item, or `None` for
    /// unknown channels.
    pub fn channel_resource(&self, channel_id: &str) -> Result<Option<(Value, ChannelResource)>> {
        let response = self.list_once("channels", &[("part", CHANNEL_PARTS), ("id", channel_id)])?;
        let parsed: ListResponse<ChannelResource> = serde_json::from_value(response.clone())
            .with_context(|| format!("parsing channel {channel_id}"))?;
        Ok(parsed
            .items
            .into_iter()
            .next()
            .map(|channel| (response, channel)))
    }

    /// Video ids of an uploads playlist, newest first as the API lists them.
    pub fn upload_ids(&self, playlist_id: &str) -> Result<Vec<String>> {
        let items = list_all(
            self.client,
            &self.retry,
            "playlistItems",
            &[
                ("part", "snippet"),
                ("playlistId", playlist_id),
                ("maxResults", "50"),
            ],
        )?;
        Ok(items
            .iter()
            .filter_map(|item| {
                item.pointer("/snippet/resourceId/videoId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect())
    }

    /// Fetches and stores `video_meta/<id>.json`. Returns `false` when the
    /// video is unknown to the API.
    pub fn fetch_video_meta<S: BlobStore>(&self, store: &mut S, video_id: &str) -> Result<bool> {
        let key = entry::video_meta(video_id);
        if store.contains(&key) {
            return Ok(true);
        }
        let response = self.list_once("videos", &[("part", VIDEO_PARTS), ("id", video_id)])?;
        let known = response
            .get("items")
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty());
        if !known {
            warn!("video {video_id} is not available; no metadata stored");
            return Ok(false);
        }
        store.put_json(&key, &response)?;
        Ok(true)
    }

    /// Stores the comment threads of a video and, for threads with more
    /// replies than the API inlines, the complete reply lists.
    pub fn fetch_comments<S: BlobStore>(&self, store: &mut S, video_id: &str) -> Result<()> {
        let threads_key = entry::comment_threads(video_id);
        if store.contains(&threads_key) {
            return Ok(());
        }
        let threads = match list_all(
            self.client,
            &self.retry,
            "commentThreads",
            &[
                ("part", "snippet,replies"),
                ("videoId", video_id),
                ("maxResults", "100"),
                ("textFormat", "plainText"),
            ],
        ) {
            Ok(threads) => threads,
            Err(err) => {
                warn!("skipping comments of {video_id}: {err:#}");
                return Ok(());
            }
        };
        if threads.is_empty() {
            debug!("video {video_id} has no comments");
            return Ok(());
        }

        let mut replies: HashMap<String, Vec<Value>> = HashMap::new();
        for raw in &threads {
            let thread: CommentThread = match serde_json::from_value(raw.clone()) {
                Ok(thread) => thread,
                Err(err) => {
                    warn!("unexpected comment thread shape for {video_id}: {err}");
                    continue;
                }
            };
            if !thread.needs_reply_fetch() {
                continue;
            }
            match list_all(
                self.client,
                &self.retry,
                "comments",
                &[
                    ("part", "snippet"),
                    ("parentId", thread.id.as_str()),
                    ("maxResults", "100"),
                    ("textFormat", "plainText"),
                ],
            ) {
                Ok(thread_replies) => {
                    replies.insert(thread.id.clone(), thread_replies);
                }
                Err(err) => warn!("skipping replies of thread {}: {err:#}", thread.id),
            }
        }

        store.put_json(&threads_key, &threads)?;
        store.put_json(&entry::comment_replies(video_id), &replies)?;
        Ok(())
    }

    /// Scrapes the caption track of a video and stores it as XML and text.
    pub fn fetch_captions<S: BlobStore>(&self, store: &mut S, video_id: &str) -> Result<()> {
        let xml_key = entry::caption(video_id, "xml");
        if store.contains(&xml_key) {
            return Ok(());
        }
        let page_url = watch_url(video_id);
        let page = match self
            .retry
            .run(&format!("watch page {video_id}"), || self.client.fetch_page(&page_url))
        {
            Ok(page) => page,
            Err(err) => {
                warn!("skipping captions of {video_id}: {err:#}");
                return Ok(());
            }
        };
        let Some(track_url) = extract_caption_url(&page) else {
            debug!("video {video_id} has no caption track");
            self.pause();
            return Ok(());
        };
        let xml = match self
            .retry
            .run(&format!("caption track {video_id}"), || self.client.fetch_page(&track_url))
        {
            Ok(xml) => xml,
            Err(err) => {
                warn!("skipping captions of {video_id}: {err:#}");
                return Ok(());
            }
        };
        let text = caption_text(&xml)?;
        store.put_text(&xml_key, &xml)?;
        store.put_text(&entry::caption(video_id, "txt"), &text)?;
        self.pause();
        Ok(())
    }

    /// Metadata, then optionally comments and captions of one video.
    pub fn fetch_video<S: BlobStore>(
        &self,
        store: &mut S,
        video_id: &str,
        options: FetchOptions,
    ) -> Result<()> {
        match self.fetch_video_meta(store, video_id) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(err) => {
                warn!("skipping video {video_id}: {err:#}");
                return Ok(());
            }
        }
        if options.comments {
            self.fetch_comments(store, video_id)?;
        }
        if options.captions {
            self.fetch_captions(store, video_id)?;
        }
        Ok(())
    }

    fn fetch_channel_comments<S: BlobStore>(&self, store: &mut S, channel_id: &str) -> Result<()> {
        if store.contains(entry::CHANNEL_COMMENTS) {
            return Ok(());
        }
        match list_all(
            self.client,
            &self.retry,
            "commentThreads",
            &[
                ("part", "snippet,replies"),
                ("allThreadsRelatedToChannelId", channel_id),
                ("maxResults", "100"),
                ("textFormat", "plainText"),
            ],
        ) {
            Ok(threads) if threads.is_empty() => Ok(()),
            Ok(threads) => store.put_json(entry::CHANNEL_COMMENTS, &threads),
            Err(err) => {
                warn!("skipping channel comments of {channel_id}: {err:#}");
                Ok(())
            }
        }
    }

    fn fetch_playlists<S: BlobStore>(&self, store: &mut S, channel_id: &str) -> Result<()> {
        let playlists = match store.get_json::<Vec<Value>>(entry::PLAYLISTS)? {
            Some(playlists) => playlists,
            None => {
                let playlists = match list_all(
                    self.client,
                    &self.retry,
                    "playlists",
                    &[
                        ("part", "snippet"),
                        ("channelId", channel_id),
                        ("maxResults", "50"),
                    ],
                ) {
                    Ok(playlists) => playlists,
                    Err(err) => {
                        warn!("skipping playlists of {channel_id}: {err:#}");
                        return Ok(());
                    }
                };
                store.put_json(entry::PLAYLISTS, &playlists)?;
                playlists
            }
        };

        for playlist in &playlists {
            let Some(playlist_id) = playlist.get("id").and_then(Value::as_str) else {
                continue;
            };
            let key = entry::playlist_items(playlist_id);
            if store.contains(&key) {
                continue;
            }
            match list_all(
                self.client,
                &self.retry,
                "playlistItems",
                &[
                    ("part", "snippet"),
                    ("playlistId", playlist_id),
                    ("maxResults", "50"),
                ],
            ) {
                Ok(items) => store.put_json(&key, &items)?,
                Err(err) => warn!("skipping items of playlist {playlist_id}: {err:#}"),
            }
        }
        Ok(())
    }

    /// Fills `store` with everything known about a channel. Returns the
    /// video ids the archive covers.
    pub fn fetch_channel_into<S: BlobStore>(
        &self,
        store: &mut S,
        response: &Value,
        channel: &ChannelResource,
        options: FetchOptions,
    ) -> Result<Vec<String>> {
        if options.comments {
            self.fetch_channel_comments(store, &channel.id)?;
        }
        self.fetch_playlists(store, &channel.id)?;
        if !store.contains(entry::CHANNEL_META) {
            store.put_json(entry::CHANNEL_META, response)?;
        }

        // An interrupted run resumes on the id list it already committed to;
        // videos uploaded since then belong in an update archive.
        let video_ids = match store.get_json::<Vec<String>>(entry::VIDEO_IDS)? {
            Some(ids) => ids,
            None => {
                let uploads = channel
                    .uploads_playlist()
                    .with_context(|| format!("channel {} has no uploads playlist", channel.id))?;
                let ids = self.upload_ids(uploads)?;
                store.put_json(entry::VIDEO_IDS, &ids)?;
                ids
            }
        };

        for (position, video_id) in video_ids.iter().enumerate() {
            debug!(
                "{}: video {}/{} ({video_id})",
                channel.snippet.title,
                position + 1,
                video_ids.len()
            );
            self.fetch_video(store, video_id, options)?;
        }
        Ok(video_ids)
    }

    /// Writes every video that is new or whose comment count changed since
    /// the reconstructed state into `diff`. Returns the ids written.
    pub fn collect_updates<R: BlobStore, S: BlobStore>(
        &self,
        current: &ArchiveReader<R>,
        upload_ids: &[String],
        diff: &mut S,
        options: FetchOptions,
    ) -> Result<Vec<String>> {
        let mut updated = Vec::new();
        for video_id in upload_ids {
            let response =
                match self.list_once("videos", &[("part", VIDEO_PARTS), ("id", video_id.as_str())]) {
                    Ok(response) => response,
                    Err(err) => {
                        warn!("skipping update check of {video_id}: {err:#}");
                        continue;
                    }
                };
            let parsed: ListResponse<VideoResource> = match serde_json::from_value(response.clone()) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("skipping update check of {video_id}: unreadable metadata: {err}");
                    continue;
                }
            };
            let Some(fresh) = parsed.items.first() else {
                continue;
            };
            let fresh_count = fresh
                .statistics
                .as_ref()
                .and_then(|statistics| statistics.comment_count);
            if let Some(known) = current.video(video_id)
                && known.comment_count == fresh_count
            {
                continue;
            }

            diff.put_json(&entry::video_meta(video_id), &response)?;
            if options.comments {
                self.fetch_comments(diff, video_id)?;
            }
            if options.captions {
                self.fetch_captions(diff, video_id)?;
            }
            updated.push(video_id.clone());
        }
        if !updated.is_empty() {
            diff.put_json(entry::VIDEO_IDS, &updated)?;
        }
        Ok(updated)
    }
}

/// Fetches one channel of the fetch list into `channels/<group>/`.
/// Returns the archive path, or `None` when the channel was skipped.
pub fn fetch_channel<C>(
    harvester: &Harvester<'_, C>,
    paths: &ProjectPaths,
    group: &str,
    reference: &str,
    options: FetchOptions,
) -> Result<Option<PathBuf>>
where
    C: DataApi + PageFetcher,
{
    let channel_ref = ChannelRef::parse(reference)?;
    let Some(channel_id) = resolve_channel_id(harvester.client(), harvester.retry(), &channel_ref)?
    else {
        warn!("could not resolve channel {reference}");
        return Ok(None);
    };
    let Some((response, channel)) = harvester.channel_resource(&channel_id)? else {
        warn!("channel {reference} ({channel_id}) is not available");
        return Ok(None);
    };

    let title = channel.snippet.title.clone();
    let path = paths
        .channel_group(group)
        .join(format!("{}.zip", sanitize_file_stem(&title)));
    if path.exists() && options.skip_existing {
        info!("{title}: archive exists, skipping");
        return Ok(None);
    }

    let activity = Activity::begin(
        "fetch_channel",
        format!("Fetched metadata, comments and captions of YouTube channel {title} ({channel_id})"),
    )
    .with_primary_source(PrimarySource::youtube());
    let mut archive = ZipArchive::open(&path)?;
    let video_ids = harvester.fetch_channel_into(&mut archive, &response, &channel, options)?;
    provenance::record(&path, activity)?;
    info!("{title}: {} video(s) in {}", video_ids.len(), path.display());
    Ok(Some(path))
}

/// Fetches a list of videos into `videos/<name>.zip`.
pub fn fetch_video_collection<C>(
    harvester: &Harvester<'_, C>,
    paths: &ProjectPaths,
    name: &str,
    video_ids: &[String],
    options: FetchOptions,
) -> Result<Option<PathBuf>>
where
    C: DataApi + PageFetcher,
{
    let path = paths.video_collection(name);
    if path.exists() && options.skip_existing {
        info!("{name}: collection exists, skipping");
        return Ok(None);
    }
    let activity = Activity::begin(
        "fetch_videos",
        format!("Fetched {} YouTube video(s) for collection {name}", video_ids.len()),
    )
    .with_primary_source(PrimarySource::youtube());
    let mut archive = ZipArchive::open(&path)?;
    if !archive.contains(entry::VIDEO_IDS) {
        archive.put_json(entry::VIDEO_IDS, video_ids)?;
    }
    for video_id in video_ids {
        harvester.fetch_video(&mut archive, video_id, options)?;
    }
    provenance::record(&path, activity)?;
    Ok(Some(path))
}

/// Writes an update archive next to `base` with everything that changed.
/// Changes are staged in memory; the archive only appears on disk once
/// there is something to write, and a failed write removes it again.
pub fn update_channel<C>(
    harvester: &Harvester<'_, C>,
    base: &Path,
    options: FetchOptions,
) -> Result<Option<PathBuf>>
where
    C: DataApi + PageFetcher,
{
    let current = ArchiveReader::open(base)?;
    let channel = current
        .channel()?
        .with_context(|| format!("{} has no channel metadata", base.display()))?;
    let uploads = channel
        .uploads_playlist()
        .with_context(|| format!("channel {} has no uploads playlist", channel.id))?;
    let upload_ids = harvester.upload_ids(uploads)?;

    let activity = Activity::begin(
        "update_channel",
        format!("Fetched changed videos of YouTube channel {}", channel.snippet.title),
    )
    .with_source(base)
    .with_primary_source(PrimarySource::youtube());
    let mut staged = MemoryStore::new(format!("update of {}", base.display()));
    let updated = harvester.collect_updates(&current, &upload_ids, &mut staged, options)?;
    if updated.is_empty() {
        info!("{}: no changes", channel.snippet.title);
        return Ok(None);
    }

    let diff_path = update_archive_path(base)?;
    if diff_path.exists() {
        bail!("update archive {} already exists", diff_path.display());
    }
    if let Err(err) = write_staged(&staged, &diff_path) {
        if let Err(cleanup) = fs::remove_file(&diff_path) {
            warn!("could not remove partial {}: {cleanup}", diff_path.display());
        }
        return Err(err);
    }
    provenance::record(&diff_path, activity)?;
    info!(
        "{}: {} changed video(s) in {}",
        channel.snippet.title,
        updated.len(),
        diff_path.display()
    );
    Ok(Some(diff_path))
}

fn write_staged(staged: &MemoryStore, path: &Path) -> Result<()> {
    let mut archive = ZipArchive::open(path)?;
    for key in staged.keys() {
        if let Some(data) = staged.get(&key)? {
            archive.put(&key, &data)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{FakeApi, FakePages, no_retry};
    use serde_json::json;
    use tempfile::tempdir;

    struct FakeClient {
        api: FakeApi,
        pages: FakePages,
    }

    impl DataApi for FakeClient {
        fn list(&self, resource: &str, params: &[(&str, &str)]) -> Result<Value> {
            self.api.list(resource, params)
        }
    }

    impl PageFetcher for FakeClient {
        fn fetch_page(&self, url: &str) -> Result<String> {
            self.pages.fetch_page(url)
        }
    }

    fn video(id: &str, comments: u32) -> Value {
        json!({"items": [{
            "id": id,
            "snippet": {"title": format!("Video {id}"), "publishedAt": "2021-01-01T00:00:00Z"},
            "statistics": {"commentCount": comments.to_string()}
        }]})
    }

    fn thread(id: &str, replies: i64) -> Value {
        json!({
            "id": id,
            "snippet": {
                "topLevelComment": {"id": id, "snippet": {"authorDisplayName": "alice", "textOriginal": "hi"}},
                "totalReplyCount": replies
            }
        })
    }

    fn client() -> FakeClient {
        let mut api = FakeApi::default();
        api.respond(
            "channels",
            "UC1",
            vec![json!({"items": [{
                "id": "UC1",
                "snippet": {"title": "Test Channel"},
                "contentDetails": {"relatedPlaylists": {"uploads": "UU1"}}
            }]})],
        );
        api.respond(
            "playlistItems",
            "UU1",
            vec![
                json!({"items": [{"snippet": {"resourceId": {"videoId": "v1"}}}]}),
                json!({"items": [{"snippet": {"resourceId": {"videoId": "v2"}}}]}),
            ],
        );
        api.respond("videos", "v1", vec![video("v1", 3)]);
        api.respond("videos", "v2", vec![video("v2", 0)]);
        api.respond(
            "commentThreads",
            "v1",
            vec![
                json!({"items": [thread("t1", 0)]}),
                json!({"items": [thread("t2", 7)]}),
            ],
        );
        api.respond(
            "comments",
            "t2",
            vec![json!({"items": [{"id": "t2.r1", "snippet": {"authorDisplayName": "bob"}}]})],
        );
        api.respond(
            "playlists",
            "UC1",
            vec![json!({"items": [{"id": "PL1", "snippet": {"title": "Favourites"}}]})],
        );
        api.respond(
            "playlistItems",
            "PL1",
            vec![json!({"items": [{"snippet": {"resourceId": {"videoId": "v2"}}}]})],
        );
        let mut pages = FakePages::default();
        pages.serve(
            &watch_url("v1"),
            r#"{"captionTracks":[{"baseUrl":"https://captions.test/v1"}]}"#,
        );
        pages.serve(
            "https://captions.test/v1",
            r#"<transcript><text start="1">hello</text></transcript>"#,
        );
        pages.serve(&watch_url("v2"), "<html></html>");
        FakeClient { api, pages }
    }

    fn options() -> FetchOptions {
        FetchOptions::default()
    }

    #[test]
    fn channel_fetch_fills_archive_layout() -> Result<()> {
        let client = client();
        let harvester = Harvester::new(&client, no_retry(), Duration::ZERO);
        let (response, channel) = harvester.channel_resource("UC1")?.unwrap();
        let mut store = MemoryStore::new("channel");
        let ids = harvester.fetch_channel_into(&mut store, &response, &channel, options())?;
        assert_eq!(ids, vec!["v1", "v2"]);

        for key in [
            entry::CHANNEL_META,
            entry::VIDEO_IDS,
            entry::PLAYLISTS,
            "playlists/PL1.json",
            "video_meta/v1.json",
            "video_meta/v2.json",
            "video_comments/v1_threads.json",
            "video_comments/v1_comments.json",
            "video_captions/v1.xml",
            "video_captions/v1.txt",
        ] {
            assert!(store.contains(key), "missing {key}");
        }
        assert!(!store.contains("video_comments/v2_threads.json"));
        assert!(!store.contains("video_captions/v2.txt"));
        assert_eq!(
            store.get_text("video_captions/v1.txt")?.as_deref(),
            Some("hello")
        );
        let replies: HashMap<String, Vec<Value>> =
            store.get_json("video_comments/v1_comments.json")?.unwrap();
        assert_eq!(replies["t2"].len(), 1);

        let reader = ArchiveReader::from_stores(store, Vec::new())?;
        let v1 = reader.video("v1").unwrap();
        assert_eq!(v1.comments.len(), 3);
        assert_eq!(reader.video("v2").unwrap().playlists[0].title, "Favourites");
        Ok(())
    }

    #[test]
    fn refetch_skips_present_entries() -> Result<()> {
        let client = client();
        let harvester = Harvester::new(&client, no_retry(), Duration::ZERO);
        let mut store = MemoryStore::new("videos");
        harvester.fetch_video(&mut store, "v1", options())?;
        let calls = client.api.call_count("videos");
        harvester.fetch_video(&mut store, "v1", options())?;
        assert_eq!(client.api.call_count("videos"), calls);
        assert_eq!(client.api.call_count("commentThreads"), 2);
        Ok(())
    }

    #[test]
    fn comment_failures_do_not_abort_the_video() -> Result<()> {
        let client = client();
        client.api.fail("commentThreads", 1);
        let harvester = Harvester::new(&client, no_retry(), Duration::ZERO);
        let mut store = MemoryStore::new("videos");
        harvester.fetch_video(&mut store, "v1", options())?;
        assert!(store.contains("video_meta/v1.json"));
        assert!(!store.contains("video_comments/v1_threads.json"));
        assert!(store.contains("video_captions/v1.txt"));
        Ok(())
    }

    #[test]
    fn updates_only_carry_changed_videos() -> Result<()> {
        let mut base = MemoryStore::new("base");
        base.put_json(entry::VIDEO_IDS, &json!(["v1", "v2"]))?;
        base.put_json(&entry::video_meta("v1"), &video("v1", 1))?;
        base.put_json(&entry::video_meta("v2"), &video("v2", 0))?;
        let current = ArchiveReader::from_stores(base, Vec::new())?;

        let mut client = client();
        client.api.respond("videos", "v3", vec![video("v3", 0)]);
        let harvester = Harvester::new(&client, no_retry(), Duration::ZERO);
        let uploads = vec!["v3".to_string(), "v2".to_string(), "v1".to_string()];
        let no_extras = FetchOptions {
            comments: false,
            captions: false,
            skip_existing: true,
        };
        let mut diff = MemoryStore::new("diff");
        let updated = harvester.collect_updates(&current, &uploads, &mut diff, no_extras)?;
        assert_eq!(updated, vec!["v3", "v1"]);
        let ids: Vec<String> = diff.get_json(entry::VIDEO_IDS)?.unwrap();
        assert_eq!(ids, updated);
        assert!(!diff.contains("video_meta/v2.json"));
        Ok(())
    }

    #[test]
    fn fetch_channel_writes_archive_and_provenance() -> Result<()> {
        let dir = tempdir()?;
        let paths = ProjectPaths::new(dir.path());
        let client = client();
        let harvester = Harvester::new(&client, no_retry(), Duration::ZERO);
        let path = fetch_channel(&harvester, &paths, "main", "channel/UC1", options())?.unwrap();
        assert_eq!(path, paths.channel_group("main").join("Test Channel.zip"));
        assert!(provenance::sidecar_path(&path).exists());
        assert!(fetch_channel(&harvester, &paths, "main", "channel/UC1", options())?.is_none());
        assert!(fetch_channel(&harvester, &paths, "main", "channel/UCmissing", options())?.is_none());

        // Nothing changed since the fetch: no update archive survives.
        assert!(update_channel(&harvester, &path, options())?.is_none());
        let leftovers = crate::archive::discover_update_archives(&path)?;
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn update_skips_unreadable_videos_and_writes_complete_archive() -> Result<()> {
        let dir = tempdir()?;
        let paths = ProjectPaths::new(dir.path());
        let mut client = client();
        let path = {
            let harvester = Harvester::new(&client, no_retry(), Duration::ZERO);
            fetch_channel(&harvester, &paths, "main", "channel/UC1", options())?.unwrap()
        };

        client.api.respond("videos", "v1", vec![video("v1", 5)]);
        client
            .api
            .respond("videos", "v2", vec![json!({"items": [{"snippet": {}}]})]);
        let harvester = Harvester::new(&client, no_retry(), Duration::ZERO);
        let diff_path = update_channel(&harvester, &path, options())?.unwrap();

        let updates = crate::archive::discover_update_archives(&path)?;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].file_name(), diff_path.file_name());
        let diff = ZipArchive::open_existing(&diff_path)?;
        let ids: Vec<String> = diff.get_json(entry::VIDEO_IDS)?.unwrap();
        assert_eq!(ids, vec!["v1"]);
        assert!(!diff.contains("video_meta/v2.json"));

        let reader = ArchiveReader::open(&path)?;
        assert_eq!(reader.video("v1").unwrap().comment_count, Some(5));
        assert!(reader.video("v2").is_some());
        Ok(())
    }

    #[test]
    fn write_staged_copies_every_entry() -> Result<()> {
        let dir = tempdir()?;
        let mut staged = MemoryStore::new("staged");
        staged.put_json(entry::VIDEO_IDS, &json!(["v1"]))?;
        staged.put_text(&entry::caption("v1", "txt"), "hello")?;
        let path = dir.path().join("Chan_2020-01-01T00-00-00.zip");
        write_staged(&staged, &path)?;
        let archive = ZipArchive::open_existing(&path)?;
        assert_eq!(archive.keys(), staged.keys());
        assert_eq!(archive.get_text("video_captions/v1.txt")?.as_deref(), Some("hello"));
        Ok(())
    }
}
