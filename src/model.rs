#![forbid(unsafe_code)]

//! Domain types and the slices of YouTube Data API payloads we read back out
//! of archives.
//!
//! Archives store raw API responses; the `*Resource` structs here only
//! declare the fields the analysis code needs, everything else is ignored.
//! Counts arrive as strings (`"viewCount": "1234"`) and are parsed leniently.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

/// Threads with more replies than this only carry a truncated inline list;
/// the full list is stored separately.
pub const INLINE_REPLY_LIMIT: i64 = 5;

static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("valid duration pattern")
});

/// Accepts both `"123"` and `123`; anything unparseable becomes `None`.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(value)) => Some(value),
        Some(Raw::Float(value)) => Some(value as i64),
        Some(Raw::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

/// `{"items": [...], "nextPageToken": "..."}` wrapper shared by list calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub channel_title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentDetails {
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatistics {
    #[serde(default, deserialize_with = "lenient_count")]
    pub view_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub like_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub dislike_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub favorite_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub comment_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDetails {
    #[serde(default)]
    pub topic_categories: Vec<String>,
}

/// One item of a `videos.list` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResource {
    pub id: String,
    #[serde(default)]
    pub snippet: VideoSnippet,
    #[serde(default)]
    pub content_details: Option<ContentDetails>,
    #[serde(default)]
    pub statistics: Option<VideoStatistics>,
    #[serde(default)]
    pub topic_details: Option<TopicDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorChannelId {
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSnippet {
    #[serde(default)]
    pub author_display_name: String,
    #[serde(default)]
    pub author_channel_id: Option<AuthorChannelId>,
    #[serde(default)]
    pub text_original: String,
    #[serde(default)]
    pub text_display: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default, deserialize_with = "lenient_count")]
    pub like_count: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// A single comment as returned by the API, top-level or reply.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentResource {
    pub id: String,
    #[serde(default)]
    pub snippet: CommentSnippet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnippet {
    pub top_level_comment: CommentResource,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_reply_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadReplies {
    #[serde(default)]
    pub comments: Vec<CommentResource>,
}

/// One item of a `commentThreads.list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentThread {
    pub id: String,
    pub snippet: ThreadSnippet,
    #[serde(default)]
    pub replies: Option<ThreadReplies>,
}

impl CommentThread {
    pub fn total_reply_count(&self) -> i64 {
        self.snippet.total_reply_count.unwrap_or(0)
    }

    /// Whether the inline reply list is truncated and the full list has to
    /// be fetched separately.
    pub fn needs_reply_fetch(&self) -> bool {
        self.total_reply_count() > INLINE_REPLY_LIMIT
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Titled {
    #[serde(default)]
    pub title: String,
}

/// One item of a `playlists.list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistResource {
    pub id: String,
    #[serde(default)]
    pub snippet: Titled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemSnippet {
    pub resource_id: ResourceId,
}

/// One item of a `playlistItems.list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItemResource {
    pub snippet: PlaylistItemSnippet,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatistics {
    #[serde(default, deserialize_with = "lenient_count")]
    pub view_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub subscriber_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub video_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelatedPlaylists {
    #[serde(default)]
    pub uploads: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelContentDetails {
    #[serde(default)]
    pub related_playlists: RelatedPlaylists,
}

/// One item of a `channels.list` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResource {
    pub id: String,
    #[serde(default)]
    pub snippet: Titled,
    #[serde(default)]
    pub content_details: Option<ChannelContentDetails>,
    #[serde(default)]
    pub statistics: Option<ChannelStatistics>,
}

impl ChannelResource {
    pub fn uploads_playlist(&self) -> Option<&str> {
        self.content_details
            .as_ref()
            .and_then(|details| details.related_playlists.uploads.as_deref())
    }
}

/// A playlist the video belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub video_ids: Vec<String>,
}

impl Playlist {
    pub fn contains(&self, video_id: &str) -> bool {
        self.video_ids.iter().any(|id| id == video_id)
    }

    pub fn to_ref(&self) -> PlaylistRef {
        PlaylistRef {
            id: self.id.clone(),
            title: self.title.clone(),
        }
    }
}

/// A flattened comment: top-level comments and replies look the same.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub reply_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_thread: Option<String>,
    pub timestamp: String,
    pub likes: i64,
}

impl Comment {
    pub fn from_resource(resource: &CommentResource, reply_count: i64) -> Self {
        let snippet = &resource.snippet;
        let text = if snippet.text_original.is_empty() {
            snippet.text_display.clone()
        } else {
            snippet.text_original.clone()
        };
        Self {
            id: resource.id.clone(),
            author: snippet.author_display_name.clone(),
            author_id: snippet
                .author_channel_id
                .as_ref()
                .map(|channel| channel.value.clone()),
            text,
            parent_id: snippet.parent_id.clone(),
            reply_count,
            comment_thread: comment_thread(&resource.id, reply_count),
            timestamp: snippet.published_at.clone(),
            likes: snippet.like_count.unwrap_or(0),
        }
    }

    /// Replies carry `threadId.replyId` identifiers.
    pub fn is_top_level(&self) -> bool {
        !self.id.contains('.')
    }

    /// Whitespace separated word count of the text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Thread id for a comment: the part before the first `.` when the comment
/// is a reply or starts a thread with replies, otherwise none.
pub fn comment_thread(comment_id: &str, reply_count: i64) -> Option<String> {
    if reply_count > 0 || comment_id.contains('.') {
        comment_id
            .split('.')
            .next()
            .map(|thread| thread.trim().to_string())
    } else {
        None
    }
}

/// Flattens comment threads into a single ordered comment list.
///
/// Each thread yields its top-level comment (with the total reply count),
/// followed by its replies. Threads above [`INLINE_REPLY_LIMIT`] take their
/// replies from `replies`, falling back to the truncated inline list.
pub fn flatten_threads(
    threads: &[CommentThread],
    replies: &HashMap<String, Vec<CommentResource>>,
) -> Vec<Comment> {
    let mut comments = Vec::new();
    for thread in threads {
        comments.push(Comment::from_resource(
            &thread.snippet.top_level_comment,
            thread.total_reply_count(),
        ));
        let inline = thread
            .replies
            .as_ref()
            .map(|replies| replies.comments.as_slice())
            .unwrap_or_default();
        let thread_replies = if thread.needs_reply_fetch() {
            match replies.get(&thread.id) {
                Some(full) => full.as_slice(),
                None => {
                    log::debug!("no stored replies for thread {}; using inline list", thread.id);
                    inline
                }
            }
        } else {
            inline
        };
        comments.extend(
            thread_replies
                .iter()
                .map(|reply| Comment::from_resource(reply, 0)),
        );
    }
    comments
}

/// Parses `PT#H#M#S` style durations into seconds. Missing units count as 0,
/// unparseable input yields 0.
pub fn parse_duration(token: &str) -> u64 {
    let Some(time_part) = token.rsplit('T').next() else {
        return 0;
    };
    let days = token
        .strip_prefix('P')
        .and_then(|rest| rest.split_once('D'))
        .and_then(|(days, _)| days.parse::<u64>().ok())
        .unwrap_or(0);
    let Some(captures) = DURATION_PART.captures(time_part) else {
        return days.saturating_mul(86_400);
    };
    let unit = |index: usize| {
        captures
            .get(index)
            .and_then(|value| value.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    days.saturating_mul(86_400)
        .saturating_add(unit(1).saturating_mul(3600))
        .saturating_add(unit(2).saturating_mul(60))
        .saturating_add(unit(3))
}

/// A video reconstructed from archive entries.
#[derive(Debug, Clone, Serialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub duration: u64,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub dislikes: Option<i64>,
    pub favorites: Option<i64>,
    pub comment_count: Option<i64>,
    pub comments: Vec<Comment>,
    pub playlists: Vec<PlaylistRef>,
}

impl Video {
    pub fn from_resource(resource: &VideoResource) -> Self {
        let statistics = resource.statistics.clone().unwrap_or_default();
        Self {
            id: resource.id.clone(),
            title: resource.snippet.title.clone(),
            description: resource.snippet.description.clone(),
            published_at: resource.snippet.published_at.clone(),
            duration: resource
                .content_details
                .as_ref()
                .and_then(|details| details.duration.as_deref())
                .map(parse_duration)
                .unwrap_or(0),
            tags: resource.snippet.tags.clone(),
            categories: resource
                .topic_details
                .as_ref()
                .map(|details| details.topic_categories.clone())
                .unwrap_or_default(),
            views: statistics.view_count,
            likes: statistics.like_count,
            dislikes: statistics.dislike_count,
            favorites: statistics.favorite_count,
            comment_count: statistics.comment_count,
            comments: Vec::new(),
            playlists: Vec::new(),
        }
    }

    /// `YYYY-MM-DD` part of the publication timestamp.
    pub fn publication_date(&self) -> &str {
        self.published_at.get(..10).unwrap_or(&self.published_at)
    }

    /// Comment count per author name, most active first. Ties keep the
    /// order in which authors first commented.
    pub fn comment_stats(&self) -> Vec<(String, usize)> {
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for comment in &self.comments {
            let count = counts.entry(comment.author.as_str()).or_insert(0);
            if *count == 0 {
                order.push(comment.author.clone());
            }
            *count += 1;
        }
        let mut stats: Vec<(String, usize)> = order
            .into_iter()
            .map(|author| {
                let count = counts.get(author.as_str()).copied().unwrap_or(0);
                (author, count)
            })
            .collect();
        stats.sort_by(|a, b| b.1.cmp(&a.1));
        stats
    }

    /// Distinct comment author names.
    pub fn users(&self) -> BTreeSet<&str> {
        self.comments
            .iter()
            .map(|comment| comment.author.as_str())
            .collect()
    }

    pub fn comments_by_user<'a>(&'a self, author: &'a str) -> impl Iterator<Item = &'a Comment> {
        self.comments
            .iter()
            .filter(move |comment| comment.author == author)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|candidate| candidate == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(id: &str, author: &str, parent: Option<&str>) -> CommentResource {
        serde_json::from_value(json!({
            "id": id,
            "snippet": {
                "authorDisplayName": author,
                "authorChannelId": {"value": format!("UC_{author}")},
                "textOriginal": format!("text of {id}"),
                "publishedAt": "2020-01-01T00:00:00Z",
                "likeCount": 2,
                "parentId": parent,
            }
        }))
        .unwrap()
    }

    fn thread(id: &str, total: i64, inline: Vec<CommentResource>) -> CommentThread {
        CommentThread {
            id: id.to_string(),
            snippet: ThreadSnippet {
                top_level_comment: resource(id, "alice", None),
                total_reply_count: Some(total),
            },
            replies: Some(ThreadReplies { comments: inline }),
        }
    }

    #[test]
    fn comment_thread_derivation() {
        assert_eq!(comment_thread("123.456", 0).as_deref(), Some("123"));
        assert_eq!(comment_thread("123", 0), None);
        assert_eq!(comment_thread("123", 4).as_deref(), Some("123"));
    }

    #[test]
    fn parse_duration_handles_missing_units() {
        assert_eq!(parse_duration("PT1H2M3S"), 3723);
        assert_eq!(parse_duration("PT2M3S"), 123);
        assert_eq!(parse_duration("PT45S"), 45);
        assert_eq!(parse_duration("PT1H"), 3600);
        assert_eq!(parse_duration("P1DT1S"), 86_401);
        assert_eq!(parse_duration("garbage"), 0);
    }

    #[test]
    fn parse_duration_saturates_huge_values() {
        assert_eq!(parse_duration("PT18446744073709551615H"), u64::MAX);
        assert_eq!(parse_duration("P18446744073709551615DT1S"), u64::MAX);
        assert_eq!(parse_duration("PT9999999999999999M1S"), u64::MAX);
    }

    #[test]
    fn statistics_accept_string_counts() {
        let video: VideoResource = serde_json::from_value(json!({
            "id": "vid",
            "snippet": {"title": "T", "publishedAt": "2019-05-04T10:00:00Z", "tags": ["a"]},
            "contentDetails": {"duration": "PT10M"},
            "statistics": {"viewCount": "1200", "likeCount": 7, "commentCount": "x"},
            "topicDetails": {"topicCategories": ["https://en.wikipedia.org/wiki/Music"]}
        }))
        .unwrap();
        let video = Video::from_resource(&video);
        assert_eq!(video.views, Some(1200));
        assert_eq!(video.likes, Some(7));
        assert_eq!(video.comment_count, None);
        assert_eq!(video.dislikes, None);
        assert_eq!(video.duration, 600);
        assert_eq!(video.publication_date(), "2019-05-04");
        assert!(video.has_tag("a"));
        assert!(video.has_category("https://en.wikipedia.org/wiki/Music"));
    }

    #[test]
    fn flatten_uses_inline_replies_for_short_threads() {
        let threads = vec![thread(
            "t1",
            2,
            vec![
                resource("t1.r1", "bob", Some("t1")),
                resource("t1.r2", "carol", Some("t1")),
            ],
        )];
        let comments = flatten_threads(&threads, &HashMap::new());
        assert_eq!(comments.len(), 3);
        assert_eq!(comments[0].reply_count, 2);
        assert_eq!(comments[0].comment_thread.as_deref(), Some("t1"));
        assert!(comments[0].is_top_level());
        assert_eq!(comments[1].reply_count, 0);
        assert_eq!(comments[1].comment_thread.as_deref(), Some("t1"));
        assert_eq!(comments[1].parent_id.as_deref(), Some("t1"));
        assert_eq!(comments[2].author_id.as_deref(), Some("UC_carol"));
    }

    #[test]
    fn flatten_prefers_stored_replies_for_long_threads() {
        let threads = vec![thread("t1", 7, vec![resource("t1.r1", "bob", Some("t1"))])];
        let full: Vec<CommentResource> = (0..7)
            .map(|index| resource(&format!("t1.r{index}"), "dave", Some("t1")))
            .collect();
        let mut replies = HashMap::new();
        replies.insert("t1".to_string(), full);
        let comments = flatten_threads(&threads, &replies);
        assert_eq!(comments.len(), 8);
        assert!(comments[1..].iter().all(|comment| comment.author == "dave"));

        let fallback = flatten_threads(&threads, &HashMap::new());
        assert_eq!(fallback.len(), 2);
    }

    #[test]
    fn comment_stats_orders_by_count() {
        let threads = vec![
            thread("t1", 0, vec![]),
            thread(
                "t2",
                2,
                vec![resource("t2.a", "bob", None), resource("t2.b", "bob", None)],
            ),
            thread("t3", 0, vec![]),
        ];
        let mut video = Video::from_resource(
            &serde_json::from_value(json!({"id": "v", "snippet": {}})).unwrap(),
        );
        video.comments = flatten_threads(&threads, &HashMap::new());
        assert_eq!(
            video.comment_stats(),
            vec![("alice".to_string(), 3), ("bob".to_string(), 2)]
        );
        assert_eq!(video.users().into_iter().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(video.comments_by_user("bob").count(), 2);
    }
}
