#![forbid(unsafe_code)]

//! Channel and commenter statistics over reconstructed archives.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::archive::ZipArchive;
use crate::layout::{ProjectPaths, entry};
use crate::provenance::{self, Activity};
use crate::reader::ArchiveReader;
use crate::store::BlobStore;

pub const CHANNEL_STATS_FILE: &str = "channel_stats.csv";
pub const TOTAL_ROW: &str = "Total";

/// Dense ranks with the largest value ranked 1. Ties share a rank and the
/// next distinct value gets the next integer.
pub fn dense_rank<T: Ord>(values: &[T]) -> Vec<usize> {
    let mut distinct: Vec<&T> = values.iter().collect();
    distinct.sort_by(|a, b| b.cmp(a));
    distinct.dedup();
    values
        .iter()
        .map(|value| {
            distinct
                .binary_search_by(|probe| value.cmp(probe))
                .map(|position| position + 1)
                .unwrap_or(0)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelTotals {
    pub title: String,
    pub videos: i64,
    pub comments: i64,
}

impl ChannelTotals {
    pub fn from_reader<S: BlobStore>(title: &str, reader: &ArchiveReader<S>) -> Self {
        Self {
            title: title.to_string(),
            videos: reader.videos().len() as i64,
            comments: reader
                .videos()
                .iter()
                .filter_map(|video| video.comment_count)
                .sum(),
        }
    }
}

/// Appends the `Total` row.
pub fn with_total(mut rows: Vec<ChannelTotals>) -> Vec<ChannelTotals> {
    let total = ChannelTotals {
        title: TOTAL_ROW.to_string(),
        videos: rows.iter().map(|row| row.videos).sum(),
        comments: rows.iter().map(|row| row.comments).sum(),
    };
    rows.push(total);
    rows
}

pub fn write_channel_totals(path: &Path, rows: &[ChannelTotals]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Writes `analysis/channel_stats.csv` for every base channel archive.
pub fn channel_stats(paths: &ProjectPaths) -> Result<PathBuf> {
    paths.prepare()?;
    let archives = paths.channel_archives(None)?;
    let mut activity = Activity::begin(
        "analysis_channel_stats",
        format!(
            "videos and comments per channel in {}",
            paths.channels.display()
        ),
    );
    let mut rows = Vec::with_capacity(archives.len() + 1);
    for archive in &archives {
        let reader = ArchiveReader::open(&archive.path)?;
        let totals = ChannelTotals::from_reader(&archive.name, &reader);
        info!(
            "{}: {} video(s), {} comment(s)",
            totals.title, totals.videos, totals.comments
        );
        rows.push(totals);
        activity = activity.with_source(&archive.path);
    }
    let rows = with_total(rows);
    let output = paths.analysis.join(CHANNEL_STATS_FILE);
    write_channel_totals(&output, &rows)?;
    provenance::record(&output, activity)?;
    Ok(output)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstComment {
    pub timestamp: String,
    pub video: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelActivity {
    pub comments: usize,
    pub first_comment: FirstComment,
}

/// Everything known about one commenter across all channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub id: String,
    pub names: Vec<String>,
    pub total_comments: usize,
    pub text_len_average: f64,
    pub text_len_median: f64,
    pub comment_stats: BTreeMap<String, ChannelActivity>,
    pub first_comment_channel: String,
    pub first_comment_date: String,
    pub first_comment_video: String,
    pub last_comment_channel: String,
    pub last_comment_date: String,
    pub last_comment_video: String,
    pub total_replies: i64,
    pub replies_per_comments: f64,
    pub comment_count_rank: usize,
    pub reply_count_rank: usize,
}

impl UserStats {
    pub fn display_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone)]
struct CommentRecord {
    channel: String,
    video: String,
    author: String,
    words: usize,
    timestamp: String,
    reply_count: i64,
}

/// Collects comments per author id; comments without one are ignored.
#[derive(Debug, Default)]
pub struct UserStatsBuilder {
    comments: BTreeMap<String, Vec<CommentRecord>>,
}

impl UserStatsBuilder {
    pub fn add_channel<S: BlobStore>(&mut self, channel: &str, reader: &ArchiveReader<S>) {
        for (video, comment) in reader.all_comments() {
            let Some(author_id) = comment.author_id.as_deref().filter(|id| !id.is_empty()) else {
                continue;
            };
            self.comments
                .entry(author_id.to_string())
                .or_default()
                .push(CommentRecord {
                    channel: channel.to_string(),
                    video: video.id.clone(),
                    author: comment.author.clone(),
                    words: comment.word_count(),
                    timestamp: comment.timestamp.clone(),
                    reply_count: comment.reply_count,
                });
        }
    }

    pub fn user_count(&self) -> usize {
        self.comments.len()
    }

    pub fn build(self) -> BTreeMap<String, UserStats> {
        let mut users: BTreeMap<String, UserStats> = self
            .comments
            .into_iter()
            .filter_map(|(id, mut comments)| {
                comments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
                summarize(id, &comments).map(|stats| (stats.id.clone(), stats))
            })
            .collect();

        let comment_ranks = dense_rank(
            &users
                .values()
                .map(|user| user.total_comments)
                .collect::<Vec<_>>(),
        );
        let reply_ranks = dense_rank(
            &users
                .values()
                .map(|user| user.total_replies)
                .collect::<Vec<_>>(),
        );
        for ((user, comment_rank), reply_rank) in
            users.values_mut().zip(comment_ranks).zip(reply_ranks)
        {
            user.comment_count_rank = comment_rank;
            user.reply_count_rank = reply_rank;
        }
        users
    }
}

/// `comments` must be sorted by timestamp.
fn summarize(id: String, comments: &[CommentRecord]) -> Option<UserStats> {
    let (first, last) = (comments.first()?, comments.last()?);
    let mut lengths: Vec<usize> = comments.iter().map(|comment| comment.words).collect();
    lengths.sort_unstable();

    let mut comment_stats: BTreeMap<String, ChannelActivity> = BTreeMap::new();
    for comment in comments {
        comment_stats
            .entry(comment.channel.clone())
            .and_modify(|activity| activity.comments += 1)
            .or_insert_with(|| ChannelActivity {
                comments: 1,
                first_comment: FirstComment {
                    timestamp: comment.timestamp.clone(),
                    video: comment.video.clone(),
                },
            });
    }

    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for comment in comments {
        if seen.insert(comment.author.as_str()) {
            names.push(comment.author.clone());
        }
    }

    let total_replies: i64 = comments.iter().map(|comment| comment.reply_count).sum();
    Some(UserStats {
        id,
        names,
        total_comments: comments.len(),
        text_len_average: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
        text_len_median: median(&lengths),
        comment_stats,
        first_comment_channel: first.channel.clone(),
        first_comment_date: first.timestamp.clone(),
        first_comment_video: first.video.clone(),
        last_comment_channel: last.channel.clone(),
        last_comment_date: last.timestamp.clone(),
        last_comment_video: last.video.clone(),
        total_replies,
        replies_per_comments: total_replies as f64 / comments.len() as f64,
        comment_count_rank: 0,
        reply_count_rank: 0,
    })
}

/// Median of sorted values; the mean of the middle pair for even lengths.
fn median(sorted: &[usize]) -> f64 {
    match sorted.len() {
        0 => 0.0,
        len if len % 2 == 1 => sorted[len / 2] as f64,
        len => (sorted[len / 2 - 1] + sorted[len / 2]) as f64 / 2.0,
    }
}

pub fn user_stats_path(paths: &ProjectPaths, project_name: &str) -> PathBuf {
    paths
        .analysis
        .join(format!("{project_name}_user_stats.zip"))
}

/// Builds the commenter dataset from every base channel archive and stores
/// it as `user_stats.json` in a fresh zip.
pub fn user_stats(paths: &ProjectPaths, project_name: &str) -> Result<PathBuf> {
    paths.prepare()?;
    let archives = paths.channel_archives(None)?;
    let mut activity = Activity::begin(
        "build_user_stats",
        format!(
            "user stats from youtube channels in {}",
            paths.channels.display()
        ),
    );
    let mut builder = UserStatsBuilder::default();
    for archive in &archives {
        let reader = ArchiveReader::open(&archive.path)?;
        builder.add_channel(&archive.name, &reader);
        activity = activity.with_source(&archive.path);
    }
    info!(
        "building stats for {} user(s) from {} channel(s)",
        builder.user_count(),
        archives.len()
    );
    let users = builder.build();

    let output = user_stats_path(paths, project_name);
    let mut store = ZipArchive::create(&output)?;
    store.put_json(entry::USER_STATS, &users)?;
    provenance::record(&output, activity)?;
    Ok(output)
}

/// A list of commenters, e.g. everyone who commented on one channel.
#[derive(Debug, Clone)]
pub struct UserList {
    pub name: String,
    users: Vec<UserStats>,
}

impl UserList {
    pub fn new(name: impl Into<String>, users: Vec<UserStats>) -> Self {
        Self {
            name: name.into(),
            users,
        }
    }

    /// Loads the full list from a user stats archive.
    pub fn load(path: &Path) -> Result<Self> {
        let store = ZipArchive::open_existing(path)
            .with_context(|| format!("user stats file {} not found", path.display()))?;
        let users: BTreeMap<String, UserStats> = store
            .get_json(entry::USER_STATS)?
            .with_context(|| format!("{} has no {}", path.display(), entry::USER_STATS))?;
        Ok(Self::new("all", users.into_values().collect()))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserStats> {
        self.users.iter()
    }

    /// Users that commented at least once on `channel`.
    pub fn for_channel(&self, channel: &str) -> Self {
        Self::new(
            channel,
            self.users
                .iter()
                .filter(|user| user.comment_stats.contains_key(channel))
                .cloned()
                .collect(),
        )
    }

    /// Users whose very first comment was on this list's channel.
    pub fn first_commenters(&self) -> impl Iterator<Item = &UserStats> {
        self.users
            .iter()
            .filter(|user| user.first_comment_channel == self.name)
    }

    /// Users present in this list and every one of `others`, sorted by name.
    pub fn intersect(&self, others: &[&UserList]) -> Self {
        let mut ids: BTreeSet<&str> = self.users.iter().map(|user| user.id.as_str()).collect();
        for other in others {
            let other_ids: HashSet<&str> = other.users.iter().map(|user| user.id.as_str()).collect();
            ids.retain(|id| other_ids.contains(id));
        }
        let mut users: Vec<UserStats> = self
            .users
            .iter()
            .filter(|user| ids.contains(user.id.as_str()))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        Self::new("intersection", users)
    }

    /// Number of distinct ids per display name, most shared first. Ties are
    /// ordered by name.
    pub fn common_user_names(&self, limit: Option<usize>) -> Vec<(String, usize)> {
        let mut ids_by_name: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for user in &self.users {
            for name in &user.names {
                ids_by_name
                    .entry(name.as_str())
                    .or_default()
                    .insert(user.id.as_str());
            }
        }
        let mut counts: Vec<(String, usize)> = ids_by_name
            .into_iter()
            .map(|(name, ids)| (name.to_string(), ids.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.truncate(limit.unwrap_or(usize::MAX));
        counts
    }
}
