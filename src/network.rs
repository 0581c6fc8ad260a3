#![forbid(unsafe_code)]

//! Relation sources for the crawler and the network build entry point.
//!
//! Channel networks follow the "related channels" boxes of channel pages;
//! video networks follow the recommendation list of watch pages. Both are
//! plain HTML scrapes, metadata comes from the Data API.

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use log::{debug, info, warn};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::api::{ChannelRef, DataApi, PageFetcher, RetryPolicy, resolve_channel_id};
use crate::archive::UPDATE_STAMP_FORMAT;
use crate::cache::SnapshotStore;
use crate::captions::watch_url;
use crate::config::NetworkSpec;
use crate::crawl::{NodeMeta, RelationCrawler, RelationSource};
use crate::graph::RelationGraph;
use crate::layout::ProjectPaths;
use crate::model::{ChannelResource, ListResponse, VideoResource};
use crate::provenance::{self, Activity, PrimarySource};

/// Search results used as seeds for query-based video networks.
pub const SEARCH_SEED_COUNT: &str = "30";

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("invalid selector {css}: {err:?}"))
}

pub fn channel_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{channel_id}")
}

/// Which related-channel sections of a channel page count as relations.
#[derive(Debug, Clone)]
pub struct SectionFilter {
    /// Also follow featured-channel sections, not just "related channels".
    pub featured: bool,
    /// Section headers that are always ignored.
    pub skip: Vec<String>,
    /// Headers of the algorithmic "related channels" sections.
    pub related: Vec<String>,
}

impl Default for SectionFilter {
    fn default() -> Self {
        Self {
            featured: false,
            skip: vec!["Popular channels".into(), "Beliebte Kanäle".into()],
            related: vec!["Related channels".into(), "Ähnliche Kanäle".into()],
        }
    }
}

impl SectionFilter {
    fn accepts(&self, header: &str) -> bool {
        let header = header.trim();
        if self.skip.iter().any(|skip| skip.eq_ignore_ascii_case(header)) {
            return false;
        }
        self.featured
            || self
                .related
                .iter()
                .any(|related| related.eq_ignore_ascii_case(header))
    }
}

/// Links found in the related-channel sections of a channel page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedLinks {
    pub available: bool,
    pub channel_ids: Vec<String>,
    pub users: Vec<String>,
}

fn first_link(item: ElementRef<'_>, link: &Selector) -> Option<String> {
    item.select(link)
        .next()
        .and_then(|anchor| anchor.value().attr("href"))
        .map(str::to_string)
}

/// Parses a channel page. Pages showing two alert boxes belong to
/// terminated or unavailable channels.
pub fn parse_related_channels(html: &str, filter: &SectionFilter) -> Result<RelatedLinks> {
    let document = Html::parse_document(html);
    let alert = selector("div.yt-alert-content")?;
    if document.select(&alert).count() >= 2 {
        return Ok(RelatedLinks::default());
    }
    let section = selector("div.branded-page-related-channels")?;
    let header = selector("h2")?;
    let item = selector("li")?;
    let link = selector("a[href]")?;

    let mut links = RelatedLinks {
        available: true,
        ..RelatedLinks::default()
    };
    for block in document.select(&section) {
        let title: String = block
            .select(&header)
            .next()
            .map(|heading| heading.text().collect())
            .unwrap_or_default();
        if !filter.accepts(&title) {
            debug!("skipping section {:?}", title.trim());
            continue;
        }
        for entry in block.select(&item) {
            let Some(href) = first_link(entry, &link) else {
                continue;
            };
            let path = href.split(['?', '#']).next().unwrap_or_default();
            if let Some(id) = path.strip_prefix("/channel/") {
                push_unique(&mut links.channel_ids, id);
            } else if let Some(user) = path.strip_prefix("/user/") {
                push_unique(&mut links.users, user);
            }
        }
    }
    Ok(links)
}

/// Video ids listed as recommendations on a watch page.
pub fn parse_recommended_videos(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let item = selector("li.related-list-item")?;
    let link = selector("a[href]")?;
    let mut ids = Vec::new();
    for entry in document.select(&item) {
        let Some(href) = first_link(entry, &link) else {
            continue;
        };
        if let Some(id) = video_id_from_href(&href) {
            push_unique(&mut ids, &id);
        }
    }
    Ok(ids)
}

/// Extracts the `v` parameter of a watch link.
pub fn video_id_from_href(href: &str) -> Option<String> {
    let (_, query) = href.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("v="))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}

fn fetch_with_retry<C: PageFetcher>(client: &C, retry: &RetryPolicy, url: &str) -> Result<String> {
    retry.run(&format!("fetching {url}"), || client.fetch_page(url))
}

fn first_item<T: serde::de::DeserializeOwned>(response: Value, what: &str) -> Result<Option<T>> {
    let parsed: ListResponse<T> =
        serde_json::from_value(response).with_context(|| format!("parsing {what}"))?;
    Ok(parsed.items.into_iter().next())
}

/// Related-channel relations scraped from channel pages.
pub struct RelatedChannels<'a, C> {
    client: &'a C,
    retry: RetryPolicy,
    delay: Duration,
    filter: SectionFilter,
}

impl<'a, C> RelatedChannels<'a, C>
where
    C: DataApi + PageFetcher,
{
    pub fn new(client: &'a C, retry: RetryPolicy, delay: Duration, filter: SectionFilter) -> Self {
        Self {
            client,
            retry,
            delay,
            filter,
        }
    }
}

impl<C> RelationSource for RelatedChannels<'_, C>
where
    C: DataApi + PageFetcher,
{
    fn relations(&mut self, id: &str) -> Result<Vec<String>> {
        let html = fetch_with_retry(self.client, &self.retry, &channel_url(id))?;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let links = parse_related_channels(&html, &self.filter)?;
        if !links.available {
            info!("channel {id} is unavailable");
            return Ok(Vec::new());
        }
        let mut related = links.channel_ids;
        for user in links.users {
            match resolve_channel_id(self.client, &self.retry, &ChannelRef::User(user.clone())) {
                Ok(Some(channel_id)) => push_unique(&mut related, &channel_id),
                Ok(None) => debug!("user {user} has no channel"),
                Err(err) => warn!("could not resolve user {user}: {err:#}"),
            }
        }
        Ok(related)
    }

    fn metadata(&mut self, id: &str) -> Result<Option<NodeMeta>> {
        let response = self.retry.run(&format!("channel {id}"), || {
            self.client
                .list("channels", &[("part", "snippet,statistics"), ("id", id)])
        })?;
        let Some(channel) = first_item::<ChannelResource>(response, "channel metadata")? else {
            return Ok(None);
        };
        let Some(statistics) = channel.statistics else {
            return Ok(None);
        };
        Ok(Some(
            NodeMeta::new(channel.snippet.title)
                .with_int("subscribers", statistics.subscriber_count.unwrap_or(0))
                .with_int("videos", statistics.video_count.unwrap_or(0))
                .with_int("views", statistics.view_count.unwrap_or(0)),
        ))
    }
}

/// Recommendation relations scraped from watch pages.
pub struct RecommendedVideos<'a, C> {
    client: &'a C,
    retry: RetryPolicy,
    delay: Duration,
}

impl<'a, C> RecommendedVideos<'a, C>
where
    C: DataApi + PageFetcher,
{
    pub fn new(client: &'a C, retry: RetryPolicy, delay: Duration) -> Self {
        Self {
            client,
            retry,
            delay,
        }
    }
}

impl<C> RelationSource for RecommendedVideos<'_, C>
where
    C: DataApi + PageFetcher,
{
    fn relations(&mut self, id: &str) -> Result<Vec<String>> {
        let html = fetch_with_retry(self.client, &self.retry, &watch_url(id))?;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        parse_recommended_videos(&html)
    }

    fn metadata(&mut self, id: &str) -> Result<Option<NodeMeta>> {
        let response = self.retry.run(&format!("video {id}"), || {
            self.client
                .list("videos", &[("part", "snippet,statistics"), ("id", id)])
        })?;
        let Some(video) = first_item::<VideoResource>(response, "video metadata")? else {
            return Ok(None);
        };
        let statistics = video.statistics.unwrap_or_default();
        Ok(Some(
            NodeMeta::new(video.snippet.title)
                .with_text("channel", video.snippet.channel_title.unwrap_or_default())
                .with_int("views", statistics.view_count.unwrap_or(0))
                .with_int("likes", statistics.like_count.unwrap_or(0))
                .with_int("dislikes", statistics.dislike_count.unwrap_or(0))
                .with_int("comments", statistics.comment_count.unwrap_or(0)),
        ))
    }
}

/// Top search results for `query`, used as crawl seeds.
pub fn search_video_ids<C: DataApi>(client: &C, retry: &RetryPolicy, query: &str) -> Result<Vec<String>> {
    let response = retry.run(&format!("search {query:?}"), || {
        client.list(
            "search",
            &[
                ("part", "id,snippet"),
                ("q", query),
                ("type", "video"),
                ("maxResults", SEARCH_SEED_COUNT),
            ],
        )
    })?;
    Ok(response
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.pointer("/id/videoId").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

/// Crawls with `source`, resolves metadata, and writes the pruned graph.
pub fn crawl_to_graph<R: RelationSource>(
    source: &mut R,
    relations: &mut SnapshotStore<Vec<String>>,
    metadata: &mut SnapshotStore<NodeMeta>,
    seeds: &[String],
    depth: usize,
) -> Result<RelationGraph> {
    let mut crawler = RelationCrawler::new(relations, metadata);
    let outcome = crawler.crawl(source, seeds, depth)?;
    crawler.save()?;
    let resolved = crawler.resolve_metadata(source, &outcome.visited)?;
    crawler.save()?;
    info!("resolved metadata for {resolved} new node(s)");
    let edges = crawler.resolved_edges(&outcome);
    Ok(RelationGraph::from_edges(&edges, crawler.metadata()))
}

/// Builds the network named `name` and returns the GraphML path.
pub fn build_network<C>(
    client: &C,
    retry: RetryPolicy,
    scrape_delay: Duration,
    paths: &ProjectPaths,
    name: &str,
    spec: &NetworkSpec,
) -> Result<PathBuf>
where
    C: DataApi + PageFetcher,
{
    let (graph, output, description) = match spec {
        NetworkSpec::Channels {
            seeds,
            featured,
            depth,
            skip_sections,
        } => {
            let mut seed_ids = Vec::new();
            for seed in seeds {
                match resolve_channel_id(client, &retry, &ChannelRef::parse(seed)?)? {
                    Some(id) => seed_ids.push(id),
                    None => warn!("could not resolve seed {seed}"),
                }
            }
            let suffix = if *featured { "_f" } else { "" };
            let mut relations = SnapshotStore::load(
                &paths
                    .channel_networks
                    .join(format!("channel_relations{suffix}.json")),
            )?;
            let mut metadata = SnapshotStore::load(
                &paths
                    .channel_networks
                    .join(format!("channel_metadata{suffix}.json")),
            )?;
            let mut filter = SectionFilter {
                featured: *featured,
                ..SectionFilter::default()
            };
            if let Some(skip) = skip_sections {
                filter.skip = skip.clone();
            }
            let mut source = RelatedChannels::new(client, retry, scrape_delay, filter);
            let graph = crawl_to_graph(&mut source, &mut relations, &mut metadata, &seed_ids, *depth)?;
            let stamp = Local::now().format(UPDATE_STAMP_FORMAT);
            let output = paths
                .channel_networks
                .join(format!("{name}_{stamp}.graphml"));
            let description = format!(
                "Related channel network {name} from {} seed(s), depth {depth}, featured {featured}",
                seed_ids.len()
            );
            (graph, output, description)
        }
        NetworkSpec::Videos { q, seeds, depth } => {
            let mut seed_ids = seeds.clone();
            if let Some(query) = q.as_deref().filter(|query| !query.trim().is_empty()) {
                for id in search_video_ids(client, &retry, query)? {
                    push_unique(&mut seed_ids, &id);
                }
            }
            let mut relations =
                SnapshotStore::load(&paths.video_networks.join("video_relations.json"))?;
            let mut metadata =
                SnapshotStore::load(&paths.video_networks.join("video_metadata.json"))?;
            let mut source = RecommendedVideos::new(client, retry, scrape_delay);
            let graph = crawl_to_graph(&mut source, &mut relations, &mut metadata, &seed_ids, *depth)?;
            let output = paths.video_networks.join(format!("{name}.graphml"));
            let description = format!(
                "Video recommendation network {name} from {} seed(s), depth {depth}",
                seed_ids.len()
            );
            (graph, output, description)
        }
    };

    let activity = Activity::begin("network", description).with_primary_source(PrimarySource::youtube());
    graph.save_graphml(&output)?;
    provenance::record(&output, activity)?;
    info!(
        "{name}: {} node(s), {} edge(s) written to {}",
        graph.node_count(),
        graph.edge_count(),
        output.display()
    );
    Ok(output)
}
