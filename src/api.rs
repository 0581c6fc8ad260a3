#![forbid(unsafe_code)]

//! Thin access layer for the YouTube Data API v3 and plain page fetches.
//!
//! Everything that talks to the network goes through [`DataApi`] or
//! [`PageFetcher`] so the fetchers and crawlers can be driven by canned
//! responses in tests.

use anyhow::{Context, Result, anyhow, bail};
use log::warn;
use serde_json::Value;
use std::thread;
use std::time::Duration;

pub const API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const USER_AGENT: &str = concat!("ytharvest/", env!("CARGO_PKG_VERSION"));
/// Attempts per call before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// One `list` call against the Data API. `params` exclude the API key.
pub trait DataApi {
    fn list(&self, resource: &str, params: &[(&str, &str)]) -> Result<Value>;
}

/// Fetches a web page as text.
pub trait PageFetcher {
    fn fetch_page(&self, url: &str) -> Result<String>;
}

/// Uniform capped retry used at every call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Runs `call` until it succeeds or the attempts are used up. The last
    /// error is returned with `label` attached.
    pub fn run<T>(&self, label: &str, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => {
                    return Err(err.context(format!("{label}: giving up after {attempts} attempt(s)")));
                }
                Err(err) => {
                    warn!("{label}: attempt {attempt}/{attempts} failed: {err:#}");
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Follows `nextPageToken` until the API stops returning one, collecting the
/// `items` of every page. Each page request is retried on its own.
pub fn collect_pages(
    retry: &RetryPolicy,
    label: &str,
    mut fetch_page: impl FnMut(Option<&str>) -> Result<Value>,
) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = retry.run(label, || fetch_page(token.as_deref()))?;
        if let Some(page_items) = page.get("items").and_then(Value::as_array) {
            items.extend(page_items.iter().cloned());
        }
        match page.get("nextPageToken").and_then(Value::as_str) {
            Some(next) if !next.is_empty() => token = Some(next.to_string()),
            _ => break,
        }
    }
    Ok(items)
}

/// Convenience wrapper: paginated `list` call with the standard token param.
pub fn list_all<A: DataApi + ?Sized>(
    api: &A,
    retry: &RetryPolicy,
    resource: &str,
    params: &[(&str, &str)],
) -> Result<Vec<Value>> {
    let label = format!("{resource} {}", describe_params(params));
    collect_pages(retry, &label, |token| {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        if let Some(token) = token {
            query.push(("pageToken", token));
        }
        api.list(resource, &query)
    })
}

fn describe_params(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .filter(|(key, _)| *key != "part" && *key != "maxResults")
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// How a channel is referenced in the fetch list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Id(String),
    User(String),
    Handle(String),
}

impl ChannelRef {
    /// Accepts `channel/<id>`, `user/<name>`, `@handle`, full channel URLs
    /// and bare channel ids.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_end_matches('/');
        let path = trimmed
            .split_once("youtube.com/")
            .map(|(_, rest)| rest)
            .unwrap_or(trimmed);
        if let Some(id) = path.strip_prefix("channel/") {
            return Ok(Self::Id(id.to_string()));
        }
        if let Some(name) = path.strip_prefix("user/") {
            return Ok(Self::User(name.to_string()));
        }
        if let Some(handle) = path.strip_prefix('@') {
            return Ok(Self::Handle(format!("@{handle}")));
        }
        if path.is_empty() || path.contains('/') {
            bail!("unrecognized channel reference {raw:?}");
        }
        Ok(Self::Id(path.to_string()))
    }
}

/// Resolves a channel reference to its channel id. `None` when the API
/// does not know the user or handle.
pub fn resolve_channel_id<A: DataApi + ?Sized>(
    api: &A,
    retry: &RetryPolicy,
    channel: &ChannelRef,
) -> Result<Option<String>> {
    let (key, value) = match channel {
        ChannelRef::Id(id) => return Ok(Some(id.clone())),
        ChannelRef::User(name) => ("forUsername", name.as_str()),
        ChannelRef::Handle(handle) => ("forHandle", handle.as_str()),
    };
    let response = retry.run(&format!("resolving {value}"), || {
        api.list("channels", &[("part", "id"), (key, value)])
    })?;
    Ok(response
        .get("items")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

/// ureq-backed client for both the Data API and page scraping.
pub struct YoutubeClient {
    agent: ureq::Agent,
    api_key: String,
    base_url: String,
}

impl YoutubeClient {
    pub fn new(api_key: &str, proxy: Option<&str>) -> Result<Self> {
        let mut builder = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT);
        if let Some(proxy) = proxy.filter(|proxy| !proxy.trim().is_empty()) {
            let proxy = ureq::Proxy::new(proxy_url(proxy))
                .with_context(|| format!("invalid proxy {proxy}"))?;
            builder = builder.proxy(proxy);
        }
        Ok(Self {
            agent: builder.build(),
            api_key: api_key.to_string(),
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Points the client at a different API root, e.g. a local mock.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

/// Bare `host:port` proxies are treated as SOCKS5.
fn proxy_url(proxy: &str) -> String {
    let proxy = proxy.trim();
    if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("socks5://{proxy}")
    }
}

impl DataApi for YoutubeClient {
    fn list(&self, resource: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{resource}", self.base_url);
        let mut request = self.agent.get(&url).query("key", &self.api_key);
        for (key, value) in params {
            request = request.query(key, value);
        }
        match request.call() {
            Ok(response) => response
                .into_json::<Value>()
                .with_context(|| format!("decoding {resource} response")),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(anyhow!(
                    "{resource} request failed with HTTP {code}: {}",
                    body.chars().take(300).collect::<String>()
                ))
            }
            Err(err) => Err(anyhow!(err).context(format!("requesting {resource}"))),
        }
    }
}

impl PageFetcher for YoutubeClient {
    fn fetch_page(&self, url: &str) -> Result<String> {
        match self.agent.get(url).set("Accept-Language", "en-US,en;q=0.8").call() {
            Ok(response) => response
                .into_string()
                .with_context(|| format!("reading body of {url}")),
            Err(ureq::Error::Status(code, _)) => bail!("{url} returned HTTP {code}"),
            Err(err) => Err(anyhow!(err).context(format!("fetching {url}"))),
        }
    }
}
