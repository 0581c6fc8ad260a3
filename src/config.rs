#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::api::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy};
use crate::layout::ProjectPaths;
use crate::search_index::DEFAULT_ELASTICSEARCH_URL;

pub const DEFAULT_CONFIG_PATH: &str = "harvest.toml";
pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PROJECT_NAME: &str = "ytharvest_project";
pub const DEFAULT_INDEX_PREFIX: &str = "ytharvest";
pub const DEFAULT_SCRAPE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_CRAWL_DEPTH: usize = 1;

pub const API_KEY_VAR: &str = "YOUTUBE_API_KEY";
pub const PROJECT_DIR_VAR: &str = "HARVEST_PROJECT_DIR";
pub const PROXY_VAR: &str = "HARVEST_PROXY";
pub const ELASTICSEARCH_URL_VAR: &str = "ELASTICSEARCH_URL";

const CONFIG_TEMPLATE: &str = r#"[project]
name = "ytharvest_project"
dir = "data"

[youtube]
# YOUTUBE_API_KEY in .env or the environment takes precedence.
api_key = ""

[network]
# host:port is treated as a SOCKS5 proxy.
proxy = ""
scrape_delay_ms = 1000

[search]
url = "http://localhost:9200"
prefix = "ytharvest"

[retry]
max_attempts = 15
delay_ms = 2000

[fetch.channels]
# main = ["user/pythonselkanHD", "channel/UCT6iAerLNE-0J1S_E97UAuQ"]

[fetch.videos]
# picks = ["Fg1EvKUhZw4"]

# [networks.mgs]
# type = "videos"
# q = "metal gear solid"
# depth = 1
#
# [networks.yongyea]
# type = "channels"
# seeds = ["channel/UCT6iAerLNE-0J1S_E97UAuQ", "user/pythonselkanHD"]
# featured = false
# depth = 5
"#;

fn default_depth() -> usize {
    DEFAULT_CRAWL_DEPTH
}

/// One `[networks.<name>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NetworkSpec {
    Channels {
        seeds: Vec<String>,
        #[serde(default)]
        featured: bool,
        #[serde(default = "default_depth")]
        depth: usize,
        /// Replaces the default list of ignored section headers.
        #[serde(default, rename = "skip")]
        skip_sections: Option<Vec<String>>,
    },
    Videos {
        #[serde(default)]
        q: Option<String>,
        #[serde(default)]
        seeds: Vec<String>,
        #[serde(default = "default_depth")]
        depth: usize,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub name: Option<String>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct YoutubeSection {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub proxy: Option<String>,
    pub scrape_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub url: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub channels: BTreeMap<String, Vec<String>>,
    pub videos: BTreeMap<String, Vec<String>>,
}

/// Raw contents of `harvest.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarvestFile {
    pub project: ProjectSection,
    pub youtube: YoutubeSection,
    pub network: NetworkSection,
    pub search: SearchSection,
    pub retry: RetrySection,
    pub fetch: FetchSection,
    pub networks: BTreeMap<String, NetworkSpec>,
}

impl HarvestFile {
    /// A missing file is an empty configuration.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Parsing {}", path.display()))
    }
}

/// Fully resolved settings of one harvesting project.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub project_name: String,
    pub project_dir: PathBuf,
    /// Only commands that talk to YouTube need it; see [`HarvestConfig::require_api_key`].
    pub api_key: Option<String>,
    pub proxy: Option<String>,
    pub search_url: String,
    pub index_prefix: String,
    pub retry: RetryPolicy,
    pub scrape_delay: Duration,
    pub channel_groups: BTreeMap<String, Vec<String>>,
    pub video_groups: BTreeMap<String, Vec<String>>,
    pub networks: BTreeMap<String, NetworkSpec>,
}

impl HarvestConfig {
    pub fn paths(&self) -> ProjectPaths {
        ProjectPaths::new(&self.project_dir)
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{API_KEY_VAR} not set and [youtube] api_key is empty"))
    }

    pub fn network(&self, name: &str) -> Result<&NetworkSpec> {
        self.networks
            .get(name)
            .ok_or_else(|| anyhow!("no config for network <{name}>"))
    }

    /// Channel groups to fetch: all of them, or just `group`.
    pub fn channel_groups(&self, group: Option<&str>) -> Result<Vec<(&str, &[String])>> {
        select_groups(&self.channel_groups, group, "channel")
    }

    pub fn video_groups(&self, group: Option<&str>) -> Result<Vec<(&str, &[String])>> {
        select_groups(&self.video_groups, group, "video")
    }
}

fn select_groups<'a>(
    groups: &'a BTreeMap<String, Vec<String>>,
    group: Option<&str>,
    kind: &str,
) -> Result<Vec<(&'a str, &'a [String])>> {
    match group {
        None | Some("all") => Ok(groups
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.as_slice()))
            .collect()),
        Some(name) => {
            let (name, entries) = groups
                .get_key_value(name)
                .ok_or_else(|| anyhow!("no {kind} group <{name}> in the fetch config"))?;
            Ok(vec![(name.as_str(), entries.as_slice())])
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project_dir: Option<PathBuf>,
    pub api_key: Option<String>,
    pub proxy: Option<String>,
    pub env_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

impl ConfigOverrides {
    fn config_path(&self) -> &Path {
        self.config_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH))
    }

    fn env_path(&self) -> &Path {
        self.env_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH))
    }
}

pub fn load_config(overrides: ConfigOverrides) -> Result<HarvestConfig> {
    let file = HarvestFile::read(overrides.config_path())?;
    let file_vars = read_env_file(overrides.env_path())?;
    build_config_with_overrides(file, &file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_config(
    file: HarvestFile,
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<HarvestConfig> {
    build_config_with_overrides(file, file_vars, env_lookup, ConfigOverrides::default())
}

/// Precedence: override, process environment, `.env`, `harvest.toml`,
/// built-in default. Blank values count as unset.
fn build_config_with_overrides(
    file: HarvestFile,
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> Result<HarvestConfig> {
    let api_key = non_blank(overrides.api_key)
        .or_else(|| lookup_value(API_KEY_VAR, file_vars, &env_lookup))
        .or_else(|| non_blank(file.youtube.api_key));
    let project_dir = overrides
        .project_dir
        .map(|path| path.to_string_lossy().into_owned())
        .and_then(|value| non_blank(Some(value)))
        .or_else(|| lookup_value(PROJECT_DIR_VAR, file_vars, &env_lookup))
        .or_else(|| non_blank(file.project.dir.map(|dir| dir.to_string_lossy().into_owned())))
        .ok_or_else(|| anyhow!("{PROJECT_DIR_VAR} not set and [project] dir is empty"))?;
    let proxy = non_blank(overrides.proxy)
        .or_else(|| lookup_value(PROXY_VAR, file_vars, &env_lookup))
        .or_else(|| non_blank(file.network.proxy));
    let search_url = lookup_value(ELASTICSEARCH_URL_VAR, file_vars, &env_lookup)
        .or_else(|| non_blank(file.search.url))
        .unwrap_or_else(|| DEFAULT_ELASTICSEARCH_URL.to_string());

    let retry = RetryPolicy {
        max_attempts: file
            .retry
            .max_attempts
            .filter(|attempts| *attempts > 0)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS),
        delay: file
            .retry
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RETRY_DELAY),
    };

    Ok(HarvestConfig {
        project_name: non_blank(file.project.name)
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
        project_dir: PathBuf::from(project_dir),
        api_key,
        proxy,
        search_url,
        index_prefix: non_blank(file.search.prefix)
            .unwrap_or_else(|| DEFAULT_INDEX_PREFIX.to_string()),
        retry,
        scrape_delay: file
            .network
            .scrape_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SCRAPE_DELAY),
        channel_groups: file.fetch.channels,
        video_groups: file.fetch.videos,
        networks: file.networks,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

/// Writes the `harvest.toml` template (never over an existing file), stores
/// `api_key` in the env file and creates the project directories. Returns
/// the project root.
pub fn init_project(overrides: &ConfigOverrides, api_key: Option<&str>) -> Result<PathBuf> {
    let config_path = overrides.config_path();
    if config_path.exists() {
        println!("Keeping existing {}", config_path.display());
    } else {
        if let Some(parent) = config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating {}", parent.display()))?;
        }
        fs::write(config_path, CONFIG_TEMPLATE)
            .with_context(|| format!("Writing {}", config_path.display()))?;
        println!("Wrote {}", config_path.display());
    }

    if let Some(key) = api_key.filter(|key| !key.trim().is_empty()) {
        upsert_env_value(overrides.env_path(), API_KEY_VAR, key.trim())?;
        println!("Stored {API_KEY_VAR} in {}", overrides.env_path().display());
    }

    let file = HarvestFile::read(config_path)?;
    let root = overrides
        .project_dir
        .clone()
        .or(file.project.dir)
        .filter(|dir| !dir.as_os_str().is_empty())
        .with_context(|| format!("[project] dir missing in {}", config_path.display()))?;
    ProjectPaths::new(&root).prepare()?;
    Ok(root)
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .map(unescape_quoted)
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| value.to_string());
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

/// Reverses the escaping applied by [`upsert_env_value`].
fn unescape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(next) = chars.next()
        {
            out.push(next);
            continue;
        }
        out.push(c);
    }
    out
}

/// Updates or appends a single env var inside the target file while preserving
/// unrelated lines and comments.
pub fn upsert_env_value(path: &Path, key: &str, value: &str) -> Result<()> {
    if let Some(parent) = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }

    let raw = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?
    } else {
        String::new()
    };
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    let mut updated = false;
    let mut lines: Vec<String> = raw
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let indent = &line[..line.len() - trimmed.len()];
            let (prefix, rest) = match trimmed.strip_prefix("export ") {
                Some(stripped) => ("export ", stripped),
                None => ("", trimmed),
            };
            match rest.split_once('=') {
                Some((candidate, _)) if candidate.trim() == key => {
                    updated = true;
                    format!("{indent}{prefix}{key}=\"{escaped}\"")
                }
                _ => line.to_string(),
            }
        })
        .collect();
    if !updated {
        lines.push(format!("{key}=\"{escaped}\""));
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, lines.join("\n") + "\n")
        .with_context(|| format!("Writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("Replacing {}", path.display()))?;
    Ok(())
}

/// Fails early on a network entry that can never produce a graph.
pub fn validate_network(name: &str, spec: &NetworkSpec) -> Result<()> {
    match spec {
        NetworkSpec::Channels { seeds, .. } if seeds.is_empty() => {
            bail!("network <{name}> has no seeds")
        }
        NetworkSpec::Videos { q, seeds, .. }
            if seeds.is_empty() && q.as_deref().is_none_or(|q| q.trim().is_empty()) =>
        {
            bail!("network <{name}> needs seeds or a search query")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn harvest_from(contents: &str) -> HarvestFile {
        toml::from_str(contents).unwrap()
    }

    fn minimal() -> HarvestFile {
        harvest_from("[project]\ndir = \"data\"\n[youtube]\napi_key = \"toml-key\"\n")
    }

    #[test]
    fn template_parses_with_defaults() {
        let file = harvest_from(CONFIG_TEMPLATE);
        let config = build_config(file, &HashMap::new(), |key| {
            (key == API_KEY_VAR).then(|| "k".to_string())
        })
        .unwrap();
        assert_eq!(config.project_name, "ytharvest_project");
        assert_eq!(config.project_dir, PathBuf::from("data"));
        assert_eq!(config.proxy, None);
        assert_eq!(config.retry.max_attempts, 15);
        assert_eq!(config.retry.delay, Duration::from_millis(2000));
        assert_eq!(config.scrape_delay, Duration::from_millis(1000));
        assert_eq!(config.index_prefix, "ytharvest");
        assert!(config.channel_groups.is_empty());
        assert!(config.networks.is_empty());
    }

    #[test]
    fn load_config_reads_groups_and_networks() {
        let file = harvest_from(
            r#"
            [project]
            name = "souls"
            dir = "/data/souls"

            [youtube]
            api_key = "abc"

            [fetch.channels]
            main = ["user/someone", "channel/UC1"]

            [fetch.videos]
            picks = ["vid1"]

            [networks.mgs]
            type = "videos"
            q = "metal gear solid"

            [networks.related]
            type = "channels"
            seeds = ["channel/UC1"]
            featured = true
            depth = 3
            skip = ["Popular channels"]
            "#,
        );
        let config = build_config(file, &HashMap::new(), |_| None).unwrap();
        assert_eq!(config.project_name, "souls");
        assert_eq!(config.channel_groups(Some("main")).unwrap()[0].1.len(), 2);
        assert_eq!(config.channel_groups(None).unwrap().len(), 1);
        assert_eq!(
            config.video_groups(Some("picks")).unwrap()[0].1.to_vec(),
            vec!["vid1".to_string()]
        );
        assert!(config.channel_groups(Some("missing")).is_err());
        assert_eq!(
            config.network("mgs").unwrap(),
            &NetworkSpec::Videos {
                q: Some("metal gear solid".into()),
                seeds: Vec::new(),
                depth: DEFAULT_CRAWL_DEPTH,
            }
        );
        assert_eq!(
            config.network("related").unwrap(),
            &NetworkSpec::Channels {
                seeds: vec!["channel/UC1".into()],
                featured: true,
                depth: 3,
                skip_sections: Some(vec!["Popular channels".into()]),
            }
        );
        assert!(config.network("nope").is_err());
    }

    #[test]
    fn build_config_prefers_env_over_files() {
        let vars = read_env_file(make_file("YOUTUBE_API_KEY=\"dotenv-key\"\n").path()).unwrap();
        let config = build_config(minimal(), &vars, |key| {
            (key == PROJECT_DIR_VAR).then(|| "/env-dir".to_string())
        })
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("dotenv-key"));
        assert_eq!(config.project_dir, PathBuf::from("/env-dir"));

        let config = build_config(minimal(), &vars, |key| {
            (key == API_KEY_VAR).then(|| "env-key".to_string())
        })
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn build_config_override_precedence() {
        let mut vars = HashMap::new();
        vars.insert(PROXY_VAR.to_string(), "file-proxy:1080".to_string());
        let overrides = ConfigOverrides {
            project_dir: Some(PathBuf::from("/override")),
            api_key: Some("override-key".into()),
            proxy: Some("override-proxy:9050".into()),
            ..ConfigOverrides::default()
        };
        let config = build_config_with_overrides(
            minimal(),
            &vars,
            |key| (key == API_KEY_VAR).then(|| "env-key".to_string()),
            overrides,
        )
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("override-key"));
        assert_eq!(config.project_dir, PathBuf::from("/override"));
        assert_eq!(config.proxy.as_deref(), Some("override-proxy:9050"));
    }

    #[test]
    fn missing_api_key_is_fatal_only_when_required() {
        let file = harvest_from("[project]\ndir = \"data\"\n[youtube]\napi_key = \"  \"\n");
        let config = build_config(file, &HashMap::new(), |_| None).unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.paths().root, PathBuf::from("data"));
        let err = config.require_api_key().unwrap_err();
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[test]
    fn missing_project_dir_is_fatal() {
        let file = harvest_from("[youtube]\napi_key = \"k\"\n");
        let err = build_config(file, &HashMap::new(), |_| None).unwrap_err();
        assert!(err.to_string().contains(PROJECT_DIR_VAR));
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_file(
            r#"
            export YOUTUBE_API_KEY="abc"
            HARVEST_PROJECT_DIR='/data'
            HARVEST_PROXY =  "localhost:9050"
            ELASTICSEARCH_URL=http://es:9200
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("YOUTUBE_API_KEY").unwrap(), "abc");
        assert_eq!(vars.get("HARVEST_PROJECT_DIR").unwrap(), "/data");
        assert_eq!(vars.get("HARVEST_PROXY").unwrap(), "localhost:9050");
        assert_eq!(vars.get("ELASTICSEARCH_URL").unwrap(), "http://es:9200");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn upsert_env_value_replaces_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "# keys\nexport YOUTUBE_API_KEY=\"old\"\nOTHER=1\n").unwrap();
        upsert_env_value(&path, API_KEY_VAR, "new \"quoted\"").unwrap();
        upsert_env_value(&path, PROXY_VAR, "localhost:9050").unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("# keys\nexport YOUTUBE_API_KEY="));
        assert!(raw.contains("OTHER=1"));
        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars.get(API_KEY_VAR).unwrap(), "new \"quoted\"");
        assert_eq!(vars.get(PROXY_VAR).unwrap(), "localhost:9050");
    }

    #[test]
    fn init_project_writes_template_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(dir.path().join("harvest.toml")),
            env_path: Some(dir.path().join(".env")),
            project_dir: Some(dir.path().join("data")),
            ..ConfigOverrides::default()
        };
        let root = init_project(&overrides, Some("secret")).unwrap();
        assert!(root.join("channels").is_dir());
        assert!(root.join("addon").is_dir());
        let vars = read_env_file(&dir.path().join(".env")).unwrap();
        assert_eq!(vars.get(API_KEY_VAR).unwrap(), "secret");
        let file = HarvestFile::read(&dir.path().join("harvest.toml")).unwrap();
        assert_eq!(file.project.name.as_deref(), Some("ytharvest_project"));

        fs::write(dir.path().join("harvest.toml"), "[project]\ndir = \"x\"\n").unwrap();
        init_project(&overrides, None).unwrap();
        let kept = fs::read_to_string(dir.path().join("harvest.toml")).unwrap();
        assert_eq!(kept, "[project]\ndir = \"x\"\n");
    }

    #[test]
    fn networks_without_seeds_are_rejected() {
        let empty = NetworkSpec::Videos {
            q: Some(" ".into()),
            seeds: Vec::new(),
            depth: 1,
        };
        assert!(validate_network("n", &empty).is_err());
        let query = NetworkSpec::Videos {
            q: Some("speedrun".into()),
            seeds: Vec::new(),
            depth: 1,
        };
        assert!(validate_network("n", &query).is_ok());
    }
}
