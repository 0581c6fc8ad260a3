#![forbid(unsafe_code)]

//! `ytharvest` command line tool: fetch channels and videos into archives,
//! keep them updated, crawl relation networks, and run the analysis, index
//! and export steps on top of the stored data.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::path::{Path, PathBuf};
use ytharvest::api::YoutubeClient;
use ytharvest::config::{ConfigOverrides, HarvestConfig, init_project, load_config, validate_network};
use ytharvest::export::{CaptionExport, export_archive};
use ytharvest::fetcher::{FetchOptions, Harvester, fetch_channel, fetch_video_collection, update_channel};
use ytharvest::layout::ProjectPaths;
use ytharvest::network::build_network;
use ytharvest::search_index::{
    CommentClassifiers, ElasticsearchClient, channel_sources, collection_sources, ingest_archives,
};
use ytharvest::stats::{UserList, channel_stats, user_stats, user_stats_path};

#[derive(Debug, Parser)]
#[command(name = "ytharvest", version, about = "YouTube data harvesting toolkit")]
struct Cli {
    /// Project configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Env file consulted after the process environment.
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,
    #[arg(long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,
    /// Proxy for every request, `host:port` means SOCKS5.
    #[arg(long, global = true)]
    proxy: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a config template and create the project directories.
    Init {
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Fetch the channel or video groups listed in the config.
    Fetch {
        #[command(subcommand)]
        target: FetchTarget,
    },
    /// Write update archives for already fetched channels.
    Update { group: Option<String> },
    /// Crawl a configured relation network into GraphML.
    Network { name: String },
    Analysis {
        #[command(subcommand)]
        kind: AnalysisKind,
    },
    /// Rebuild the Elasticsearch indices.
    Index {
        #[command(subcommand)]
        source: IndexSource,
    },
    Export {
        #[command(subcommand)]
        kind: ExportKind,
    },
}

impl Command {
    /// Commands that call the YouTube API and so need an API key.
    fn calls_youtube(&self) -> bool {
        matches!(
            self,
            Command::Fetch { .. } | Command::Update { .. } | Command::Network { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Args)]
struct FetchFlags {
    #[arg(long)]
    no_comments: bool,
    #[arg(long)]
    no_captions: bool,
    /// Refetch into archives that already exist.
    #[arg(long)]
    no_skip: bool,
}

impl FetchFlags {
    fn options(self) -> FetchOptions {
        FetchOptions {
            comments: !self.no_comments,
            captions: !self.no_captions,
            skip_existing: !self.no_skip,
        }
    }
}

#[derive(Debug, Subcommand)]
enum FetchTarget {
    Channels {
        group: Option<String>,
        #[command(flatten)]
        flags: FetchFlags,
    },
    Videos {
        group: Option<String>,
        #[command(flatten)]
        flags: FetchFlags,
    },
}

#[derive(Debug, Subcommand)]
enum AnalysisKind {
    /// Videos and comments per channel as CSV.
    ChannelStats,
    /// Per-commenter statistics across all channels.
    UserStats,
    /// Display names shared by several commenter ids.
    CommonNames {
        #[arg(long)]
        channel: Option<String>,
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
enum IndexSource {
    Channels {
        #[arg(long)]
        prefix: Option<String>,
    },
    Videos {
        group: String,
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum ExportKind {
    /// Timestamped caption transcripts.
    Captions { archive: String },
    /// TEI documents of the plain-text captions.
    Tei { archive: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        project_dir: cli.project_dir,
        api_key: None,
        proxy: cli.proxy,
        env_path: cli.env_file,
        config_path: cli.config,
    };

    if let Command::Init { api_key } = &cli.command {
        let root = init_project(&overrides, api_key.as_deref())?;
        println!("Project directory ready: {}", root.display());
        return Ok(());
    }

    let config = load_config(overrides)?;
    if cli.command.calls_youtube() {
        config.require_api_key()?;
    }
    let paths = config.paths();
    paths.prepare()?;

    match cli.command {
        Command::Init { .. } => Ok(()),
        Command::Fetch { target } => run_fetch(&config, &paths, target),
        Command::Update { group } => run_update(&config, &paths, group.as_deref()),
        Command::Network { name } => run_network(&config, &paths, &name),
        Command::Analysis { kind } => run_analysis(&config, &paths, kind),
        Command::Index { source } => run_index(&config, &paths, source),
        Command::Export { kind } => run_export(&paths, kind),
    }
}

fn client(config: &HarvestConfig) -> Result<YoutubeClient> {
    YoutubeClient::new(config.require_api_key()?, config.proxy.as_deref())
}

fn banner(title: &str) {
    println!("===================================");
    println!("{title}");
    println!("===================================");
}

fn run_fetch(config: &HarvestConfig, paths: &ProjectPaths, target: FetchTarget) -> Result<()> {
    let client = client(config)?;
    let harvester = Harvester::new(&client, config.retry, config.scrape_delay);
    let mut failures = 0;
    match target {
        FetchTarget::Channels { group, flags } => {
            for (group, references) in config.channel_groups(group.as_deref())? {
                banner(&format!("Fetching channel group {group}"));
                for reference in references {
                    println!("Channel: {reference}");
                    match fetch_channel(&harvester, paths, group, reference, flags.options()) {
                        Ok(Some(path)) => println!("Archive: {}", path.display()),
                        Ok(None) => {}
                        Err(err) => {
                            error!("fetching {reference} failed: {err:#}");
                            failures += 1;
                        }
                    }
                }
            }
        }
        FetchTarget::Videos { group, flags } => {
            for (group, video_ids) in config.video_groups(group.as_deref())? {
                banner(&format!("Fetching video collection {group}"));
                match fetch_video_collection(&harvester, paths, group, video_ids, flags.options()) {
                    Ok(Some(path)) => println!("Archive: {}", path.display()),
                    Ok(None) => {}
                    Err(err) => {
                        error!("fetching collection {group} failed: {err:#}");
                        failures += 1;
                    }
                }
            }
        }
    }
    if failures > 0 {
        bail!("{failures} fetch(es) failed");
    }
    Ok(())
}

fn run_update(config: &HarvestConfig, paths: &ProjectPaths, group: Option<&str>) -> Result<()> {
    let client = client(config)?;
    let harvester = Harvester::new(&client, config.retry, config.scrape_delay);
    let archives = paths.channel_archives(group)?;
    banner(&format!("Updating {} channel archive(s)", archives.len()));
    let mut failures = 0;
    for archive in archives {
        println!("Channel: {}/{}", archive.group, archive.name);
        match update_channel(&harvester, &archive.path, FetchOptions::default()) {
            Ok(Some(path)) => println!("Update: {}", path.display()),
            Ok(None) => println!("No changes"),
            Err(err) => {
                error!("updating {} failed: {err:#}", archive.path.display());
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} update(s) failed");
    }
    Ok(())
}

fn run_network(config: &HarvestConfig, paths: &ProjectPaths, name: &str) -> Result<()> {
    let spec = config.network(name)?;
    validate_network(name, spec)?;
    let client = client(config)?;
    banner(&format!("Building network {name}"));
    let output = build_network(
        &client,
        config.retry,
        config.scrape_delay,
        paths,
        name,
        spec,
    )?;
    println!("Graph: {}", output.display());
    Ok(())
}

fn run_analysis(config: &HarvestConfig, paths: &ProjectPaths, kind: AnalysisKind) -> Result<()> {
    match kind {
        AnalysisKind::ChannelStats => {
            let output = channel_stats(paths)?;
            println!("Channel stats: {}", output.display());
        }
        AnalysisKind::UserStats => {
            let output = user_stats(paths, &config.project_name)?;
            println!("User stats: {}", output.display());
        }
        AnalysisKind::CommonNames { channel, limit } => {
            let path = user_stats_path(paths, &config.project_name);
            let users = UserList::load(&path)
                .context("run `ytharvest analysis user-stats` first")?;
            let users = match channel.as_deref() {
                Some(channel) => users.for_channel(channel),
                None => users,
            };
            println!("{} user(s) in {}", users.len(), users.name);
            for (name, ids) in users.common_user_names(Some(limit)) {
                println!("{ids:>6}  {name}");
            }
        }
    }
    Ok(())
}

fn run_index(config: &HarvestConfig, paths: &ProjectPaths, source: IndexSource) -> Result<()> {
    let (sources, prefix) = match source {
        IndexSource::Channels { prefix } => (channel_sources(paths)?, prefix),
        IndexSource::Videos { group, prefix } => (collection_sources(paths, &group)?, prefix),
    };
    let prefix = prefix.unwrap_or_else(|| config.index_prefix.clone());
    let classifiers = CommentClassifiers::load(&paths.comment_classifier(&config.project_name))?;
    let mut backend = ElasticsearchClient::new(&config.search_url);
    info!("indexing into {} with prefix {prefix}", config.search_url);
    let summary = ingest_archives(&mut backend, &config.retry, &prefix, &sources, &classifiers)?;
    banner("Indexing complete");
    println!("Videos: {}", summary.videos);
    println!("Comments: {}", summary.comments);
    if summary.failed_comments > 0 {
        bail!("{} comment(s) were rejected by the index", summary.failed_comments);
    }
    Ok(())
}

/// Accepts an archive path or the name of a channel archive / video
/// collection inside the project.
fn resolve_archive(paths: &ProjectPaths, archive: &str) -> Result<PathBuf> {
    let direct = Path::new(archive);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }
    let name = archive.trim_end_matches(".zip");
    if let Some(found) = paths
        .channel_archives(None)?
        .into_iter()
        .find(|candidate| candidate.name == name)
    {
        return Ok(found.path);
    }
    let collection = paths.video_collection(name);
    if collection.is_file() {
        return Ok(collection);
    }
    bail!("no archive named {archive}")
}

fn run_export(paths: &ProjectPaths, kind: ExportKind) -> Result<()> {
    let (archive, kind) = match kind {
        ExportKind::Captions { archive } => (archive, CaptionExport::Timestamped),
        ExportKind::Tei { archive } => (archive, CaptionExport::Tei),
    };
    let path = resolve_archive(paths, &archive)?;
    let out_dir = export_archive(paths, &path, kind)?;
    println!("Export: {}", out_dir.display());
    Ok(())
}
