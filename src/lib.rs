#![forbid(unsafe_code)]

//! Library half of `ytharvest`: archive storage, YouTube fetching, relation
//! crawling and the analysis passes the CLI dispatches to.

pub mod api;
pub mod archive;
pub mod cache;
pub mod captions;
pub mod config;
pub mod crawl;
pub mod export;
pub mod fetcher;
pub mod graph;
pub mod layout;
pub mod model;
pub mod network;
pub mod provenance;
pub mod reader;
pub mod search_index;
pub mod stats;
pub mod store;
