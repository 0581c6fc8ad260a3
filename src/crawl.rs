#![forbid(unsafe_code)]

//! Bounded-depth relation crawl with memoized edges.
//!
//! Starting from a set of seeds, each node with remaining depth is expanded
//! into its related nodes. The crawl is breadth first, so every node is
//! reached first along a shortest path and therefore with the largest depth
//! budget it can get; a visited set keeps each node from being queued twice.
//! Relation lists and node metadata live in [`SnapshotStore`]s owned by the
//! caller and are reused across runs.

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::cache::SnapshotStore;

/// Typed node attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeAttr {
    Int(i64),
    Text(String),
}

/// Resolved metadata of a crawled node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMeta {
    pub title: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, NodeAttr>,
}

impl NodeMeta {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.attributes.insert(key.to_string(), NodeAttr::Int(value));
        self
    }

    pub fn with_text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes
            .insert(key.to_string(), NodeAttr::Text(value.into()));
        self
    }
}

/// Where relations and metadata of a node come from.
pub trait RelationSource {
    /// Ids directly related to `id`.
    fn relations(&mut self, id: &str) -> Result<Vec<String>>;

    /// Metadata of `id`, `None` when the node cannot be resolved.
    fn metadata(&mut self, id: &str) -> Result<Option<NodeMeta>>;
}

/// Result of one crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    pub visited: BTreeSet<String>,
    pub edges: BTreeMap<String, Vec<String>>,
}

impl CrawlOutcome {
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}

pub struct RelationCrawler<'c> {
    relations: &'c mut SnapshotStore<Vec<String>>,
    metadata: &'c mut SnapshotStore<NodeMeta>,
}

impl<'c> RelationCrawler<'c> {
    pub fn new(
        relations: &'c mut SnapshotStore<Vec<String>>,
        metadata: &'c mut SnapshotStore<NodeMeta>,
    ) -> Self {
        Self {
            relations,
            metadata,
        }
    }

    /// Traverses from `seeds` up to `depth` hops. Depth 0 visits only the
    /// seeds and records no edges.
    pub fn crawl<R: RelationSource>(
        &mut self,
        source: &mut R,
        seeds: &[String],
        depth: usize,
    ) -> Result<CrawlOutcome> {
        let mut outcome = CrawlOutcome::default();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        for seed in seeds {
            if outcome.visited.insert(seed.clone()) {
                queue.push_back((seed.clone(), depth));
            }
        }

        while let Some((id, remaining)) = queue.pop_front() {
            if remaining == 0 {
                continue;
            }
            let targets = self.edges_of(source, &id)?;
            debug!("{id}: {} relation(s), depth left {remaining}", targets.len());
            for target in &targets {
                if outcome.visited.insert(target.clone()) {
                    queue.push_back((target.clone(), remaining - 1));
                }
            }
            outcome.edges.insert(id, targets);
        }
        info!(
            "crawl visited {} node(s) along {} edge(s)",
            outcome.visited.len(),
            outcome.edge_count()
        );
        Ok(outcome)
    }

    fn edges_of<R: RelationSource>(&mut self, source: &mut R, id: &str) -> Result<Vec<String>> {
        if let Some(cached) = self.relations.get(id) {
            return Ok(cached.clone());
        }
        match source.relations(id) {
            Ok(found) => {
                let mut seen = HashSet::new();
                let targets: Vec<String> = found
                    .into_iter()
                    .filter(|target| seen.insert(target.clone()))
                    .collect();
                self.relations.insert(id, targets.clone())?;
                Ok(targets)
            }
            Err(err) => {
                warn!("no relations for {id}: {err:#}");
                Ok(Vec::new())
            }
        }
    }

    /// Fetches metadata for every visited node not yet cached. Returns the
    /// number of nodes resolved in this pass.
    pub fn resolve_metadata<R: RelationSource>(
        &mut self,
        source: &mut R,
        visited: &BTreeSet<String>,
    ) -> Result<usize> {
        let mut resolved = 0;
        for id in visited {
            if self.metadata.contains(id) {
                continue;
            }
            match source.metadata(id) {
                Ok(Some(meta)) => {
                    self.metadata.insert(id, meta)?;
                    resolved += 1;
                }
                Ok(None) => debug!("{id} could not be resolved; skipping"),
                Err(err) => warn!("metadata for {id} failed: {err:#}"),
            }
        }
        Ok(resolved)
    }

    /// Edges whose endpoints both carry metadata.
    pub fn resolved_edges(&self, outcome: &CrawlOutcome) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for (source, targets) in &outcome.edges {
            if !self.metadata.contains(source) {
                continue;
            }
            for target in targets {
                if self.metadata.contains(target) {
                    edges.push((source.clone(), target.clone()));
                }
            }
        }
        edges
    }

    pub fn metadata(&self) -> &SnapshotStore<NodeMeta> {
        self.metadata
    }

    /// Flushes both caches to their snapshot files.
    pub fn save(&mut self) -> Result<()> {
        self.relations.save()?;
        self.metadata.save()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use anyhow::bail;
    use std::collections::HashMap;

    /// Relation source backed by fixed maps; counts fetches.
    #[derive(Default)]
    pub struct MapSource {
        pub relations: HashMap<String, Vec<String>>,
        pub unresolvable: HashSet<String>,
        pub failing: HashSet<String>,
        pub relation_calls: Vec<String>,
    }

    impl MapSource {
        pub fn link(&mut self, from: &str, to: &[&str]) {
            self.relations.insert(
                from.to_string(),
                to.iter().map(|id| id.to_string()).collect(),
            );
        }
    }

    impl RelationSource for MapSource {
        fn relations(&mut self, id: &str) -> Result<Vec<String>> {
            self.relation_calls.push(id.to_string());
            if self.failing.contains(id) {
                bail!("page for {id} unavailable");
            }
            Ok(self.relations.get(id).cloned().unwrap_or_default())
        }

        fn metadata(&mut self, id: &str) -> Result<Option<NodeMeta>> {
            if self.unresolvable.contains(id) {
                return Ok(None);
            }
            Ok(Some(NodeMeta::new(format!("Title {id}")).with_int("views", 1)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MapSource;
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn seeds(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn depth_zero_visits_only_the_seed() -> Result<()> {
        let mut source = MapSource::default();
        source.link("seed", &["a"]);
        let mut relations = SnapshotStore::in_memory();
        let mut metadata = SnapshotStore::in_memory();
        let mut crawler = RelationCrawler::new(&mut relations, &mut metadata);
        let outcome = crawler.crawl(&mut source, &seeds(&["seed"]), 0)?;
        assert_eq!(outcome.visited, ids(&["seed"]));
        assert!(outcome.edges.is_empty());
        assert!(source.relation_calls.is_empty());
        Ok(())
    }

    #[test]
    fn depth_two_reaches_second_hop() -> Result<()> {
        let mut source = MapSource::default();
        source.link("seed", &["a", "b"]);
        source.link("a", &["c"]);
        source.link("c", &["d"]);
        let mut relations = SnapshotStore::in_memory();
        let mut metadata = SnapshotStore::in_memory();
        let mut crawler = RelationCrawler::new(&mut relations, &mut metadata);
        let outcome = crawler.crawl(&mut source, &seeds(&["seed"]), 2)?;
        assert_eq!(outcome.visited, ids(&["seed", "a", "b", "c"]));
        assert_eq!(outcome.edges["seed"], vec!["a", "b"]);
        assert_eq!(outcome.edges["a"], vec!["c"]);
        assert!(!outcome.edges.contains_key("c"));
        Ok(())
    }

    #[test]
    fn cycles_terminate_and_edges_are_memoized() -> Result<()> {
        let mut source = MapSource::default();
        source.link("a", &["b", "b", "a"]);
        source.link("b", &["a"]);
        let mut relations = SnapshotStore::in_memory();
        let mut metadata = SnapshotStore::in_memory();
        {
            let mut crawler = RelationCrawler::new(&mut relations, &mut metadata);
            let outcome = crawler.crawl(&mut source, &seeds(&["a"]), 10)?;
            assert_eq!(outcome.visited, ids(&["a", "b"]));
            assert_eq!(outcome.edges["a"], vec!["b", "a"]);
        }
        let first_calls = source.relation_calls.len();
        let mut crawler = RelationCrawler::new(&mut relations, &mut metadata);
        crawler.crawl(&mut source, &seeds(&["a"]), 10)?;
        assert_eq!(source.relation_calls.len(), first_calls);
        Ok(())
    }

    #[test]
    fn self_links_survive_into_resolved_edges() -> Result<()> {
        let mut source = MapSource::default();
        source.link("seed", &["seed", "a"]);
        let mut relations = SnapshotStore::in_memory();
        let mut metadata = SnapshotStore::in_memory();
        let mut crawler = RelationCrawler::new(&mut relations, &mut metadata);
        let outcome = crawler.crawl(&mut source, &seeds(&["seed"]), 1)?;
        crawler.resolve_metadata(&mut source, &outcome.visited)?;
        let edges = crawler.resolved_edges(&outcome);
        assert!(edges.contains(&("seed".to_string(), "seed".to_string())));
        assert!(edges.contains(&("seed".to_string(), "a".to_string())));
        Ok(())
    }

    #[test]
    fn failed_fetches_are_not_cached() -> Result<()> {
        let mut source = MapSource::default();
        source.link("seed", &["a"]);
        source.failing.insert("seed".to_string());
        let mut relations = SnapshotStore::in_memory();
        let mut metadata = SnapshotStore::in_memory();
        let mut crawler = RelationCrawler::new(&mut relations, &mut metadata);
        let outcome = crawler.crawl(&mut source, &seeds(&["seed"]), 1)?;
        assert_eq!(outcome.edge_count(), 0);
        assert!(!relations.contains("seed"));
        Ok(())
    }

    #[test]
    fn unresolved_endpoints_are_pruned() -> Result<()> {
        let mut source = MapSource::default();
        source.link("seed", &["a", "b"]);
        source.link("a", &["c"]);
        source.unresolvable.insert("b".to_string());
        let mut relations = SnapshotStore::in_memory();
        let mut metadata = SnapshotStore::in_memory();
        let mut crawler = RelationCrawler::new(&mut relations, &mut metadata);
        let outcome = crawler.crawl(&mut source, &seeds(&["seed"]), 2)?;
        let resolved = crawler.resolve_metadata(&mut source, &outcome.visited)?;
        assert_eq!(resolved, 3);
        let edges = crawler.resolved_edges(&outcome);
        assert_eq!(
            edges,
            vec![
                ("a".to_string(), "c".to_string()),
                ("seed".to_string(), "a".to_string()),
            ]
        );
        assert_eq!(crawler.resolve_metadata(&mut source, &outcome.visited)?, 0);
        Ok(())
    }
}
