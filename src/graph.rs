#![forbid(unsafe_code)]

//! Directed relation graph and its GraphML rendering.

use anyhow::{Context, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::cache::SnapshotStore;
use crate::crawl::{NodeAttr, NodeMeta};

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub meta: NodeMeta,
}

/// Metadata-enriched directed graph keyed by external id.
#[derive(Debug, Default)]
pub struct RelationGraph {
    graph: DiGraph<GraphNode, ()>,
    index: HashMap<String, NodeIndex>,
}

impl RelationGraph {
    /// Builds the graph from resolved edges. Nodes only enter the graph
    /// through an edge; endpoints without metadata are dropped with their
    /// edges.
    pub fn from_edges(edges: &[(String, String)], metadata: &SnapshotStore<NodeMeta>) -> Self {
        let mut graph = Self::default();
        for (source, target) in edges {
            let (Some(source_meta), Some(target_meta)) = (metadata.get(source), metadata.get(target))
            else {
                continue;
            };
            let from = graph.node(source, source_meta);
            let to = graph.node(target, target_meta);
            graph.graph.update_edge(from, to, ());
        }
        graph
    }

    fn node(&mut self, id: &str, meta: &NodeMeta) -> NodeIndex {
        if let Some(index) = self.index.get(id) {
            return *index;
        }
        let index = self.graph.add_node(GraphNode {
            id: id.to_string(),
            meta: meta.clone(),
        });
        self.index.insert(id.to_string(), index);
        index
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_indices().map(|index| &self.graph[index])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(from), Some(to)) => self.graph.contains_edge(*from, *to),
            _ => false,
        }
    }

    /// Attribute keys with their GraphML type. `label` always comes first.
    fn attribute_keys(&self) -> Vec<(String, &'static str)> {
        let mut keys: BTreeMap<String, &'static str> = BTreeMap::new();
        for node in self.nodes() {
            for (name, value) in &node.meta.attributes {
                let kind = match value {
                    NodeAttr::Int(_) => "long",
                    NodeAttr::Text(_) => "string",
                };
                let entry = keys.entry(name.clone()).or_insert(kind);
                if *entry != kind {
                    *entry = "string";
                }
            }
        }
        keys.remove("label");
        let mut ordered = vec![("label".to_string(), "string")];
        ordered.extend(keys);
        ordered
    }

    pub fn write_graphml<W: Write>(&self, out: &mut W) -> Result<()> {
        let keys = self.attribute_keys();
        writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        writeln!(
            out,
            r#"<graphml xmlns="http://graphml.graphdrawing.org/xmlns" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://graphml.graphdrawing.org/xmlns http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd">"#
        )?;
        for (position, (name, kind)) in keys.iter().enumerate() {
            writeln!(
                out,
                r#"  <key id="d{position}" for="node" attr.name="{}" attr.type="{kind}"/>"#,
                escape_xml(name)
            )?;
        }
        writeln!(out, r#"  <graph edgedefault="directed">"#)?;
        for node in self.nodes() {
            writeln!(out, r#"    <node id="{}">"#, escape_xml(&node.id))?;
            for (position, (name, _)) in keys.iter().enumerate() {
                let value = if name == "label" {
                    Some(node.meta.title.clone())
                } else {
                    node.meta.attributes.get(name).map(|value| match value {
                        NodeAttr::Int(number) => number.to_string(),
                        NodeAttr::Text(text) => text.clone(),
                    })
                };
                if let Some(value) = value {
                    writeln!(
                        out,
                        r#"      <data key="d{position}">{}</data>"#,
                        escape_xml(&value)
                    )?;
                }
            }
            writeln!(out, "    </node>")?;
        }
        for edge in self.graph.edge_indices() {
            let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            writeln!(
                out,
                r#"    <edge source="{}" target="{}"/>"#,
                escape_xml(&self.graph[from].id),
                escape_xml(&self.graph[to].id)
            )?;
        }
        writeln!(out, "  </graph>")?;
        writeln!(out, "</graphml>")?;
        Ok(())
    }

    pub fn save_graphml(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut out = BufWriter::new(file);
        self.write_graphml(&mut out)
            .with_context(|| format!("writing {}", path.display()))?;
        out.flush()?;
        Ok(())
    }
}

/// Escapes text for XML element content and attribute values.
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c if (c as u32) < 0x20 && !matches!(c, '\n' | '\r' | '\t') => {}
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> Result<SnapshotStore<NodeMeta>> {
        let mut store = SnapshotStore::in_memory();
        store.insert("a", NodeMeta::new("Alpha & Co").with_int("views", 10))?;
        store.insert(
            "b",
            NodeMeta::new("Beta").with_int("views", 3).with_text("channel", "B<1>"),
        )?;
        store.insert("lonely", NodeMeta::new("Lonely"))?;
        Ok(store)
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect()
    }

    #[test]
    fn graph_only_keeps_resolved_edges() -> Result<()> {
        let meta = metadata()?;
        let graph = RelationGraph::from_edges(&edges(&[("a", "b"), ("a", "b"), ("b", "x")]), &meta);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.has_edge("a", "b"));
        assert!(!graph.contains("x"));
        assert!(!graph.contains("lonely"));
        Ok(())
    }

    #[test]
    fn self_loops_are_kept() -> Result<()> {
        let meta = metadata()?;
        let graph = RelationGraph::from_edges(&edges(&[("a", "a"), ("a", "b")]), &meta);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.has_edge("a", "a"));
        let mut out = Vec::new();
        graph.write_graphml(&mut out)?;
        let xml = String::from_utf8(out)?;
        assert!(xml.contains(r#"<edge source="a" target="a"/>"#));
        Ok(())
    }

    #[test]
    fn graphml_contains_typed_keys_and_escaped_values() -> Result<()> {
        let meta = metadata()?;
        let graph = RelationGraph::from_edges(&edges(&[("a", "b")]), &meta);
        let mut out = Vec::new();
        graph.write_graphml(&mut out)?;
        let xml = String::from_utf8(out)?;
        assert!(xml.contains(r#"<key id="d0" for="node" attr.name="label" attr.type="string"/>"#));
        assert!(xml.contains(r#"attr.name="channel" attr.type="string""#));
        assert!(xml.contains(r#"attr.name="views" attr.type="long""#));
        assert!(xml.contains("Alpha &amp; Co"));
        assert!(xml.contains("B&lt;1&gt;"));
        assert!(xml.contains(r#"<edge source="a" target="b"/>"#));
        assert!(xml.contains(r#"edgedefault="directed""#));
        Ok(())
    }

    #[test]
    fn escape_xml_drops_control_characters() {
        assert_eq!(escape_xml("a\u{1}b\n"), "ab\n");
        assert_eq!(escape_xml("'\""), "&apos;&quot;");
    }
}
