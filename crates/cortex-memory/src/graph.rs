//! `graph` – contextual memory: concepts linked by undirected relationships.
//!
//! | Item | Carries |
//! |---|---|
//! | node | string id, arbitrary JSON `data` |
//! | relationship | `relationship` type (default `"related"`), creation `timestamp`, merged attributes |
//!
//! Built on a `petgraph` [`StableUnGraph`] so node indices survive removals,
//! with a side index from id to [`NodeIndex`].  Every query measures
//! distance in hops.
//!
//! Ageing is driven by timestamps: a node ages out once `data.timestamp` is
//! past the retention window, a relationship once its own `timestamp` is.
//! Nodes without a parseable timestamp are kept.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use cortex_types::{CortexError, Map, Value};
use petgraph::algo::{all_simple_paths, astar, tarjan_scc};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Relationship type used when the caller names none.
pub const DEFAULT_RELATIONSHIP: &str = "related";
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_NODE_LIMIT: usize = 10_000;
pub const DEFAULT_EDGE_LIMIT: usize = 50_000;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Relationship not found: {0} -- {1}")]
    RelationshipNotFound(String, String),
    #[error("Age of {0} days is out of range")]
    AgeOutOfRange(u32),
}

impl From<GraphError> for CortexError {
    fn from(e: GraphError) -> Self {
        CortexError::invalid_args(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub attributes: Map<String, Value>,
}

/// What a purge removed.  `purged` is false when no purge ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PurgeReport {
    pub purged: bool,
    pub removed_nodes: Vec<String>,
    pub removed_edges: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Centrality {
    pub node: String,
    pub score: f64,
}

#[derive(Default)]
pub struct ContextGraph {
    graph: StableUnGraph<Node, Map<String, Value>>,
    index: HashMap<String, NodeIndex>,
}

impl ContextGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    // ── Nodes ───────────────────────────────────────────────────────────────

    /// Add a node.  Returns false, leaving the node untouched, if `id` exists.
    pub fn add_node(&mut self, id: &str, data: Value) -> bool {
        if self.index.contains_key(id) {
            warn!(node = id, "node already exists");
            return false;
        }
        self.insert_node(id, data);
        debug!(node = id, "node added");
        true
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).and_then(|&i| self.graph.node_weight(i))
    }

    /// Replace the data of an existing node.
    pub fn update_node(&mut self, id: &str, data: Value) -> Result<Node, GraphError> {
        let i = self.index_of(id)?;
        let node = self
            .graph
            .node_weight_mut(i)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        node.data = data;
        Ok(node.clone())
    }

    /// Remove a node and every relationship touching it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        match self.index.remove(id) {
            Some(i) => {
                self.graph.remove_node(i);
                debug!(node = id, "node removed");
                true
            }
            None => false,
        }
    }

    /// Ids of nodes whose `data[attribute]` equals `value` or, for an
    /// array attribute, contains it.
    pub fn filter_nodes(&self, attribute: &str, value: &Value) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes()
            .filter(|n| {
                n.data.get(attribute).is_some_and(|found| {
                    found == value || found.as_array().is_some_and(|items| items.contains(value))
                })
            })
            .map(|n| n.id.clone())
            .collect();
        ids.sort();
        ids
    }

    // ── Relationships ───────────────────────────────────────────────────────

    /// Link two nodes, creating either one that is missing with null data.
    /// Returns false if they are already linked.
    pub fn add_relationship(&mut self, source: &str, target: &str, kind: &str) -> bool {
        self.add_relationship_at(source, target, kind, Utc::now())
    }

    pub fn add_relationship_at(
        &mut self,
        source: &str,
        target: &str,
        kind: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if self.edge_between(source, target).is_some() {
            warn!(source, target, "relationship already exists");
            return false;
        }
        let a = self.ensure_node(source);
        let b = self.ensure_node(target);
        let mut attributes = Map::new();
        attributes.insert("relationship".into(), Value::from(kind));
        attributes.insert(
            "timestamp".into(),
            Value::from(now.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        self.graph.add_edge(a, b, attributes);
        debug!(source, target, relationship = kind, "relationship added");
        true
    }

    pub fn relationship(&self, source: &str, target: &str) -> Option<Relationship> {
        let e = self.edge_between(source, target)?;
        Some(Relationship {
            source: source.to_string(),
            target: target.to_string(),
            attributes: self.graph.edge_weight(e)?.clone(),
        })
    }

    /// Merge `patch` into the relationship's attributes.
    pub fn update_relationship(
        &mut self,
        source: &str,
        target: &str,
        patch: Map<String, Value>,
    ) -> Result<Relationship, GraphError> {
        let not_found = || GraphError::RelationshipNotFound(source.to_string(), target.to_string());
        let e = self.edge_between(source, target).ok_or_else(not_found)?;
        let attributes = self.graph.edge_weight_mut(e).ok_or_else(not_found)?;
        attributes.extend(patch);
        Ok(Relationship {
            source: source.to_string(),
            target: target.to_string(),
            attributes: attributes.clone(),
        })
    }

    pub fn remove_relationship(&mut self, source: &str, target: &str) -> bool {
        match self.edge_between(source, target) {
            Some(e) => {
                self.graph.remove_edge(e);
                debug!(source, target, "relationship removed");
                true
            }
            None => {
                debug!(
                    source,
                    target,
                    source_exists = self.index.contains_key(source),
                    target_exists = self.index.contains_key(target),
                    "no relationship to remove"
                );
                false
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// `id` followed by every node within `depth` hops, nearest first.
    pub fn find_related(&self, id: &str, depth: usize) -> Result<Vec<String>, GraphError> {
        let start = self.index_of(id)?;
        let mut seen = HashSet::from([start]);
        let mut order = vec![start];
        let mut frontier = VecDeque::from([(start, 0usize)]);
        while let Some((n, hops)) = frontier.pop_front() {
            if hops == depth {
                continue;
            }
            for next in self.graph.neighbors(n) {
                if seen.insert(next) {
                    order.push(next);
                    frontier.push_back((next, hops + 1));
                }
            }
        }
        Ok(self.ids(order))
    }

    /// Fewest-hop path between two nodes, or `None` when they are not
    /// connected.
    pub fn shortest_path(&self, source: &str, target: &str) -> Result<Option<Vec<String>>, GraphError> {
        let from = self.index_of(source)?;
        let to = self.index_of(target)?;
        Ok(astar(&self.graph, from, |n| n == to, |_| 1usize, |_| 0usize).map(|(_, path)| self.ids(path)))
    }

    /// Every simple path between two distinct nodes, shortest first.
    pub fn all_paths(&self, source: &str, target: &str) -> Result<Vec<Vec<String>>, GraphError> {
        let from = self.index_of(source)?;
        let to = self.index_of(target)?;
        if from == to {
            return Ok(Vec::new());
        }
        let mut paths: Vec<Vec<String>> = all_simple_paths::<Vec<_>, _>(&self.graph, from, to, 0, None)
            .map(|path| self.ids(path))
            .collect();
        paths.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        Ok(paths)
    }

    /// Connected components, largest first; members sorted by id.
    pub fn clusters(&self) -> Vec<Vec<String>> {
        let mut clusters: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .map(|component| {
                let mut ids = self.ids(component);
                ids.sort();
                ids
            })
            .collect();
        clusters.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        clusters
    }

    /// Degree over `n - 1` per node, highest first.
    pub fn degree_centrality(&self) -> Vec<Centrality> {
        let n = self.graph.node_count();
        let mut scores: Vec<Centrality> = self
            .graph
            .node_indices()
            .map(|i| {
                let degree = self.graph.edges(i).count();
                let score = if n > 1 {
                    degree as f64 / (n - 1) as f64
                } else {
                    1.0
                };
                Centrality {
                    node: self.graph[i].id.clone(),
                    score,
                }
            })
            .collect();
        scores.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.node.cmp(&b.node)));
        scores
    }

    // ── Ageing ──────────────────────────────────────────────────────────────

    /// Remove nodes and relationships older than `retention_days`.
    pub fn purge_old_data(&mut self, retention_days: u32) -> Result<PurgeReport, GraphError> {
        self.purge_old_data_at(retention_days, Utc::now())
    }

    pub fn purge_old_data_at(
        &mut self,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<PurgeReport, GraphError> {
        let cutoff = TimeDelta::try_days(i64::from(retention_days))
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or(GraphError::AgeOutOfRange(retention_days))?;
        let is_stale = |ts: Option<&Value>| {
            ts.and_then(Value::as_str)
                .and_then(parse_timestamp)
                .is_some_and(|t| t < cutoff)
        };

        let stale_nodes: Vec<String> = self
            .nodes()
            .filter(|n| is_stale(n.data.get("timestamp")))
            .map(|n| n.id.clone())
            .collect();
        for id in &stale_nodes {
            self.remove_node(id);
        }

        let stale_edges: Vec<EdgeIndex> = self
            .graph
            .edge_indices()
            .filter(|&e| is_stale(self.graph.edge_weight(e).and_then(|a| a.get("timestamp"))))
            .collect();
        let mut removed_edges = Vec::with_capacity(stale_edges.len());
        for e in stale_edges {
            if let Some((a, b)) = self.graph.edge_endpoints(e) {
                removed_edges.push((self.graph[a].id.clone(), self.graph[b].id.clone()));
                self.graph.remove_edge(e);
            }
        }

        info!(
            nodes = stale_nodes.len(),
            relationships = removed_edges.len(),
            retention_days,
            "contextual memory purged"
        );
        Ok(PurgeReport {
            purged: true,
            removed_nodes: stale_nodes,
            removed_edges,
        })
    }

    /// Purge only when the graph has outgrown either limit.
    pub fn monitor_and_purge(
        &mut self,
        node_limit: usize,
        edge_limit: usize,
        retention_days: u32,
    ) -> Result<PurgeReport, GraphError> {
        let (nodes, edges) = (self.node_count(), self.relationship_count());
        if nodes <= node_limit && edges <= edge_limit {
            return Ok(PurgeReport::default());
        }
        warn!(nodes, edges, node_limit, edge_limit, "contextual memory over limit");
        self.purge_old_data(retention_days)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph
            .node_indices()
            .filter_map(|i| self.graph.node_weight(i))
    }

    fn insert_node(&mut self, id: &str, data: Value) -> NodeIndex {
        let i = self.graph.add_node(Node {
            id: id.to_string(),
            data,
        });
        self.index.insert(id.to_string(), i);
        i
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        match self.index.get(id) {
            Some(&i) => i,
            None => self.insert_node(id, Value::Null),
        }
    }

    fn index_of(&self, id: &str) -> Result<NodeIndex, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    fn edge_between(&self, source: &str, target: &str) -> Option<EdgeIndex> {
        let a = *self.index.get(source)?;
        let b = *self.index.get(target)?;
        self.graph.find_edge(a, b)
    }

    fn ids(&self, indices: impl IntoIterator<Item = NodeIndex>) -> Vec<String> {
        indices
            .into_iter()
            .filter_map(|i| self.graph.node_weight(i).map(|n| n.id.clone()))
            .collect()
    }
}

/// RFC 3339, or a naive ISO-8601 date-time read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
