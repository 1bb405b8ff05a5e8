//! `contextual` region – the concept graph over dispatch.
//!
//! | Operation | Arguments | Result |
//! |---|---|---|
//! | `add_node` | `node`, `data`? | `{"added": bool}` |
//! | `get_node` | `node` | [`Lookup`] of [`Node`][cortex_memory::Node] |
//! | `update_node` | `node`, `data` | `Node` |
//! | `remove_node` | `node` | `{"removed": bool}` |
//! | `add_relationship` | `source`, `target`, `relationship`? (default `"related"`) | `{"added": bool}` |
//! | `get_relationship` | `source`, `target` | [`Lookup`] of [`Relationship`][cortex_memory::Relationship] |
//! | `update_relationship` | `source`, `target`, `data` | `Relationship` |
//! | `remove_relationship` | `source`, `target` | `{"removed": bool}` |
//! | `find_related_nodes` | `node`, `depth`? (default 1) | `[id]` |
//! | `find_shortest_path` | `source`, `target` | `[id]` or `null` |
//! | `find_all_paths` | `source`, `target` | `[[id]]` |
//! | `filter_nodes` | `attribute`, `value` | `[id]` |
//! | `detect_clusters` | – | `[[id]]` |
//! | `degree_centrality` | – | `[{node, score}]` |
//! | `purge_old_data` | `retention_days`? (default 30) | [`PurgeReport`][cortex_memory::PurgeReport] |
//! | `monitor_and_purge` | `node_limit`?, `edge_limit`?, `retention_days`? | `PurgeReport` |
//! | `stats` | – | `{"nodes": n, "relationships": m}` |
//!
//! Queries naming an unknown node are `invalid_arguments`.  A missing
//! relationship key reads as `source--target`.

use std::sync::{Arc, Mutex};

use cortex_kernel::{CapabilityHandle, Region};
use cortex_memory::ContextGraph;
use cortex_memory::graph::{
    DEFAULT_EDGE_LIMIT, DEFAULT_NODE_LIMIT, DEFAULT_RELATIONSHIP, DEFAULT_RETENTION_DAYS,
};
use cortex_types::{Args, CortexError, Lookup, Map, Value};
use serde_json::json;

use super::{encode, lock};

/// Publishes a [`ContextGraph`] as a region.
pub struct ContextualRegion {
    name: String,
    graph: Arc<Mutex<ContextGraph>>,
}

impl ContextualRegion {
    pub fn new(name: impl Into<String>, graph: ContextGraph) -> Self {
        Self {
            name: name.into(),
            graph: Arc::new(Mutex::new(graph)),
        }
    }
}

fn endpoints(args: &Args) -> Result<(String, String), CortexError> {
    Ok((args.required(0, "source")?, args.required(1, "target")?))
}

/// Bind a graph operation to the shared graph.
fn on<F>(
    graph: &Arc<Mutex<ContextGraph>>,
    op: F,
) -> impl Fn(Args) -> Result<Value, CortexError> + Send + Sync + 'static
where
    F: Fn(&mut ContextGraph, Args) -> Result<Value, CortexError> + Send + Sync + 'static,
{
    let graph = graph.clone();
    move |args| op(&mut lock(&graph), args)
}

fn add_node(g: &mut ContextGraph, args: Args) -> Result<Value, CortexError> {
    let node: String = args.required(0, "node")?;
    let data = args.get(1, "data").cloned().unwrap_or(Value::Null);
    Ok(json!({ "added": g.add_node(&node, data) }))
}

fn get_node(g: &mut ContextGraph, args: Args) -> Result<Value, CortexError> {
    let node: String = args.required(0, "node")?;
    encode(&Lookup::from_option(&node, g.node(&node).cloned()))
}

fn update_node(g: &mut ContextGraph, args: Args) -> Result<Value, CortexError> {
    let node: String = args.required(0, "node")?;
    let data: Value = args.required(1, "data")?;
    encode(&g.update_node(&node, data)?)
}

fn add_relationship(g: &mut ContextGraph, args: Args) -> Result<Value, CortexError> {
    let (source, target) = endpoints(&args)?;
    let kind: Option<String> = args.optional(2, "relationship")?;
    let added = g.add_relationship(&source, &target, kind.as_deref().unwrap_or(DEFAULT_RELATIONSHIP));
    Ok(json!({ "added": added }))
}

fn get_relationship(g: &mut ContextGraph, args: Args) -> Result<Value, CortexError> {
    let (source, target) = endpoints(&args)?;
    let key = format!("{source}--{target}");
    encode(&Lookup::from_option(&key, g.relationship(&source, &target)))
}

fn update_relationship(g: &mut ContextGraph, args: Args) -> Result<Value, CortexError> {
    let (source, target) = endpoints(&args)?;
    let patch: Map<String, Value> = args.required(2, "data")?;
    encode(&g.update_relationship(&source, &target, patch)?)
}

fn monitor_and_purge(g: &mut ContextGraph, args: Args) -> Result<Value, CortexError> {
    let node_limit: usize = args.optional(0, "node_limit")?.unwrap_or(DEFAULT_NODE_LIMIT);
    let edge_limit: usize = args.optional(1, "edge_limit")?.unwrap_or(DEFAULT_EDGE_LIMIT);
    let retention_days: u32 = args.optional(2, "retention_days")?.unwrap_or(DEFAULT_RETENTION_DAYS);
    encode(&g.monitor_and_purge(node_limit, edge_limit, retention_days)?)
}

impl Region for ContextualRegion {
    fn capability(self: Arc<Self>) -> Result<CapabilityHandle, CortexError> {
        let g = &self.graph;
        CapabilityHandle::builder(self.name.clone())
            .sync_op("add_node", on(g, add_node))
            .sync_op("get_node", on(g, get_node))
            .sync_op("update_node", on(g, update_node))
            .sync_op(
                "remove_node",
                on(g, |g, args| {
                    let node: String = args.required(0, "node")?;
                    Ok(json!({ "removed": g.remove_node(&node) }))
                }),
            )
            .sync_op("add_relationship", on(g, add_relationship))
            .sync_op("get_relationship", on(g, get_relationship))
            .sync_op("update_relationship", on(g, update_relationship))
            .sync_op(
                "remove_relationship",
                on(g, |g, args| {
                    let (source, target) = endpoints(&args)?;
                    Ok(json!({ "removed": g.remove_relationship(&source, &target) }))
                }),
            )
            .sync_op(
                "find_related_nodes",
                on(g, |g, args| {
                    let node: String = args.required(0, "node")?;
                    let depth: usize = args.optional(1, "depth")?.unwrap_or(1);
                    encode(&g.find_related(&node, depth)?)
                }),
            )
            .sync_op(
                "find_shortest_path",
                on(g, |g, args| {
                    let (source, target) = endpoints(&args)?;
                    encode(&g.shortest_path(&source, &target)?)
                }),
            )
            .sync_op(
                "find_all_paths",
                on(g, |g, args| {
                    let (source, target) = endpoints(&args)?;
                    encode(&g.all_paths(&source, &target)?)
                }),
            )
            .sync_op(
                "filter_nodes",
                on(g, |g, args| {
                    let attribute: String = args.required(0, "attribute")?;
                    let value: Value = args.required(1, "value")?;
                    encode(&g.filter_nodes(&attribute, &value))
                }),
            )
            .sync_op("detect_clusters", on(g, |g, _| encode(&g.clusters())))
            .sync_op("degree_centrality", on(g, |g, _| encode(&g.degree_centrality())))
            .sync_op(
                "purge_old_data",
                on(g, |g, args| {
                    let days: u32 = args
                        .optional(0, "retention_days")?
                        .unwrap_or(DEFAULT_RETENTION_DAYS);
                    encode(&g.purge_old_data(days)?)
                }),
            )
            .sync_op("monitor_and_purge", on(g, monitor_and_purge))
            .sync_op(
                "stats",
                on(g, |g, _| {
                    Ok(json!({
                        "nodes": g.node_count(),
                        "relationships": g.relationship_count(),
                    }))
                }),
            )
            .build()
    }
}
