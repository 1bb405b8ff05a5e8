//! `cortex-memory` – Stores & Recall.
//!
//! Holds the agent's bounded short-term stores and its persistent key/value
//! memory on a local SQLite substrate.
//!
//! # Modules
//!
//! - [`bounded`] – [`BoundedStore`][bounded::BoundedStore]: capacity-limited
//!   store generic over an [`EvictionPolicy`][bounded::EvictionPolicy].
//! - [`working_memory`] – [`WorkingMemory`][working_memory::WorkingMemory]:
//!   FIFO eviction, capacity 20 by default.
//! - [`cache`] – [`Cache`][cache::Cache]: lowest-priority eviction, capacity
//!   50 by default.
//! - [`kv_store`] – [`KvStore`][kv_store::KvStore]: one SQLite table of JSON
//!   values with tag, priority, importance, and age queries.
//! - [`graph`] – [`ContextGraph`][graph::ContextGraph]: contextual memory,
//!   concepts joined by undirected relationships with path and cluster
//!   queries.

pub mod bounded;
pub mod cache;
pub mod graph;
pub mod kv_store;
pub mod working_memory;

pub use bounded::{BoundedEntry, BoundedStore, EvictionPolicy};
pub use cache::{Cache, LowestPriority};
pub use graph::{Centrality, ContextGraph, GraphError, Node, PurgeReport, Relationship};
pub use kv_store::{DEFAULT_IMPORTANCE, KvRecord, KvStore, KvStoreError};
pub use working_memory::{InsertionOrder, WorkingMemory};
