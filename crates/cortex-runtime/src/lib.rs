//! `cortex-runtime` – Composition & Regions
//!
//! Wires the kernel's dispatcher and scheduler to the memory stores and
//! exposes every subsystem as a named region.
//!
//! # Modules
//!
//! - [`coordinator`] – [`Coordinator`][coordinator::Coordinator]:
//!   builds the scheduler, working memory, and cache, registers them (plus any
//!   caller-supplied regions), freezes the registry, and routes calls through
//!   the [`Dispatcher`][cortex_kernel::Dispatcher].
//! - [`regions`] – adapters publishing the scheduler, bounded stores,
//!   SQLite key/value memory, the contextual concept graph, and an
//!   OpenAI-compatible LLM as operation tables.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod coordinator;
pub mod regions;
pub mod telemetry;

pub use coordinator::{Call, Coordinator, CoordinatorBuilder, CoordinatorConfig};
pub use regions::{ContextualRegion, KvRegion, LlmClient, LlmError, LlmRegion, SchedulerRegion, StoreRegion};
pub use telemetry::{init_tracing, LogFormat, TracerProviderGuard};
