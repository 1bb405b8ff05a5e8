//! `cortex-kernel` – Coordination & Routing
//!
//! The switchboard of Cortex. It owns no domain knowledge; it routes calls
//! to regions, contains their failures, and decides what runs next.
//!
//! # Modules
//!
//! - [`capability`] – [`CapabilityHandle`][capability::CapabilityHandle]:
//!   the operation table a region publishes, built through a
//!   [`CapabilityBuilder`][capability::CapabilityBuilder] that rejects
//!   duplicate operation names.
//! - [`registry`] – [`CapabilityRegistry`][registry::CapabilityRegistry]:
//!   region name → capability handle, populated once at startup.
//! - [`dispatcher`] – [`Dispatcher`][dispatcher::Dispatcher]:
//!   routes `(region, operation, args)` calls, converts handler errors and
//!   panics into [`CortexError::RegionExecution`][cortex_types::CortexError::RegionExecution],
//!   and enforces per-call timeout and cancellation bounds.
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]:
//!   priority queue with age decay, retry accounting, and archival.
//! - [`error_sink`] – [`ErrorSink`][error_sink::ErrorSink]:
//!   the `(component, message)` side channel every failure is reported to.

pub mod capability;
pub mod dispatcher;
pub mod error_sink;
pub mod registry;
pub mod scheduler;

pub use capability::{CapabilityBuilder, CapabilityHandle, Operation, OperationFuture, Region};
pub use dispatcher::{cancel_pair, CancelHandle, CancelSignal, DispatchOptions, Dispatcher};
pub use error_sink::{report, ErrorSink, FanoutSink, FileSink, MemorySink, SinkError, TracingSink};
pub use registry::CapabilityRegistry;
pub use scheduler::{
    Admission, FeedbackResult, Scheduler, SchedulerConfig, Task, DEFAULT_DECAY_FACTOR,
    DEFAULT_MAX_RETRIES, DEFAULT_URGENCY_FACTOR,
};
