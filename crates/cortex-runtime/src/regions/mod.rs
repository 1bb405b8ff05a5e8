//! Region adapters – expose subsystems as dispatchable operation tables.
//!
//! | Region | Adapter | Backing subsystem |
//! |---|---|---|
//! | `scheduler` | [`SchedulerRegion`] | [`Scheduler`][cortex_kernel::Scheduler] |
//! | `working_memory` | [`StoreRegion`] | [`WorkingMemory`][cortex_memory::WorkingMemory] |
//! | `cache` | [`StoreRegion`] | [`Cache`][cortex_memory::Cache] |
//! | `declarative`, `emotional`, `procedural` | [`KvRegion`] | [`KvStore`][cortex_memory::KvStore] |
//! | `contextual` | [`ContextualRegion`] | [`ContextGraph`][cortex_memory::ContextGraph] |
//! | `reasoning` | [`LlmRegion`] | [`LlmClient`] |

use std::sync::{Mutex, MutexGuard, PoisonError};

use cortex_types::{CortexError, Value};
use serde::Serialize;

pub mod contextual;
pub mod kv;
pub mod llm;
pub mod scheduler;
pub mod store;

pub use contextual::ContextualRegion;
pub use kv::KvRegion;
pub use llm::{LlmClient, LlmError, LlmRegion};
pub use scheduler::SchedulerRegion;
pub use store::StoreRegion;

/// Built-in region names.
pub const SCHEDULER: &str = "scheduler";
pub const WORKING_MEMORY: &str = "working_memory";
pub const CACHE: &str = "cache";

/// Conventional names for the persistent key/value regions.
pub const DECLARATIVE: &str = "declarative";
pub const EMOTIONAL: &str = "emotional";
pub const PROCEDURAL: &str = "procedural";
pub const CONTEXTUAL: &str = "contextual";
pub const REASONING: &str = "reasoning";

/// Serialize an operation result.
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, CortexError> {
    serde_json::to_value(value).map_err(|e| CortexError::fault(format!("result encoding failed: {e}")))
}

/// Lock, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
