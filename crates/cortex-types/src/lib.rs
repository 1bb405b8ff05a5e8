//! `cortex-types` – vocabulary shared by every CortexOS crate.
//!
//! Holds the workspace-wide [`CortexError`] taxonomy, the [`Args`] call shape
//! used by the dispatcher, and the scheduling primitives ([`Priority`],
//! [`Outcome`], [`TaskState`]) and the [`Lookup`] answer shape that cross
//! region boundaries as JSON.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Error taxonomy
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type for registry, dispatch, scheduling, and region faults.
///
/// Every variant is serializable so a failure can be handed back to a caller
/// through the same JSON-shaped channel as a successful result.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CortexError {
    #[error("Unknown region: {region}")]
    UnknownRegion { region: String },

    #[error("Operation '{operation}' not found for region {region}")]
    OperationNotFound { region: String, operation: String },

    #[error("Region {region} failed during '{operation}': {cause}")]
    RegionExecution {
        region: String,
        operation: String,
        cause: Box<CortexError>,
    },

    #[error("Region already registered: {region}")]
    DuplicateRegion { region: String },

    #[error("Operation '{operation}' registered twice on region {region}")]
    DuplicateOperation { region: String, operation: String },

    #[error("Invalid task: {reason}")]
    InvalidTask { reason: String },

    #[error("Task not found: {name}")]
    TaskNotFound { name: String },

    #[error("Invalid outcome '{outcome}' (expected \"success\" or \"failure\")")]
    InvalidOutcome { outcome: String },

    #[error("Task queue is empty")]
    EmptyQueue,

    #[error("Invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error("Dispatch of '{operation}' on {region} was cancelled")]
    Cancelled { region: String, operation: String },

    #[error("Dispatch of '{operation}' on {region} timed out after {after_ms} ms")]
    Timeout {
        region: String,
        operation: String,
        after_ms: u64,
    },

    #[error("Region fault: {message}")]
    Fault { message: String },
}

impl CortexError {
    /// Shorthand for a region-internal [`CortexError::Fault`].
    pub fn fault(message: impl Into<String>) -> Self {
        CortexError::Fault {
            message: message.into(),
        }
    }

    /// Shorthand for [`CortexError::InvalidArguments`].
    pub fn invalid_args(reason: impl Into<String>) -> Self {
        CortexError::InvalidArguments {
            reason: reason.into(),
        }
    }

    /// Stable snake_case tag matching the serialized `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            CortexError::UnknownRegion { .. } => "unknown_region",
            CortexError::OperationNotFound { .. } => "operation_not_found",
            CortexError::RegionExecution { .. } => "region_execution",
            CortexError::DuplicateRegion { .. } => "duplicate_region",
            CortexError::DuplicateOperation { .. } => "duplicate_operation",
            CortexError::InvalidTask { .. } => "invalid_task",
            CortexError::TaskNotFound { .. } => "task_not_found",
            CortexError::InvalidOutcome { .. } => "invalid_outcome",
            CortexError::EmptyQueue => "empty_queue",
            CortexError::InvalidArguments { .. } => "invalid_arguments",
            CortexError::Cancelled { .. } => "cancelled",
            CortexError::Timeout { .. } => "timeout",
            CortexError::Fault { .. } => "fault",
        }
    }

    /// Follow nested [`CortexError::RegionExecution`] wrappers down to the
    /// error the region itself raised.
    pub fn root_cause(&self) -> &CortexError {
        let mut current = self;
        while let CortexError::RegionExecution { cause, .. } = current {
            current = cause;
        }
        current
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Call arguments
// ─────────────────────────────────────────────────────────────────────────────

/// Positional and keyword arguments for one dispatched operation.
///
/// Lookups by [`Args::required`] / [`Args::optional`] check the keyword map
/// first and fall back to the positional slot, so callers may use either
/// form for any parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    #[serde(default)]
    pub positional: Vec<Value>,
    #[serde(default)]
    pub keyword: Map<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a positional list with no keyword arguments.
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keyword: Map::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument, replacing any previous value for `name`.
    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.to_string(), value.into());
        self
    }

    /// Raw lookup: keyword `name` wins over positional slot `index`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.keyword
            .get(name)
            .or_else(|| self.positional.get(index))
    }

    /// Decode a mandatory argument.
    ///
    /// # Errors
    ///
    /// [`CortexError::InvalidArguments`] when the argument is absent, `null`,
    /// or does not decode into `T`.
    pub fn required<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, CortexError> {
        match self.optional(index, name)? {
            Some(v) => Ok(v),
            None => Err(CortexError::invalid_args(format!(
                "missing argument `{name}` (position {index})"
            ))),
        }
    }

    /// Decode an optional argument; absent and `null` both yield `None`.
    pub fn optional<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> Result<Option<T>, CortexError> {
        match self.get(index, name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone()).map(Some).map_err(|e| {
                CortexError::invalid_args(format!("argument `{name}`: {e}"))
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Priority
// ─────────────────────────────────────────────────────────────────────────────

/// Named priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    Low,
    Normal,
    High,
}

impl PriorityClass {
    /// Numeric class used for the initial ranking: low=1, normal=2, high=3.
    pub fn numeric(self) -> f64 {
        match self {
            PriorityClass::Low => 1.0,
            PriorityClass::Normal => 2.0,
            PriorityClass::High => 3.0,
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityClass::Low => write!(f, "low"),
            PriorityClass::Normal => write!(f, "normal"),
            PriorityClass::High => write!(f, "high"),
        }
    }
}

/// A task or entry priority: a named class or a raw numeric override.
///
/// Serializes as either `"low" | "normal" | "high"` or a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Priority {
    Class(PriorityClass),
    Numeric(f64),
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Class(PriorityClass::Normal)
    }
}

impl Priority {
    pub const LOW: Priority = Priority::Class(PriorityClass::Low);
    pub const NORMAL: Priority = Priority::Class(PriorityClass::Normal);
    pub const HIGH: Priority = Priority::Class(PriorityClass::High);

    /// Numeric rank: the class table for named priorities, the raw value for
    /// overrides.
    pub fn numeric(self) -> f64 {
        match self {
            Priority::Class(c) => c.numeric(),
            Priority::Numeric(n) => n,
        }
    }

    /// Decay weight used by re-prioritization.  Numeric overrides carry the
    /// same weight as `normal`.
    pub fn weight(self, urgency_factor: f64, decay_factor: f64) -> f64 {
        match self {
            Priority::Class(PriorityClass::High) => urgency_factor,
            Priority::Class(PriorityClass::Low) => decay_factor,
            _ => 1.0,
        }
    }

    /// Lenient decode used for free-form metadata: unrecognised values fall
    /// back to `normal`.
    pub fn from_metadata(value: Option<&Value>) -> Priority {
        value
            .and_then(|v| serde_json::from_value::<Priority>(v.clone()).ok())
            .filter(|p| p.numeric().is_finite())
            .unwrap_or_default()
    }
}

impl FromStr for Priority {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::LOW),
            "normal" => Ok(Priority::NORMAL),
            "high" => Ok(Priority::HIGH),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Priority::Numeric)
                .ok_or_else(|| CortexError::InvalidTask {
                    reason: format!("unrecognised priority '{s}'"),
                }),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Class(c) => write!(f, "{c}"),
            Priority::Numeric(n) => write!(f, "{n}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Task lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome reported through scheduler feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl FromStr for Outcome {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            other => Err(CortexError::InvalidOutcome {
                outcome: other.to_string(),
            }),
        }
    }
}

/// Logical state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Live: waiting in the queue or handed out by `next()` awaiting feedback.
    Queued,
    /// Terminal success.
    Archived,
    /// Terminal failure after exceeding the retry ceiling.
    Dropped,
}

/// A task suggested by a planner (e.g. the reasoning region) before admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskProposal {
    /// Short task name, used as the queue identifier.
    pub name: String,
    /// Suggested priority class.
    pub priority: PriorityClass,
}

// ─────────────────────────────────────────────────────────────────────────────
// Lookups
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a keyed read through dispatch.
///
/// A missing key is a normal answer, not an error, so it travels as a
/// tagged value: `{"status": "found", "entry": ...}` or
/// `{"status": "not_found", "key": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Lookup<T> {
    Found { entry: T },
    NotFound { key: String },
}

impl<T> Lookup<T> {
    pub fn from_option(key: &str, entry: Option<T>) -> Self {
        match entry {
            Some(entry) => Lookup::Found { entry },
            None => Lookup::NotFound {
                key: key.to_string(),
            },
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found { .. })
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found { entry } => Some(entry),
            Lookup::NotFound { .. } => None,
        }
    }
}
