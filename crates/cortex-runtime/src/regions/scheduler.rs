//! `scheduler` region – task admission and feedback over dispatch.
//!
//! | Operation | Arguments | Result |
//! |---|---|---|
//! | `admit` | `name`, `priority`?, `metadata`? | [`Admission`][cortex_kernel::Admission] |
//! | `reprioritize` | `urgency_factor`?, `decay_factor`? | `{"rescored": n}` |
//! | `next` | – | [`Task`][cortex_kernel::Task] |
//! | `feedback` | `name`, `outcome`, `detail`? | [`FeedbackResult`][cortex_kernel::FeedbackResult] |
//! | `queued` / `in_flight` / `archived` / `dropped` | – | `[Task]` |
//! | `len` | – | number of queued tasks |
//!
//! `admit` takes `metadata.priority` when present and falls back to the
//! `priority` argument, then `normal`.

use std::sync::{Arc, Mutex};

use cortex_kernel::{CapabilityHandle, Region, Scheduler};
use cortex_types::{Args, CortexError, Map, Outcome, Priority, Value};
use serde_json::json;

use super::{encode, lock, SCHEDULER};

/// Publishes a shared [`Scheduler`] as a region.
pub struct SchedulerRegion {
    scheduler: Arc<Mutex<Scheduler>>,
    urgency_factor: f64,
    decay_factor: f64,
}

impl SchedulerRegion {
    /// `urgency_factor` / `decay_factor` are used by `reprioritize` when the
    /// caller omits them.
    pub fn new(scheduler: Arc<Mutex<Scheduler>>, urgency_factor: f64, decay_factor: f64) -> Self {
        Self {
            scheduler,
            urgency_factor,
            decay_factor,
        }
    }

    fn admit(&self, args: Args) -> Result<Value, CortexError> {
        let name = task_name(&args)?;
        let metadata: Option<Map<String, Value>> = args.optional(2, "metadata")?;
        // A priority already carried in the metadata outranks the argument.
        let raw = metadata
            .as_ref()
            .and_then(|m| m.get("priority"))
            .or_else(|| args.get(1, "priority"))
            .filter(|v| !v.is_null());
        let priority = match raw {
            Some(raw) => parse_priority(raw)?,
            None => Priority::NORMAL,
        };
        let admission = lock(&self.scheduler).admit(&name, priority, metadata)?;
        encode(&admission)
    }

    fn reprioritize(&self, args: Args) -> Result<Value, CortexError> {
        let urgency = args
            .optional(0, "urgency_factor")?
            .unwrap_or(self.urgency_factor);
        let decay = args.optional(1, "decay_factor")?.unwrap_or(self.decay_factor);
        let rescored = lock(&self.scheduler).reprioritize(urgency, decay)?;
        Ok(json!({ "rescored": rescored }))
    }

    fn feedback(&self, args: Args) -> Result<Value, CortexError> {
        let name = task_name(&args)?;
        let outcome = match args.get(1, "outcome") {
            Some(Value::String(s)) => s.parse::<Outcome>()?,
            Some(other) => {
                return Err(CortexError::InvalidOutcome {
                    outcome: other.to_string(),
                });
            }
            None => return Err(CortexError::invalid_args("missing argument `outcome`")),
        };
        let detail: Option<String> = args.optional(2, "detail")?;
        let result = lock(&self.scheduler).feedback(&name, outcome, detail)?;
        encode(&result)
    }
}

/// Task names must be strings; emptiness is checked by the scheduler.
fn task_name(args: &Args) -> Result<String, CortexError> {
    match args.get(0, "name") {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(CortexError::InvalidTask {
            reason: "task name must be a non-empty string".to_string(),
        }),
    }
}

fn parse_priority(raw: &Value) -> Result<Priority, CortexError> {
    match raw {
        Value::String(s) => s.parse(),
        Value::Number(n) => n.as_f64().map(Priority::Numeric).ok_or_else(|| {
            CortexError::InvalidTask {
                reason: format!("unrepresentable priority {n}"),
            }
        }),
        other => Err(CortexError::InvalidTask {
            reason: format!("unrecognised priority {other}"),
        }),
    }
}

impl Region for SchedulerRegion {
    fn capability(self: Arc<Self>) -> Result<CapabilityHandle, CortexError> {
        let admit = self.clone();
        let reprioritize = self.clone();
        let feedback = self.clone();
        let next = self.scheduler.clone();
        let queued = self.scheduler.clone();
        let in_flight = self.scheduler.clone();
        let archived = self.scheduler.clone();
        let dropped = self.scheduler.clone();
        let len = self.scheduler.clone();

        CapabilityHandle::builder(SCHEDULER)
            .sync_op("admit", move |args| admit.admit(args))
            .sync_op("reprioritize", move |args| reprioritize.reprioritize(args))
            .sync_op("next", move |_| encode(&lock(&next).next()?))
            .sync_op("feedback", move |args| feedback.feedback(args))
            .sync_op("queued", move |_| encode(lock(&queued).queued()))
            .sync_op("in_flight", move |_| encode(lock(&in_flight).in_flight()))
            .sync_op("archived", move |_| encode(lock(&archived).archived()))
            .sync_op("dropped", move |_| encode(lock(&dropped).dropped()))
            .sync_op("len", move |_| Ok(Value::from(lock(&len).len())))
            .build()
    }
}
