//! [`Scheduler`] – priority task queue with decay, retry, and archival.
//!
//! # Lifecycle
//!
//! ```text
//!   admit ──► queued ──next()──► in flight ──feedback(success)──► archived
//!               ▲                    │
//!               └──feedback(failure)─┤ (retry_count ≤ max_retries, demoted to low)
//!                                    └──feedback(failure)──► dropped
//! ```
//!
//! A task handed out by [`Scheduler::next`] stays live until feedback
//! arrives; only then is it archived, re-queued, or dropped.  Tasks still
//! waiting in the queue may receive feedback too.
//!
//! # Ordering
//!
//! The queue is kept sorted by `priority_score` descending, ties broken by
//! admission order.  Admission and re-queueing insert at the ordered
//! position without disturbing the relative order of other tasks;
//! [`Scheduler::reprioritize`] is the only operation that reorders in place.
//!
//! # Decay
//!
//! ```text
//! priority_score = weight / (1 + age_seconds)
//! weight         = urgency_factor (high) | 1.0 (normal, numeric) | decay_factor (low)
//! ```
//!
//! A task without a usable creation timestamp is treated as infinitely old
//! and sinks to a score of zero.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use cortex_types::{CortexError, Map, Outcome, Priority, TaskState, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error_sink::{report, ErrorSink, TracingSink};

// ─────────────────────────────────────────────────────────────────────────────
// Constants & configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Failures tolerated before a task is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default weight applied to `high` tasks during re-prioritization.
pub const DEFAULT_URGENCY_FACTOR: f64 = 1.5;
/// Default weight applied to `low` tasks during re-prioritization.
pub const DEFAULT_DECAY_FACTOR: f64 = 0.9;

const COMPONENT: &str = "scheduler";

/// Tunables for a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// A task is dropped once its `retry_count` exceeds this value.
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Task
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Identity of this admission cycle.
    pub id: Uuid,
    pub name: String,
    pub base_priority: Priority,
    /// `None` when the caller supplied a timestamp that could not be parsed.
    pub created_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    /// Transient ranking key.
    pub priority_score: f64,
    pub state: TaskState,
    pub metadata: Map<String, Value>,
    /// Detail attached to the most recent feedback.
    pub detail: Option<String>,
    #[serde(skip)]
    seq: u64,
}

impl Task {
    /// Seconds elapsed since admission; `+inf` without a creation timestamp.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        match self.created_at {
            Some(created) => (now - created)
                .num_microseconds()
                .map(|us| (us as f64 / 1_000_000.0).max(0.0))
                .unwrap_or(f64::INFINITY),
            None => f64::INFINITY,
        }
    }
}

/// Decayed score for a task of `priority` that is `age_seconds` old.
pub fn decayed_score(priority: Priority, age_seconds: f64, urgency_factor: f64, decay_factor: f64) -> f64 {
    priority.weight(urgency_factor, decay_factor) / (1.0 + age_seconds)
}

/// Queue order: higher score first, then earlier admission.
fn rank(a: &Task, b: &Task) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then(a.seq.cmp(&b.seq))
}

/// Parse a caller-supplied timestamp: RFC 3339, or a naive ISO-8601
/// date-time interpreted as UTC.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// Acknowledgment returned by [`Scheduler::admit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admission {
    pub id: Uuid,
    pub name: String,
    pub priority_score: f64,
    /// Zero-based position in the queue after insertion.
    pub position: usize,
    pub queue_len: usize,
}

/// What [`Scheduler::feedback`] did with the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FeedbackResult {
    Archived,
    Requeued { retry_count: u32 },
    Dropped { retry_count: u32 },
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the live task queue and the archive / drop histories.
///
/// # Example
///
/// ```
/// use cortex_kernel::scheduler::{FeedbackResult, Scheduler};
/// use cortex_types::{Outcome, Priority};
///
/// let mut scheduler = Scheduler::default();
/// scheduler.admit("Prepare Dataset", Priority::HIGH, None).unwrap();
///
/// let task = scheduler.next().unwrap();
/// assert_eq!(task.name, "Prepare Dataset");
///
/// let result = scheduler.feedback("Prepare Dataset", Outcome::Success, None).unwrap();
/// assert_eq!(result, FeedbackResult::Archived);
/// assert!(scheduler.feedback("Prepare Dataset", Outcome::Success, None).is_err());
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    sink: Arc<dyn ErrorSink>,
    queue: Vec<Task>,
    in_flight: Vec<Task>,
    archived: Vec<Task>,
    dropped: Vec<Task>,
    next_seq: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            sink: Arc::new(TracingSink),
            queue: Vec::new(),
            in_flight: Vec::new(),
            archived: Vec::new(),
            dropped: Vec::new(),
            next_seq: 0,
        }
    }

    /// Report drops and bad timestamps to `sink` instead of the default
    /// [`TracingSink`].
    pub fn with_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Admit a new task.
    ///
    /// A `"timestamp"` entry in `metadata` is honoured as the creation time;
    /// when absent the current time is used and recorded there.
    ///
    /// # Errors
    ///
    /// [`CortexError::InvalidTask`] when `name` is blank, when a task with the
    /// same name is still live, or when a numeric priority is not finite.
    pub fn admit(
        &mut self,
        name: &str,
        base_priority: Priority,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Admission, CortexError> {
        self.admit_at(name, base_priority, metadata, Utc::now())
    }

    /// [`Scheduler::admit`] with an explicit clock reading.
    pub fn admit_at(
        &mut self,
        name: &str,
        base_priority: Priority,
        metadata: Option<Map<String, Value>>,
        now: DateTime<Utc>,
    ) -> Result<Admission, CortexError> {
        if name.trim().is_empty() {
            return Err(CortexError::InvalidTask {
                reason: "task name must be a non-empty string".to_string(),
            });
        }
        if !base_priority.numeric().is_finite() {
            return Err(CortexError::InvalidTask {
                reason: format!("priority for '{name}' must be finite"),
            });
        }
        if self.find_live(name).is_some() {
            return Err(CortexError::InvalidTask {
                reason: format!("task '{name}' is already queued"),
            });
        }

        let mut metadata = metadata.unwrap_or_default();
        let created_at = match metadata.get("timestamp") {
            Some(raw) => parse_timestamp(raw),
            None => {
                metadata.insert("timestamp".to_string(), Value::from(now.to_rfc3339()));
                Some(now)
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let task = Task {
            id: Uuid::new_v4(),
            name: name.to_string(),
            base_priority,
            created_at,
            retry_count: 0,
            priority_score: base_priority.numeric(),
            state: TaskState::Queued,
            metadata,
            detail: None,
            seq,
        };
        let admission = Admission {
            id: task.id,
            name: task.name.clone(),
            priority_score: task.priority_score,
            position: 0,
            queue_len: 0,
        };
        let position = self.insert_ordered(task);
        debug!(task = name, priority = %base_priority, position, "task admitted");
        Ok(Admission {
            position,
            queue_len: self.queue.len(),
            ..admission
        })
    }

    /// Recompute every live task's score with age decay and re-sort.
    ///
    /// Returns the number of queued tasks rescored.
    ///
    /// # Errors
    ///
    /// [`CortexError::InvalidArguments`] when either factor is not finite.
    pub fn reprioritize(&mut self, urgency_factor: f64, decay_factor: f64) -> Result<usize, CortexError> {
        self.reprioritize_at(urgency_factor, decay_factor, Utc::now())
    }

    /// [`Scheduler::reprioritize`] with an explicit clock reading.
    pub fn reprioritize_at(
        &mut self,
        urgency_factor: f64,
        decay_factor: f64,
        now: DateTime<Utc>,
    ) -> Result<usize, CortexError> {
        if !urgency_factor.is_finite() || !decay_factor.is_finite() {
            return Err(CortexError::invalid_args(
                "urgency_factor and decay_factor must be finite",
            ));
        }
        for task in self.queue.iter_mut().chain(self.in_flight.iter_mut()) {
            if task.created_at.is_none() {
                report(
                    self.sink.as_ref(),
                    COMPONENT,
                    &format!("invalid timestamp for task '{}'; treating as oldest", task.name),
                );
            }
            let age = task.age_seconds(now);
            task.priority_score = decayed_score(task.base_priority, age, urgency_factor, decay_factor);
        }
        self.queue.sort_by(rank);
        debug!(tasks = self.queue.len(), urgency_factor, decay_factor, "queue reprioritized");
        Ok(self.queue.len())
    }

    /// Hand out the highest-ranked queued task.
    ///
    /// The task stays live (in flight) until [`Scheduler::feedback`].
    ///
    /// # Errors
    ///
    /// [`CortexError::EmptyQueue`] when nothing is queued.
    pub fn next(&mut self) -> Result<Task, CortexError> {
        if self.queue.is_empty() {
            return Err(CortexError::EmptyQueue);
        }
        let task = self.queue.remove(0);
        debug!(task = %task.name, score = task.priority_score, "task dequeued");
        self.in_flight.push(task.clone());
        Ok(task)
    }

    /// Apply an outcome to the live task called `name`.
    ///
    /// # Errors
    ///
    /// [`CortexError::TaskNotFound`] when no live task has that name
    /// (including tasks already archived or dropped).
    pub fn feedback(
        &mut self,
        name: &str,
        outcome: Outcome,
        detail: Option<String>,
    ) -> Result<FeedbackResult, CortexError> {
        let Some(location) = self.find_live(name) else {
            return Err(CortexError::TaskNotFound {
                name: name.to_string(),
            });
        };
        let (mut task, queued_at) = match location {
            Location::Queued(i) => (self.queue.remove(i), Some(i)),
            Location::InFlight(i) => (self.in_flight.remove(i), None),
        };
        if detail.is_some() {
            task.detail = detail;
        }

        match outcome {
            Outcome::Success => {
                task.state = TaskState::Archived;
                info!(task = name, "task archived");
                self.archived.push(task);
                Ok(FeedbackResult::Archived)
            }
            Outcome::Failure => {
                task.retry_count += 1;
                let retry_count = task.retry_count;
                if retry_count > self.config.max_retries {
                    task.state = TaskState::Dropped;
                    report(
                        self.sink.as_ref(),
                        COMPONENT,
                        &format!("task '{name}' exceeded retry limit and was dropped"),
                    );
                    self.dropped.push(task);
                    return Ok(FeedbackResult::Dropped { retry_count });
                }

                task.base_priority = Priority::LOW;
                warn!(task = name, retry_count, "task failed; requeued at low priority");
                match queued_at {
                    // Still waiting: keep its place.
                    Some(i) => self.queue.insert(i, task),
                    // Back from a worker: re-rank at the demoted class.
                    None => {
                        task.priority_score = task.base_priority.numeric();
                        self.insert_ordered(task);
                    }
                }
                Ok(FeedbackResult::Requeued { retry_count })
            }
        }
    }

    /// Queued tasks in dispatch order.
    pub fn queued(&self) -> &[Task] {
        &self.queue
    }

    /// Tasks handed out by [`Scheduler::next`] that await feedback.
    pub fn in_flight(&self) -> &[Task] {
        &self.in_flight
    }

    /// Successfully completed tasks, oldest first.
    pub fn archived(&self) -> &[Task] {
        &self.archived
    }

    /// Tasks dropped after exhausting their retries, oldest first.
    pub fn dropped(&self) -> &[Task] {
        &self.dropped
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn find_live(&self, name: &str) -> Option<Location> {
        self.queue
            .iter()
            .position(|t| t.name == name)
            .map(Location::Queued)
            .or_else(|| {
                self.in_flight
                    .iter()
                    .position(|t| t.name == name)
                    .map(Location::InFlight)
            })
    }

    fn insert_ordered(&mut self, task: Task) -> usize {
        let position = self
            .queue
            .partition_point(|t| rank(t, &task) == Ordering::Less);
        self.queue.insert(position, task);
        position
    }
}

enum Location {
    Queued(usize),
    InFlight(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_sink::MemorySink;
    use chrono::TimeDelta;
    use serde_json::json;

    fn names(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn next_follows_priority_class_order() {
        let mut s = Scheduler::default();
        s.admit("A", Priority::HIGH, None).unwrap();
        s.admit("B", Priority::LOW, None).unwrap();
        s.admit("C", Priority::NORMAL, None).unwrap();

        assert_eq!(s.next().unwrap().name, "A");
        assert_eq!(s.next().unwrap().name, "C");
        assert_eq!(s.next().unwrap().name, "B");
        assert_eq!(s.next().unwrap_err(), CortexError::EmptyQueue);
    }

    #[test]
    fn ties_keep_admission_order() {
        let mut s = Scheduler::default();
        for name in ["first", "second", "third"] {
            s.admit(name, Priority::NORMAL, None).unwrap();
        }
        assert_eq!(names(s.queued()), vec!["first", "second", "third"]);
    }

    #[test]
    fn numeric_override_passes_through() {
        let mut s = Scheduler::default();
        s.admit("high", Priority::HIGH, None).unwrap();
        let ack = s.admit("override", Priority::Numeric(10.0), None).unwrap();
        assert_eq!(ack.priority_score, 10.0);
        assert_eq!(ack.position, 0);
        assert_eq!(ack.queue_len, 2);
        assert_eq!(s.next().unwrap().name, "override");
    }

    #[test]
    fn blank_name_is_invalid() {
        let mut s = Scheduler::default();
        assert!(matches!(
            s.admit("", Priority::NORMAL, None),
            Err(CortexError::InvalidTask { .. })
        ));
        assert!(matches!(
            s.admit("   ", Priority::NORMAL, None),
            Err(CortexError::InvalidTask { .. })
        ));
        assert!(s.is_empty());
    }

    #[test]
    fn non_finite_priority_is_invalid() {
        let mut s = Scheduler::default();
        let err = s.admit("nan", Priority::Numeric(f64::NAN), None).unwrap_err();
        assert_eq!(err.kind(), "invalid_task");
    }

    #[test]
    fn duplicate_live_name_is_invalid() {
        let mut s = Scheduler::default();
        s.admit("dup", Priority::NORMAL, None).unwrap();
        assert!(s.admit("dup", Priority::HIGH, None).is_err());
        // Still rejected while in flight.
        s.next().unwrap();
        assert!(s.admit("dup", Priority::HIGH, None).is_err());
        // Accepted again as a fresh identity once archived.
        s.feedback("dup", Outcome::Success, None).unwrap();
        let ack = s.admit("dup", Priority::HIGH, None).unwrap();
        assert_ne!(ack.id, s.archived()[0].id);
    }

    #[test]
    fn admission_records_timestamp_metadata() {
        let mut s = Scheduler::default();
        let mut meta = Map::new();
        meta.insert("tags".into(), json!(["data"]));
        s.admit("tagged", Priority::NORMAL, Some(meta)).unwrap();
        let task = &s.queued()[0];
        assert!(task.metadata.contains_key("timestamp"));
        assert_eq!(task.metadata["tags"], json!(["data"]));
        assert!(task.created_at.is_some());
    }

    #[test]
    fn caller_timestamp_is_honoured() {
        let mut s = Scheduler::default();
        let mut meta = Map::new();
        meta.insert("timestamp".into(), json!("2024-01-01T12:00:00"));
        s.admit("naive", Priority::NORMAL, Some(meta)).unwrap();
        let created = s.queued()[0].created_at.unwrap();
        assert_eq!(created.to_rfc3339(), "2024-01-01T12:00:00+00:00");
    }

    #[test]
    fn decay_is_strictly_monotonic_in_age() {
        let mut previous = f64::INFINITY;
        for age in [0.0, 0.5, 1.0, 10.0, 3_600.0, 86_400.0] {
            let score = decayed_score(Priority::NORMAL, age, 1.5, 0.9);
            assert!(score < previous, "score must decrease with age");
            previous = score;
        }
    }

    #[test]
    fn reprioritize_decays_with_measured_age() {
        let mut s = Scheduler::default();
        let t0 = Utc::now();
        s.admit_at("job", Priority::NORMAL, None, t0).unwrap();

        s.reprioritize_at(1.5, 0.9, t0 + TimeDelta::seconds(1)).unwrap();
        let early = s.queued()[0].priority_score;
        s.reprioritize_at(1.5, 0.9, t0 + TimeDelta::seconds(9)).unwrap();
        let late = s.queued()[0].priority_score;

        assert!((early - 0.5).abs() < 1e-9);
        assert!((late - 0.1).abs() < 1e-9);
        assert!(late < early);
    }

    #[test]
    fn reprioritize_favours_fresh_high_over_stale_high() {
        let mut s = Scheduler::default();
        let t0 = Utc::now();
        s.admit_at("stale", Priority::HIGH, None, t0).unwrap();
        s.admit_at("fresh", Priority::HIGH, None, t0 + TimeDelta::seconds(100)).unwrap();
        s.admit_at("normal", Priority::NORMAL, None, t0 + TimeDelta::seconds(100)).unwrap();

        s.reprioritize_at(1.5, 0.9, t0 + TimeDelta::seconds(100)).unwrap();
        assert_eq!(names(s.queued()), vec!["fresh", "normal", "stale"]);
    }

    #[test]
    fn unparseable_timestamp_sinks_to_bottom() {
        let sink = Arc::new(MemorySink::new());
        let mut s = Scheduler::default().with_sink(sink.clone());
        let mut meta = Map::new();
        meta.insert("timestamp".into(), json!("not a date"));
        s.admit("broken", Priority::HIGH, Some(meta)).unwrap();
        s.admit("fine", Priority::LOW, None).unwrap();

        let rescored = s.reprioritize(1.5, 0.9).unwrap();
        assert_eq!(rescored, 2);
        assert_eq!(names(s.queued()), vec!["fine", "broken"]);
        assert_eq!(s.queued()[1].priority_score, 0.0);
        assert!(sink.records()[0].1.contains("broken"));
    }

    #[test]
    fn reprioritize_rejects_non_finite_factors() {
        let mut s = Scheduler::default();
        assert!(s.reprioritize(f64::INFINITY, 0.9).is_err());
        assert!(s.reprioritize(1.5, f64::NAN).is_err());
    }

    #[test]
    fn consecutive_next_scores_never_increase() {
        let mut s = Scheduler::default();
        let t0 = Utc::now();
        for (i, p) in [Priority::LOW, Priority::HIGH, Priority::NORMAL, Priority::HIGH, Priority::LOW]
            .into_iter()
            .enumerate()
        {
            s.admit_at(&format!("t{i}"), p, None, t0 + TimeDelta::seconds(i as i64)).unwrap();
        }
        s.reprioritize_at(1.5, 0.9, t0 + TimeDelta::seconds(10)).unwrap();

        let mut last = f64::INFINITY;
        while let Ok(task) = s.next() {
            assert!(task.priority_score <= last);
            last = task.priority_score;
        }
    }

    #[test]
    fn success_after_next_archives() {
        let mut s = Scheduler::default();
        s.admit("Prepare Dataset", Priority::HIGH, None).unwrap();
        assert_eq!(s.next().unwrap().name, "Prepare Dataset");
        assert_eq!(s.in_flight().len(), 1);

        let r = s
            .feedback("Prepare Dataset", Outcome::Success, Some("workflow created".into()))
            .unwrap();
        assert_eq!(r, FeedbackResult::Archived);
        assert!(s.in_flight().is_empty());
        assert_eq!(s.archived()[0].state, TaskState::Archived);
        assert_eq!(s.archived()[0].detail.as_deref(), Some("workflow created"));

        let err = s.feedback("Prepare Dataset", Outcome::Success, None).unwrap_err();
        assert!(matches!(err, CortexError::TaskNotFound { .. }));
    }

    #[test]
    fn success_on_queued_task_archives() {
        let mut s = Scheduler::default();
        s.admit("queued", Priority::NORMAL, None).unwrap();
        s.feedback("queued", Outcome::Success, None).unwrap();
        assert!(s.is_empty());
        assert_eq!(s.archived().len(), 1);
    }

    #[test]
    fn fourth_failure_drops_task() {
        let sink = Arc::new(MemorySink::new());
        let mut s = Scheduler::default().with_sink(sink.clone());
        s.admit("flaky", Priority::HIGH, None).unwrap();

        for expected in 1..=3 {
            let r = s.feedback("flaky", Outcome::Failure, None).unwrap();
            assert_eq!(r, FeedbackResult::Requeued { retry_count: expected });
            assert_eq!(s.queued()[0].base_priority, Priority::LOW);
        }
        let r = s.feedback("flaky", Outcome::Failure, None).unwrap();
        assert_eq!(r, FeedbackResult::Dropped { retry_count: 4 });

        assert_eq!(s.next().unwrap_err(), CortexError::EmptyQueue);
        assert_eq!(s.dropped()[0].state, TaskState::Dropped);
        assert!(matches!(
            s.feedback("flaky", Outcome::Failure, None),
            Err(CortexError::TaskNotFound { .. })
        ));
        assert!(sink.records().iter().any(|(_, m)| m.contains("retry limit")));
    }

    #[test]
    fn failure_in_queue_keeps_position() {
        let mut s = Scheduler::default();
        s.admit("a", Priority::HIGH, None).unwrap();
        s.admit("b", Priority::NORMAL, None).unwrap();
        s.admit("c", Priority::LOW, None).unwrap();
        s.feedback("a", Outcome::Failure, None).unwrap();
        // Demotion only affects ranking after the next reprioritize pass.
        assert_eq!(names(s.queued()), vec!["a", "b", "c"]);

        s.reprioritize_at(1.5, 0.9, Utc::now()).unwrap();
        assert_eq!(s.queued()[0].name, "b");
    }

    #[test]
    fn failure_after_next_requeues_in_order() {
        let mut s = Scheduler::default();
        s.admit("a", Priority::HIGH, None).unwrap();
        s.admit("b", Priority::NORMAL, None).unwrap();
        let task = s.next().unwrap();
        assert_eq!(task.name, "a");

        s.feedback("a", Outcome::Failure, Some("timeout".into())).unwrap();
        assert!(s.in_flight().is_empty());
        assert_eq!(names(s.queued()), vec!["b", "a"]);
        assert_eq!(s.queued()[1].retry_count, 1);
        assert_eq!(s.queued()[1].detail.as_deref(), Some("timeout"));
    }

    #[test]
    fn failed_in_flight_task_is_reranked_as_low() {
        let mut s = Scheduler::default();
        s.admit("flaky", Priority::HIGH, None).unwrap();
        s.admit("steady", Priority::NORMAL, None).unwrap();
        s.admit("later", Priority::LOW, None).unwrap();
        assert_eq!(s.next().unwrap().name, "flaky");

        s.feedback("flaky", Outcome::Failure, None).unwrap();
        let flaky = s.queued().iter().find(|t| t.name == "flaky").unwrap();
        assert_eq!(flaky.base_priority, Priority::LOW);
        assert_eq!(flaky.priority_score, Priority::LOW.numeric());
        // Same class as `later`; admission order breaks the tie.
        assert_eq!(names(s.queued()), vec!["steady", "flaky", "later"]);
        assert_eq!(s.next().unwrap().name, "steady");
    }

    #[test]
    fn custom_retry_ceiling() {
        let mut s = Scheduler::new(SchedulerConfig { max_retries: 0 });
        s.admit("once", Priority::NORMAL, None).unwrap();
        assert_eq!(
            s.feedback("once", Outcome::Failure, None).unwrap(),
            FeedbackResult::Dropped { retry_count: 1 }
        );
    }

    #[test]
    fn unknown_task_feedback() {
        let mut s = Scheduler::default();
        let err = s.feedback("ghost", Outcome::Success, None).unwrap_err();
        assert_eq!(err, CortexError::TaskNotFound { name: "ghost".into() });
    }

    #[test]
    fn feedback_result_serializes_with_status() {
        let json = serde_json::to_value(FeedbackResult::Requeued { retry_count: 2 }).unwrap();
        assert_eq!(json, json!({"status": "requeued", "retry_count": 2}));
        let json = serde_json::to_value(FeedbackResult::Archived).unwrap();
        assert_eq!(json, json!({"status": "archived"}));
    }
}
