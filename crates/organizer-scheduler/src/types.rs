use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Local};
use organizer_core::types::TaskId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};

/// Deferred invocation run when a job fires. Arguments are bound by capture.
pub type Action = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Identity of one registration. Two jobs for the same task never share an id,
/// so a job can remove itself without touching its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        // UUIDv7 is time-ordered, which keeps log lines easy to correlate.
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for `fire_at`.
    Pending,
    /// Taken by the runner; its action has run or is running.
    Fired,
    /// Removed before it came due.
    Cancelled,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Fired => "fired",
            JobState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A single one-shot reminder tracked by the runner.
pub struct Job {
    pub id: JobId,
    pub tag: TaskId,
    pub fire_at: DateTime<Local>,
    pub state: JobState,
    action: Option<Action>,
}

impl Job {
    pub fn new(tag: TaskId, fire_at: DateTime<Local>, action: Action) -> Self {
        Self::with_id(JobId::new(), tag, fire_at, action)
    }

    pub fn with_id(id: JobId, tag: TaskId, fire_at: DateTime<Local>, action: Action) -> Self {
        Self {
            id,
            tag,
            fire_at,
            state: JobState::Pending,
            action: Some(action),
        }
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        self.fire_at <= now
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            tag: self.tag,
            fire_at: self.fire_at,
            state: self.state,
        }
    }

    /// Run the action. A panic inside it is caught and reported as an error.
    ///
    /// The action is consumed; a second call returns `AlreadyConsumed`.
    pub fn run_action(&mut self) -> Result<()> {
        let action = self
            .action
            .take()
            .ok_or_else(|| SchedulerError::AlreadyConsumed {
                id: self.id.to_string(),
            })?;
        match catch_unwind(AssertUnwindSafe(action)) {
            Ok(result) => result,
            Err(payload) => Err(SchedulerError::ActionPanicked(panic_message(&*payload))),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("fire_at", &self.fire_at)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Read-only snapshot of a job, safe to hand out of the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub tag: TaskId,
    pub fire_at: DateTime<Local>,
    pub state: JobState,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
