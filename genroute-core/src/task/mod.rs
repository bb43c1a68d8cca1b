//! Task tracking: status model, status boundary, reconciliation.

pub mod board;
pub mod classify;
pub mod manager;
pub mod submitter;

pub use board::{JobBoard, MemoryJobBoard, StatusQuery};
pub use classify::{classify_failure, FailureKind, RecoveryAction};
pub use manager::{
    Notification, NotificationKind, Notifications, PollOutcome, PromptFormatter, TaskManager,
    TaskManagerBuilder, MIN_POLL_INTERVAL,
};
pub use submitter::{SubmitReceipt, SubmitRejection, TaskSubmitter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Primary key assigned by the job boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Reserved id of the example entry. Never polled.
    pub const EXAMPLE: TaskId = TaskId(-1);

    pub fn is_example(self) -> bool {
        self == Self::EXAMPLE
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Job status as reported by the status boundary.
///
/// `Pending -> Processing -> {Succeeded, Failed, Finished, Replaced}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaskStatus {
    Failed,
    Processing,
    Succeeded,
    Pending,
    /// Ended without a known outcome
    Finished,
    /// Superseded by a fallback task
    Replaced,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Succeeded,
        TaskStatus::Failed,
        TaskStatus::Finished,
        TaskStatus::Replaced,
        TaskStatus::Processing,
        TaskStatus::Pending,
    ];

    pub const NON_TERMINAL: [TaskStatus; 2] = [TaskStatus::Processing, TaskStatus::Pending];

    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Processing | TaskStatus::Pending)
    }

    /// Terminal statuses that carry `failure`/`failure_code`
    pub fn is_failure(self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Finished)
    }
}

impl TryFrom<u8> for TaskStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TaskStatus::Failed),
            1 => Ok(TaskStatus::Processing),
            2 => Ok(TaskStatus::Succeeded),
            3 => Ok(TaskStatus::Pending),
            4 => Ok(TaskStatus::Finished),
            5 => Ok(TaskStatus::Replaced),
            other => Err(format!("unknown task status {}", other)),
        }
    }
}

impl From<TaskStatus> for u8 {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Failed => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Succeeded => 2,
            TaskStatus::Pending => 3,
            TaskStatus::Finished => 4,
            TaskStatus::Replaced => 5,
        }
    }
}

/// A unit of asynchronous work as reported by the status boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<TaskId>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(
        default,
        alias = "failureCode",
        deserialize_with = "lenient_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub failure_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            generation_id: None,
            status,
            output: None,
            failure: None,
            failure_code: None,
            prompt: None,
            created_at: None,
            tool: None,
        }
    }
}

// Providers report failure codes as strings or bare numbers.
fn lenient_code<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Caller-facing status of a visible entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Generating,
    Done,
}

/// Caller-facing projection of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleEntry {
    /// Canonical identity: the task id, re-keyed to the generation id on success
    pub id: TaskId,
    /// Task id this entry carried before re-keying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl VisibleEntry {
    /// The sentinel example entry
    pub fn example(output: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: TaskId::EXAMPLE,
            task_id: None,
            status: EntryStatus::Done,
            output: Some(output.into()),
            prompt: prompt.into(),
            created_at: None,
        }
    }

    pub fn generating(id: TaskId, prompt: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            task_id: None,
            status: EntryStatus::Generating,
            output: None,
            prompt: prompt.into(),
            created_at: Some(created_at),
        }
    }

    pub fn is_example(&self) -> bool {
        self.id.is_example()
    }

    pub fn is_generating(&self) -> bool {
        self.status == EntryStatus::Generating
    }

    /// Matches a task id either directly or through its pre-rekey alias
    pub fn matches(&self, id: TaskId) -> bool {
        self.id == id || self.task_id == Some(id)
    }
}

/// Restore the visible ordering: example last, generating entries first,
/// each partition by `created_at` descending. Stable.
pub fn sort_entries(entries: &mut [VisibleEntry]) {
    entries.sort_by(|a, b| {
        a.is_example()
            .cmp(&b.is_example())
            .then_with(|| b.is_generating().cmp(&a.is_generating()))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Whether `entries` already satisfies the visible ordering
pub fn is_sorted(entries: &[VisibleEntry]) -> bool {
    entries.windows(2).all(|pair| {
        let (a, b) = (&pair[0], &pair[1]);
        if a.is_example() != b.is_example() {
            return b.is_example();
        }
        if a.is_generating() != b.is_generating() {
            return a.is_generating();
        }
        a.created_at >= b.created_at
    })
}
