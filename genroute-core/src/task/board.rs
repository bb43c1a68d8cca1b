//! Status-query boundary.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use super::{Task, TaskId, TaskStatus};
use crate::error::GenError;

/// Status query sent to the job board.
///
/// Queries by id ignore the tool filter. Tool queries are used at cold start
/// to recover work left in flight by a previous session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_ids: Vec<TaskId>,
    pub statuses: Vec<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl StatusQuery {
    /// Every status of the given ids
    pub fn by_ids(ids: impl IntoIterator<Item = TaskId>) -> Self {
        Self {
            task_ids: ids.into_iter().collect(),
            statuses: TaskStatus::ALL.to_vec(),
            tool: None,
        }
    }

    /// Non-terminal tasks of a tool
    pub fn in_flight_for_tool(tool: impl Into<String>) -> Self {
        Self {
            task_ids: Vec::new(),
            statuses: TaskStatus::NON_TERMINAL.to_vec(),
            tool: Some(tool.into()),
        }
    }

    /// Whether a task satisfies this query
    pub fn matches(&self, task: &Task) -> bool {
        if !self.statuses.contains(&task.status) {
            return false;
        }
        if !self.task_ids.is_empty() {
            return self.task_ids.contains(&task.id);
        }
        match &self.tool {
            Some(tool) => task.tool.as_deref() == Some(tool.as_str()),
            None => true,
        }
    }
}

/// Job-status boundary
#[async_trait]
pub trait JobBoard: Send + Sync + Debug + 'static {
    /// Tasks matching the query
    async fn query(&self, query: StatusQuery) -> Result<Vec<Task>, GenError>;

    /// Completed results persisted for a tool, used to seed the visible list
    async fn load_results(&self, tool: &str) -> Result<Vec<Task>, GenError> {
        let _ = tool;
        Ok(Vec::new())
    }
}

/// In-memory job board
#[derive(Debug, Default)]
pub struct MemoryJobBoard {
    tasks: DashMap<TaskId, Task>,
}

impl MemoryJobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a task
    pub fn upsert(&self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    /// Change a task's status in place
    pub fn set_status(&self, id: TaskId, status: TaskStatus) {
        if let Some(mut task) = self.tasks.get_mut(&id) {
            task.status = status;
        }
    }

    pub fn remove(&self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id).map(|(_, task)| task)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl JobBoard for MemoryJobBoard {
    async fn query(&self, query: StatusQuery) -> Result<Vec<Task>, GenError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by_key(|task| task.id);
        Ok(tasks)
    }

    async fn load_results(&self, tool: &str) -> Result<Vec<Task>, GenError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|entry| {
                let task = entry.value();
                task.status == TaskStatus::Succeeded && task.tool.as_deref() == Some(tool)
            })
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by_key(|task| task.id);
        Ok(tasks)
    }
}
