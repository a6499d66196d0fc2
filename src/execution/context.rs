//! Execution context tracking for a created container.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::task::Task;

/// Lifecycle state of a task's container.
///
/// ```text
/// Created → Running → Completed
///    │         │
///    └─────────┴────→ Failed / Destroyed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Container exists but has not been started.
    Created,
    /// Container was started.
    Running,
    /// Container exited and its output was captured.
    Completed,
    /// A lifecycle operation failed.
    Failed,
    /// Container was removed; the identity is no longer usable.
    Destroyed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Created => write!(f, "created"),
            TaskState::Running => write!(f, "running"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Record of a task's container, owned by the caller.
///
/// Only driver operations mutate a context. The task's host hint holds the
/// concrete host the container was created on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// The task, with its host hint resolved.
    pub task: Task,
    /// Engine-assigned container ID.
    pub id: String,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status, once the container has been waited on.
    pub status: Option<i64>,
    state: TaskState,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl ExecutionContext {
    pub(crate) fn new(task: Task, id: impl Into<String>) -> Self {
        Self {
            task,
            id: id.into(),
            stdout: String::new(),
            stderr: String::new(),
            status: None,
            state: TaskState::Created,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TaskState) {
        if matches!(state, TaskState::Completed | TaskState::Failed) {
            self.finished_at = Some(Utc::now());
        }
        self.state = state;
    }

    /// Returns when the container was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the task completed or failed.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns true once the container has been removed.
    pub fn is_destroyed(&self) -> bool {
        self.state == TaskState::Destroyed
    }

    /// Returns true if the task exited with status 0.
    pub fn succeeded(&self) -> bool {
        self.state == TaskState::Completed && self.status == Some(0)
    }
}
