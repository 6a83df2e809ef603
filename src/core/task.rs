//! Task identity and lifecycle state

use super::job::JobConfig;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque task identifier. Fresh UUID v4 per task, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters, for status lines
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    fn can_advance_to(&self, next: TaskState) -> bool {
        match self {
            Self::Pending => next == Self::Running,
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One download job, owned by its worker
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub url: String,
    pub config: JobConfig,
    pub retried_from: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    state: TaskState,
}

impl Task {
    pub fn new(url: impl Into<String>, config: JobConfig) -> Self {
        Self {
            id: TaskId::new(),
            url: url.into(),
            config,
            retried_from: None,
            created_at: Utc::now(),
            state: TaskState::Pending,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Time since the task was created
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    /// Move to `next`. Terminal states absorb: nothing leaves them.
    pub fn advance(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            anyhow::bail!(
                "Task {} cannot move from {} to {}",
                self.id,
                self.state,
                next
            );
        }
        self.state = next;
        Ok(())
    }
}
