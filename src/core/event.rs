//! Task events - what the consumer sees
//!
//! JSON-serializable; one event per classified output line plus exactly one
//! terminal event per task.

use super::task::{TaskId, TaskState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    Status,
    Error,
    Log,
}

/// Structured progress, parsed from the `percent:eta:speed` line template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// `<digits>.<digit>%` as the tool prints it; `100%` on the synthetic
    /// completion event
    pub percent: String,
    #[serde(default)]
    pub eta: String,
    #[serde(default)]
    pub speed: String,
    /// Unparsed source line, empty for synthetic events
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

impl Progress {
    /// Synthetic "done" progress sent right before a Completed status
    pub fn finished() -> Self {
        Self {
            percent: "100%".to_string(),
            eta: "00:00".to_string(),
            speed: "0MiB/s".to_string(),
            raw: String::new(),
        }
    }

    /// Percent as a 0.0 - 1.0 fraction
    pub fn fraction(&self) -> Option<f32> {
        let value: f32 = self.percent.trim().trim_end_matches('%').parse().ok()?;
        Some((value / 100.0).clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Progress(Progress),
    Text(String),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Progress(_) => None,
        }
    }

    pub fn as_progress(&self) -> Option<&Progress> {
        match self {
            Payload::Progress(progress) => Some(progress),
            Payload::Text(_) => None,
        }
    }
}

/// Immutable, task-tagged event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub task_id: TaskId,
    pub payload: Payload,
    /// Set on the one terminal event of a task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskState>,
}

impl Event {
    pub fn new(task_id: TaskId, kind: EventKind, payload: Payload) -> Self {
        Self {
            kind,
            task_id,
            payload,
            outcome: None,
        }
    }

    pub fn progress(task_id: TaskId, progress: Progress) -> Self {
        Self::new(task_id, EventKind::Progress, Payload::Progress(progress))
    }

    pub fn status(task_id: TaskId, text: impl Into<String>) -> Self {
        Self::new(task_id, EventKind::Status, Payload::Text(text.into()))
    }

    pub fn log(task_id: TaskId, text: impl Into<String>) -> Self {
        Self::new(task_id, EventKind::Log, Payload::Text(text.into()))
    }

    /// Terminal event for `outcome`: Error for Failed, Status otherwise
    pub fn terminal(task_id: TaskId, outcome: TaskState, text: impl Into<String>) -> Self {
        let kind = if outcome == TaskState::Failed {
            EventKind::Error
        } else {
            EventKind::Status
        };
        Self {
            kind,
            task_id,
            payload: Payload::Text(text.into()),
            outcome: Some(outcome),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Serialize to a JSON line
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
