//! Semantic layer - turning raw tool output into typed events

pub mod parsers;

pub use parsers::YtDlpParser;

use crate::core::{Event, EventKind, Payload, TaskId};
use std::sync::LazyLock;

static PARSER: LazyLock<YtDlpParser> = LazyLock::new(YtDlpParser::new);

/// Kind and payload of one classified output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: EventKind,
    pub payload: Payload,
}

impl Classified {
    pub fn text(kind: EventKind, line: &str) -> Self {
        Self {
            kind,
            payload: Payload::Text(line.to_string()),
        }
    }

    /// Tag with the owning task
    pub fn into_event(self, task_id: TaskId) -> Event {
        Event::new(task_id, self.kind, self.payload)
    }
}

/// Classify one yt-dlp output line with the shared parser
pub fn classify(line: &str) -> Classified {
    PARSER.classify(line)
}
