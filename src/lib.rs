//! dlqueue - concurrent yt-dlp download orchestration
//!
//! Starts one external `yt-dlp` process per download, classifies its merged
//! output into typed events and delivers them over a single bus that a
//! consumer drains on its own schedule.

pub mod app;
pub mod core;
pub mod error;
pub mod metadata;
pub mod semantic;
pub mod settings;

// Re-exports
pub use app::{App, Summary, TaskView};
pub use core::{
    Event, EventBus, EventDrain, EventKind, EventSender, JobConfig, JobOrchestrator, Payload,
    Progress, Quality, TaskId, TaskState, ToolPaths,
};
pub use error::DownloadError;
pub use metadata::Metadata;
pub use settings::Settings;

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
