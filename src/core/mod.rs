//! Core engine - process supervision, event delivery, task orchestration

mod bus;
mod event;
mod job;
mod orchestrator;
mod process;
mod registry;
mod task;

pub use bus::{EventBus, EventDrain, EventSender, POLL_INTERVAL};
pub use event::{Event, EventKind, Payload, Progress};
pub use job::{
    build_download_args, build_metadata_args, child_env, resolve_output_template, JobConfig,
    Quality, ToolPaths, DEFAULT_NAMING_PATTERN, EXT_PLACEHOLDER, PROGRESS_TEMPLATE,
};
pub use orchestrator::{
    JobOrchestrator, CANCELLED_TEXT, COMPLETED_TEXT, DRAIN_GRACE, EXIT_GRACE,
};
pub use process::{ProcessHandle, TOOL_LOG_TARGET};
pub use registry::{CancelHandle, TaskRegistry};
pub use task::{Task, TaskId, TaskState};
