//! Error taxonomy for download tasks
//!
//! Only [`DownloadError::Launch`] ever reaches the caller of
//! [`JobOrchestrator::start`](crate::core::JobOrchestrator::start). Every
//! other variant is raised inside a worker and converted into a terminal
//! `Error` event for the task.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    /// The external tool could not be started.
    #[error("failed to launch {}: {source}", path.display())]
    Launch {
        /// Program path that was attempted.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the merged output stream failed mid-task.
    #[error("output stream failed: {0}")]
    Stream(#[from] io::Error),

    /// The tool exited with a non-zero code and no cancellation was requested.
    #[error("Process failed (exit code {code})")]
    NonZeroExit { code: i32 },

    /// The worker itself broke (blocking read panicked or was aborted).
    #[error("worker failed: {0}")]
    Worker(String),
}

impl DownloadError {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DownloadError::Launch { .. } => "launch_failure",
            DownloadError::Stream(_) => "stream_failure",
            DownloadError::NonZeroExit { .. } => "non_zero_exit",
            DownloadError::Worker(_) => "worker_failure",
        }
    }
}
