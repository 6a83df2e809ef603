//! Job orchestrator - one worker per download
//!
//! The tool is spawned synchronously inside [`JobOrchestrator::start`], so a
//! missing binary is reported to the caller before anything is registered.
//! The output loop then runs as a tokio task; each blocking pipe read goes
//! through `tokio::task::spawn_blocking` so the runtime threads never wait on
//! the tool.

use super::bus::EventSender;
use super::event::{Event, Progress};
use super::job::{build_download_args, child_env, resolve_output_template, JobConfig, ToolPaths};
use super::process::ProcessHandle;
use super::registry::{CancelHandle, TaskRegistry};
use super::task::{Task, TaskId, TaskState};
use crate::error::DownloadError;
use crate::semantic::classify;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// How long a cancelled task keeps draining output before giving up on it
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How long a cancelled process gets to exit before it is killed
pub const EXIT_GRACE: Duration = Duration::from_secs(5);

const EXIT_POLL: Duration = Duration::from_millis(20);

pub const COMPLETED_TEXT: &str = "Download Completed";
pub const CANCELLED_TEXT: &str = "Download Cancelled";

/// Entry point for starting and cancelling downloads
pub struct JobOrchestrator {
    tool: ToolPaths,
    registry: Arc<TaskRegistry>,
    events: EventSender,
}

impl JobOrchestrator {
    pub fn new(tool: ToolPaths, events: EventSender) -> Self {
        Self {
            tool,
            registry: Arc::new(TaskRegistry::new()),
            events,
        }
    }

    /// Start a download. Must be called from within a tokio runtime.
    ///
    /// Only launch failures are returned; everything after that arrives as
    /// events tagged with the returned id.
    pub fn start(&self, url: &str, config: JobConfig) -> Result<TaskId, DownloadError> {
        self.launch(Task::new(url, config))
    }

    /// Start `url` again as a brand-new task linked to `previous`
    pub fn retry(
        &self,
        previous: TaskId,
        url: &str,
        config: JobConfig,
    ) -> Result<TaskId, DownloadError> {
        let mut task = Task::new(url, config);
        task.retried_from = Some(previous);
        self.launch(task)
    }

    fn launch(&self, task: Task) -> Result<TaskId, DownloadError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| DownloadError::Launch {
            path: self.tool.ytdlp.clone(),
            source: io::Error::other(e),
        })?;

        let template =
            resolve_output_template(&task.config.output_dir, &task.config.output_template);
        let args = build_download_args(&task.config, &template, &task.url);
        let process = ProcessHandle::spawn(
            &task.id.to_string(),
            &self.tool.ytdlp,
            &args,
            child_env(&task.config),
        )?;

        let id = task.id;
        match task.retried_from {
            Some(previous) => log::info!("Started download task {} (retry of {})", id, previous),
            None => log::info!("Started download task {}", id),
        }

        let cancel = CancelHandle::new();
        self.registry.register(id, cancel.clone());

        let guard = WorkerGuard {
            id,
            registry: self.registry.clone(),
            events: self.events.clone(),
            process: process.clone(),
            finished: false,
        };
        runtime.spawn(run_worker(task, process, cancel, guard));
        Ok(id)
    }

    /// Ask a task to stop. `false` if it is unknown or already finished.
    pub fn cancel(&self, id: &TaskId) -> bool {
        self.registry.request_cancel(id)
    }

    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// Stop every task now: no output drain, no exit grace
    pub fn kill_all(&self) -> usize {
        self.registry.kill_all()
    }

    pub fn is_running(&self, id: &TaskId) -> bool {
        self.registry.is_running(id)
    }

    pub fn running(&self) -> Vec<TaskId> {
        self.registry.running_ids()
    }
}

/// How the process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExitReport {
    code: i32,
    cancelled: bool,
}

/// Terminal state and message for a finished worker
fn settle(result: &Result<ExitReport, DownloadError>) -> (TaskState, String) {
    match result {
        Ok(report) if report.code == 0 => (TaskState::Completed, COMPLETED_TEXT.to_string()),
        Ok(report) if report.cancelled => (TaskState::Cancelled, CANCELLED_TEXT.to_string()),
        Ok(report) => (
            TaskState::Failed,
            DownloadError::NonZeroExit { code: report.code }.to_string(),
        ),
        Err(e) => (TaskState::Failed, e.to_string()),
    }
}

async fn run_worker(
    mut task: Task,
    process: ProcessHandle,
    cancel: CancelHandle,
    mut guard: WorkerGuard,
) {
    advance(&mut task, TaskState::Running);

    let result = supervise(task.id, &process, &cancel, &guard.events).await;
    if let Err(e) = &result {
        log::error!("Task {} {}: {}", task.id, e.as_label(), e);
        if let Err(kill_err) = process.kill() {
            log::warn!("Failed to kill task {}: {}", task.id, kill_err);
        }
    }

    let (state, text) = settle(&result);
    if state == TaskState::Completed {
        guard.events.publish(Event::progress(task.id, Progress::finished()));
    }
    advance(&mut task, state);

    log::info!(
        "Task {} {} after {}s",
        task.id,
        state,
        task.elapsed().num_seconds()
    );
    guard.finish(Event::terminal(task.id, state, text));
}

fn advance(task: &mut Task, next: TaskState) {
    if let Err(e) = task.advance(next) {
        log::warn!("{}", e);
    }
}

/// Output loop: classify and publish every line until EOF or cancellation
async fn supervise(
    id: TaskId,
    process: &ProcessHandle,
    cancel: &CancelHandle,
    events: &EventSender,
) -> Result<ExitReport, DownloadError> {
    let mut cancelled = false;
    let mut drain_deadline: Option<Instant> = None;
    let mut pending = spawn_read(process);

    loop {
        tokio::select! {
            biased;

            _ = cancel.killed() => {
                cancelled = true;
                log::warn!("Task {} force-stopped", id);
                if let Err(e) = process.kill() {
                    log::warn!("Failed to kill task {}: {}", id, e);
                }
                break;
            }

            _ = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                if let Err(e) = process.terminate().await {
                    log::warn!("Failed to terminate task {}: {}", id, e);
                }
                drain_deadline = Some(Instant::now() + DRAIN_GRACE);
            }

            _ = time::sleep_until(drain_deadline.unwrap_or_else(Instant::now)), if drain_deadline.is_some() => {
                log::warn!("Task {} output still open {:?} after cancel", id, DRAIN_GRACE);
                break;
            }

            joined = &mut pending => {
                let line = joined.map_err(|e| DownloadError::Worker(e.to_string()))??;
                match line {
                    Some(line) => {
                        if !line.is_empty() {
                            events.publish(classify(&line).into_event(id));
                        }
                        pending = spawn_read(process);
                    }
                    None => break,
                }
            }
        }
    }

    let code = wait_exit(id, process, cancelled).await?;
    Ok(ExitReport { code, cancelled })
}

fn spawn_read(process: &ProcessHandle) -> JoinHandle<io::Result<Option<String>>> {
    let process = process.clone();
    tokio::task::spawn_blocking(move || process.read_line())
}

/// Poll for the exit code; a cancelled process that lingers gets killed
async fn wait_exit(
    id: TaskId,
    process: &ProcessHandle,
    cancelled: bool,
) -> Result<i32, DownloadError> {
    let started = Instant::now();
    let mut killed = false;

    loop {
        if let Some(code) = process.exit_code()? {
            return Ok(code);
        }

        if cancelled && !killed && started.elapsed() >= EXIT_GRACE {
            log::warn!("Task {} ignored terminate, killing pid {}", id, process.pid());
            process.kill()?;
            killed = true;
        }

        time::sleep(EXIT_POLL).await;
    }
}

/// Deregisters the task however the worker ends, and makes sure the
/// consumer gets a terminal event even if the worker never reached one.
struct WorkerGuard {
    id: TaskId,
    registry: Arc<TaskRegistry>,
    events: EventSender,
    process: ProcessHandle,
    finished: bool,
}

impl WorkerGuard {
    fn finish(&mut self, terminal: Event) {
        self.registry.deregister(&self.id);
        self.finished = true;
        self.events.publish(terminal);
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.id);
        if self.finished {
            return;
        }

        let reason = if std::thread::panicking() {
            "worker panicked"
        } else {
            "worker stopped before the task finished"
        };
        log::error!("Task {}: {}", self.id, reason);

        if let Err(e) = self.process.kill() {
            log::warn!("Failed to kill task {}: {}", self.id, e);
        }
        let error = DownloadError::Worker(reason.to_string());
        self.events
            .publish(Event::terminal(self.id, TaskState::Failed, error.to_string()));
    }
}
