//! Consumer side - drains the event bus and tracks every download
//!
//! One `App` owns the bus drain. It polls every [`POLL_INTERVAL`], folds each
//! event into the task's [`TaskView`] and hands it to a render callback.

use crate::core::{
    Event, EventBus, EventDrain, EventKind, JobConfig, JobOrchestrator, Payload, Progress,
    TaskId, TaskState, ToolPaths, POLL_INTERVAL,
};
use crate::error::DownloadError;
use anyhow::bail;
use std::collections::HashMap;

/// Lines of tool log kept per task
const MAX_LOG_LINES: usize = 1000;

/// What the consumer knows about one download
#[derive(Debug, Clone)]
pub struct TaskView {
    pub id: TaskId,
    pub url: String,
    pub label: String,
    pub config: JobConfig,
    pub progress: Option<Progress>,
    pub status: Option<String>,
    pub error: Option<String>,
    pub outcome: Option<TaskState>,
    pub log: Vec<String>,
    /// Starts made for this slot, retries included
    pub attempts: u32,
    /// Id this slot ran under before its latest retry
    pub retried_from: Option<TaskId>,
}

impl TaskView {
    fn new(id: TaskId, url: &str, config: JobConfig) -> Self {
        Self {
            id,
            url: url.to_string(),
            label: url.to_string(),
            config,
            progress: None,
            status: None,
            error: None,
            outcome: None,
            log: Vec::new(),
            attempts: 1,
            retried_from: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    fn apply(&mut self, event: &Event) {
        match (&event.kind, &event.payload) {
            (EventKind::Progress, Payload::Progress(progress)) => {
                self.progress = Some(progress.clone());
            }
            (EventKind::Status, Payload::Text(text)) => self.status = Some(text.clone()),
            (EventKind::Error, Payload::Text(text)) => self.error = Some(text.clone()),
            (EventKind::Log, Payload::Text(text)) => {
                self.log.push(text.clone());
                if self.log.len() > MAX_LOG_LINES {
                    let drain = self.log.len() - MAX_LOG_LINES;
                    self.log.drain(0..drain);
                }
            }
            (kind, payload) => {
                log::warn!("Task {}: unexpected {:?} payload {:?}", self.id, kind, payload);
            }
        }

        if let Some(outcome) = event.outcome {
            self.outcome = Some(outcome);
        }
    }
}

/// Final tally once every task is done
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl Summary {
    pub fn all_completed(&self) -> bool {
        self.cancelled == 0 && self.failed == 0
    }
}

/// Application state
pub struct App {
    pub orchestrator: JobOrchestrator,
    drain: EventDrain,
    tasks: HashMap<TaskId, TaskView>,
    order: Vec<TaskId>,
    /// Automatic retries per failed slot
    max_retries: u32,
}

impl App {
    pub fn new(tool: ToolPaths) -> Self {
        let (events, drain) = EventBus::channel();
        Self {
            orchestrator: JobOrchestrator::new(tool, events),
            drain,
            tasks: HashMap::new(),
            order: Vec::new(),
            max_retries: 0,
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Start a download and track it
    pub fn submit(&mut self, url: &str, config: JobConfig) -> Result<TaskId, DownloadError> {
        let id = self.orchestrator.start(url, config.clone())?;
        self.tasks.insert(id, TaskView::new(id, url, config));
        self.order.push(id);
        Ok(id)
    }

    pub fn cancel(&self, id: &TaskId) -> bool {
        self.orchestrator.cancel(id)
    }

    /// Start a finished task's URL again. The slot keeps its place but moves
    /// to the new id. A task that is still running is left alone.
    pub fn retry(&mut self, id: &TaskId) -> crate::Result<TaskId> {
        let Some(view) = self.tasks.get(id) else {
            bail!("unknown task {}", id);
        };
        if !view.is_finished() {
            bail!("task {} is still running", id);
        }

        let new_id = self
            .orchestrator
            .retry(*id, &view.url, view.config.clone())?;

        if let Some(mut view) = self.tasks.remove(id) {
            view.retried_from = Some(view.id);
            view.id = new_id;
            view.attempts += 1;
            view.progress = None;
            view.status = None;
            view.error = None;
            view.outcome = None;
            self.tasks.insert(new_id, view);
        }
        if let Some(slot) = self.order.iter_mut().find(|slot| **slot == *id) {
            *slot = new_id;
        }

        Ok(new_id)
    }

    pub fn set_label(&mut self, id: &TaskId, label: impl Into<String>) {
        if let Some(view) = self.tasks.get_mut(id) {
            view.label = label.into();
        }
    }

    pub fn view(&self, id: &TaskId) -> Option<&TaskView> {
        self.tasks.get(id)
    }

    /// Views in submission order
    pub fn views(&self) -> impl Iterator<Item = &TaskView> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Drain pending events (non-blocking) and dispatch them by task id.
    ///
    /// Returns how many events were handled.
    pub fn process_events<F>(&mut self, mut on_event: F) -> usize
    where
        F: FnMut(&Event, &TaskView),
    {
        let events = self.drain.drain_all();
        let mut failed = Vec::new();

        for event in &events {
            let Some(view) = self.tasks.get_mut(&event.task_id) else {
                log::debug!("Event for untracked task {}", event.task_id);
                continue;
            };

            view.apply(event);
            on_event(event, &*view);

            if event.outcome == Some(TaskState::Failed) && view.attempts <= self.max_retries {
                failed.push(event.task_id);
            }
        }

        for id in failed {
            if let Err(e) = self.retry(&id) {
                log::error!("Retry of task {} failed: {}", id, e);
            }
        }

        events.len()
    }

    pub fn all_finished(&self) -> bool {
        self.tasks.values().all(TaskView::is_finished)
    }

    pub fn summary(&self) -> Summary {
        self.tasks
            .values()
            .fold(Summary::default(), |mut summary, view| {
                match view.outcome {
                    Some(TaskState::Completed) => summary.completed += 1,
                    Some(TaskState::Cancelled) => summary.cancelled += 1,
                    Some(TaskState::Failed) => summary.failed += 1,
                    _ => {}
                }
                summary
            })
    }

    /// Poll until every tracked task is finished. Ctrl-C cancels them all,
    /// a second Ctrl-C kills whatever is still winding down.
    pub async fn run<F>(&mut self, mut on_event: F) -> Summary
    where
        F: FnMut(&Event, &TaskView),
    {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;

        while !self.all_finished() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.process_events(&mut on_event);
                }
                _ = &mut ctrl_c => {
                    ctrl_c.set(tokio::signal::ctrl_c());
                    if interrupted {
                        let count = self.orchestrator.kill_all();
                        log::warn!("Interrupted again, killing {} task(s)", count);
                    } else {
                        interrupted = true;
                        self.max_retries = 0;
                        let count = self.orchestrator.cancel_all();
                        log::warn!("Interrupted, cancelling {} task(s)", count);
                    }
                }
            }
        }

        // Anything that landed between the last tick and the final terminal
        self.process_events(&mut on_event);
        self.summary()
    }
}
