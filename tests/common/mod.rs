//! Shared helpers: a scripted stand-in for yt-dlp and event collection
#![allow(dead_code)]

use dlqueue::{DownloadError, Event, EventDrain, TaskId};
use std::collections::{HashMap, HashSet};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for any single test to see all its terminal events
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Linux "Text file busy"
const ETXTBSY: i32 = 26;

/// Write an executable `/bin/sh` script named `yt-dlp` into `dir`
pub fn fake_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("yt-dlp");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();

    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Run a launch, retrying while a concurrently forked test process still
/// holds the freshly written script open for writing.
pub fn launch<F>(mut start: F) -> Result<TaskId, DownloadError>
where
    F: FnMut() -> Result<TaskId, DownloadError>,
{
    for _ in 0..50 {
        match start() {
            Err(DownloadError::Launch { source, .. }) if source.raw_os_error() == Some(ETXTBSY) => {
                std::thread::sleep(Duration::from_millis(20));
            }
            other => return other,
        }
    }
    start()
}

/// Receive until every id in `ids` has published its terminal event.
///
/// Events of other tasks are kept too so tests can spot leakage.
pub async fn collect_until_terminal(
    drain: &mut EventDrain,
    ids: &[TaskId],
) -> HashMap<TaskId, Vec<Event>> {
    let mut by_task: HashMap<TaskId, Vec<Event>> =
        ids.iter().map(|id| (*id, Vec::new())).collect();
    let mut remaining: HashSet<TaskId> = ids.iter().copied().collect();

    while !remaining.is_empty() {
        let event = tokio::time::timeout(EVENT_TIMEOUT, drain.recv())
            .await
            .expect("timed out waiting for terminal events")
            .expect("event bus closed");
        if event.is_terminal() {
            remaining.remove(&event.task_id);
        }
        by_task.entry(event.task_id).or_default().push(event);
    }

    by_task
}

/// Text payload of every event, for readable assertions
pub fn texts(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e.payload.as_text().map(str::to_string))
        .collect()
}
