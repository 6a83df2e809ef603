#![cfg(unix)]

mod common;

use common::{fake_tool, launch};
use dlqueue::{App, EventKind, JobConfig, Summary, TaskState, ToolPaths};
use std::path::Path;
use tempfile::TempDir;

fn app(tool: &Path) -> App {
    App::new(ToolPaths {
        ytdlp: tool.to_path_buf(),
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_until_all_finished() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(
        dir.path(),
        r#"
for last; do :; done
echo "[download] Destination: $last"
echo "  42.0%:00:03:3.00MiB/s"
case "$last" in
  *bad*) exit 2 ;;
esac
exit 0
"#,
    );
    let mut app = app(&tool);
    let config = JobConfig {
        output_dir: dir.path().to_path_buf(),
        ..JobConfig::default()
    };

    let good = launch(|| app.submit("https://example.com/good", config.clone())).unwrap();
    let bad = launch(|| app.submit("https://example.com/bad", config.clone())).unwrap();
    app.set_label(&good, "Good clip");

    let mut seen = Vec::new();
    let summary = app
        .run(|event, view| seen.push((event.task_id, event.kind, view.label.clone())))
        .await;

    assert_eq!(
        summary,
        Summary {
            completed: 1,
            cancelled: 0,
            failed: 1,
        }
    );
    assert!(!summary.all_completed());

    let good_view = app.view(&good).unwrap();
    assert_eq!(good_view.outcome, Some(TaskState::Completed));
    assert_eq!(good_view.progress.as_ref().unwrap().percent, "100%");
    assert_eq!(good_view.status.as_deref(), Some("Download Completed"));

    let bad_view = app.view(&bad).unwrap();
    assert_eq!(bad_view.outcome, Some(TaskState::Failed));
    assert_eq!(bad_view.error.as_deref(), Some("Process failed (exit code 2)"));
    assert_eq!(bad_view.progress.as_ref().unwrap().percent, "42.0%");

    // Callback sees the view for the event's own task
    assert!(seen
        .iter()
        .filter(|(id, _, _)| *id == good)
        .all(|(_, _, label)| label == "Good clip"));
    assert!(seen.iter().any(|(id, kind, _)| *id == bad && *kind == EventKind::Error));

    let order: Vec<_> = app.views().map(|v| v.url.as_str()).collect();
    assert_eq!(order, vec!["https://example.com/good", "https://example.com/bad"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_task_is_retried_in_place() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(
        dir.path(),
        r#"
marker="$(dirname "$0")/attempted"
if [ -f "$marker" ]; then
  echo "  100.0%:00:00:1.00MiB/s"
  exit 0
fi
touch "$marker"
echo "ERROR: flaky network"
exit 1
"#,
    );
    let mut app = app(&tool).with_retries(1);

    let first = launch(|| app.submit("https://example.com/flaky", JobConfig::default())).unwrap();

    let mut outcomes = Vec::new();
    let summary = app
        .run(|event, view| {
            if let Some(outcome) = event.outcome {
                outcomes.push((event.task_id, outcome, view.attempts));
            }
        })
        .await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
    assert!(app.view(&first).is_none());

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0], (first, TaskState::Failed, 1));
    let (second, outcome, attempts) = outcomes[1];
    assert_ne!(second, first);
    assert_eq!(outcome, TaskState::Completed);
    assert_eq!(attempts, 2);

    let views: Vec<_> = app.views().collect();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, second);
    assert_eq!(views[0].retried_from, Some(first));
    assert_eq!(views[0].error, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retry_refuses_running_task() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(dir.path(), "while true; do echo working; sleep 0.1; done");
    let mut app = app(&tool);

    let id = launch(|| app.submit("https://example.com/long", JobConfig::default())).unwrap();

    let err = app.retry(&id).unwrap_err();
    assert!(err.to_string().contains("still running"), "{err:#}");
    assert_eq!(app.orchestrator.running(), vec![id]);
    let view = app.view(&id).unwrap();
    assert_eq!(view.attempts, 1);
    assert_eq!(view.retried_from, None);

    assert!(app.retry(&dlqueue::TaskId::new()).is_err());

    assert!(app.cancel(&id));
    let summary = app.run(|_, _| {}).await;
    assert_eq!(summary.cancelled, 1);
    assert_eq!(app.views().count(), 1);
    assert!(app.orchestrator.running().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_through_app() {
    let dir = TempDir::new().unwrap();
    let tool = fake_tool(dir.path(), "while true; do echo working; sleep 0.1; done");
    let mut app = app(&tool).with_retries(3);

    let id = launch(|| app.submit("https://example.com/long", JobConfig::default())).unwrap();
    assert!(app.cancel(&id));

    let summary = app.run(|_, _| {}).await;
    assert_eq!(summary.cancelled, 1);
    // Cancellation is not a failure, so nothing is retried
    assert_eq!(app.view(&id).unwrap().attempts, 1);
    assert!(app.orchestrator.running().is_empty());
}
