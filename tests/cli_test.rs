use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

#[cfg(unix)]
mod common;

fn write_config(dir: &Path, ytdlp_path: &Path) -> std::path::PathBuf {
    let path = dir.join("config.json");
    let config = serde_json::json!({
        "download_path": dir.join("out"),
        "ytdlp_path": ytdlp_path,
        "naming_pattern": "%(title)s.%(ext)s",
    });
    std::fs::write(&path, config.to_string()).unwrap();
    path
}

fn dlqueue() -> Command {
    let mut cmd = Command::cargo_bin("dlqueue").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    dlqueue()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_config_creates_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    dlqueue()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("naming_pattern"))
        .stdout(predicate::str::contains("bestvideo+bestaudio/best"));

    assert!(path.exists());
}

#[test]
fn test_get_requires_url() {
    dlqueue().arg("get").assert().failure();
}

#[test]
fn test_get_rejects_nothing_to_download() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &dir.path().join("yt-dlp"));

    dlqueue()
        .arg("--config")
        .arg(&config)
        .args(["get", "--no-video", "https://youtu.be/dQw4w9WgXcQ"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Select at least one of video or thumbnail"));
}

#[test]
fn test_get_with_missing_tool_fails_to_launch() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &dir.path().join("missing-yt-dlp"));

    dlqueue()
        .arg("--config")
        .arg(&config)
        .args(["get", "https://youtu.be/dQw4w9WgXcQ"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to launch"))
        .stderr(predicate::str::contains("missing-yt-dlp"));
}

#[cfg(unix)]
#[test]
fn test_get_streams_json_events() {
    let dir = TempDir::new().unwrap();
    let tool = common::fake_tool(
        dir.path(),
        r#"
echo "[youtube] dQw4w9WgXcQ: Downloading webpage"
echo "  50.0%:00:02:1.00MiB/s"
exit 0
"#,
    );
    let config = write_config(dir.path(), &tool);
    std::thread::sleep(std::time::Duration::from_millis(50));

    dlqueue()
        .arg("--config")
        .arg(&config)
        .args(["get", "--json", "https://youtu.be/dQw4w9WgXcQ"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind":"progress""#))
        .stdout(predicate::str::contains(r#""percent":"50.0%""#))
        .stdout(predicate::str::contains(r#""outcome":"completed""#))
        .stdout(predicate::str::contains("taskId"));
}

#[cfg(unix)]
#[test]
fn test_get_reports_failed_download() {
    let dir = TempDir::new().unwrap();
    let tool = common::fake_tool(dir.path(), "echo 'ERROR: boom'\nexit 4");
    let config = write_config(dir.path(), &tool);
    std::thread::sleep(std::time::Duration::from_millis(50));

    dlqueue()
        .arg("--config")
        .arg(&config)
        .args(["get", "https://youtu.be/dQw4w9WgXcQ"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Process failed (exit code 4)"))
        .stderr(predicate::str::contains("did not complete"));
}
