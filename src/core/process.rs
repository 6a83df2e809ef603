//! Process runner - spawn the download tool and stream its merged output
//!
//! stdout and stderr share one OS pipe, so lines arrive in the order the
//! tool wrote them. Reads are blocking; callers on the async runtime go
//! through `tokio::task::spawn_blocking`.

use crate::error::DownloadError;
use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

/// Log target every raw tool line is forwarded to
pub const TOOL_LOG_TARGET: &str = "dlqueue::tool";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Handle for a single spawned process
#[derive(Clone)]
pub struct ProcessHandle {
    pub label: String,
    program: PathBuf,
    pid: u32,
    child: Arc<Mutex<Child>>,
    reader: Arc<Mutex<Option<Box<dyn BufRead + Send>>>>,
}

impl ProcessHandle {
    /// Spawn `program` with `args`, extra environment on top of ours.
    ///
    /// Fails with [`DownloadError::Launch`] when the binary is missing or
    /// not executable.
    pub fn spawn<I, K, V>(
        label: &str,
        program: &Path,
        args: &[String],
        env: I,
    ) -> Result<Self, DownloadError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        log::info!(
            "Spawning {} for task {}: {}",
            program.display(),
            label,
            args.join(" ")
        );

        let launch = |source| DownloadError::Launch {
            path: program.to_path_buf(),
            source,
        };

        let (reader, writer) = io::pipe().map_err(launch)?;
        let writer_err = writer.try_clone().map_err(launch)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err);
        hide_console(&mut cmd);

        let child = cmd.spawn().map_err(launch)?;
        // The command still owns our copies of the write end; EOF needs them gone
        drop(cmd);

        Ok(Self::from_parts(label, program, child, BufReader::new(reader)))
    }

    /// Wrap an already running child and the stream its output arrives on
    pub(crate) fn from_parts<R>(label: &str, program: &Path, child: Child, reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self {
            label: label.to_string(),
            program: program.to_path_buf(),
            pid: child.id(),
            child: Arc::new(Mutex::new(child)),
            reader: Arc::new(Mutex::new(Some(Box::new(reader)))),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Read one line of output, blocking. `None` once the stream is closed.
    ///
    /// Invalid UTF-8 is replaced, trailing `\r\n` stripped. Every line is
    /// forwarded to the log before it is returned.
    pub fn read_line(&self) -> io::Result<Option<String>> {
        let mut guard = self.reader.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(reader) = guard.as_mut() else {
            return Ok(None);
        };

        let mut buf = Vec::new();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            // EOF - every writer is gone
            *guard = None;
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        log::debug!(target: TOOL_LOG_TARGET, "[{}] {}", self.label, line);

        Ok(Some(line))
    }

    /// Ask the process to stop (SIGTERM on unix). Falls back to [`kill`](Self::kill).
    pub async fn terminate(&self) -> io::Result<()> {
        log::info!("Terminating task {} (pid {})", self.label, self.pid);

        #[cfg(unix)]
        {
            let status = tokio::process::Command::new("kill")
                .args(["-TERM", &self.pid.to_string()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if matches!(status, Ok(s) if s.success()) {
                return Ok(());
            }
        }

        self.kill()
    }

    /// Force the process down
    pub fn kill(&self) -> io::Result<()> {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        child.kill()
    }

    /// Exit code if the process has finished, `None` while it still runs.
    ///
    /// A process ended by a signal reports the negated signal number.
    pub fn exit_code(&self) -> io::Result<Option<i32>> {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(child.try_wait()?.map(exit_code_of))
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

/// No console window for the child on platforms that would open one
fn hide_console(command: &mut Command) -> &mut Command {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    command
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> ProcessHandle {
        ProcessHandle::spawn(
            "test",
            Path::new("/bin/sh"),
            &["-c".to_string(), script.to_string()],
            Vec::<(String, String)>::new(),
        )
        .unwrap()
    }

    fn wait_exit(handle: &ProcessHandle) -> i32 {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(code) = handle.exit_code().unwrap() {
                return code;
            }
            assert!(Instant::now() < deadline, "process did not exit");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_merged_output_and_exit_code() {
        let handle = sh("echo first; echo second 1>&2; printf 'no newline'; exit 3");

        assert_eq!(handle.read_line().unwrap().as_deref(), Some("first"));
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("second"));
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("no newline"));
        assert_eq!(handle.read_line().unwrap(), None);
        // Stays closed
        assert_eq!(handle.read_line().unwrap(), None);

        assert_eq!(wait_exit(&handle), 3);
    }

    #[test]
    fn test_crlf_and_invalid_utf8() {
        let handle = sh(r"printf 'a\r\n'; printf 'b\377c\n'");

        assert_eq!(handle.read_line().unwrap().as_deref(), Some("a"));
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("b\u{FFFD}c"));
        assert_eq!(handle.read_line().unwrap(), None);
    }

    #[test]
    fn test_environment_passed() {
        let handle = ProcessHandle::spawn(
            "env",
            Path::new("/bin/sh"),
            &["-c".to_string(), "echo $DLQ_PROBE".to_string()],
            [("DLQ_PROBE", "visible")],
        )
        .unwrap();
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("visible"));
    }

    #[test]
    fn test_launch_failure_carries_path() {
        let missing = Path::new("/nonexistent/dlqueue/yt-dlp");
        let err = ProcessHandle::spawn("x", missing, &[], Vec::<(String, String)>::new())
            .err()
            .unwrap();

        match err {
            DownloadError::Launch { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_terminate() {
        let handle = sh("echo ready; exec sleep 30");
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("ready"));
        assert_eq!(handle.exit_code().unwrap(), None);

        handle.terminate().await.unwrap();

        assert_eq!(handle.read_line().unwrap(), None);
        assert_eq!(wait_exit(&handle), -15);
    }
}
