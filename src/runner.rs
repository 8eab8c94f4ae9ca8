//! Uniform external tool invocation.
//!
//! Every stage that shells out goes through [`run`]: one place enforces the
//! argv-only rule, the wall-clock timeout, and the never-throws contract.
//!
//! ## Why argv vectors, never a shell?
//!
//! Several argv elements embed request-derived strings (filenames built from
//! the format, the job key). Passed through a shell those would be injection
//! vectors; passed as an argument vector they are inert bytes. There is no
//! shell-string variant in this crate.
//!
//! ## Why never-throws?
//!
//! A missing binary, a non-zero exit, and a timeout are all the same thing
//! to the pipeline: a tool that did not deliver. Each becomes a
//! [`StageResult`] with `succeeded = false` and whatever output was
//! captured, and the *stage* decides whether that is fatal. Errors never
//! cross this boundary as panics or `Err`.
//!
//! ## Timeout and capture semantics
//!
//! stdout and stderr are drained into shared buffers on background tasks
//! while the parent waits on the child, so partial output survives a kill.
//! The drains themselves get only a short grace period after the child is
//! gone: a tool that leaked its pipe to a still-running grandchild must not
//! hold the request open waiting for an EOF that never comes. On timeout
//! the child is killed, the cause is appended to stderr, and the result is
//! an ordinary failure. The runner holds no shared mutable state between
//! invocations; concurrent request handlers may call it freely.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to keep reading pipes after the child itself is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Outcome of one external tool invocation.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// True only for a clean zero exit within the timeout.
    pub succeeded: bool,
    /// Captured stdout (possibly partial on timeout).
    pub stdout: String,
    /// Captured stderr, with the failure cause appended for spawn errors
    /// and timeouts.
    pub stderr: String,
}

impl StageResult {
    fn failure(detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            stdout: String::new(),
            stderr: detail.into(),
        }
    }

    /// A short excerpt for error messages: the tail of stderr, falling back
    /// to stdout (LaTeX tools log errors to stdout).
    pub fn output_excerpt(&self) -> String {
        const MAX_CHARS: usize = 400;
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let trimmed = source.trim();
        let start = trimmed
            .char_indices()
            .rev()
            .nth(MAX_CHARS.saturating_sub(1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        trimmed[start..].to_string()
    }
}

/// Spawn `argv` in `cwd` with a hard wall-clock `timeout`.
///
/// The first element is the program; the rest are its arguments, passed
/// verbatim with no shell interpretation.
pub async fn run(argv: &[OsString], cwd: &Path, timeout: Duration) -> StageResult {
    let Some((program, args)) = argv.split_first() else {
        return StageResult::failure("empty argument vector");
    };

    let cmdline: String = argv
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    debug!(command = %cmdline, cwd = %cwd.display(), "spawning external tool");
    let started = Instant::now();

    let mut child = match Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(command = %cmdline, error = %e, "failed to spawn external tool");
            return StageResult::failure(format!(
                "failed to start '{}': {e}",
                program.to_string_lossy()
            ));
        }
    };

    let (stdout_buf, stdout_task) = spawn_drain(child.stdout.take());
    let (stderr_buf, stderr_task) = spawn_drain(child.stderr.take());

    let (succeeded, cause) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(
                command = %cmdline,
                exit = status.code().unwrap_or(-1),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "external tool finished"
            );
            (status.success(), None)
        }
        Ok(Err(e)) => (false, Some(format!("failed waiting for process: {e}"))),
        Err(_elapsed) => {
            warn!(
                command = %cmdline,
                timeout_secs = timeout.as_secs(),
                "external tool timed out; killing"
            );
            let _ = child.start_kill();
            let _ = child.wait().await;
            (
                false,
                Some(format!("process timed out after {}s", timeout.as_secs())),
            )
        }
    };

    finish_drain(stdout_task).await;
    finish_drain(stderr_task).await;

    let stdout = take_buffer(&stdout_buf);
    let mut stderr = take_buffer(&stderr_buf);
    if let Some(cause) = cause {
        push_line(&mut stderr, &cause);
    }

    StageResult {
        succeeded,
        stdout,
        stderr,
    }
}

type CaptureBuf = Arc<Mutex<Vec<u8>>>;

/// Start a background task copying the pipe into a shared buffer.
///
/// The buffer (not the task's return value) holds the capture, so the
/// caller can take whatever arrived even if the task never reaches EOF.
fn spawn_drain<R>(pipe: Option<R>) -> (CaptureBuf, Option<JoinHandle<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf: CaptureBuf = Arc::new(Mutex::new(Vec::new()));
    let handle = pipe.map(|mut r| {
        let buf = Arc::clone(&buf);
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match r.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut guard = buf.lock().unwrap_or_else(|e| e.into_inner());
                        guard.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        })
    });
    (buf, handle)
}

/// Give the drain a bounded window to hit EOF, then abandon it. A leaked
/// pipe held by a grandchild process must not outlive the request.
async fn finish_drain(task: Option<JoinHandle<()>>) {
    if let Some(mut task) = task {
        if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    }
}

fn take_buffer(buf: &CaptureBuf) -> String {
    let guard = buf.lock().unwrap_or_else(|e| e.into_inner());
    String::from_utf8_lossy(&guard).into_owned()
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(line);
}
