use std::io::ErrorKind;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::ExecutionResult;
use crate::error::{JudgeError, Result};

/// Bytes kept per output stream; anything beyond is drained and dropped
pub const MAX_OUTPUT_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

enum Outcome {
    Exited(std::io::Result<(Captured, Captured, ExitStatus)>),
    TimedOut,
    Cancelled,
}

/// Runs `command` to completion under a wall-clock `limit`
///
/// `stdin` is written to the process and the pipe is closed afterwards, so a
/// program reading until EOF terminates. The process exiting, the deadline
/// passing and `cancel` firing race in one `select!`: whichever comes first
/// decides the result and the others are dropped. On timeout or cancellation
/// the whole process group is killed and reaped before returning, and any
/// output captured so far is discarded. After a normal exit the group is
/// killed as well, so nothing the program left in the background survives.
///
/// A non-zero exit code is not an error here.
pub async fn run(
    command: &str,
    args: &[String],
    stdin: Option<&str>,
    limit: Duration,
    workdir: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<ExecutionResult> {
    let deadline = Instant::now() + limit;

    let mut cmd = Command::new(command);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| JudgeError::SpawnFailure {
        command: command.to_string(),
        message: e.to_string(),
    })?;
    // `id()` is gone once the child is reaped, the group outlives it
    let pid = child.id();
    log::debug!("Spawned `{command}` with args {args:?} (pid {pid:?})");

    let outcome = {
        let finished = collect(&mut child, stdin);
        tokio::pin!(finished);

        tokio::select! {
            res = &mut finished => Outcome::Exited(res),
            _ = sleep_until(deadline) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        }
    };

    match outcome {
        Outcome::Exited(Ok((stdout, stderr, status))) => {
            // background children that let go of the pipes must not outlive the call
            if let Some(pid) = pid {
                kill_group(pid);
            }
            Ok(ExecutionResult {
                stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
                exit_code: status.code(),
                truncated: stdout.truncated || stderr.truncated,
            })
        }
        Outcome::Exited(Err(e)) => {
            terminate(&mut child, command).await;
            Err(e.into())
        }
        Outcome::TimedOut => {
            log::info!("`{command}` exceeded {}ms, killing it", limit.as_millis());
            terminate(&mut child, command).await;
            Err(JudgeError::TimeLimitExceeded { limit })
        }
        Outcome::Cancelled => {
            log::info!("`{command}` cancelled, killing it");
            terminate(&mut child, command).await;
            Err(JudgeError::Cancelled)
        }
    }
}

/// Feeds stdin, drains both output pipes and waits for the exit status
async fn collect(
    child: &mut Child,
    input: Option<&str>,
) -> std::io::Result<(Captured, Captured, ExitStatus)> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let feed = async move {
        let Some(mut pipe) = stdin else {
            return Ok(());
        };
        if let Some(data) = input.filter(|data| !data.is_empty()) {
            match pipe.write_all(data.as_bytes()).await {
                // the program quit without reading all of its input
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                other => other?,
            }
        }
        // dropping the pipe signals EOF
        drop(pipe);
        Ok::<_, std::io::Error>(())
    };

    let ((), out, err) = tokio::try_join!(feed, drain(stdout), drain(stderr))?;
    let status = child.wait().await?;

    Ok((out, err, status))
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Captured> {
    let mut captured = Captured::default();
    let Some(mut pipe) = pipe else {
        return Ok(captured);
    };

    (&mut pipe)
        .take(MAX_OUTPUT_BYTES)
        .read_to_end(&mut captured.bytes)
        .await?;
    let discarded = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    captured.truncated = discarded > 0;

    Ok(captured)
}

/// Kills the process group led by `child`, then kills and reaps `child` itself
async fn terminate(child: &mut Child, command: &str) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }

    if let Err(e) = child.kill().await {
        log::warn!("Failed to kill `{command}`: {e}");
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // SAFETY: plain syscall; the group was created by `process_group(0)` at spawn
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        log::debug!("killpg({pid}) failed: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
