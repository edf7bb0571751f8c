//! Child-process step execution.
//!
//! Spawns one build or run command, reads stdout and stderr concurrently
//! under the step timeout, and kills the child if the timeout fires.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, instrument};

use super::ExecutionResult;

/// Why a step produced no [`ExecutionResult`].
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Command is empty")]
    EmptyCommand,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed to collect output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("{stream} maxBuffer length exceeded")]
    OutputLimit { stream: &'static str, limit: usize },
}

/// Run `argv` in `cwd` and capture both streams.
///
/// Each stream may hold at most `max_output` bytes; a step that writes more
/// is killed. A non-zero exit is not an error here; callers decide what it
/// means.
#[instrument(skip_all, fields(program = argv.first().map(String::as_str), ?timeout, max_output = max_output))]
pub async fn run_step(
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
    max_output: usize,
) -> Result<ExecutionResult, StepError> {
    let (program, args) = argv.split_first().ok_or(StepError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so everything the step forks can be killed with it
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| StepError::Spawn {
        program: program.clone(),
        source,
    })?;
    let _group = ProcessGroup::of(child.id());

    // Take pipe handles out so `child` stays in scope for kill-on-timeout
    let mut child_stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let mut child_stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    let collected = tokio::time::timeout(timeout, async {
        let buffers = tokio::try_join!(
            read_capped(&mut child_stdout, "stdout", max_output),
            read_capped(&mut child_stderr, "stderr", max_output),
        )?;
        let status = child.wait().await?;
        Ok::<_, StepError>((buffers, status))
    })
    .await;

    let ((stdout_buf, stderr_buf), status) = match collected {
        Ok(Ok(done)) => done,
        Ok(Err(e)) => {
            let _ = child.kill().await;
            debug!(error = %e, "Step aborted, child killed");
            return Err(e);
        }
        Err(_) => {
            let _ = child.kill().await;
            debug!("Step timed out, child killed");
            return Err(StepError::TimedOut(timeout));
        }
    };

    let result = ExecutionResult {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
    };

    debug!(exit_code = result.exit_code, "Step completed");

    Ok(result)
}

/// Read `reader` to EOF, failing once more than `limit` bytes arrive.
async fn read_capped<R>(reader: R, stream: &'static str, limit: usize) -> Result<Vec<u8>, StepError>
where
    R: AsyncRead + Unpin,
{
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut buf = Vec::new();
    reader.take(cap).read_to_end(&mut buf).await?;
    if buf.len() > limit {
        return Err(StepError::OutputLimit { stream, limit });
    }
    Ok(buf)
}

/// Kills the step's whole process group when dropped.
///
/// The direct child is handled by `kill_on_drop`; this reaches whatever it
/// forked, on every exit path.
struct ProcessGroup {
    #[cfg(unix)]
    leader: Option<nix::unistd::Pid>,
}

impl ProcessGroup {
    #[cfg(unix)]
    fn of(pid: Option<u32>) -> Self {
        Self {
            leader: pid
                .and_then(|pid| i32::try_from(pid).ok())
                .map(nix::unistd::Pid::from_raw),
        }
    }

    #[cfg(not(unix))]
    const fn of(_pid: Option<u32>) -> Self {
        Self {}
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(leader) = self.leader {
            // ESRCH just means the group is already gone
            let _ = nix::sys::signal::killpg(leader, nix::sys::signal::Signal::SIGKILL);
        }
    }
}

fn missing_pipe(name: &str) -> std::io::Error {
    std::io::Error::other(format!("Failed to open {name}"))
}
