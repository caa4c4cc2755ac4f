// src/exec/process.rs

//! Real process invocation via `tokio::process::Command`.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ItemError;
use crate::exec::invocation::Invocation;

/// Run one invocation to completion or until `cancel` fires.
///
/// - exit status 0 → `Ok(())`
/// - non-zero exit (or death by signal, reported as -1) → `ExitStatus`
/// - spawn failure → `Spawn`
/// - cancellation → the child is killed and `Cancelled` is returned
pub async fn run_process(invocation: &Invocation, cancel: CancellationToken) -> Result<(), ItemError> {
    info!(cmd = %invocation, "starting process");

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ItemError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

    // Always drain the pipes so the child never blocks on a full buffer.
    if let Some(stdout) = child.stdout.take() {
        drain_lines(stdout, invocation.program.display().to_string(), "stdout");
    }
    if let Some(stderr) = child.stderr.take() {
        drain_lines(stderr, invocation.program.display().to_string(), "stderr");
    }

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| ItemError::io(&invocation.program, e))?;
            let code = status.code().unwrap_or(-1);
            debug!(program = ?invocation.program, exit_code = code, "process exited");
            if status.success() {
                Ok(())
            } else {
                Err(ItemError::ExitStatus {
                    program: invocation.program.clone(),
                    code,
                })
            }
        }
        _ = cancel.cancelled() => {
            info!(program = ?invocation.program, "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(program = ?invocation.program, error = %e, "failed to kill process");
            }
            Err(ItemError::Cancelled)
        }
    }
}

fn drain_lines<R>(reader: R, program: String, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(program = %program, stream, "{}", line);
        }
    });
}
