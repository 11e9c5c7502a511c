//! External command execution for remediation actions
//!
//! - Synchronous commands run under a bounded timeout, output captured
//! - Detached launches discard output and are reaped in the background
//! - No shell is involved: argv is passed as-is

use serde::Serialize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

/// Captured result of a finished command
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command timed out after {0}s")]
    Timeout(u64),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs `program args..` and waits for it, killing it once `timeout` elapses.
pub async fn run_with_timeout(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput, ExecError> {
    let start_time = Instant::now();
    debug!(program, ?args, timeout_secs = timeout.as_secs(), "running command");

    let mut cmd = AsyncCommand::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| ExecError::Timeout(timeout.as_secs()))?
        .map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        returncode: exit_code(&output.status),
    };
    debug!(
        program,
        returncode = result.returncode,
        execution_time_ms = start_time.elapsed().as_millis() as u64,
        "command finished"
    );
    Ok(result)
}

/// Starts `program args..` with all stdio discarded and returns right away.
/// The exit status is only logged; callers never observe it.
pub fn spawn_detached(program: &str, args: &[String]) -> Result<(), ExecError> {
    let mut child = AsyncCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let pid = child.id();
    info!(program, ?args, ?pid, "detached process started");

    let label = program.to_string();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(program = %label, ?pid, code = exit_code(&status), "detached process exited"),
            Err(e) => warn!(program = %label, ?pid, error = %e, "failed to reap detached process"),
        }
    });
    Ok(())
}

/// Exit code, or the negated signal number when killed by a signal.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }
    -1
}
