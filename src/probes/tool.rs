//! External tool invocation bound to a run context.
//!
//! The child process is spawned with `kill_on_drop`, and the wait is raced
//! against the context: once the context is canceled the wait future is
//! dropped, which kills the process and unblocks the probe.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::ToolError;
use crate::orchestrator::RunContext;

/// Captured output of a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program` with `args` and waits for it, unless `ctx` is canceled first.
pub async fn run_tool(
    ctx: &RunContext,
    program: &str,
    args: &[String],
) -> Result<ToolOutput, ToolError> {
    if ctx.is_cancelled() {
        return Err(ToolError::Cancelled {
            program: program.to_string(),
        });
    }

    debug!(
        program,
        args = ?args,
        remaining_ms = ctx.remaining().as_millis() as u64,
        "running tool"
    );

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::select! {
        biased;
        _ = ctx.cancelled() => {
            debug!(program, "run canceled, killing tool");
            return Err(ToolError::Cancelled {
                program: program.to_string(),
            });
        }
        output = command.output() => output.map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?,
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    trace!(program, status = %output.status, "tool finished");

    if !output.status.success() {
        return Err(ToolError::Exit {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: last_lines(&stderr, 5),
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

/// Keeps the tail of noisy tool diagnostics for error messages.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
