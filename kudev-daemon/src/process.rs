//! Cancellable external commands.

use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::CommandError;

/// Lines of stderr kept in a [`CommandError::Failed`].
const STDERR_TAIL_LINES: usize = 20;

/// Run `program args..` to completion and return trimmed stdout.
///
/// The child is killed if `cancel` fires first.
pub async fn run(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<String, CommandError> {
    tracing::debug!(%program, args = %args.join(" "), "running command");
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let output = tokio::select! {
        _ = cancel.cancelled() => {
            return Err(CommandError::Cancelled { program: program.to_string() });
        }
        output = child.wait_with_output() => output.map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?,
    };

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(CommandError::Failed {
            program: program.to_string(),
            status: output.status.code(),
            stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_LINES),
        })
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
