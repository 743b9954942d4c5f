//! Syntax check before execution.
//!
//! The interpreter compiles the submission (read from stdin) without running
//! it. A syntax error comes back as a one-line message on stderr and the
//! offending source line on stdout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{RunnerError, RunnerResult};

const COMPILE_SCRIPT: &str = r#"
import sys
source = sys.stdin.buffer.read().decode("utf-8", "replace")
try:
    compile(source, "<submitted_code>", "exec", dont_inherit=True)
except SyntaxError as e:
    sys.stderr.write(f"{e.msg} (line {e.lineno}, column {e.offset})\n")
    sys.stdout.write((e.text or "").strip())
    sys.exit(1)
"#;

/// Compile `code` with `interpreter`, rejecting it on a syntax error.
pub async fn check_syntax(interpreter: &Path, code: &str, timeout: Duration) -> RunnerResult<()> {
    let mut child = Command::new(interpreter)
        .arg("-c")
        .arg(COMPILE_SCRIPT)
        .env("PYTHONDONTWRITEBYTECODE", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RunnerError::Internal(format!("spawn {}: {e}", interpreter.display())))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| RunnerError::Internal("precheck stdin not captured".into()))?;
    let source = code.as_bytes().to_vec();
    // Feed stdin concurrently with the wait so a large submission cannot
    // deadlock against a full output pipe.
    let feed = async move {
        stdin.write_all(&source).await?;
        stdin.shutdown().await
    };

    let (fed, output) = tokio::time::timeout(timeout, async {
        tokio::join!(feed, child.wait_with_output())
    })
    .await
    .map_err(|_| {
        RunnerError::Internal(format!(
            "syntax check timed out after {} seconds",
            timeout.as_secs()
        ))
    })?;
    let output = output?;

    if output.status.success() {
        if let Err(e) = fed {
            debug!(error = %e, "precheck stdin closed early");
        }
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr.lines().last().unwrap_or("").trim();
    match output.status.code() {
        Some(1) if !message.is_empty() => Err(RunnerError::Syntax {
            message: message.to_string(),
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
        }),
        _ => Err(RunnerError::Internal(format!(
            "syntax check exited with {}: {}",
            output.status,
            stderr.trim()
        ))),
    }
}
