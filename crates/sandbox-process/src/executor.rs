use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sandbox::{
    ExecMode, ExecStatus, ExecutionRequest, ExecutionResult, Executor, SandboxError,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::command;
use crate::config::ProcessExecutorConfig;
use crate::paths::{ScriptFile, script_path};
use crate::process::{self, ProcessGroup};
use crate::registry::ProcessRegistry;

/// How a launched child ended.
enum Outcome {
    Exited {
        exit_code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    TimedOut,
    /// Terminated by [`ProcessExecutor::stop_all`] before it finished.
    Stopped,
}

/// Runs submitted code as local child processes.
///
/// One instance is shared by all requests; each execution owns its own script
/// file and child, and only the process registry is shared between them.
pub struct ProcessExecutor {
    config: ProcessExecutorConfig,
    registry: ProcessRegistry,
}

impl ProcessExecutor {
    pub fn new(config: ProcessExecutorConfig) -> Self {
        Self {
            config,
            registry: ProcessRegistry::new(),
        }
    }

    /// Number of executions whose child is currently running.
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    async fn run(
        &self,
        run_id: Uuid,
        path: &Path,
        code: &str,
        mode: ExecMode,
        timeout: Duration,
    ) -> sandbox::Result<Outcome> {
        let script = ScriptFile::create(path.to_path_buf(), code).await?;

        let (mut cmd, command_line) =
            command::build(&self.config.interpreter, mode, script.path());
        debug!(run_id = %run_id, command = %command_line, "spawning");
        let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            program: self.config.interpreter.display().to_string(),
            source,
        })?;

        let group = ProcessGroup::of(&child);
        let registration = group.map(|g| self.registry.register(run_id, g));
        info!(run_id = %run_id, pid = ?group.map(|g| g.pid()), "running");

        let waited = tokio::time::timeout(timeout, process::collect_output(&mut child)).await;
        let outcome = match waited {
            Ok(Ok(output)) => {
                if registration.as_ref().is_some_and(|r| r.was_stopped()) {
                    Outcome::Stopped
                } else {
                    Outcome::Exited {
                        exit_code: process::exit_code(output.status),
                        stdout: output.stdout,
                        stderr: output.stderr,
                    }
                }
            }
            Ok(Err(e)) => {
                process::terminate(&mut child, group, self.config.stop_grace).await;
                return Err(e);
            }
            Err(_) => {
                warn!(
                    run_id = %run_id,
                    timeout_secs = timeout.as_secs(),
                    "deadline exceeded, terminating process group"
                );
                process::terminate(&mut child, group, self.config.stop_grace).await;
                Outcome::TimedOut
            }
        };

        // Release the registry entry before the script, mirroring acquisition order.
        drop(registration);
        drop(script);
        Ok(outcome)
    }
}

/// Fields shared by every result of one execution.
struct RunContext {
    mode: ExecMode,
    temp_path: PathBuf,
    timeout_secs: u64,
    started: Instant,
}

impl RunContext {
    fn finish(
        self,
        status: ExecStatus,
        exit_code: i32,
        stdout: String,
        stderr: String,
        error_detail: Option<String>,
    ) -> ExecutionResult {
        ExecutionResult {
            stdout,
            stderr,
            exit_code,
            mode_used: self.mode,
            temp_path: self.temp_path,
            declared_timeout: self.timeout_secs,
            wall_clock_secs: self.started.elapsed().as_secs_f64(),
            status,
            error_detail,
        }
    }

    fn failed(self, detail: String) -> ExecutionResult {
        let stderr = format!("execution error: {detail}");
        self.finish(ExecStatus::Failed, -1, String::new(), stderr, Some(detail))
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn name(&self) -> &str {
        "process"
    }

    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let timeout_secs = self.config.effective_timeout_secs(request.timeout_secs());

        let mode = command::resolve_mode(request.mode(), request.code());
        if mode != request.mode() {
            info!(run_id = %run_id, requested = %request.mode(), "no test markers found, running as script");
        }

        let temp_path = script_path(&self.config.temp_dir, run_id);
        info!(
            run_id = %run_id,
            mode = %mode,
            timeout_secs,
            path = %temp_path.display(),
            code_len = request.code().len(),
            "execution started"
        );

        let outcome = self
            .run(
                run_id,
                &temp_path,
                request.code(),
                mode,
                Duration::from_secs(timeout_secs),
            )
            .await;

        let ctx = RunContext {
            mode,
            temp_path,
            timeout_secs,
            started,
        };
        let result = match outcome {
            Ok(Outcome::Exited {
                exit_code,
                stdout,
                stderr,
            }) => ctx.finish(
                ExecStatus::Completed,
                exit_code,
                String::from_utf8_lossy(&stdout).into_owned(),
                String::from_utf8_lossy(&stderr).into_owned(),
                None,
            ),
            Ok(Outcome::TimedOut) => {
                let message = format!("execution timed out after {timeout_secs} seconds");
                ctx.finish(
                    ExecStatus::TimedOut,
                    -1,
                    String::new(),
                    message.clone(),
                    Some(message),
                )
            }
            Ok(Outcome::Stopped) => ctx.failed("execution stopped during shutdown".into()),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "execution failed");
                ctx.failed(e.to_string())
            }
        };

        info!(
            run_id = %run_id,
            status = %result.status,
            exit_code = result.exit_code,
            elapsed_ms = (result.wall_clock_secs * 1000.0) as u64,
            "execution finished"
        );
        result
    }

    fn stop_all(&self) {
        let entries = self.registry.drain();
        if entries.is_empty() {
            return;
        }
        info!(count = entries.len(), "stopping all running processes");
        for (run_id, group) in entries {
            match group.request_stop() {
                Ok(()) => info!(run_id = %run_id, pid = group.pid(), "process stopped"),
                Err(e) => {
                    warn!(run_id = %run_id, pid = group.pid(), error = %e, "failed to stop process");
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// Executor that runs scripts with `sh`, which is always present and
    /// happily executes a `.py` file as a shell script.
    fn sh_executor(dir: &Path) -> ProcessExecutor {
        ProcessExecutor::new(ProcessExecutorConfig {
            interpreter: PathBuf::from("sh"),
            temp_dir: dir.to_path_buf(),
            min_timeout: Duration::from_secs(1),
            stop_grace: Duration::from_millis(500),
        })
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn completed_run_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let exec = sh_executor(dir.path());

        let result = exec
            .execute(ExecutionRequest::new("echo hello; echo oops >&2", ExecMode::Script, 10))
            .await;

        assert_eq!(result.status, ExecStatus::Completed);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.mode_used, ExecMode::Script);
        assert_eq!(result.declared_timeout, 10);
        assert!(result.error_detail.is_none());
        assert!(!result.temp_path.exists());
        assert!(dir_is_empty(dir.path()));
        assert_eq!(exec.active_count(), 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_still_completed() {
        let dir = tempfile::tempdir().unwrap();
        let exec = sh_executor(dir.path());

        let result = exec
            .execute(ExecutionRequest::new("exit 3", ExecMode::Script, 10))
            .await;

        assert_eq!(result.status, ExecStatus::Completed);
        assert_eq!(result.exit_code, 3);
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn runs_inside_script_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exec = sh_executor(dir.path());

        let result = exec
            .execute(ExecutionRequest::new("pwd", ExecMode::Script, 10))
            .await;

        let expected = dir.path().canonicalize().unwrap();
        let actual = PathBuf::from(result.stdout.trim()).canonicalize().unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn stdin_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let exec = sh_executor(dir.path());

        let result = exec
            .execute(ExecutionRequest::new("cat; echo done", ExecMode::Script, 10))
            .await;

        assert_eq!(result.status, ExecStatus::Completed);
        assert_eq!(result.stdout, "done\n");
    }

    #[tokio::test]
    async fn invalid_utf8_output_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let exec = sh_executor(dir.path());

        let result = exec
            .execute(ExecutionRequest::new(r"printf 'a\377b'", ExecMode::Script, 10))
            .await;

        assert_eq!(result.stdout, "a\u{FFFD}b");
    }

    #[tokio::test]
    async fn timeout_terminates_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let exec = sh_executor(dir.path());

        let start = Instant::now();
        let result = exec
            .execute(ExecutionRequest::new("sleep 10", ExecMode::Script, 1))
            .await;

        assert_eq!(result.status, ExecStatus::TimedOut);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stdout, "");
        assert!(result.stderr.contains("1 seconds"), "stderr: {}", result.stderr);
        assert!(result.error_detail.is_some());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(result.wall_clock_secs >= 1.0);
        assert!(!result.temp_path.exists());
        assert_eq!(exec.active_count(), 0);
    }

    #[tokio::test]
    async fn timeout_force_kills_process_ignoring_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let exec = sh_executor(dir.path());

        let start = Instant::now();
        let result = exec
            .execute(ExecutionRequest::new(
                "trap '' TERM; sleep 10",
                ExecMode::Script,
                1,
            ))
            .await;

        assert_eq!(result.status, ExecStatus::TimedOut);
        // deadline + grace, well before the sleep would end
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert!(start.elapsed() < Duration::from_secs(6));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn timeout_is_clamped_to_floor() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ProcessExecutor::new(ProcessExecutorConfig {
            interpreter: PathBuf::from("sh"),
            temp_dir: dir.path().to_path_buf(),
            ..Default::default()
        });

        let result = exec
            .execute(ExecutionRequest::new("true", ExecMode::Script, 0))
            .await;

        assert_eq!(result.declared_timeout, 5);
    }

    #[tokio::test]
    async fn missing_interpreter_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ProcessExecutor::new(ProcessExecutorConfig {
            interpreter: PathBuf::from("/nonexistent/interpreter"),
            temp_dir: dir.path().to_path_buf(),
            ..Default::default()
        });

        let result = exec
            .execute(ExecutionRequest::new("print(1)", ExecMode::Script, 5))
            .await;

        assert_eq!(result.status, ExecStatus::Failed);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stdout, "");
        let detail = result.error_detail.unwrap();
        assert!(detail.contains("/nonexistent/interpreter"), "detail: {detail}");
        assert!(result.stderr.starts_with("execution error:"));
        assert!(dir_is_empty(dir.path()));
        assert_eq!(exec.active_count(), 0);
    }

    #[tokio::test]
    async fn unwritable_temp_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let exec = sh_executor(&blocker.join("sub"));

        let result = exec
            .execute(ExecutionRequest::new("true", ExecMode::Script, 5))
            .await;

        assert_eq!(result.status, ExecStatus::Failed);
        assert!(result.error_detail.is_some());
    }

    #[tokio::test]
    async fn test_suite_without_markers_falls_back_to_script() {
        let dir = tempfile::tempdir().unwrap();
        let exec = sh_executor(dir.path());

        let result = exec
            .execute(ExecutionRequest::new("echo plain", ExecMode::TestSuite, 10))
            .await;

        assert_eq!(result.mode_used, ExecMode::Script);
        assert_eq!(result.status, ExecStatus::Completed);
        assert_eq!(result.stdout, "plain\n");
    }

    #[tokio::test]
    async fn test_suite_with_markers_runs_under_harness() {
        use std::os::unix::fs::PermissionsExt;

        // Stand-in interpreter that echoes the arguments it was given.
        let bin = tempfile::tempdir().unwrap();
        let stub = bin.path().join("fake-python");
        std::fs::write(&stub, "#!/bin/sh\nprintf '%s\\n' \"$@\"\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let exec = ProcessExecutor::new(ProcessExecutorConfig {
            interpreter: stub,
            temp_dir: dir.path().to_path_buf(),
            min_timeout: Duration::from_secs(1),
            stop_grace: Duration::from_millis(500),
        });

        let result = exec
            .execute(ExecutionRequest::new(
                "def test_add():\n    assert 1 + 1 == 2\n",
                ExecMode::TestSuite,
                10,
            ))
            .await;

        assert_eq!(result.status, ExecStatus::Completed, "stderr: {}", result.stderr);
        assert_eq!(result.mode_used, ExecMode::TestSuite);
        let script_name = result.temp_path.file_name().unwrap().to_str().unwrap();
        assert!(script_name.starts_with("script_") && script_name.ends_with(".py"));
        let argv: Vec<&str> = result.stdout.lines().collect();
        assert_eq!(argv, ["-m", "pytest", script_name, "-v", "--tb=short"]);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn timeout_stops_background_members_of_the_group() {
        let dir = tempfile::tempdir().unwrap();
        let marker_dir = tempfile::tempdir().unwrap();
        let marker = marker_dir.path().join("marker");
        let exec = sh_executor(dir.path());

        // The shell exits at once; its background job keeps stdout open.
        let code = format!("(sleep 3; touch {}) &\necho started", marker.display());
        let result = exec
            .execute(ExecutionRequest::new(code, ExecMode::Script, 1))
            .await;

        assert_eq!(result.status, ExecStatus::TimedOut);
        assert_eq!(result.exit_code, -1);
        assert!(dir_is_empty(dir.path()));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!marker.exists(), "background job outlived the timeout");
    }

    #[tokio::test]
    async fn concurrent_runs_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let exec = sh_executor(dir.path());

        let (a, b) = tokio::join!(
            exec.execute(ExecutionRequest::new("sleep 0.2; echo a", ExecMode::Script, 10)),
            exec.execute(ExecutionRequest::new("echo b", ExecMode::Script, 10)),
        );

        assert_eq!(a.stdout, "a\n");
        assert_eq!(b.stdout, "b\n");
        assert_ne!(a.temp_path, b.temp_path);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn stop_all_terminates_in_flight_runs() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(sh_executor(dir.path()));

        let task = tokio::spawn({
            let exec = Arc::clone(&exec);
            async move {
                exec.execute(ExecutionRequest::new("sleep 30", ExecMode::Script, 60))
                    .await
            }
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while exec.active_count() == 0 {
            assert!(Instant::now() < deadline, "execution never started");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let start = Instant::now();
        exec.stop_all();
        assert_eq!(exec.active_count(), 0);

        let result = task.await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(result.status, ExecStatus::Failed);
        assert_eq!(result.exit_code, -1);
        assert!(dir_is_empty(dir.path()));
    }

    #[test]
    fn stop_all_on_idle_executor_is_noop() {
        let exec = ProcessExecutor::new(ProcessExecutorConfig::default());
        exec.stop_all();
        assert_eq!(exec.active_count(), 0);
        assert_eq!(exec.name(), "process");
    }
}
