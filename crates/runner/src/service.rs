use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sandbox::{ExecutionRequest, Executor};
use sanitizer::Language;
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::envelope::Envelope;
use crate::error::{RunnerError, RunnerResult};
use crate::precheck;
use crate::request::RunRequest;

/// Longest request id echoed back, in characters.
const MAX_ID_CHARS: usize = 128;

/// Request-level settings taken from [`RunnerConfig`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub interpreter: PathBuf,
    pub default_timeout_secs: u64,
    pub max_ratio: f64,
    /// `None` disables the syntax check.
    pub precheck_timeout: Option<Duration>,
}

impl From<&RunnerConfig> for ServiceSettings {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            default_timeout_secs: config.execution.default_timeout_secs,
            max_ratio: config.policy.max_ratio,
            precheck_timeout: config
                .policy
                .precheck
                .then_some(Duration::from_secs(config.policy.precheck_timeout_secs)),
        }
    }
}

/// Turns run requests into envelopes: validates and cleans the submission,
/// then hands it to the executor.
pub struct CodeRunService {
    executor: Arc<dyn Executor>,
    settings: ServiceSettings,
    shutting_down: AtomicBool,
}

impl CodeRunService {
    pub fn new(executor: Arc<dyn Executor>, settings: ServiceSettings) -> Self {
        Self {
            executor,
            settings,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Stop every running execution and reject requests that have not been
    /// dispatched yet.
    pub fn shut_down(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.executor.stop_all();
    }

    pub async fn handle(&self, request: RunRequest) -> Envelope {
        let id = request.id.as_deref().map(|raw| {
            sanitizer::sanitize_input(raw)
                .chars()
                .take(MAX_ID_CHARS)
                .collect::<String>()
        });

        let prepared = match self.prepare(&request).await {
            Ok(_) if self.shutting_down.load(Ordering::SeqCst) => {
                warn!(id = id.as_deref().unwrap_or("-"), "shutting down, request not dispatched");
                return Envelope::rejected(id, &RunnerError::ShuttingDown);
            }
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(id = id.as_deref().unwrap_or("-"), error = %e, "request rejected");
                return Envelope::rejected(id, &e);
            }
        };

        info!(
            id = id.as_deref().unwrap_or("-"),
            executor = self.executor.name(),
            mode = %prepared.mode(),
            timeout_secs = prepared.timeout_secs(),
            code_chars = prepared.code().chars().count(),
            "dispatching execution"
        );
        let result = self.executor.execute(prepared).await;
        Envelope::from_result(id, result)
    }

    async fn prepare(&self, request: &RunRequest) -> RunnerResult<ExecutionRequest> {
        if request.code.trim().is_empty() {
            return Err(RunnerError::Request("code must not be empty".into()));
        }
        let mode = request.mode()?;

        let code = sanitizer::clean(&request.code);
        if code.is_empty() {
            return Err(RunnerError::Request(
                "code is empty after cleaning".into(),
            ));
        }
        let ratio = sanitizer::check_ratio(&code, self.settings.max_ratio)?;
        info!(
            raw_chars = request.code.chars().count(),
            cleaned_chars = code.chars().count(),
            cjk_ratio = ratio,
            "code cleaned"
        );

        let language = sanitizer::detect_language(&code);
        if language == Language::JavaScript {
            warn!(%language, "submission looks like another language, running anyway");
        }

        if let Some(timeout) = self.settings.precheck_timeout {
            precheck::check_syntax(&self.settings.interpreter, &code, timeout).await?;
        }

        let timeout_secs = request.timeout_or(self.settings.default_timeout_secs);
        Ok(ExecutionRequest::new(code, mode, timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sandbox::{ExecMode, ExecStatus, ExecutionResult};

    use super::*;

    /// Records requests and answers each with a canned result.
    #[derive(Default)]
    struct RecordingExecutor {
        seen: Mutex<Vec<ExecutionRequest>>,
        exit_code: i32,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        fn name(&self) -> &str {
            "recording"
        }

        async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
            let result = ExecutionResult {
                stdout: format!("ran {} chars", request.code().len()),
                stderr: String::new(),
                exit_code: self.exit_code,
                mode_used: request.mode(),
                temp_path: PathBuf::from("/tmp/script_test.py"),
                declared_timeout: request.timeout_secs(),
                wall_clock_secs: 0.01,
                status: ExecStatus::Completed,
                error_detail: None,
            };
            self.seen.lock().unwrap().push(request);
            result
        }

        fn stop_all(&self) {}
    }

    fn settings() -> ServiceSettings {
        ServiceSettings {
            interpreter: PathBuf::from("python3"),
            default_timeout_secs: 30,
            max_ratio: sanitizer::DEFAULT_MAX_RATIO,
            precheck_timeout: None,
        }
    }

    fn service(executor: &Arc<RecordingExecutor>) -> CodeRunService {
        CodeRunService::new(Arc::clone(executor) as Arc<dyn Executor>, settings())
    }

    #[tokio::test]
    async fn cleaned_code_reaches_executor() {
        let exec = Arc::new(RecordingExecutor::default());
        let svc = service(&exec);

        let request = RunRequest {
            id: Some("job-1".into()),
            ..RunRequest::new("```python\nprint('hi')\n```\n这段代码会打印问候语")
        };
        let env = svc.handle(request).await;

        assert_eq!(env.code, 200);
        assert_eq!(env.id.as_deref(), Some("job-1"));
        let seen = exec.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].code(), "print('hi')");
        assert_eq!(seen[0].mode(), ExecMode::Script);
        assert_eq!(seen[0].timeout_secs(), 30);
    }

    #[tokio::test]
    async fn runner_and_timeout_are_forwarded() {
        let exec = Arc::new(RecordingExecutor::default());
        let svc = service(&exec);

        let request = RunRequest {
            runner: Some("pytest".into()),
            timeout: Some(12),
            ..RunRequest::new("def test_one():\n    assert True\n")
        };
        let env = svc.handle(request).await;

        assert_eq!(env.data.runner, Some("pytest"));
        assert_eq!(env.data.timeout, Some(12));
        let seen = exec.seen.lock().unwrap();
        assert_eq!(seen[0].mode(), ExecMode::TestSuite);
        assert_eq!(seen[0].timeout_secs(), 12);
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_as_failure() {
        let exec = Arc::new(RecordingExecutor {
            exit_code: 2,
            ..Default::default()
        });
        let env = service(&exec).handle(RunRequest::new("import sys\nsys.exit(2)")).await;
        assert_eq!(env.code, 400);
        assert_eq!(env.msg, "execution failed");
    }

    #[tokio::test]
    async fn empty_code_is_rejected_without_execution() {
        let exec = Arc::new(RecordingExecutor::default());
        let env = service(&exec).handle(RunRequest::new("  \n\t")).await;

        assert_eq!(env.code, 400);
        assert_eq!(env.data.error.as_deref(), Some("parameter_error"));
        assert!(exec.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prose_only_submission_is_rejected() {
        let exec = Arc::new(RecordingExecutor::default());
        let env = service(&exec)
            .handle(RunRequest::new("这是一段没有代码的说明文字"))
            .await;

        assert_eq!(env.code, 400);
        assert_eq!(env.msg, "invalid request: code is empty after cleaning");
        assert!(exec.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn high_cjk_ratio_is_a_policy_violation() {
        let exec = Arc::new(RecordingExecutor::default());
        // mostly-CJK comment lines survive cleaning
        let code = "# 计算两个数的和并输出\n# 结果保存在变量里面\nx = 1";
        let env = service(&exec).handle(RunRequest::new(code)).await;

        assert_eq!(env.code, 400);
        assert_eq!(env.data.error.as_deref(), Some("policy_violation"));
        assert!(env.msg.starts_with("policy violation:"), "msg: {}", env.msg);
        assert!(exec.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_runner_is_rejected() {
        let exec = Arc::new(RecordingExecutor::default());
        let request = RunRequest {
            runner: Some("ruby".into()),
            ..RunRequest::new("puts 1")
        };
        let env = service(&exec).handle(request).await;

        assert_eq!(env.code, 400);
        assert_eq!(env.data.stderr, "unsupported runner: ruby");
        assert!(exec.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn request_id_is_sanitized() {
        let exec = Arc::new(RecordingExecutor::default());
        let request = RunRequest {
            id: Some(format!("a\u{0}b{}", "x".repeat(500))),
            ..RunRequest::new("print(1)")
        };
        let env = service(&exec).handle(request).await;

        let id = env.id.unwrap();
        assert!(id.starts_with("abx"));
        assert_eq!(id.chars().count(), MAX_ID_CHARS);
    }

    #[test]
    fn settings_follow_config() {
        let mut config = RunnerConfig::default();
        assert_eq!(
            ServiceSettings::from(&config).precheck_timeout,
            Some(Duration::from_secs(crate::config::DEFAULT_PRECHECK_TIMEOUT_SECS))
        );
        config.policy.precheck = false;
        assert_eq!(ServiceSettings::from(&config).precheck_timeout, None);
    }

    #[tokio::test]
    async fn requests_after_shut_down_are_not_dispatched() {
        let exec = Arc::new(RecordingExecutor::default());
        let svc = service(&exec);

        svc.shut_down();
        let env = svc
            .handle(RunRequest {
                id: Some("late".into()),
                ..RunRequest::new("print(1)")
            })
            .await;

        assert_eq!(env.code, 500);
        assert_eq!(env.id.as_deref(), Some("late"));
        assert_eq!(env.data.error.as_deref(), Some("execution_error"));
        assert!(env.msg.contains("shutting down"), "msg: {}", env.msg);
        assert!(exec.seen.lock().unwrap().is_empty());
    }
}
