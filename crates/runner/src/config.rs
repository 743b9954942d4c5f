use std::path::{Path, PathBuf};
use std::time::Duration;

use sandbox_process::ProcessExecutorConfig;
use serde::Deserialize;

use crate::error::{RunnerError, RunnerResult};

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_MIN_TIMEOUT_SECS: u64 = 5;
pub(crate) const DEFAULT_STOP_GRACE_SECS: u64 = 5;
pub(crate) const DEFAULT_MAX_CONCURRENT: usize = 4;
pub(crate) const DEFAULT_PRECHECK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Interpreter binary. A bare name is looked up on `PATH`.
    pub interpreter: PathBuf,
    /// Directory that receives one script file per execution.
    pub temp_dir: PathBuf,
    pub execution: ExecutionConfig,
    pub policy: PolicyConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(sandbox_process::DEFAULT_INTERPRETER),
            temp_dir: std::env::temp_dir().join("coderun"),
            execution: ExecutionConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Timeout applied when a request does not carry one.
    pub default_timeout_secs: u64,
    /// Floor for every timeout.
    pub min_timeout_secs: u64,
    /// How long a timed-out process may take to exit after the graceful stop.
    pub stop_grace_secs: u64,
    /// Executions in flight at once in `serve` mode.
    pub max_concurrent: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            min_timeout_secs: DEFAULT_MIN_TIMEOUT_SECS,
            stop_grace_secs: DEFAULT_STOP_GRACE_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Highest accepted share of CJK characters in cleaned code.
    pub max_ratio: f64,
    /// Compile submissions before running them.
    pub precheck: bool,
    pub precheck_timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_ratio: sanitizer::DEFAULT_MAX_RATIO,
            precheck: true,
            precheck_timeout_secs: DEFAULT_PRECHECK_TIMEOUT_SECS,
        }
    }
}

/// Load and validate a runner config from a YAML file.
///
/// Missing fields take their defaults. Relative paths in the config are
/// resolved against the config file's parent directory.
pub async fn load(path: &Path) -> RunnerResult<RunnerConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RunnerError::Config(format!("read {}: {e}", path.display())))?;
    let mut config = if content.trim().is_empty() {
        RunnerConfig::default()
    } else {
        serde_yaml_ng::from_str(&content)
            .map_err(|e| RunnerError::Config(format!("parse {}: {e}", path.display())))?
    };
    if let Some(config_dir) = path.parent() {
        config.resolve_relative_paths(config_dir);
    }
    config.validate()?;
    Ok(config)
}

impl RunnerConfig {
    /// Resolve relative paths against `config_dir` (the directory containing the YAML file).
    ///
    /// A bare interpreter name such as `python3` is left alone for the `PATH`
    /// lookup; only interpreter paths with a directory part are resolved.
    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        if self.temp_dir.is_relative() {
            self.temp_dir = config_dir.join(&self.temp_dir);
        }
        if self.interpreter.is_relative() && self.interpreter.components().count() > 1 {
            self.interpreter = config_dir.join(&self.interpreter);
        }
    }

    pub fn validate(&self) -> RunnerResult<()> {
        if self.execution.max_concurrent == 0 {
            return Err(RunnerError::Config(
                "execution.max_concurrent must be at least 1".into(),
            ));
        }
        if self.execution.default_timeout_secs == 0 {
            return Err(RunnerError::Config(
                "execution.default_timeout_secs must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.policy.max_ratio) {
            return Err(RunnerError::Config(format!(
                "policy.max_ratio must be between 0 and 1, got {}",
                self.policy.max_ratio
            )));
        }
        Ok(())
    }

    /// Apply CLI / environment overrides on top of the file values.
    pub fn apply_overrides(
        &mut self,
        interpreter: Option<PathBuf>,
        temp_dir: Option<PathBuf>,
        skip_precheck: bool,
    ) {
        if let Some(interpreter) = interpreter {
            self.interpreter = interpreter;
        }
        if let Some(temp_dir) = temp_dir {
            self.temp_dir = temp_dir;
        }
        if skip_precheck {
            self.policy.precheck = false;
        }
    }

    /// Replace the interpreter with its absolute location, failing early when
    /// it cannot be found or is not executable.
    pub fn resolve_interpreter(&mut self) -> RunnerResult<()> {
        let found = which::which(&self.interpreter).map_err(|e| {
            RunnerError::Config(format!(
                "interpreter {}: {e}",
                self.interpreter.display()
            ))
        })?;
        self.interpreter = found;
        Ok(())
    }

    pub async fn prepare_temp_dir(&self) -> RunnerResult<()> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| {
                RunnerError::Config(format!(
                    "create temp_dir {}: {e}",
                    self.temp_dir.display()
                ))
            })
    }

    pub fn executor_config(&self) -> ProcessExecutorConfig {
        ProcessExecutorConfig {
            interpreter: self.interpreter.clone(),
            temp_dir: self.temp_dir.clone(),
            min_timeout: Duration::from_secs(self.execution.min_timeout_secs),
            stop_grace: Duration::from_secs(self.execution.stop_grace_secs),
        }
    }
}
