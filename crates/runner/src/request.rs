use sandbox::ExecMode;
use serde::Deserialize;

use crate::error::{RunnerError, RunnerResult};

/// One code submission, as read from a request line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunRequest {
    /// Caller correlation id, echoed back in the response.
    #[serde(default)]
    pub id: Option<String>,
    pub code: String,
    /// `python` (default) or `pytest`.
    #[serde(default)]
    pub runner: Option<String>,
    /// Seconds; missing or zero selects the configured default.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl RunRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: None,
            code: code.into(),
            runner: None,
            timeout: None,
        }
    }

    /// Execution mode named by `runner`.
    pub fn mode(&self) -> RunnerResult<ExecMode> {
        match self.runner.as_deref().map(str::trim) {
            None | Some("") | Some("python") => Ok(ExecMode::Script),
            Some("pytest") => Ok(ExecMode::TestSuite),
            Some(other) => Err(RunnerError::Request(format!(
                "unsupported runner: {other}"
            ))),
        }
    }

    pub fn timeout_or(&self, default_secs: u64) -> u64 {
        self.timeout.filter(|&t| t > 0).unwrap_or(default_secs)
    }
}

/// Name of the runner that executes `mode`.
pub fn runner_name(mode: ExecMode) -> &'static str {
    match mode {
        ExecMode::Script => "python",
        ExecMode::TestSuite => "pytest",
    }
}
