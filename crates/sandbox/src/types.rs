use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How submitted code is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// Run the file directly with the interpreter.
    Script,
    /// Run the file under the test framework harness.
    TestSuite,
}

impl std::fmt::Display for ExecMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Script => f.write_str("script"),
            Self::TestSuite => f.write_str("test_suite"),
        }
    }
}

/// Terminal state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    /// The child ran to natural completion within the deadline.
    Completed,
    /// The deadline passed and the process group was terminated.
    TimedOut,
    /// Something went wrong before or during launch.
    Failed,
}

impl std::fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::TimedOut => f.write_str("timed_out"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    code: String,
    mode: ExecMode,
    timeout_secs: u64,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, mode: ExecMode, timeout_secs: u64) -> Self {
        Self {
            code: code.into(),
            mode,
            timeout_secs,
        }
    }

    /// Build a request from raw bytes, replacing invalid UTF-8 with U+FFFD.
    pub fn from_utf8_lossy(code: &[u8], mode: ExecMode, timeout_secs: u64) -> Self {
        Self::new(String::from_utf8_lossy(code), mode, timeout_secs)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    /// Requested timeout. Executors may clamp this up to their own floor.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Process exit status, or `-1` for timeout and internal failures.
    pub exit_code: i32,
    /// Mode actually run; may differ from the requested mode.
    pub mode_used: ExecMode,
    /// Script location, for diagnostics only. The file is gone by the time
    /// the result is returned.
    pub temp_path: PathBuf,
    /// Effective timeout in seconds, after clamping.
    pub declared_timeout: u64,
    pub wall_clock_secs: f64,
    pub status: ExecStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ExecutionResult {
    /// The code ran to completion and exited with status 0.
    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Completed && self.exit_code == 0
    }
}
