//! Response envelope written for every request.
//!
//! | outcome                          | code | msg                                  |
//! |----------------------------------|------|--------------------------------------|
//! | completed, exit 0                | 200  | `execution succeeded`                |
//! | completed, nonzero exit          | 400  | `execution failed`                   |
//! | timed out                        | 408  | `execution timed out (N seconds)`    |
//! | engine failure                   | 500  | `execution error: <detail>`          |
//! | rejected before execution        | 400  | the rejection reason                 |
//! | runner-side failure              | 500  | the error                            |

use std::path::PathBuf;

use sandbox::{ExecStatus, ExecutionResult};
use serde::Serialize;

use crate::error::RunnerError;
use crate::request::runner_name;

pub const CODE_OK: u16 = 200;
pub const CODE_BAD_REQUEST: u16 = 400;
pub const CODE_TIMEOUT: u16 = 408;
pub const CODE_INTERNAL: u16 = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub code: u16,
    pub msg: String,
    pub data: ResponseData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseData {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Envelope for a request that reached the engine.
    pub fn from_result(id: Option<String>, result: ExecutionResult) -> Self {
        let (code, msg) = match result.status {
            ExecStatus::Completed if result.exit_code == 0 => {
                (CODE_OK, "execution succeeded".to_string())
            }
            ExecStatus::Completed => (CODE_BAD_REQUEST, "execution failed".to_string()),
            ExecStatus::TimedOut => (
                CODE_TIMEOUT,
                format!("execution timed out ({} seconds)", result.declared_timeout),
            ),
            ExecStatus::Failed => (
                CODE_INTERNAL,
                format!(
                    "execution error: {}",
                    result.error_detail.as_deref().unwrap_or("unknown")
                ),
            ),
        };

        Self {
            id,
            code,
            msg,
            data: ResponseData {
                stdout: result.stdout,
                stderr: result.stderr,
                exit_code: result.exit_code,
                runner: Some(runner_name(result.mode_used)),
                file_path: Some(result.temp_path),
                timeout: Some(result.declared_timeout),
                execution_time: Some(result.wall_clock_secs),
                status: result.status.to_string(),
                error: result.error_detail,
            },
        }
    }

    /// Envelope for a request that never reached the engine.
    pub fn rejected(id: Option<String>, err: &RunnerError) -> Self {
        let (code, kind, stderr) = match err {
            RunnerError::Syntax { text, .. } => (CODE_BAD_REQUEST, "syntax_error", text.clone()),
            RunnerError::Policy(v) => (CODE_BAD_REQUEST, "policy_violation", v.to_string()),
            RunnerError::Request(reason) => (CODE_BAD_REQUEST, "parameter_error", reason.clone()),
            RunnerError::Config(_)
            | RunnerError::ShuttingDown
            | RunnerError::Io(_)
            | RunnerError::Internal(_) => {
                (CODE_INTERNAL, "execution_error", err.to_string())
            }
        };

        Self {
            id,
            code,
            msg: err.to_string(),
            data: ResponseData {
                stdout: String::new(),
                stderr,
                exit_code: -1,
                runner: None,
                file_path: None,
                timeout: None,
                execution_time: None,
                status: "error".to_string(),
                error: Some(kind.to_string()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }
}
