use async_trait::async_trait;

use crate::types::{ExecutionRequest, ExecutionResult};

/// A backend that runs submitted code to completion.
///
/// `execute` never fails: every error path is folded into a terminal
/// [`ExecutionResult`] with [`crate::ExecStatus::Failed`].
#[async_trait]
pub trait Executor: Send + Sync {
    /// Human-readable name for this executor implementation (e.g. "process").
    fn name(&self) -> &str;
    /// Run one request. Consumes the request; the result is produced exactly once.
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult;
    /// Ask every in-flight execution to stop. Best-effort and non-blocking.
    fn stop_all(&self);
}
