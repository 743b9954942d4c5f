mod error;
mod executor;
mod types;

pub use error::{Result, SandboxError};
pub use executor::Executor;
pub use types::{ExecMode, ExecStatus, ExecutionRequest, ExecutionResult};
