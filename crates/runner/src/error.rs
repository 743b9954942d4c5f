#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("policy violation: {0}")]
    Policy(#[from] sanitizer::PolicyViolation),

    /// Rejected by the interpreter's compile step. `text` is the offending
    /// source line, when the interpreter reported one.
    #[error("syntax error: {message}")]
    Syntax { message: String, text: String },

    #[error("invalid request: {0}")]
    Request(String),

    #[error("server is shutting down")]
    ShuttingDown,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type RunnerResult<T> = Result<T, RunnerError>;
