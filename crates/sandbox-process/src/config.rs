use std::path::PathBuf;
use std::time::Duration;

/// Default floor for execution timeouts.
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Default wait between the graceful stop and the forced kill.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
/// Default interpreter binary, looked up on `PATH` at spawn time.
pub const DEFAULT_INTERPRETER: &str = "python3";

#[derive(Debug, Clone)]
pub struct ProcessExecutorConfig {
    /// Interpreter used for both script and test-suite runs.
    pub interpreter: PathBuf,
    /// Directory that receives one script file per execution.
    pub temp_dir: PathBuf,
    /// Requested timeouts below this are clamped up to it.
    pub min_timeout: Duration,
    /// How long a timed-out process group gets to exit after SIGTERM.
    pub stop_grace: Duration,
}

impl Default for ProcessExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            temp_dir: std::env::temp_dir(),
            min_timeout: DEFAULT_MIN_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

impl ProcessExecutorConfig {
    /// Effective timeout for a request, in whole seconds.
    pub fn effective_timeout_secs(&self, requested_secs: u64) -> u64 {
        requested_secs.max(self.min_timeout.as_secs())
    }
}
