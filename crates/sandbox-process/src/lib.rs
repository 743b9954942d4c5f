mod command;
mod config;
mod executor;
mod paths;
mod process;
mod registry;

pub use command::{has_test_markers, resolve_mode};
pub use config::{
    DEFAULT_INTERPRETER, DEFAULT_MIN_TIMEOUT, DEFAULT_STOP_GRACE, ProcessExecutorConfig,
};
pub use executor::ProcessExecutor;
pub use paths::script_path;
pub use process::ProcessGroup;
pub use registry::ProcessRegistry;
