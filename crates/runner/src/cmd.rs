mod clean;
mod run;
mod serve;

use std::path::{Path, PathBuf};

use clap::Args;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::config::{self, RunnerConfig};
use crate::error::RunnerResult;

pub use clean::{CleanArgs, run_clean};
pub use run::{RunArgs, run_once};
pub use serve::{ServeArgs, run_serve};

/// Options shared by the commands that execute code.
#[derive(Args)]
pub struct ExecArgs {
    /// Path to runner.yaml config file (defaults apply when omitted)
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Interpreter binary (overrides config)
    #[arg(long, env = "CODERUN_INTERPRETER")]
    interpreter: Option<PathBuf>,
    /// Directory for per-execution script files (overrides config)
    #[arg(long, env = "CODERUN_TEMP_DIR")]
    temp_dir: Option<PathBuf>,
    /// Run submissions without compiling them first
    #[arg(long)]
    skip_precheck: bool,
}

impl ExecArgs {
    /// Load the config file, apply overrides, and make sure the interpreter
    /// and temp directory are usable.
    async fn load_config(self) -> RunnerResult<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => config::load(path).await?,
            None => RunnerConfig::default(),
        };
        config.apply_overrides(self.interpreter, self.temp_dir, self.skip_precheck);
        config.validate()?;
        config.resolve_interpreter()?;
        config.prepare_temp_dir().await?;
        info!(
            interpreter = %config.interpreter.display(),
            temp_dir = %config.temp_dir.display(),
            precheck = config.policy.precheck,
            "config loaded"
        );
        Ok(config)
    }
}

/// Read source text from `path`, or from stdin when `path` is `-`.
///
/// Invalid UTF-8 is replaced rather than rejected.
async fn read_source(path: &Path) -> RunnerResult<String> {
    let bytes = if path == Path::new("-") {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        tokio::fs::read(path).await?
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Resolve when the process is asked to stop (SIGTERM or SIGINT).
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).ok();
    let mut sigint = signal(SignalKind::interrupt()).ok();

    tokio::select! {
        _ = recv_signal(&mut sigterm) => {
            info!("received SIGTERM, stopping");
        }
        _ = recv_signal(&mut sigint) => {
            info!("received SIGINT, stopping");
        }
    }
}

/// Resolve when the process is asked to stop (Ctrl-C).
#[cfg(not(unix))]
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C, stopping"),
        Err(_) => std::future::pending().await,
    }
}

/// Await a signal if registered, or pend forever if registration failed.
#[cfg(unix)]
async fn recv_signal(sig: &mut Option<tokio::signal::unix::Signal>) {
    match sig {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}
