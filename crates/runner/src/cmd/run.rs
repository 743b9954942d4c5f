use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use sandbox::Executor;
use sandbox_process::ProcessExecutor;
use tracing::info;

use super::{ExecArgs, read_source, shutdown_signal};
use crate::error::{RunnerError, RunnerResult};
use crate::request::RunRequest;
use crate::service::{CodeRunService, ServiceSettings};

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    exec: ExecArgs,
    /// Source file to run (`-` reads stdin)
    file: PathBuf,
    /// Runner: `python` or `pytest`
    #[arg(long, default_value = "python")]
    runner: String,
    /// Timeout in seconds (defaults to the configured value)
    #[arg(long)]
    timeout: Option<u64>,
    /// Correlation id echoed in the response
    #[arg(long)]
    id: Option<String>,
}

/// Run one file and print its response envelope as JSON.
///
/// Exits successfully only when the code ran and exited with status 0.
pub async fn run_once(args: RunArgs) -> RunnerResult<ExitCode> {
    let RunArgs {
        exec,
        file,
        runner,
        timeout,
        id,
    } = args;
    let config = exec.load_config().await?;
    let code = read_source(&file).await?;

    let executor = Arc::new(ProcessExecutor::new(config.executor_config()));
    let service = CodeRunService::new(
        Arc::clone(&executor) as Arc<dyn Executor>,
        ServiceSettings::from(&config),
    );
    let request = RunRequest {
        id,
        runner: Some(runner),
        timeout,
        ..RunRequest::new(code)
    };

    let handle = service.handle(request);
    tokio::pin!(handle);
    let envelope = tokio::select! {
        envelope = &mut handle => envelope,
        () = shutdown_signal() => {
            info!(active = executor.active_count(), "stopping running execution");
            service.shut_down();
            handle.await
        }
    };

    let json = serde_json::to_string_pretty(&envelope)
        .map_err(|e| RunnerError::Internal(format!("serialize response: {e}")))?;
    println!("{json}");

    Ok(if envelope.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
