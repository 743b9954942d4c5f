use std::sync::Arc;

use clap::Args;
use sandbox::Executor;
use sandbox_process::ProcessExecutor;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{ExecArgs, shutdown_signal};
use crate::envelope::Envelope;
use crate::error::{RunnerError, RunnerResult};
use crate::request::RunRequest;
use crate::service::{CodeRunService, ServiceSettings};

/// Responses buffered ahead of the stdout writer.
const RESPONSE_BUFFER: usize = 64;

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    exec: ExecArgs,
}

/// Read JSON request lines from stdin and write one JSON envelope line per
/// request to stdout, in completion order.
///
/// Stops at end of input (after finishing queued work) or on SIGTERM/SIGINT,
/// which also stops every running execution.
pub async fn run_serve(args: ServeArgs) -> RunnerResult<()> {
    let config = args.exec.load_config().await?;
    let max_concurrent = config.execution.max_concurrent;

    let executor = Arc::new(ProcessExecutor::new(config.executor_config()));
    let service = Arc::new(CodeRunService::new(
        Arc::clone(&executor) as Arc<dyn Executor>,
        ServiceSettings::from(&config),
    ));
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let mut jobs = JoinSet::new();

    let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
    let writer = tokio::spawn(write_responses(rx, tokio::io::stdout()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut interrupted = false;
    let mut accepted: u64 = 0;

    info!(max_concurrent, "serving requests from stdin");

    loop {
        // Take a permit before reading so input backs up while we are full.
        let permit = tokio::select! {
            () = &mut shutdown => {
                interrupted = true;
                break;
            }
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => {
                    error!("semaphore closed unexpectedly");
                    break;
                }
            },
        };

        let line = tokio::select! {
            () = &mut shutdown => {
                interrupted = true;
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("end of input");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<RunRequest>(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed request line");
                let err = RunnerError::Request(format!("malformed request: {e}"));
                if tx.send(Envelope::rejected(None, &err)).await.is_err() {
                    error!("response writer stopped");
                    break;
                }
                continue;
            }
        };
        accepted += 1;

        let service = Arc::clone(&service);
        let tx = tx.clone();
        jobs.spawn(async move {
            let id = request.id.clone();
            // Inner spawn isolates panics: the caller still gets a response.
            let inner = tokio::spawn(async move { service.handle(request).await });
            let envelope = match inner.await {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!(error = %e, "request task panicked");
                    Envelope::rejected(id, &RunnerError::Internal(format!("request task failed: {e}")))
                }
            };
            if tx.send(envelope).await.is_err() {
                warn!("response writer stopped, dropping response");
            }
            drop(permit);
        });

        while let Some(result) = jobs.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "job task panicked");
            }
        }
    }

    if interrupted {
        info!(active = executor.active_count(), "stopping running executions");
        service.shut_down();
    }

    let remaining = jobs.len();
    if remaining > 0 {
        info!(remaining, "waiting for running jobs to finish");
        while let Some(result) = jobs.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "job task panicked during drain");
            }
        }
    }

    drop(tx);
    writer
        .await
        .map_err(|e| RunnerError::Internal(format!("response writer failed: {e}")))??;

    info!(accepted, "server stopped");
    Ok(())
}

/// Write each envelope as one JSON line, flushing after every line.
async fn write_responses<W>(mut rx: mpsc::Receiver<Envelope>, mut out: W) -> RunnerResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let mut line = serde_json::to_vec(&envelope)
            .map_err(|e| RunnerError::Internal(format!("serialize response: {e}")))?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
    }
    Ok(())
}
