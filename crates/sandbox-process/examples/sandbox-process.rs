use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use sandbox::{ExecMode, ExecutionRequest, Executor};
use sandbox_process::{ProcessExecutor, ProcessExecutorConfig};
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

/// Run a script file through the process executor, without sanitizing it.
#[derive(Parser)]
#[command(name = "sandbox-process")]
struct Cli {
    /// Script to execute
    file: PathBuf,
    /// Run under the test harness instead of as a plain script
    #[arg(long)]
    test_suite: bool,
    /// Execution timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Interpreter binary
    #[arg(long, default_value = sandbox_process::DEFAULT_INTERPRETER)]
    interpreter: PathBuf,
    /// Directory for temporary script files (defaults to the platform temp dir)
    #[arg(long)]
    temp_dir: Option<PathBuf>,
    /// Timeout floor in seconds
    #[arg(long, default_value_t = 5)]
    min_timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match tokio::fs::read(&cli.file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("error: read {}: {e}", cli.file.display());
            return ExitCode::FAILURE;
        }
    };

    let mut config = ProcessExecutorConfig {
        interpreter: cli.interpreter,
        min_timeout: Duration::from_secs(cli.min_timeout),
        ..Default::default()
    };
    if let Some(dir) = cli.temp_dir {
        config.temp_dir = dir;
    }
    let executor = ProcessExecutor::new(config);

    let mode = if cli.test_suite {
        ExecMode::TestSuite
    } else {
        ExecMode::Script
    };
    let result = executor
        .execute(ExecutionRequest::from_utf8_lossy(&code, mode, cli.timeout))
        .await;

    println!("status:    {}", result.status);
    println!("mode:      {}", result.mode_used);
    println!("exit code: {}", result.exit_code);
    println!("elapsed:   {:.3}s", result.wall_clock_secs);
    if let Some(detail) = &result.error_detail {
        println!("error:     {detail}");
    }
    println!("--- stdout ---\n{}", result.stdout);
    println!("--- stderr ---\n{}", result.stderr);

    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
