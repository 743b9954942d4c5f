use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use tracing::{info, warn};

use super::read_source;
use crate::error::RunnerResult;

#[derive(Args)]
pub struct CleanArgs {
    /// Source file to clean (`-` reads stdin)
    file: PathBuf,
    /// Highest accepted share of CJK characters in the cleaned code
    #[arg(long, default_value_t = sanitizer::DEFAULT_MAX_RATIO)]
    max_ratio: f64,
}

/// Print the cleaned form of a file, failing when it would be rejected for
/// its CJK share.
pub async fn run_clean(args: CleanArgs) -> RunnerResult<ExitCode> {
    let raw = read_source(&args.file).await?;
    let cleaned = sanitizer::clean(&raw);
    let (ok, ratio) = sanitizer::validate_ratio(&cleaned, args.max_ratio);
    let language = sanitizer::detect_language(&cleaned);

    info!(
        raw_chars = raw.chars().count(),
        cleaned_chars = cleaned.chars().count(),
        cjk_ratio = ratio,
        %language,
        "cleaned"
    );
    println!("{cleaned}");

    if ok {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(
            cjk_ratio = ratio,
            max_ratio = args.max_ratio,
            "cleaned code would be rejected"
        );
        Ok(ExitCode::FAILURE)
    }
}
