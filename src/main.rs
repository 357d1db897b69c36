//! Command line entry point for tts-batch
//!
//! Usage: `tts-batch file1.txt file2.txt ...`
//!
//! Each file is submitted for synthesis and its audio is saved next to it as
//! `<file>.mp3`. The process keeps retrying missing downloads until they all
//! arrive or it receives SIGINT/SIGTERM.

use std::path::PathBuf;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use tts_batch::{BatchOrchestrator, Config, Error, run_with_shutdown};

/// Submit text files for speech synthesis and download the generated audio
#[derive(Parser)]
#[command(name = "tts-batch")]
#[command(about = "Submit text files for speech synthesis and download the generated mp3 files")]
struct Args {
    /// UTF-8 text files to synthesize
    files: Vec<PathBuf>,

    /// JSON configuration file (missing fields take their defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Synthesis language (default: telugu)
    #[arg(long)]
    language: Option<String>,

    /// Seconds between download attempts (default: 60)
    #[arg(long)]
    retry_interval: Option<u64>,

    /// Give up on a download after this many attempts (default: never)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Treat a non-success submission status as a failure
    #[arg(long)]
    validate_status: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> tts_batch::Result<(Config, Vec<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(language) = self.language {
            config.service.language = language;
        }
        if let Some(secs) = self.retry_interval {
            config.retry.interval = Duration::from_secs(secs);
        }
        if self.max_attempts.is_some() {
            config.retry.max_attempts = self.max_attempts;
        }
        if self.validate_status {
            config.submission.validate_status = true;
        }
        Ok((config, self.files))
    }
}

/// Usage text to print when no files were given, `None` otherwise
fn missing_files_usage(files: &[PathBuf]) -> Option<String> {
    files
        .is_empty()
        .then(|| format!("No files provided\n{}", Args::command().render_usage()))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> tts_batch::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    if let Some(usage) = missing_files_usage(&args.files) {
        eprintln!("{usage}");
    }

    let (config, files) = args.into_config()?;
    let orchestrator = BatchOrchestrator::new(config)?;

    match orchestrator.run_batch(&files).await {
        Ok(_) => {}
        // an unreadable document ends the run
        Err(e @ Error::Io(_)) => return Err(e),
        // already logged; downloads of the other documents keep going
        Err(_) => {}
    }

    let reports = run_with_shutdown(&orchestrator).await;
    let downloaded = reports.iter().filter(|r| r.is_downloaded()).count();
    tracing::info!(
        downloaded,
        total = reports.len(),
        "Finished downloading generated mp3 files"
    );
    Ok(())
}
