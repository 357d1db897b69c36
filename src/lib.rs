//! # tts-batch
//!
//! Submits a batch of text documents to a remote speech-synthesis service and
//! downloads the resulting audio, one file per document.
//!
//! Each document runs through its own pipeline:
//! 1. derive a request ID from the text ([`request_id::generate_id`])
//! 2. submit the text ([`client::SynthesisClient`])
//! 3. fetch `<prefix><id>.mp3` into `<document>.mp3`, retrying at a fixed
//!    interval until it exists ([`fetcher::RetryingFetcher`])
//!
//! A batch is reported done once every submission completed; downloads keep
//! retrying in the background until they succeed or the orchestrator shuts down.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use tts_batch::{BatchOrchestrator, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = BatchOrchestrator::new(Config::default())?;
//!
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     orchestrator.run_batch(&[PathBuf::from("story.txt")]).await?;
//!     let reports = orchestrator.wait_for_downloads().await;
//!     println!("{} downloads finished", reports.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Synthesis service client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Retrying artifact fetcher
pub mod fetcher;
/// Batch orchestration
pub mod orchestrator;
/// Content-derived request identifiers
pub mod request_id;
/// Fixed-interval retry with cancellation
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use client::SynthesisClient;
pub use config::{Config, RetryConfig, ServiceConfig, SubmissionConfig};
pub use error::{DownloadError, Error, Result};
pub use fetcher::RetryingFetcher;
pub use orchestrator::BatchOrchestrator;
pub use request_id::generate_id;
pub use types::{
    ArtifactLocation, BatchReport, Document, Event, FetchReport, FetchStatus, RequestId, Stage,
    SubmissionOutcome, SubmissionRequest,
};

/// Wait for outstanding downloads, shutting down gracefully on a termination signal.
///
/// Returns the fetch reports collected either way.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use tts_batch::{BatchOrchestrator, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = BatchOrchestrator::new(Config::default())?;
///     orchestrator.run_batch(&[PathBuf::from("a.txt")]).await?;
///
///     // Run with automatic signal handling
///     let reports = run_with_shutdown(&orchestrator).await;
///     println!("{} downloads finished", reports.len());
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: &BatchOrchestrator) -> Vec<FetchReport> {
    tokio::select! {
        reports = orchestrator.wait_for_downloads() => reports,
        _ = wait_for_signal() => {
            orchestrator.shutdown().await;
            orchestrator.wait_for_downloads().await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            tracing::info!(signal = name, "Received termination signal");
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register both signal handlers, listening on one");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        return;
    }
    tracing::info!("Received Ctrl+C signal");
}
