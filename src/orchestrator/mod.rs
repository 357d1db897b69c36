//! Batch orchestration
//!
//! Every document gets its own pipeline task: derive the request ID, submit, then
//! fetch the artifact until it arrives. Pipelines share nothing mutable and never
//! wait on each other.
//!
//! [`BatchOrchestrator::run_batch`] resolves once every pipeline's *submission*
//! completed (or the first submission failed). Fetch loops keep running in the
//! background afterwards; [`BatchOrchestrator::wait_for_downloads`] and
//! [`BatchOrchestrator::shutdown`] deal with them.


use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::try_join_all;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::client::SynthesisClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::RetryingFetcher;
use crate::types::{
    ArtifactLocation, BatchReport, Document, Event, FetchReport, Stage, SubmissionOutcome,
};

/// How long shutdown waits for cancelled fetch loops to wind down
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs batches of documents through submit and fetch (cloneable, all fields shared)
#[derive(Clone)]
pub struct BatchOrchestrator {
    config: Arc<Config>,
    client: SynthesisClient,
    fetcher: RetryingFetcher,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// Cancels every fetch loop on shutdown
    cancel: CancellationToken,
    /// Tracks pipeline tasks, which outlive the batch call while fetching
    pipelines: TaskTracker,
    /// Reports of finished fetch loops, drained by `wait_for_downloads`
    reports: Arc<Mutex<Vec<FetchReport>>>,
    /// Set to false once shutdown begins
    accepting_new: Arc<AtomicBool>,
}

impl BatchOrchestrator {
    /// Create an orchestrator; the configuration is validated first
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        if config.retry.is_unbounded() {
            tracing::debug!(
                interval_secs = config.retry.interval.as_secs(),
                "Downloads retry until the artifact exists or shutdown"
            );
        }

        let (event_tx, _rx) = broadcast::channel(1000);
        let cancel = CancellationToken::new();
        let client = SynthesisClient::new(config.service.clone(), &config.submission)?;
        let fetcher =
            RetryingFetcher::new(config.retry.clone(), event_tx.clone(), cancel.clone())?;

        Ok(Self {
            config: Arc::new(config),
            client,
            fetcher,
            event_tx,
            cancel,
            pipelines: TaskTracker::new(),
            reports: Arc::new(Mutex::new(Vec::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submit every document and start fetching its artifact
    ///
    /// All documents are read before anything is submitted; a read failure aborts
    /// the batch. Resolves once every submission completed, with the outcomes in
    /// input order, or with the first submission error. A submission error does
    /// not stop other pipelines: their submissions and fetch loops carry on.
    pub async fn run_batch(&self, paths: &[PathBuf]) -> Result<BatchReport> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        let started_at = Utc::now();

        let documents = match read_documents(paths).await {
            Ok(documents) => documents,
            Err(e) => {
                self.report_failure(Stage::Read, &e);
                return Err(e);
            }
        };

        let pending: Vec<_> = documents
            .into_iter()
            .map(|document| self.spawn_pipeline(document))
            .collect();

        let submitted = try_join_all(pending.into_iter().map(|rx| async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::Pipeline(
                    "pipeline ended before its submission completed".to_string(),
                )),
            }
        }))
        .await;

        match submitted {
            Ok(submissions) => {
                tracing::info!(documents = submissions.len(), "All done.");
                let _ = self.event_tx.send(Event::BatchCompleted {
                    documents: submissions.len(),
                });
                Ok(BatchReport {
                    started_at,
                    submitted_at: Utc::now(),
                    submissions,
                })
            }
            Err(e) => {
                self.report_failure(Stage::Submit, &e);
                Err(e)
            }
        }
    }

    /// Wait until every fetch loop has ended and return their reports
    ///
    /// With the default unbounded retry policy this only returns once every
    /// artifact was downloaded or [`shutdown`](Self::shutdown) was called.
    pub async fn wait_for_downloads(&self) -> Vec<FetchReport> {
        self.pipelines.close();
        self.pipelines.wait().await;
        self.pipelines.reopen();
        std::mem::take(&mut *self.reports.lock().await)
    }

    /// Stop accepting batches and cancel every outstanding fetch loop
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        self.pipelines.close();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.pipelines.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                pending = self.pipelines.len(),
                "Timeout waiting for pipelines to stop, proceeding with shutdown"
            );
        }

        let _ = self.event_tx.send(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
    }

    /// Start one document's pipeline; the receiver yields its submission result
    fn spawn_pipeline(&self, document: Document) -> oneshot::Receiver<Result<SubmissionOutcome>> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let fetcher = self.fetcher.clone();
        let event_tx = self.event_tx.clone();
        let reports = self.reports.clone();
        let url_prefix = self.config.service.artifact_url_prefix.clone();

        self.pipelines.spawn(async move {
            let request = client.build_request(&document);
            let location = ArtifactLocation::new(&url_prefix, request.request_id, &document.path);

            let _ = event_tx.send(Event::Submitting {
                path: document.path.clone(),
                request_id: request.request_id,
            });
            let result = client.send(&request, &document).await;
            match &result {
                Ok(outcome) => {
                    let _ = event_tx.send(Event::Submitted {
                        path: outcome.path.clone(),
                        request_id: outcome.request_id,
                        status: outcome.status,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        path = %document.path.display(),
                        request_id = %request.request_id,
                        error = %e,
                        "Submission failed; fetching anyway"
                    );
                    let _ = event_tx.send(Event::SubmissionFailed {
                        path: document.path.clone(),
                        request_id: request.request_id,
                        error: e.to_string(),
                    });
                }
            }
            // the batch may already have failed and dropped the receiver
            let _ = tx.send(result);
            drop(document);

            let report = fetcher.fetch(&location).await;
            reports.lock().await.push(report);
        });

        rx
    }

    fn report_failure(&self, stage: Stage, error: &Error) {
        tracing::error!(?stage, code = error.error_code(), error = %error, "Batch failed");
        let _ = self.event_tx.send(Event::BatchFailed {
            stage,
            code: error.error_code().to_string(),
            error: error.to_string(),
        });
    }
}

/// Read every document concurrently; the first failure wins
async fn read_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let documents = try_join_all(paths.iter().map(|path| async move {
        tracing::info!(path = %path.display(), "Reading document");
        Document::read(path).await
    }))
    .await?;
    Ok(documents)
}
