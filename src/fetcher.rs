//! Retrying artifact fetcher
//!
//! Synthesized audio appears at its URL some unknown time after submission. Until
//! then the endpoint answers with an error (typically 404). The fetcher does not
//! tell "not ready yet" apart from "never coming": every failure is retried after
//! the configured interval, and the loop only ends on success, on cancellation,
//! or when a bounded retry policy runs out.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{DownloadError, Result};
use crate::retry::{RetryOutcome, run_with_policy};
use crate::types::{ArtifactLocation, Event, FetchReport, FetchStatus};

/// Downloads artifacts, retrying each one independently
#[derive(Clone, Debug)]
pub struct RetryingFetcher {
    http: reqwest::Client,
    retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl RetryingFetcher {
    /// Create a fetcher reporting to `event_tx` and stopping when `cancel` fires
    pub fn new(
        retry: RetryConfig,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        // a stalled GET must end so the attempt can be retried
        let http = reqwest::Client::builder()
            .timeout(retry.attempt_timeout)
            .build()?;
        Ok(Self {
            http,
            retry,
            event_tx,
            cancel,
        })
    }

    /// Fetch an artifact, retrying until it is saved
    ///
    /// Never fails: the report says whether the artifact was downloaded, the retry
    /// policy gave up, or the fetch was cancelled.
    pub async fn fetch(&self, location: &ArtifactLocation) -> FetchReport {
        let outcome = run_with_policy(
            &self.retry,
            &self.cancel,
            move |attempt| {
                tracing::info!(
                    url = %location.url,
                    path = %location.save_path.display(),
                    attempt,
                    "Downloading generated mp3"
                );
                self.emit(Event::DownloadStarted {
                    save_path: location.save_path.clone(),
                    url: location.url.clone(),
                    attempt,
                });
                self.download_once(location)
            },
            move |attempt, error, retry_in| {
                if let Some(retry_in) = retry_in {
                    tracing::warn!(
                        url = %location.url,
                        path = %location.save_path.display(),
                        attempt,
                        error = %error,
                        "Download failed, will retry in {} seconds",
                        retry_in.as_secs_f64()
                    );
                    self.emit(Event::DownloadFailed {
                        save_path: location.save_path.clone(),
                        url: location.url.clone(),
                        attempt,
                        error: error.to_string(),
                        retry_in,
                    });
                }
            },
        )
        .await;

        let (attempts, status) = match outcome {
            RetryOutcome::Completed { value, attempts } => {
                tracing::info!(
                    path = %location.save_path.display(),
                    bytes = value,
                    attempts,
                    "Done downloading generated mp3"
                );
                self.emit(Event::Downloaded {
                    save_path: location.save_path.clone(),
                    url: location.url.clone(),
                    attempts,
                    bytes: value,
                });
                (attempts, FetchStatus::Downloaded { bytes: value })
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                let last_error = last_error.to_string();
                tracing::error!(
                    url = %location.url,
                    attempts,
                    error = %last_error,
                    "Giving up on download"
                );
                self.emit(Event::DownloadAbandoned {
                    save_path: location.save_path.clone(),
                    url: location.url.clone(),
                    attempts,
                    reason: last_error.clone(),
                });
                (attempts, FetchStatus::Exhausted { last_error })
            }
            RetryOutcome::Cancelled { attempts } => {
                tracing::info!(url = %location.url, attempts, "Download cancelled");
                self.emit(Event::DownloadAbandoned {
                    save_path: location.save_path.clone(),
                    url: location.url.clone(),
                    attempts,
                    reason: "cancelled".to_string(),
                });
                (attempts, FetchStatus::Cancelled)
            }
        };

        FetchReport {
            location: location.clone(),
            attempts,
            status,
        }
    }

    /// One GET of the artifact; replaces the save path with the body on success
    async fn download_once(&self, location: &ArtifactLocation) -> Result<u64> {
        let response = self.http.get(&location.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: location.url.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        let bytes = response.bytes().await?;
        let partial = partial_path(&location.save_path);
        let written = async {
            tokio::fs::write(&partial, &bytes).await?;
            tokio::fs::rename(&partial, &location.save_path).await
        };
        if let Err(source) = written.await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(DownloadError::Write {
                path: location.save_path.clone(),
                source,
            }
            .into());
        }
        Ok(bytes.len() as u64)
    }

    fn emit(&self, event: Event) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// `<save path>.part`, renamed over the save path once fully written
fn partial_path(save_path: &Path) -> PathBuf {
    let mut partial: OsString = save_path.as_os_str().to_owned();
    partial.push(".part");
    PathBuf::from(partial)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestId;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MP3: &[u8] = b"ID3\x03\x00\x00\x00fake-audio-frames";

    fn fetcher(
        retry: RetryConfig,
    ) -> (RetryingFetcher, broadcast::Receiver<Event>, CancellationToken) {
        let (event_tx, event_rx) = broadcast::channel(1000);
        let cancel = CancellationToken::new();
        let fetcher = RetryingFetcher::new(retry, event_tx, cancel.clone()).unwrap();
        (fetcher, event_rx, cancel)
    }

    fn location(server: &MockServer, dir: &Path, id: u32) -> ArtifactLocation {
        ArtifactLocation::new(
            &format!("{}/tts/wav_output/fest_out", server.uri()),
            RequestId::new(id),
            &dir.join("a.txt"),
        )
    }

    #[tokio::test]
    async fn first_attempt_success_saves_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tts/wav_output/fest_out99162322.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3))
            .expect(1)
            .mount(&server)
            .await;
        let temp = tempfile::tempdir().unwrap();
        let location = location(&server, temp.path(), 99162322);

        let (fetcher, _rx, _cancel) = fetcher(RetryConfig::every(Duration::from_millis(20)));
        let report = fetcher.fetch(&location).await;

        assert_eq!(report.attempts, 1);
        assert_eq!(
            report.status,
            FetchStatus::Downloaded {
                bytes: MP3.len() as u64
            }
        );
        let saved = std::fs::read(temp.path().join("a.txt.mp3")).unwrap();
        assert_eq!(saved, MP3);
    }

    #[tokio::test]
    async fn k_failures_then_success_makes_k_plus_one_attempts() {
        let server = MockServer::start().await;
        let k = 3;
        Mock::given(method("GET"))
            .and(path("/tts/wav_output/fest_out7.mp3"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(k)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tts/wav_output/fest_out7.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3))
            .mount(&server)
            .await;
        let temp = tempfile::tempdir().unwrap();
        let location = location(&server, temp.path(), 7);
        let interval = Duration::from_millis(50);

        let (fetcher, mut rx, _cancel) = fetcher(RetryConfig::every(interval));
        let started = Instant::now();
        let report = fetcher.fetch(&location).await;
        let elapsed = started.elapsed();

        assert!(report.is_downloaded());
        assert_eq!(report.attempts, k as u32 + 1);
        assert!(elapsed >= interval * k as u32, "retries came too fast: {elapsed:?}");

        // nothing further after success
        tokio::time::sleep(interval * 4).await;
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), k as usize + 1);

        let mut failed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::DownloadFailed {
                attempt, retry_in, ..
            } = event
            {
                assert_eq!(retry_in, interval);
                failed.push(attempt);
            }
        }
        assert_eq!(failed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn existing_file_is_overwritten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3))
            .mount(&server)
            .await;
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt.mp3"), b"stale and much longer content").unwrap();
        let location = location(&server, temp.path(), 1);

        let (fetcher, _rx, _cancel) = fetcher(RetryConfig::every(Duration::from_millis(20)));
        assert!(fetcher.fetch(&location).await.is_downloaded());

        assert_eq!(std::fs::read(temp.path().join("a.txt.mp3")).unwrap(), MP3);
        assert!(!temp.path().join("a.txt.mp3.part").exists());
    }

    #[tokio::test]
    async fn stalled_attempt_times_out_and_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tts/wav_output/fest_out11.mp3"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3600)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tts/wav_output/fest_out11.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3))
            .mount(&server)
            .await;
        let temp = tempfile::tempdir().unwrap();
        let location = location(&server, temp.path(), 11);

        let retry = RetryConfig {
            attempt_timeout: Duration::from_millis(200),
            ..RetryConfig::every(Duration::from_millis(20))
        };
        let (fetcher, _rx, _cancel) = fetcher(retry);
        let report = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch(&location))
            .await
            .expect("stalled download was never retried");

        assert!(report.is_downloaded());
        assert_eq!(report.attempts, 2);
        assert_eq!(std::fs::read(temp.path().join("a.txt.mp3")).unwrap(), MP3);
    }

    #[test]
    fn partial_path_sits_next_to_save_path() {
        assert_eq!(
            partial_path(Path::new("/data/story.txt.mp3")),
            PathBuf::from("/data/story.txt.mp3.part")
        );
    }

    #[tokio::test]
    async fn missing_artifact_is_retried_until_cancelled() {
        let server = MockServer::start().await;
        // nothing mounted: every GET is a 404
        let temp = tempfile::tempdir().unwrap();
        let location = location(&server, temp.path(), 5);

        let (fetcher, _rx, cancel) = fetcher(RetryConfig::every(Duration::from_millis(20)));
        let handle = tokio::spawn(async move { fetcher.fetch(&location).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report.status, FetchStatus::Cancelled);
        assert!(report.attempts >= 3, "only {} attempts", report.attempts);
        assert!(!temp.path().join("a.txt.mp3").exists());
    }

    #[tokio::test]
    async fn bounded_policy_reports_last_error() {
        let server = MockServer::start().await;
        let temp = tempfile::tempdir().unwrap();
        let location = location(&server, temp.path(), 9);

        let retry = RetryConfig {
            interval: Duration::from_millis(10),
            max_attempts: Some(2),
            max_duration: None,
            ..RetryConfig::default()
        };
        let (fetcher, mut rx, _cancel) = fetcher(retry);
        let report = fetcher.fetch(&location).await;

        assert_eq!(report.attempts, 2);
        match report.status {
            FetchStatus::Exhausted { last_error } => assert!(last_error.contains("404")),
            other => panic!("expected Exhausted, got {other:?}"),
        }

        let mut abandoned = false;
        while let Ok(event) = rx.try_recv() {
            if let Event::DownloadAbandoned { attempts, .. } = event {
                assert_eq!(attempts, 2);
                abandoned = true;
            }
        }
        assert!(abandoned);
    }

    #[tokio::test]
    async fn unwritable_save_path_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(MP3))
            .mount(&server)
            .await;
        let temp = tempfile::tempdir().unwrap();
        let location = ArtifactLocation::new(
            &format!("{}/out", server.uri()),
            RequestId::new(3),
            &temp.path().join("missing-dir").join("a.txt"),
        );

        let retry = RetryConfig {
            interval: Duration::from_millis(10),
            max_attempts: Some(2),
            max_duration: None,
            ..RetryConfig::default()
        };
        let (fetcher, _rx, _cancel) = fetcher(retry);
        let report = fetcher.fetch(&location).await;

        match report.status {
            FetchStatus::Exhausted { last_error } => {
                assert!(last_error.contains("failed to write"), "{last_error}")
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
