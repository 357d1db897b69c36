//! Error types for tts-batch
//!
//! The taxonomy follows the failure classes of a batch run:
//! - Reading a document is fatal to the whole batch ([`Error::Io`])
//! - A submission transport failure becomes the single aggregate batch error
//!   ([`Error::Network`], or [`Error::Submission`] when status validation is enabled)
//! - Download failures never escape the retrying fetcher; they are described by
//!   [`DownloadError`] and reported through events and logs only

use std::path::PathBuf;
use thiserror::Error;

use crate::types::RequestId;

/// Result type alias for tts-batch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tts-batch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.interval")
        key: Option<String>,
    },

    /// I/O error (reading a document, loading a config file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The synthesis service answered with a non-success status
    ///
    /// Only produced when `submission.validate_status` is enabled.
    #[error("submission {request_id} rejected with HTTP status {status}")]
    Submission {
        /// Request ID of the rejected submission
        request_id: RequestId,
        /// HTTP status returned by the service
        status: u16,
    },

    /// A single artifact download attempt failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// A pipeline task ended without reporting its submission outcome
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Shutdown in progress - not accepting new batches
    #[error("shutdown in progress: not accepting new batches")]
    ShuttingDown,
}

/// Failure of one artifact download attempt
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Artifact endpoint answered with a non-success status (usually 404 until synthesis finishes)
    #[error("{url} returned HTTP status {status}")]
    HttpStatus {
        /// Artifact URL that was requested
        url: String,
        /// HTTP status returned
        status: u16,
    },

    /// Downloaded bytes could not be written to the save path
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Local save path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Machine-readable error code, used in events and structured logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Submission { .. } => "submission_rejected",
            Error::Download(DownloadError::HttpStatus { .. }) => "artifact_unavailable",
            Error::Download(DownloadError::Write { .. }) => "artifact_write_failed",
            Error::Pipeline(_) => "pipeline_error",
            Error::ShuttingDown => "shutting_down",
        }
    }

    pub(crate) fn config(message: impl Into<String>, key: &str) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_distinct_per_failure_class() {
        let cases = vec![
            (Error::config("bad", "service.language"), "config_error"),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
            ),
            (
                Error::Submission {
                    request_id: RequestId::new(7),
                    status: 500,
                },
                "submission_rejected",
            ),
            (
                Error::Download(DownloadError::HttpStatus {
                    url: "http://x/1.mp3".into(),
                    status: 404,
                }),
                "artifact_unavailable",
            ),
            (
                Error::Download(DownloadError::Write {
                    path: PathBuf::from("/nope/a.txt.mp3"),
                    source: std::io::Error::other("denied"),
                }),
                "artifact_write_failed",
            ),
            (Error::Pipeline("task panicked".into()), "pipeline_error"),
            (Error::ShuttingDown, "shutting_down"),
        ];

        for (error, code) in cases {
            assert_eq!(error.error_code(), code, "wrong code for {error}");
        }
    }

    #[test]
    fn config_helper_records_the_offending_key() {
        match Error::config("must not be empty", "service.voice") {
            Error::Config { message, key } => {
                assert_eq!(message, "must not be empty");
                assert_eq!(key.as_deref(), Some("service.voice"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn submission_error_message_names_request_and_status() {
        let err = Error::Submission {
            request_id: RequestId::new(99162322),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "submission 99162322 rejected with HTTP status 503"
        );
    }
}
