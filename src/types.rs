//! Core types for tts-batch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identifier sent with a submission and embedded in the artifact URL
///
/// Derived from document content by [`crate::request_id::generate_id`]. Not unique:
/// two documents may hash to the same value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u32);

impl RequestId {
    /// Create a new RequestId
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for RequestId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A text document read from disk, owned by exactly one pipeline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// Path the document was read from
    pub path: PathBuf,
    /// UTF-8 content
    pub text: String,
}

impl Document {
    /// Create a document from an already-read path and text
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    /// Read a document from disk
    ///
    /// Invalid UTF-8 sequences are replaced with U+FFFD rather than rejected, so
    /// the request ID is computed over the replaced text.
    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("Failed to read document '{}': {}", path.display(), e),
            )
        })?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "Document is not valid UTF-8, replacing invalid bytes"
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        Ok(Self::new(path, text))
    }
}

/// Form submission sent once per document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionRequest {
    /// Synthesis endpoint
    pub url: String,
    /// `application/x-www-form-urlencoded` body
    pub body: String,
    /// ID embedded in the body as `count`
    pub request_id: RequestId,
}

/// Where a document's synthesized audio is fetched from and saved to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    /// `<prefix><request_id>.mp3`
    pub url: String,
    /// `<document path>.mp3`
    pub save_path: PathBuf,
}

impl ArtifactLocation {
    /// Derive the location for a document
    pub fn new(url_prefix: &str, request_id: RequestId, document_path: &Path) -> Self {
        let mut save_path: OsString = document_path.as_os_str().to_owned();
        save_path.push(".mp3");
        Self {
            url: format!("{url_prefix}{request_id}.mp3"),
            save_path: PathBuf::from(save_path),
        }
    }
}

/// Result of a submission call that reached the server and got a full response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// Document that was submitted
    pub path: PathBuf,
    /// ID sent with the submission
    pub request_id: RequestId,
    /// HTTP status the service answered with (recorded, not judged)
    pub status: u16,
}

/// Final state of a retrying fetch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FetchStatus {
    /// Artifact saved
    Downloaded {
        /// Number of bytes written
        bytes: u64,
    },
    /// Retry bound reached (only possible with a bounded retry policy)
    Exhausted {
        /// Last attempt's error
        last_error: String,
    },
    /// Stopped by shutdown
    Cancelled,
}

/// Report returned by the retrying fetcher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    /// Location that was fetched
    pub location: ArtifactLocation,
    /// Total attempts made
    pub attempts: u32,
    /// How the loop ended
    pub status: FetchStatus,
}

impl FetchReport {
    /// Whether the artifact was saved
    pub fn is_downloaded(&self) -> bool {
        matches!(self.status, FetchStatus::Downloaded { .. })
    }
}

/// Aggregate result of a batch's submission stage
///
/// Produced once every document's submission completed. Downloads may still be
/// retrying in the background.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchReport {
    /// When the batch started
    pub started_at: DateTime<Utc>,
    /// When the last submission completed
    pub submitted_at: DateTime<Utc>,
    /// One outcome per document, in input order
    pub submissions: Vec<SubmissionOutcome>,
}

/// Batch stage a failure came from
///
/// Fetch failures never fail a batch; they are retried or end in `DownloadAbandoned`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Reading the document from disk
    Read,
    /// Submitting the text for synthesis
    Submit,
}

/// Event emitted during a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Document submitted for synthesis
    Submitting {
        /// Document path
        path: PathBuf,
        /// Derived request ID
        request_id: RequestId,
    },

    /// Submission reached its terminal ready state
    Submitted {
        /// Document path
        path: PathBuf,
        /// Derived request ID
        request_id: RequestId,
        /// HTTP status the service answered with
        status: u16,
    },

    /// Submission failed before a response was received
    SubmissionFailed {
        /// Document path
        path: PathBuf,
        /// Derived request ID
        request_id: RequestId,
        /// Error message
        error: String,
    },

    /// Download attempt started
    DownloadStarted {
        /// Local save path
        save_path: PathBuf,
        /// Artifact URL
        url: String,
        /// Attempt number, starting at 1
        attempt: u32,
    },

    /// Download attempt failed; another attempt follows after `retry_in`
    DownloadFailed {
        /// Local save path
        save_path: PathBuf,
        /// Artifact URL
        url: String,
        /// Attempt number that failed
        attempt: u32,
        /// Error message
        error: String,
        /// Delay before the next attempt
        #[serde(with = "duration_millis")]
        retry_in: Duration,
    },

    /// Artifact saved
    Downloaded {
        /// Local save path
        save_path: PathBuf,
        /// Artifact URL
        url: String,
        /// Attempts it took
        attempts: u32,
        /// Bytes written
        bytes: u64,
    },

    /// Fetch loop ended without the artifact (retry bound reached or shutdown)
    DownloadAbandoned {
        /// Local save path
        save_path: PathBuf,
        /// Artifact URL
        url: String,
        /// Attempts made
        attempts: u32,
        /// Why the loop ended
        reason: String,
    },

    /// Every submission in the batch completed
    BatchCompleted {
        /// Number of documents submitted
        documents: usize,
    },

    /// Batch aborted or a submission failed
    BatchFailed {
        /// Stage the failure came from
        stage: Stage,
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },

    /// Orchestrator shut down
    Shutdown,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
