//! Configuration types for tts-batch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration, passed explicitly to [`crate::BatchOrchestrator::new`]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote synthesis service endpoints and fixed form parameters
    #[serde(default)]
    pub service: ServiceConfig,

    /// Artifact download retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Submission call behavior
    #[serde(default)]
    pub submission: SubmissionConfig,
}

impl Config {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipelines cannot run with
    pub fn validate(&self) -> Result<()> {
        let service = &self.service;
        for (key, value) in [
            ("service.language", &service.language),
            ("service.speed", &service.speed),
            ("service.voice", &service.voice),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{key} must not be empty"), key));
            }
        }

        for (key, value) in [
            ("service.submit_url", &service.submit_url),
            ("service.artifact_url_prefix", &service.artifact_url_prefix),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| Error::config(format!("{key} is not a valid URL: {e}"), key))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::config(
                    format!("{key} must use http or https, got {}", parsed.scheme()),
                    key,
                ));
            }
        }

        if self.retry.interval.is_zero() {
            return Err(Error::config(
                "retry.interval must be greater than zero",
                "retry.interval",
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(Error::config(
                "retry.max_attempts must be at least 1 when set",
                "retry.max_attempts",
            ));
        }
        if self.retry.attempt_timeout.is_zero() {
            return Err(Error::config(
                "retry.attempt_timeout must be greater than zero",
                "retry.attempt_timeout",
            ));
        }

        Ok(())
    }
}

/// Synthesis service configuration
///
/// Applied identically to every submission in a batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Form POST endpoint
    #[serde(default = "default_submit_url")]
    pub submit_url: String,

    /// Artifact URLs are `<artifact_url_prefix><request id>.mp3`
    #[serde(default = "default_artifact_url_prefix")]
    pub artifact_url_prefix: String,

    /// Synthesis language (default: "telugu")
    #[serde(default = "default_language")]
    pub language: String,

    /// Speech speed (default: "normal")
    #[serde(default = "default_speed")]
    pub speed: String,

    /// Voice (default: "voice1")
    #[serde(default = "default_voice")]
    pub voice: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            submit_url: default_submit_url(),
            artifact_url_prefix: default_artifact_url_prefix(),
            language: default_language(),
            speed: default_speed(),
            voice: default_voice(),
        }
    }
}

/// Retry policy for artifact downloads
///
/// Attempts are spaced by a fixed interval with no backoff or jitter. The default
/// policy is unbounded: a missing artifact is retried until it appears or the
/// process shuts down.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay between consecutive attempts, in seconds (default: 60)
    #[serde(default = "default_retry_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Maximum attempts including the first (None = unbounded)
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Give up once this much time has passed since the first attempt (None = unbounded)
    #[serde(default, with = "optional_duration_serde")]
    pub max_duration: Option<Duration>,

    /// Per-attempt request timeout, in seconds (default: 60)
    ///
    /// A download that stalls past this counts as a failed attempt and is retried.
    #[serde(default = "default_attempt_timeout", with = "duration_serde")]
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval: default_retry_interval(),
            max_attempts: None,
            max_duration: None,
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

impl RetryConfig {
    /// Fixed-interval, unbounded policy
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Whether the policy ever gives up on its own
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.max_duration.is_none()
    }
}

/// Submission call behavior
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Treat a non-2xx submission response as a failure (default: false)
    ///
    /// The service acknowledges receipt, not synthesis, so by default any response
    /// counts as a completed submission and the download loop is the real
    /// completion signal. Enabling this changes batch outcomes.
    #[serde(default)]
    pub validate_status: bool,

    /// Request timeout in seconds (None = no timeout)
    #[serde(default, with = "optional_duration_serde")]
    pub timeout: Option<Duration>,
}

fn default_submit_url() -> String {
    "http://tdil-dc.in/tts/festival_cs_plugin.php".to_string()
}

fn default_artifact_url_prefix() -> String {
    "http://tdil-dc.in/tts/wav_output/fest_out".to_string()
}

fn default_language() -> String {
    "telugu".to_string()
}

fn default_speed() -> String {
    "normal".to_string()
}

fn default_voice() -> String {
    "voice1".to_string()
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Durations in config files are whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Like `duration_serde`, with `null` or a missing field meaning "no bound"
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
