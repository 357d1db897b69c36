//! Synthesis service client
//!
//! Submits document text as a form POST. A submission is complete once the HTTP
//! exchange finishes (status line and body received). The service acknowledges
//! receipt rather than synthesis, so the status is recorded but not judged unless
//! `submission.validate_status` is enabled.

use reqwest::header::CONTENT_TYPE;

use crate::config::{ServiceConfig, SubmissionConfig};
use crate::error::{Error, Result};
use crate::request_id::generate_id;
use crate::types::{Document, SubmissionOutcome, SubmissionRequest};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Client for the remote synthesis endpoint (cheap to clone)
#[derive(Clone, Debug)]
pub struct SynthesisClient {
    http: reqwest::Client,
    service: ServiceConfig,
    validate_status: bool,
}

impl SynthesisClient {
    /// Create a client for the given service
    pub fn new(service: ServiceConfig, submission: &SubmissionConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = submission.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            service,
            validate_status: submission.validate_status,
        })
    }

    /// Build the form submission for a document
    pub fn build_request(&self, document: &Document) -> SubmissionRequest {
        let request_id = generate_id(&document.text);
        let body = format!(
            "Languages={}&speed={}&voice={}&ex=execute&op={}&count={}",
            urlencoding::encode(&self.service.language),
            urlencoding::encode(&self.service.speed),
            urlencoding::encode(&self.service.voice),
            urlencoding::encode(&document.text),
            request_id,
        );
        SubmissionRequest {
            url: self.service.submit_url.clone(),
            body,
            request_id,
        }
    }

    /// Build and send the submission for a document
    pub async fn submit(&self, document: &Document) -> Result<SubmissionOutcome> {
        let request = self.build_request(document);
        self.send(&request, document).await
    }

    /// Send a prepared submission
    ///
    /// Transport failures are returned as [`Error::Network`]. Any HTTP status counts
    /// as completion unless status validation is enabled.
    pub async fn send(
        &self,
        request: &SubmissionRequest,
        document: &Document,
    ) -> Result<SubmissionOutcome> {
        tracing::info!(
            path = %document.path.display(),
            request_id = %request.request_id,
            "Submitting document"
        );

        let response = self
            .http
            .post(&request.url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(request.body.clone())
            .send()
            .await?;
        let status = response.status();
        // drain the body so completion means the whole exchange finished
        response.bytes().await?;

        if !status.is_success() {
            if self.validate_status {
                return Err(Error::Submission {
                    request_id: request.request_id,
                    status: status.as_u16(),
                });
            }
            tracing::warn!(
                path = %document.path.display(),
                request_id = %request.request_id,
                status = status.as_u16(),
                "Synthesis service answered with a non-success status; downloading anyway"
            );
        } else {
            tracing::debug!(
                request_id = %request.request_id,
                status = status.as_u16(),
                "Submission acknowledged"
            );
        }

        Ok(SubmissionOutcome {
            path: document.path.clone(),
            request_id: request.request_id,
            status: status.as_u16(),
        })
    }
}
