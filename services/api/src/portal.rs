use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use apply_pilot::config::PortalConfig;
use apply_pilot::error::AppError;
use apply_pilot::pipeline::{
    ApplicationPackage, JobId, SubmissionError, SubmissionReceipt, SubmissionSink,
};

/// HTTP client for the external submission portal's sandbox API.
pub(crate) struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct PortalSubmission<'a> {
    applicant_name: &'a str,
    applicant_email: &'a str,
    resume_text: String,
    cover_letter: &'a str,
}

#[derive(Debug, Deserialize)]
struct PortalReceipt {
    receipt_id: String,
}

impl PortalClient {
    pub(crate) fn new(config: &PortalConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AppError::Portal(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl SubmissionSink for PortalClient {
    async fn submit(
        &self,
        package: &ApplicationPackage,
        job_id: &JobId,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let url = format!("{}/sandbox/jobs/{}/apply", self.base_url, job_id);
        let payload = PortalSubmission {
            applicant_name: &package.applicant_name,
            applicant_email: &package.applicant_email,
            resume_text: package.resume_text(),
            cover_letter: &package.cover_letter,
        };

        let mut request = self.http.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                SubmissionError::Timeout
            } else {
                SubmissionError::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let receipt: PortalReceipt = response
            .json()
            .await
            .map_err(|err| SubmissionError::Transport(format!("malformed portal response: {err}")))?;
        debug!(job = %job_id, receipt = %receipt.receipt_id, "portal accepted submission");

        Ok(SubmissionReceipt {
            receipt_id: receipt.receipt_id,
        })
    }
}
