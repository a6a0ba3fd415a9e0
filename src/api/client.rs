// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::backend::JobBackend;
use crate::error::{ClientError, Result};
use crate::execution::ExecutionStream;
use crate::jobs::types::CatalogResponse;
use crate::jobs::{
    AuthorizedJob, BackendHealth, JobCatalog, JobRequest, JobStatusReport, PaymentChallenge,
    PaymentConfirmation, VerificationResult,
};
use crate::payment::PaymentAuthorization;

pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// HTTP client for the job backend
#[derive(Debug, Clone)]
pub struct JobApiClient {
    http: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl JobApiClient {
    pub fn new(api_url: &str) -> Result<Self> {
        Self::with_timeout(api_url, Duration::from_secs(30))
    }

    /// `request_timeout` bounds JSON calls only; execution streams run until their terminal event
    pub fn with_timeout(api_url: &str, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(api_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!("'{}' is not a base URL", api_url)));
        }

        Ok(Self {
            http,
            base_url,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("'{}' is not a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `GET /`
    pub async fn health(&self) -> Result<BackendHealth> {
        let url = self.endpoint(&[])?;
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// `GET /api/jobs/status/:job_id`
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusReport> {
        let url = self.endpoint(&["api", "jobs", "status", job_id])?;
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl JobBackend for JobApiClient {
    async fn list_jobs(&self) -> Result<JobCatalog> {
        let url = self.endpoint(&["api", "jobs"])?;
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        let catalog: CatalogResponse = response.json().await?;
        Ok(catalog.into())
    }

    async fn request_job(&self, request: &JobRequest) -> Result<PaymentChallenge> {
        let url = self.endpoint(&["api", "jobs", "request"])?;
        debug!("POST {} job_type={}", url, request.job_type);

        let response = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;

        match response.status() {
            StatusCode::PAYMENT_REQUIRED => {
                let challenge: PaymentChallenge = decode_body(response).await?;
                info!(
                    "Payment required for job {}: {} tokens, expires {}",
                    challenge.job_id, challenge.payment.amount, challenge.expires_at
                );
                Ok(challenge)
            }
            status => Err(unexpected_status("request job", status, response).await),
        }
    }

    async fn verify_payment(&self, confirmation: &PaymentConfirmation) -> Result<VerificationResult> {
        let url = self.endpoint(&["api", "jobs", "verify-payment"])?;
        debug!(
            "POST {} job_id={} tx_hash={}",
            url, confirmation.job_id, confirmation.tx_hash
        );

        let response = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(confirmation)
            .send()
            .await?;

        match response.status() {
            // payment_not_found arrives with 402
            StatusCode::OK | StatusCode::PAYMENT_REQUIRED => decode_body(response).await,
            StatusCode::REQUEST_TIMEOUT => Err(ClientError::ChallengeExpired {
                job_id: confirmation.job_id.clone(),
            }),
            status if status.is_server_error() => Err(ClientError::Network(format!(
                "verify payment: server returned {}",
                status
            ))),
            status => Err(unexpected_status("verify payment", status, response).await),
        }
    }

    async fn execute(&self, job_id: &str) -> Result<ExecutionStream> {
        let url = self.endpoint(&["api", "jobs", "execute", job_id])?;
        debug!("GET {} (event stream)", url);

        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            return Err(unexpected_status("execute job", status, response).await);
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::Stream(e.to_string())))
            .boxed();
        Ok(ExecutionStream::new(job_id, body))
    }

    async fn request_authorized_job(
        &self,
        request: &JobRequest,
        authorization: &PaymentAuthorization,
    ) -> Result<AuthorizedJob> {
        let url = self.endpoint(&["api", "jobs", "request"])?;
        let header_value = serde_json::to_string(authorization)?;
        debug!("POST {} job_type={} (signed)", url, request.job_type);

        let response = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .header(X_PAYMENT_HEADER, header_value)
            .json(request)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let authorized: AuthorizedJob = decode_body(response).await?;
                if authorized.status != "authorized" {
                    return Err(ClientError::ProtocolViolation(format!(
                        "expected status 'authorized', got '{}'",
                        authorized.status
                    )));
                }
                info!("Payment authorized for job {}", authorized.job_id);
                Ok(authorized)
            }
            status => Err(unexpected_status("request job (signed)", status, response).await),
        }
    }
}

async fn decode_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn unexpected_status(operation: &str, status: StatusCode, response: Response) -> ClientError {
    let body = response.text().await.unwrap_or_default();
    warn!("{}: unexpected status {} ({})", operation, status, body);
    ClientError::ProtocolViolation(format!("{}: unexpected status {}: {}", operation, status, body))
}
