// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;

use crate::error::{ClientError, Result};
use crate::execution::ExecutionStream;
use crate::jobs::{
    AuthorizedJob, JobCatalog, JobRequest, PaymentChallenge, PaymentConfirmation,
    VerificationResult,
};
use crate::payment::PaymentAuthorization;

/// The job backend as seen by the handshake
///
/// `JobApiClient` implements this over HTTP; tests substitute scripted backends.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// `GET /api/jobs`
    async fn list_jobs(&self) -> Result<JobCatalog>;

    /// `POST /api/jobs/request`, expecting a 402 challenge
    async fn request_job(&self, request: &JobRequest) -> Result<PaymentChallenge>;

    /// `POST /api/jobs/verify-payment`; must be safe to repeat with the same hash
    async fn verify_payment(&self, confirmation: &PaymentConfirmation) -> Result<VerificationResult>;

    /// `GET /api/jobs/execute/:job_id`
    async fn execute(&self, job_id: &str) -> Result<ExecutionStream>;

    /// `POST /api/jobs/request` carrying a signed `X-PAYMENT` header
    async fn request_authorized_job(
        &self,
        request: &JobRequest,
        _authorization: &PaymentAuthorization,
    ) -> Result<AuthorizedJob> {
        Err(ClientError::ProtocolViolation(format!(
            "backend does not accept signed payment authorizations for '{}'",
            request.job_type
        )))
    }
}
