// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Utc};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::JobBackend;
use crate::error::{ClientError, Result};
use crate::execution::{self, ExecutionOutcome};
use crate::jobs::{self, JobParams};
use crate::payment::AuthorizationTerms;

const BANNER_LINES: [&str; 2] = ["Job started", "Job completed"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingConfig {
    pub job_type: String,
    pub host: String,
    pub count: u32,
    pub interval: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            job_type: "ping".to_string(),
            host: "google.com".to_string(),
            count: 4,
            interval: Duration::from_secs(180),
        }
    }
}

impl PingConfig {
    pub fn params(&self) -> JobParams {
        let mut params = JobParams::new();
        params.insert("host".to_string(), self.host.clone().into());
        params.insert("count".to_string(), self.count.into());
        params
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingReport {
    pub job_id: String,
    pub host: String,
    pub alive: bool,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

/// Pays for `ping` jobs with signed authorizations and reports host liveness
pub struct PingAgent<B: ?Sized> {
    backend: Arc<B>,
    signer: LocalWallet,
    chain_id: u64,
    config: PingConfig,
}

impl<B: JobBackend + ?Sized> PingAgent<B> {
    pub fn new(backend: Arc<B>, signer: LocalWallet, chain_id: u64, config: PingConfig) -> Self {
        Self {
            backend,
            signer,
            chain_id,
            config,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn config(&self) -> &PingConfig {
        &self.config
    }

    /// One paid ping: authorize, execute, classify
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<PingReport> {
        let catalog = jobs::load_jobs(self.backend.as_ref()).await?;
        let job = catalog
            .get(&self.config.job_type)
            .ok_or_else(|| ClientError::UnknownJob(self.config.job_type.clone()))?;
        let amount = job.price_wei()?;

        let job_id = Uuid::new_v4().to_string();
        info!("💰 Signing payment of {} for job {}", job.price, job_id);
        let authorization = AuthorizationTerms::new(
            catalog.recipient_address,
            catalog.token_address,
            amount,
            job_id.clone(),
            Utc::now(),
        )
        .sign(&self.signer, self.chain_id)
        .await?;

        let mut request = catalog.select(&self.config.job_type, self.config.params(), self.address())?;
        request.job_id = Some(job_id);

        let authorized = self
            .backend
            .request_authorized_job(&request, &authorization)
            .await?;
        info!("✅ Payment authorized, job {}", authorized.job_id);

        let stream = self.backend.execute(&authorized.job_id).await?;
        let transcript = execution::drain(stream, cancel, |event| debug!("   {}", event.payload())).await?;

        match &transcript.outcome {
            Some(ExecutionOutcome::Completed(_)) => {}
            Some(ExecutionOutcome::Failed(message)) => return Err(ClientError::JobFailed(message.clone())),
            None => {
                return Err(ClientError::Stream(
                    "stream closed before a terminal event".to_string(),
                ))
            }
        }

        let output = collect_output(transcript.lines());
        let alive = parse_ping_result(&output);
        if alive {
            info!("✅ {} is ALIVE", self.config.host);
        } else {
            warn!("❌ {} is DEAD", self.config.host);
        }

        Ok(PingReport {
            job_id: authorized.job_id,
            host: self.config.host.clone(),
            alive,
            output,
            timestamp: Utc::now(),
        })
    }

    /// Pings every interval until cancelled; returns the number of iterations run
    ///
    /// Failed iterations are logged and the loop continues.
    pub async fn run_periodic<F>(&self, cancel: CancellationToken, mut on_report: F) -> u64
    where
        F: FnMut(u64, &Result<PingReport>),
    {
        info!(
            "🤖 Agent {:?} pinging {} every {}s",
            self.address(),
            self.config.host,
            self.config.interval.as_secs()
        );

        let mut iteration = 0;
        loop {
            iteration += 1;
            info!("🔄 Iteration #{}", iteration);

            let result = self.run_once(&cancel).await;
            if let Err(e) = &result {
                if *e == ClientError::Cancelled {
                    break;
                }
                warn!("Ping iteration {} failed: {}", iteration, e);
            }
            on_report(iteration, &result);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("🛑 Agent stopped after {} iterations", iteration);
        iteration
    }
}

/// Output lines with the start/completion banners removed, newline-joined
pub fn collect_output(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| line.trim_end_matches(['\r', '\n']))
        .filter(|line| !line.is_empty() && !BANNER_LINES.contains(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether ping output shows the host answering
pub fn parse_ping_result(output: &str) -> bool {
    if output.is_empty() {
        return false;
    }
    let output = output.to_lowercase();

    if output.contains("bytes from") || output.contains("reply from") {
        return true;
    }
    if output.contains("100% packet loss") || output.contains("unreachable") {
        return false;
    }

    received_count(&output).map_or(false, |received| received > 0)
}

/// `M` from "N packets transmitted, M received"
fn received_count(output: &str) -> Option<u64> {
    let (before, _) = output.split_once("received")?;
    if !before.contains("transmitted") {
        return None;
    }
    before
        .rsplit(',')
        .next()?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}
