// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use ethers::types::Address;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::types::{CatalogResponse, JobDescriptor, JobParams, JobRequest};
use crate::api::JobBackend;
use crate::error::{ClientError, Result};

/// Job definitions and payment addresses fetched once per session
#[derive(Debug, Clone, PartialEq)]
pub struct JobCatalog {
    jobs: BTreeMap<String, JobDescriptor>,
    pub token_address: Address,
    pub recipient_address: Address,
}

impl JobCatalog {
    pub fn new(
        jobs: impl IntoIterator<Item = JobDescriptor>,
        token_address: Address,
        recipient_address: Address,
    ) -> Self {
        Self {
            jobs: jobs.into_iter().map(|job| (job.key.clone(), job)).collect(),
            token_address,
            recipient_address,
        }
    }

    pub fn get(&self, key: &str) -> Option<&JobDescriptor> {
        self.jobs.get(key)
    }

    /// Descriptors in key order
    pub fn iter(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Builds the request for a listed job; the `job_type` is the catalog key verbatim
    pub fn select(&self, key: &str, params: JobParams, wallet_address: Address) -> Result<JobRequest> {
        let job = self
            .get(key)
            .ok_or_else(|| ClientError::UnknownJob(key.to_string()))?;

        Ok(JobRequest {
            job_type: job.key.clone(),
            params,
            wallet_address,
            job_id: None,
        })
    }
}

impl From<CatalogResponse> for JobCatalog {
    fn from(response: CatalogResponse) -> Self {
        let jobs = response.jobs.into_iter().map(|(key, info)| JobDescriptor {
            key,
            name: info.name,
            price: info.price,
        });
        JobCatalog::new(jobs, response.token_address, response.recipient_address)
    }
}

/// Fetches the catalog from the backend; failures are surfaced, never retried
pub async fn load_jobs<B: JobBackend + ?Sized>(backend: &B) -> Result<JobCatalog> {
    match backend.list_jobs().await {
        Ok(catalog) => {
            info!(
                "Loaded {} job types (token {:?}, recipient {:?})",
                catalog.len(),
                catalog.token_address,
                catalog.recipient_address
            );
            Ok(catalog)
        }
        Err(e) => {
            warn!("Failed to load jobs: {}", e);
            Err(e)
        }
    }
}
