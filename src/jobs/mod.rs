// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod catalog;
pub mod types;

pub use catalog::{load_jobs, JobCatalog};
pub use types::{
    format_countdown, AuthorizedJob, BackendHealth, JobDescriptor, JobParams, JobRequest,
    JobState, JobStatusReport, OutputEvent, PaymentChallenge, PaymentConfirmation, PaymentTerms,
    VerificationResult, VerificationStatus,
};
