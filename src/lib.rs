// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod agent;
pub mod api;
pub mod cli;
pub mod config;
pub mod contracts;
pub mod error;
pub mod execution;
pub mod jobs;
pub mod payment;
pub mod version;
pub mod wallet;

pub use agent::{PingAgent, PingConfig, PingReport};
pub use api::{JobApiClient, JobBackend};
pub use config::{ChainConfig, ClientConfig};
pub use error::{ClientError, Result};
pub use execution::{ExecutionOutcome, ExecutionStream, ExecutionTranscript};
pub use jobs::{JobCatalog, JobParams, OutputEvent, PaymentChallenge, VerificationStatus};
pub use payment::{
    HandshakeController, HandshakeEvent, HandshakePolicy, HandshakeState, PaymentAuthorization,
    Session,
};
pub use wallet::{LocalWalletProvider, WalletProvider};
