// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client Error Types
//!
//! Every failure the handshake can surface maps onto one [`ClientError`] variant.
//! Variants carry owned strings rather than wrapped library errors so the error can
//! be stored inside the controller state (`HandshakeState::Failed`) and compared in tests.
//!
//! ## Taxonomy
//!
//! - **Network**: catalog, request or verification fetch failed (no retry except
//!   inside the verification loop)
//! - **Wallet**: wallet absent, signing rejected, RPC lookup failed
//! - **TransactionReverted**: the transfer was mined with a failure status
//! - **ConfirmationTimeout** / **VerificationTimeout**: a polling ceiling was hit
//! - **ProtocolViolation**: the backend answered with an unexpected status or shape
//! - **Stream**: the execution stream broke before a terminal event

use ethers::types::H256;

/// Errors surfaced by the job client
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Wallet does not recognize chain {chain_id}")]
    UnrecognizedChain { chain_id: u64 },

    #[error("Transaction {tx_hash:?} reverted")]
    TransactionReverted { tx_hash: H256 },

    #[error("Transaction {tx_hash:?} not confirmed after {waited_secs}s")]
    ConfirmationTimeout { tx_hash: H256, waited_secs: u64 },

    #[error("Payment verification timed out after {attempts} attempts")]
    VerificationTimeout { attempts: u32 },

    #[error("Unexpected backend response: {0}")]
    ProtocolViolation(String),

    #[error("Payment window expired for job {job_id}")]
    ChallengeExpired { job_id: String },

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Execution stream error: {0}")]
    Stream(String),

    #[error("Invalid token amount '{amount}': {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("Unknown job type: {0}")]
    UnknownJob(String),

    #[error("Operation '{operation}' not allowed in state {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Handshake cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Failures the verification loop retries instead of surfacing immediately
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::ProtocolViolation(format!("malformed response body: {}", err))
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::ProtocolViolation(format!("malformed JSON: {}", err))
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Config(format!("invalid URL: {}", err))
    }
}

impl From<ethers::providers::ProviderError> for ClientError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        ClientError::Wallet(err.to_string())
    }
}

impl From<ethers::signers::WalletError> for ClientError {
    fn from(err: ethers::signers::WalletError) -> Self {
        ClientError::Wallet(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
