// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use ethers::types::{Address, H256};
use std::fmt;

use crate::error::{ClientError, Result};
use crate::jobs::{JobCatalog, OutputEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeState {
    Idle,
    Requesting,
    AwaitingPayment,
    Submitting,
    ConfirmingOnChain,
    VerifyingBackend,
    Executing,
    Completed,
    Failed(ClientError),
    Expired,
}

impl HandshakeState {
    pub fn name(&self) -> &'static str {
        match self {
            HandshakeState::Idle => "Idle",
            HandshakeState::Requesting => "Requesting",
            HandshakeState::AwaitingPayment => "AwaitingPayment",
            HandshakeState::Submitting => "Submitting",
            HandshakeState::ConfirmingOnChain => "ConfirmingOnChain",
            HandshakeState::VerifyingBackend => "VerifyingBackend",
            HandshakeState::Executing => "Executing",
            HandshakeState::Completed => "Completed",
            HandshakeState::Failed(_) => "Failed",
            HandshakeState::Expired => "Expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Completed | HandshakeState::Failed(_) | HandshakeState::Expired
        )
    }

    /// States in which the payment window countdown applies
    pub fn can_expire(&self) -> bool {
        matches!(self, HandshakeState::AwaitingPayment | HandshakeState::Submitting)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Failed(err) => write!(f, "Failed ({})", err),
            other => f.write_str(other.name()),
        }
    }
}

/// Progress notifications published to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeEvent {
    StateChanged {
        from: &'static str,
        to: HandshakeState,
    },
    TransactionSubmitted {
        tx_hash: H256,
    },
    TransactionConfirmed {
        tx_hash: H256,
        block_number: Option<u64>,
    },
    VerificationAttempt {
        attempt: u32,
        max_attempts: u32,
    },
    Output(OutputEvent),
}

/// Explicit per-user context handed to the controller
#[derive(Debug, Clone)]
pub struct Session {
    pub wallet_address: Address,
    catalog: Option<JobCatalog>,
}

impl Session {
    pub fn new(wallet_address: Address) -> Self {
        Self {
            wallet_address,
            catalog: None,
        }
    }

    pub fn with_catalog(wallet_address: Address, catalog: JobCatalog) -> Self {
        Self {
            wallet_address,
            catalog: Some(catalog),
        }
    }

    pub fn catalog(&self) -> Result<&JobCatalog> {
        self.catalog.as_ref().ok_or(ClientError::InvalidState {
            operation: "select job",
            state: "catalog not loaded".to_string(),
        })
    }

    pub fn set_catalog(&mut self, catalog: Option<JobCatalog>) {
        self.catalog = catalog;
    }

    pub fn token_address(&self) -> Option<Address> {
        self.catalog.as_ref().map(|catalog| catalog.token_address)
    }

    pub fn recipient_address(&self) -> Option<Address> {
        self.catalog.as_ref().map(|catalog| catalog.recipient_address)
    }
}
