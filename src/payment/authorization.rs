// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Signed payment authorization (x402 `X-PAYMENT` header)
//!
//! Instead of broadcasting a transfer, the client signs an EIP-712
//! `PaymentAuthorization` naming recipient, token, amount and job id, and sends it as a
//! JSON header on the job request. The backend recovers the signer and settles.
//!
//! Domain: `{name: "x402 Payment", version: "1", chainId}`. Signatures are valid for
//! [`AUTHORIZATION_VALIDITY_SECS`] from the signing timestamp.

use chrono::{DateTime, Utc};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Signature, U256};
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ClientError, Result};

pub const AUTHORIZATION_VALIDITY_SECS: u64 = 300;
pub const PAYMENT_DOMAIN_NAME: &str = "x402 Payment";
pub const PAYMENT_DOMAIN_VERSION: &str = "1";

/// Header payload; field names follow the backend's camelCase contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    pub recipient: String,
    pub token: String,
    /// Smallest-unit amount as a decimal string
    pub amount: String,
    pub job_id: String,
    pub timestamp: u64,
    pub valid_until: u64,
    pub signature: String,
}

/// The unsigned authorization terms
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationTerms {
    pub recipient: Address,
    pub token: Address,
    pub amount: U256,
    pub job_id: String,
    pub timestamp: u64,
    pub valid_until: u64,
}

impl AuthorizationTerms {
    pub fn new(
        recipient: Address,
        token: Address,
        amount: U256,
        job_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let timestamp = now.timestamp().max(0) as u64;
        Self {
            recipient,
            token,
            amount,
            job_id: job_id.into(),
            timestamp,
            valid_until: timestamp + AUTHORIZATION_VALIDITY_SECS,
        }
    }

    pub fn typed_data(&self, chain_id: u64) -> Result<TypedData> {
        let value = serde_json::json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "version", "type": "string"},
                    {"name": "chainId", "type": "uint256"}
                ],
                "PaymentAuthorization": [
                    {"name": "recipient", "type": "address"},
                    {"name": "token", "type": "address"},
                    {"name": "amount", "type": "uint256"},
                    {"name": "jobId", "type": "string"},
                    {"name": "timestamp", "type": "uint256"},
                    {"name": "validUntil", "type": "uint256"}
                ]
            },
            "primaryType": "PaymentAuthorization",
            "domain": {
                "name": PAYMENT_DOMAIN_NAME,
                "version": PAYMENT_DOMAIN_VERSION,
                "chainId": chain_id
            },
            "message": {
                "recipient": to_checksum(&self.recipient, None),
                "token": to_checksum(&self.token, None),
                "amount": self.amount.to_string(),
                "jobId": self.job_id,
                "timestamp": self.timestamp,
                "validUntil": self.valid_until
            }
        });
        Ok(serde_json::from_value(value)?)
    }

    pub async fn sign(self, signer: &LocalWallet, chain_id: u64) -> Result<PaymentAuthorization> {
        let typed = self.typed_data(chain_id)?;
        let signature = signer.sign_typed_data(&typed).await?;

        Ok(PaymentAuthorization {
            recipient: to_checksum(&self.recipient, None),
            token: to_checksum(&self.token, None),
            amount: self.amount.to_string(),
            job_id: self.job_id,
            timestamp: self.timestamp,
            valid_until: self.valid_until,
            signature: format!("0x{}", hex::encode(signature.to_vec())),
        })
    }
}

impl PaymentAuthorization {
    pub fn terms(&self) -> Result<AuthorizationTerms> {
        let address = |field: &str, value: &str| {
            Address::from_str(value).map_err(|e| {
                ClientError::ProtocolViolation(format!("invalid {} address: {}", field, e))
            })
        };
        Ok(AuthorizationTerms {
            recipient: address("recipient", &self.recipient)?,
            token: address("token", &self.token)?,
            amount: U256::from_dec_str(&self.amount).map_err(|e| {
                ClientError::ProtocolViolation(format!("invalid amount: {}", e))
            })?,
            job_id: self.job_id.clone(),
            timestamp: self.timestamp,
            valid_until: self.valid_until,
        })
    }

    /// Address that produced the signature
    pub fn recover_signer(&self, chain_id: u64) -> Result<Address> {
        let typed = self.terms()?.typed_data(chain_id)?;
        let signature = Signature::from_str(self.signature.trim_start_matches("0x"))
            .map_err(|e| ClientError::ProtocolViolation(format!("invalid signature: {}", e)))?;
        signature
            .recover_typed_data(&typed)
            .map_err(|e| ClientError::ProtocolViolation(format!("signature recovery failed: {}", e)))
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let now = now.timestamp().max(0) as u64;
        now <= self.valid_until
    }
}
