// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Wire and domain types for the job backend

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::contracts::erc20;
use crate::error::Result;

/// Free-form job parameters, e.g. `{"host": "google.com", "count": 4}`
pub type JobParams = serde_json::Map<String, serde_json::Value>;

/// One purchasable job type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Internal name, the unique key sent as `job_type`
    pub key: String,
    /// Display name
    pub name: String,
    /// Price as a decimal string in token units
    pub price: String,
}

impl JobDescriptor {
    pub fn price_wei(&self) -> Result<U256> {
        erc20::parse_token_amount(&self.price)
    }

    /// Display name with the first letter capitalised, as shown on job cards
    pub fn title(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// `GET /api/jobs` response body
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogResponse {
    pub jobs: BTreeMap<String, JobInfo>,
    pub token_address: Address,
    pub recipient_address: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobInfo {
    pub name: String,
    #[serde(deserialize_with = "decimal_string")]
    pub price: String,
}

/// `POST /api/jobs/request` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequest {
    pub job_type: String,
    pub params: JobParams,
    pub wallet_address: Address,
    /// Client-chosen id, only sent with a signed payment authorization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// Payment terms inside a 402 challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTerms {
    #[serde(deserialize_with = "decimal_string")]
    pub amount: String,
    pub token_address: Address,
    pub recipient_address: Address,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub network: Option<String>,
}

/// The 402 "payment required" response pairing a job with an on-chain payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentChallenge {
    pub job_id: String,
    pub payment: PaymentTerms,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PaymentChallenge {
    pub fn amount_wei(&self) -> Result<U256> {
        erc20::parse_token_amount(&self.payment.amount)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left on the payment window, zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Countdown text in `m:ss` form, or `EXPIRED`
pub fn format_countdown(remaining: Duration) -> String {
    if remaining.is_zero() {
        return "EXPIRED".to_string();
    }
    let secs = remaining.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// `POST /api/jobs/verify-payment` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentConfirmation {
    pub job_id: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    AlreadyPaid,
    PaymentNotFound,
}

impl VerificationStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self, VerificationStatus::Verified | VerificationStatus::AlreadyPaid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub execution_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Paid,
    Expired,
    NotFound,
}

/// `GET /api/jobs/status/:id` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobState,
    #[serde(default)]
    pub paid: Option<bool>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_decimal_string")]
    pub price: Option<String>,
}

/// Response to a request carrying a signed `X-PAYMENT` header
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorizedJob {
    pub status: String,
    pub job_id: String,
}

/// `GET /` response body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendHealth {
    pub service: String,
    pub status: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub connected: bool,
}

/// One decoded event from the execution stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Start(String),
    Output(String),
    Complete(String),
    Error(String),
}

impl OutputEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutputEvent::Complete(_) | OutputEvent::Error(_))
    }

    pub fn payload(&self) -> &str {
        match self {
            OutputEvent::Start(text)
            | OutputEvent::Output(text)
            | OutputEvent::Complete(text)
            | OutputEvent::Error(text) => text,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Text(String),
    Number(serde_json::Number),
}

impl From<DecimalRepr> for String {
    fn from(repr: DecimalRepr) -> Self {
        match repr {
            DecimalRepr::Text(text) => text,
            DecimalRepr::Number(number) => number.to_string(),
        }
    }
}

// Prices arrive as either "0.01" or 0.01 depending on the backend serializer
fn decimal_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    DecimalRepr::deserialize(deserializer).map(String::from)
}

fn optional_decimal_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<DecimalRepr>::deserialize(deserializer).map(|repr| repr.map(String::from))
}
