// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client configuration
//!
//! Values come from the process environment (optionally seeded from a `.env` file by
//! the binary). CLI flags override individual fields after loading.

pub mod chains;

pub use chains::{ChainConfig, ChainRegistry, NativeCurrency};

use std::str::FromStr;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::payment::HandshakePolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8989";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub chain: ChainConfig,
    pub private_key: Option<String>,
    pub policy: HandshakePolicy,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            chain: ChainConfig::base_sepolia(),
            private_key: None,
            policy: HandshakePolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(api_url) = lookup("X402_API_URL") {
            config.api_url = api_url;
        }
        if let Some(chain_id) = parse_var::<u64>(&lookup, "CHAIN_ID")? {
            config.chain = match ChainRegistry::new().get_chain(chain_id) {
                Some(preset) => preset.clone(),
                None => ChainConfig {
                    chain_id,
                    name: format!("Chain {}", chain_id),
                    block_explorer_url: None,
                    ..config.chain
                },
            };
        }
        if let Some(rpc_url) = lookup("RPC_URL") {
            config.chain.rpc_url = rpc_url;
        }
        config.private_key = lookup("AGENT_PRIVATE_KEY").filter(|key| !key.trim().is_empty());

        if let Some(retries) = parse_var::<u32>(&lookup, "X402_VERIFY_MAX_RETRIES")? {
            config.policy.verify_max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "X402_VERIFY_RETRY_DELAY_MS")? {
            config.policy.verify_retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "X402_RECEIPT_POLL_MS")? {
            config.policy.receipt_poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "X402_CONFIRMATION_TIMEOUT_SECS")? {
            config.policy.confirmation_timeout = Duration::from_secs(secs);
        }

        url::Url::parse(&config.api_url)?;
        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ClientError::Config(format!("{} = '{}': {}", key, raw, e))),
        None => Ok(None),
    }
}
