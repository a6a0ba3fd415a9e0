// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::time::Duration;

/// Polling and retry limits for the payment handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePolicy {
    /// Delay between transaction receipt lookups
    pub receipt_poll_interval: Duration,
    /// Ceiling on waiting for a receipt
    pub confirmation_timeout: Duration,
    /// Retries after the first verification attempt
    pub verify_max_retries: u32,
    pub verify_retry_delay: Duration,
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        Self {
            receipt_poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(300),
            verify_max_retries: 10,
            verify_retry_delay: Duration::from_secs(3),
        }
    }
}

impl HandshakePolicy {
    /// Total verification requests: the first attempt plus every retry
    pub fn max_verify_attempts(&self) -> u32 {
        self.verify_max_retries.saturating_add(1)
    }
}
