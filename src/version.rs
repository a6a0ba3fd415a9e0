// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the x402 job client

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Payment flows this client speaks
pub const FEATURES: &[&str] = &[
    "x402-challenge",
    "erc20-transfer",
    "bounded-verification",
    "sse-execution",
    "eip712-authorization",
    "ping-agent",
];

/// Chain IDs with a built-in preset
pub const SUPPORTED_CHAINS: &[u64] = &[
    84532, // Base Sepolia
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("x402 job client {}", VERSION_NUMBER)
}

/// Get full version info as JSON
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "features": FEATURES,
        "chains": SUPPORTED_CHAINS,
    })
}
