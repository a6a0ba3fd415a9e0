// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod ping;

pub use ping::{collect_output, parse_ping_result, PingAgent, PingConfig, PingReport};
