// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod backend;
pub mod client;
pub mod sse;

pub use backend::JobBackend;
pub use client::{JobApiClient, X_PAYMENT_HEADER};
pub use sse::{SseDecoder, SseFrame};
