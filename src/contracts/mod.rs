// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod erc20;

pub use erc20::{
    decode_uint, encode_balance_of, encode_transfer, format_token_amount, parse_token_amount,
    TransferCall, TOKEN_DECIMALS,
};
