// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ERC20 call encoding for the payment transfer and balance reads
//!
//! Amounts cross the backend boundary as decimal strings in token units and are scaled
//! by 10^18 before encoding. Calldata is the 4-byte selector followed by ABI-encoded
//! 32-byte words.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ethers::utils::format_units;

use crate::error::{ClientError, Result};

pub const TOKEN_DECIMALS: u32 = 18;

/// `transfer(address,uint256)`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// `balanceOf(address)`
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Gas limit attached to payment transfers
pub const TRANSFER_GAS_LIMIT: u64 = 100_000;

/// Parses a decimal token amount ("5", "0.01") into its smallest unit
pub fn parse_token_amount(amount: &str) -> Result<U256> {
    let trimmed = amount.trim();
    let invalid = |reason: &str| ClientError::InvalidAmount {
        amount: amount.to_string(),
        reason: reason.to_string(),
    };

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("empty amount"));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid("expected an unsigned decimal number"));
    }
    if fraction.len() > TOKEN_DECIMALS as usize {
        return Err(invalid("more than 18 fractional digits"));
    }

    let whole_units = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| invalid("exceeds uint256"))?
    };
    let fraction_units = U256::from_dec_str(&format!("{:0<18}", fraction))
        .map_err(|_| invalid("invalid fractional part"))?;

    whole_units
        .checked_mul(U256::exp10(TOKEN_DECIMALS as usize))
        .and_then(|scaled| scaled.checked_add(fraction_units))
        .ok_or_else(|| invalid("exceeds uint256"))
}

/// Formats a smallest-unit amount as token units with `precision` fractional digits
pub fn format_token_amount(amount: U256, precision: usize) -> Result<String> {
    let full = format_units(amount, TOKEN_DECIMALS).map_err(|e| ClientError::InvalidAmount {
        amount: amount.to_string(),
        reason: e.to_string(),
    })?;

    Ok(match full.split_once('.') {
        Some((whole, _)) if precision == 0 => whole.to_string(),
        Some((whole, fraction)) => {
            let digits: String = fraction.chars().chain(std::iter::repeat('0')).take(precision).collect();
            format!("{}.{}", whole, digits)
        }
        None => full,
    })
}

/// Calldata for `transfer(recipient, amount)`
pub fn encode_transfer(recipient: Address, amount: U256) -> Bytes {
    with_selector(
        TRANSFER_SELECTOR,
        &[Token::Address(recipient), Token::Uint(amount)],
    )
}

/// Calldata for `balanceOf(owner)`
pub fn encode_balance_of(owner: Address) -> Bytes {
    with_selector(BALANCE_OF_SELECTOR, &[Token::Address(owner)])
}

/// Decodes a single `uint256` return value
pub fn decode_uint(data: &[u8]) -> Result<U256> {
    let tokens = abi::decode(&[ParamType::Uint(256)], data)
        .map_err(|e| ClientError::Wallet(format!("failed to decode uint256 return: {}", e)))?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| ClientError::Wallet("empty uint256 return".to_string()))
}

fn with_selector(selector: [u8; 4], tokens: &[Token]) -> Bytes {
    let mut data = selector.to_vec();
    data.extend(abi::encode(tokens));
    data.into()
}

/// A fully-built token transfer ready for the wallet
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCall {
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
}

impl TransferCall {
    pub fn new(token: Address, recipient: Address, amount: U256) -> Self {
        Self {
            token,
            recipient,
            amount,
        }
    }

    pub fn calldata(&self) -> Bytes {
        encode_transfer(self.recipient, self.amount)
    }

    pub fn to_transaction(&self, from: Address) -> TransactionRequest {
        TransactionRequest::new()
            .from(from)
            .to(self.token)
            .data(self.calldata())
            .gas(TRANSFER_GAS_LIMIT)
    }
}
