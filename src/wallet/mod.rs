// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Wallet provider surface used by the payment handshake
//!
//! Mirrors what an injected browser wallet offers: account access, chain switching
//! (with the add-then-switch fallback for unknown chains), transaction submission,
//! receipt lookup and read-only contract calls.

pub mod local;

pub use local::LocalWalletProvider;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, TransactionRequest, H256, U256};
use tracing::info;

use crate::config::ChainConfig;
use crate::contracts::erc20;
use crate::error::{ClientError, Result};

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts the wallet exposes; the first one pays
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    async fn chain_id(&self) -> Result<u64>;

    /// Fails with `UnrecognizedChain` when the chain was never added
    async fn switch_chain(&self, chain: &ChainConfig) -> Result<()>;

    async fn add_chain(&self, chain: &ChainConfig) -> Result<()>;

    /// Signs and broadcasts; returns the transaction hash
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256>;

    /// `None` while the transaction is still pending
    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>>;

    /// Read-only `eth_call` against the latest block
    async fn call(&self, tx: TransactionRequest) -> Result<Bytes>;
}

/// Switches to `chain`, adding it first if the wallet does not know it
pub async fn ensure_chain<W: WalletProvider + ?Sized>(wallet: &W, chain: &ChainConfig) -> Result<()> {
    match wallet.switch_chain(chain).await {
        Err(ClientError::UnrecognizedChain { chain_id }) => {
            info!("Adding chain {} ({}) to wallet", chain.name, chain_id);
            wallet.add_chain(chain).await?;
            wallet.switch_chain(chain).await
        }
        other => other,
    }
}

/// Requests accounts and moves the wallet onto `chain`; returns the paying address
pub async fn connect<W: WalletProvider + ?Sized>(wallet: &W, chain: &ChainConfig) -> Result<Address> {
    let address = wallet
        .request_accounts()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::Wallet("wallet exposed no accounts".to_string()))?;

    ensure_chain(wallet, chain).await?;
    info!("Wallet {:?} connected on {}", address, chain.name);
    Ok(address)
}

/// ERC20 `balanceOf(owner)` in the token's smallest unit
pub async fn token_balance<W: WalletProvider + ?Sized>(
    wallet: &W,
    token: Address,
    owner: Address,
) -> Result<U256> {
    let tx = TransactionRequest::new()
        .to(token)
        .data(erc20::encode_balance_of(owner));
    let returned = wallet.call(tx).await?;
    erc20::decode_uint(&returned)
}
