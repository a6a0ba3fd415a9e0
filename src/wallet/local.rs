// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use async_trait::async_trait;
use ethers::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::WalletProvider;
use crate::config::ChainConfig;
use crate::error::{ClientError, Result};

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Wallet backed by a local private key and an HTTP JSON-RPC provider
pub struct LocalWalletProvider {
    wallet: LocalWallet,
    client: RwLock<Arc<SignerClient>>,
    chains: RwLock<HashMap<u64, ChainConfig>>,
    polling_interval: Duration,
}

impl LocalWalletProvider {
    pub fn new(private_key: &str, chain: ChainConfig) -> Result<Self> {
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| ClientError::Wallet(format!("Invalid private key: {}", e)))?;
        Self::from_wallet(wallet, chain)
    }

    /// Fresh random key; it holds no tokens until funded
    pub fn generate(chain: ChainConfig) -> Result<Self> {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        Self::from_wallet(wallet, chain)
    }

    pub fn from_wallet(wallet: LocalWallet, chain: ChainConfig) -> Result<Self> {
        let polling_interval = Duration::from_millis(500);
        let client = build_client(&wallet, &chain, polling_interval)?;

        let mut chains = HashMap::new();
        chains.insert(chain.chain_id, chain);

        Ok(Self {
            wallet,
            client: RwLock::new(Arc::new(client)),
            chains: RwLock::new(chains),
            polling_interval,
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Underlying key, with its chain id set to the active chain
    pub async fn signer(&self) -> LocalWallet {
        self.client.read().await.signer().clone()
    }

    /// Hex-encoded private key for persisting a generated wallet
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.wallet.signer().to_bytes()))
    }

    async fn current(&self) -> Arc<SignerClient> {
        self.client.read().await.clone()
    }
}

fn build_client(wallet: &LocalWallet, chain: &ChainConfig, interval: Duration) -> Result<SignerClient> {
    let provider = Provider::<Http>::try_from(chain.rpc_url.as_str())
        .map_err(|e| ClientError::Config(format!("Failed to create provider: {}", e)))?
        .interval(interval);
    let wallet = wallet.clone().with_chain_id(chain.chain_id);
    Ok(SignerMiddleware::new(provider, wallet))
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        Ok(vec![self.wallet.address()])
    }

    async fn chain_id(&self) -> Result<u64> {
        let chain_id = self
            .current()
            .await
            .get_chainid()
            .await
            .map_err(|e| ClientError::Wallet(format!("eth_chainId failed: {}", e)))?;
        Ok(chain_id.as_u64())
    }

    async fn switch_chain(&self, chain: &ChainConfig) -> Result<()> {
        let known = self.chains.read().await.get(&chain.chain_id).cloned();
        let known = known.ok_or(ClientError::UnrecognizedChain {
            chain_id: chain.chain_id,
        })?;

        let client = build_client(&self.wallet, &known, self.polling_interval)?;
        *self.client.write().await = Arc::new(client);
        debug!("Switched wallet to chain {} via {}", known.chain_id, known.rpc_url);
        Ok(())
    }

    async fn add_chain(&self, chain: &ChainConfig) -> Result<()> {
        info!("Registering chain {} ({})", chain.name, chain.chain_id_hex());
        self.chains.write().await.insert(chain.chain_id, chain.clone());
        Ok(())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256> {
        let client = self.current().await;
        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| ClientError::Wallet(format!("Failed to send transaction: {}", e)))?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        self.current()
            .await
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ClientError::Wallet(format!("Receipt lookup failed: {}", e)))
    }

    async fn call(&self, tx: TransactionRequest) -> Result<Bytes> {
        let client = self.current().await;
        client
            .call(&tx.into(), None)
            .await
            .map_err(|e| ClientError::Wallet(format!("eth_call failed: {}", e)))
    }
}
