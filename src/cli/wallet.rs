// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Args;
use ethers::types::Address;
use std::str::FromStr;

use super::{backend, ConnectionArgs};
use crate::contracts::erc20;
use crate::jobs;
use crate::wallet::{self, LocalWalletProvider};

#[derive(Args, Debug)]
pub struct BalanceArgs {
    /// Address to check (defaults to the configured wallet)
    #[arg(long)]
    pub address: Option<String>,

    /// Token contract (defaults to the backend's payment token)
    #[arg(long)]
    pub token: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn balance(args: BalanceArgs) -> Result<()> {
    let config = args.connection.load_config()?;

    // Read-only calls only need a provider; any key will do
    let provider = match &config.private_key {
        Some(key) => LocalWalletProvider::new(key, config.chain.clone())?,
        None => LocalWalletProvider::generate(config.chain.clone())?,
    };

    let owner = match &args.address {
        Some(address) => parse_address("--address", address)?,
        None if config.private_key.is_some() => provider.address(),
        None => {
            return Err(anyhow!(
                "Provide --address or a private key (--private-key / AGENT_PRIVATE_KEY)"
            ))
        }
    };

    let token = match &args.token {
        Some(token) => parse_address("--token", token)?,
        None => {
            let client = backend(&config)?;
            jobs::load_jobs(client.as_ref()).await?.token_address
        }
    };

    let raw = wallet::token_balance(&provider, token, owner).await?;
    println!(
        "💰 {:?} holds {} tokens (token {:?})",
        owner,
        erc20::format_token_amount(raw, 2)?,
        token
    );
    Ok(())
}

fn parse_address(flag: &str, value: &str) -> Result<Address> {
    Address::from_str(value).map_err(|_| anyhow!("Invalid {} '{}'", flag, value))
}
