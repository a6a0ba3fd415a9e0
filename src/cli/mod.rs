// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod agent;
pub mod jobs;
pub mod run;
pub mod wallet;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;

use crate::api::JobApiClient;
use crate::config::ClientConfig;

/// x402 job client CLI
#[derive(Parser, Debug)]
#[command(name = "x402-cli")]
#[command(version)]
#[command(about = "Request, pay for and run jobs on an x402 job backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the job catalog
    Jobs(jobs::JobsArgs),

    /// Check a job's payment status
    Status(jobs::StatusArgs),

    /// Check that the backend is reachable
    Health(jobs::HealthArgs),

    /// Request a job, pay for it on-chain and stream its output
    Run(run::RunArgs),

    /// Show a wallet's payment token balance
    Balance(wallet::BalanceArgs),

    /// Periodically ping a host through signed payment authorizations
    Agent(agent::AgentArgs),
}

/// Backend and chain connection flags shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Job backend base URL
    #[arg(long, env = "X402_API_URL")]
    pub api_url: Option<String>,

    /// JSON-RPC endpoint for the payment chain
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// Paying wallet's private key
    #[arg(long, env = "AGENT_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
}

impl ConnectionArgs {
    /// Environment (and `.env`) first, then flags on top
    pub fn load_config(&self) -> Result<ClientConfig> {
        dotenv::dotenv().ok();

        let mut config = ClientConfig::from_env()?;
        if let Some(api_url) = &self.api_url {
            url::Url::parse(api_url).map_err(|e| anyhow!("Invalid --api-url '{}': {}", api_url, e))?;
            config.api_url = api_url.clone();
        }
        if let Some(rpc_url) = &self.rpc_url {
            config.chain.rpc_url = rpc_url.clone();
        }
        if let Some(private_key) = self.private_key.as_ref().filter(|k| !k.trim().is_empty()) {
            config.private_key = Some(private_key.clone());
        }
        Ok(config)
    }
}

pub(crate) fn backend(config: &ClientConfig) -> Result<Arc<JobApiClient>> {
    Ok(Arc::new(JobApiClient::with_timeout(
        &config.api_url,
        config.request_timeout,
    )?))
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Jobs(args) => jobs::list_jobs(args).await,
        Commands::Status(args) => jobs::job_status(args).await,
        Commands::Health(args) => jobs::health(args).await,
        Commands::Run(args) => run::run_job(args).await,
        Commands::Balance(args) => wallet::balance(args).await,
        Commands::Agent(args) => agent::run_agent(args).await,
    }
}
