// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Args;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{backend, ConnectionArgs};
use crate::agent::{PingAgent, PingConfig};
use crate::wallet::LocalWalletProvider;

#[derive(Args, Debug)]
pub struct AgentArgs {
    /// Host to ping
    #[arg(long, default_value = "google.com")]
    pub host: String,

    /// Echo requests per ping job
    #[arg(long, default_value_t = 4)]
    pub count: u32,

    /// Seconds between pings
    #[arg(long, default_value_t = 180)]
    pub interval_secs: u64,

    /// Run a single ping and exit
    #[arg(long)]
    pub once: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn run_agent(args: AgentArgs) -> Result<()> {
    let config = args.connection.load_config()?;

    let wallet = match &config.private_key {
        Some(key) => LocalWalletProvider::new(key, config.chain.clone())?,
        None => {
            let wallet = LocalWalletProvider::generate(config.chain.clone())?;
            println!("⚠️  No AGENT_PRIVATE_KEY set, generated a new wallet");
            println!("⚠️  Address:     {:?}", wallet.address());
            println!("⚠️  Private key: {}", wallet.private_key_hex());
            println!("⚠️  Fund it with payment tokens and save the key for future use!");
            wallet
        }
    };

    let ping = PingConfig {
        host: args.host,
        count: args.count,
        interval: Duration::from_secs(args.interval_secs),
        ..PingConfig::default()
    };
    let agent = PingAgent::new(
        backend(&config)?,
        wallet.signer().await,
        config.chain.chain_id,
        ping,
    );

    println!("\n🤖 x402 agent");
    println!("   Wallet:   {:?}", agent.address());
    println!("   Target:   {}", agent.config().host);
    println!("   API:      {}", config.api_url);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    if args.once {
        let report = agent.run_once(&cancel).await?;
        println!("\n{}", report.output);
        println!(
            "\n📊 {} is {}",
            report.host,
            if report.alive { "ALIVE ✅" } else { "DEAD ❌" }
        );
        return Ok(());
    }

    println!("   Interval: {}s\n", agent.config().interval.as_secs());
    let iterations = agent
        .run_periodic(cancel, |iteration, result| match result {
            Ok(report) => println!(
                "📊 #{} {} is {}",
                iteration,
                report.host,
                if report.alive { "ALIVE ✅" } else { "DEAD ❌" }
            ),
            Err(e) => println!("⚠️  #{} failed: {}", iteration, e),
        })
        .await;

    println!("\n🛑 Agent stopped after {} iterations", iterations);
    Ok(())
}
