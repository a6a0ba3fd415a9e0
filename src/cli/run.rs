// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Args;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{backend, ConnectionArgs};
use crate::jobs::{format_countdown, JobParams, OutputEvent};
use crate::payment::{HandshakeController, HandshakeEvent, HandshakeState, Session};
use crate::wallet::{self, LocalWalletProvider};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Catalog key of the job to run
    #[arg(long)]
    pub job: String,

    /// Job parameter as key=value; values that parse as JSON keep their type
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, serde_json::Value)>,

    /// Verification retries after the first attempt
    #[arg(long)]
    pub verify_retries: Option<u32>,

    /// Delay between verification attempts in milliseconds
    #[arg(long)]
    pub verify_delay_ms: Option<u64>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

fn parse_param(raw: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Request, pay for and execute one job
pub async fn run_job(args: RunArgs) -> Result<()> {
    let mut config = args.connection.load_config()?;
    if let Some(retries) = args.verify_retries {
        config.policy.verify_max_retries = retries;
    }
    if let Some(ms) = args.verify_delay_ms {
        config.policy.verify_retry_delay = Duration::from_millis(ms);
    }

    let private_key = config.private_key.clone().ok_or_else(|| {
        anyhow!("Private key required. Use --private-key or set AGENT_PRIVATE_KEY env var")
    })?;

    let client = backend(&config)?;
    let wallet = Arc::new(LocalWalletProvider::new(&private_key, config.chain.clone())?);
    let address = wallet::connect(wallet.as_ref(), &config.chain).await?;
    println!("🔑 Wallet {:?} on {}", address, config.chain.name);

    let mut controller = HandshakeController::new(
        client,
        wallet,
        Session::new(address),
        config.policy.clone(),
    );
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                HandshakeEvent::TransactionSubmitted { tx_hash } => {
                    println!("📤 Transfer submitted: {:?}", tx_hash)
                }
                HandshakeEvent::TransactionConfirmed { block_number, .. } => {
                    println!("⛓️  Confirmed in block {:?}", block_number.unwrap_or_default())
                }
                HandshakeEvent::VerificationAttempt {
                    attempt,
                    max_attempts,
                } => println!("🔍 Verifying payment ({}/{})", attempt, max_attempts),
                _ => {}
            }
        }
    });

    let catalog = controller.load_jobs().await?;
    let job = catalog
        .get(&args.job)
        .ok_or_else(|| anyhow!("Job '{}' is not in the catalog", args.job))?;
    println!("📋 {} ({} tokens)", job.title(), job.price);

    let params: JobParams = args.params.into_iter().collect();
    let challenge = controller.request_job(&args.job, params).await?;
    println!("\n💰 Payment required");
    println!("   Job ID:    {}", challenge.job_id);
    println!("   Amount:    {} tokens", challenge.payment.amount);
    println!("   Recipient: {:?}", challenge.payment.recipient_address);
    println!(
        "   Expires:   {} ({} left)",
        challenge.expires_at,
        format_countdown(challenge.remaining_at(Utc::now()))
    );

    let cancel = controller.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling handshake");
            cancel.cancel();
        }
    });

    let tx_hash = controller.pay().await?;
    if let Some(link) = config.chain.tx_explorer_link(&format!("{:?}", tx_hash)) {
        println!("   View on explorer: {}", link);
    }

    println!("\n🚀 Executing job {}...\n", challenge.job_id);
    let transcript = controller
        .execute_with(|event| match event {
            OutputEvent::Output(text) => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            OutputEvent::Error(text) => eprintln!("\n❌ {}", text),
            OutputEvent::Start(_) | OutputEvent::Complete(_) => {}
        })
        .await?;

    match controller.state() {
        HandshakeState::Completed => {
            println!("\n✅ Job completed ({} lines)", transcript.lines().len());
            Ok(())
        }
        HandshakeState::Failed(e) => Err(anyhow!("{}", e)),
        other => Err(anyhow!("Handshake ended in state {}", other)),
    }
}
