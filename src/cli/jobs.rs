// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Args;

use super::{backend, ConnectionArgs};
use crate::jobs::{self, JobState};

#[derive(Args, Debug)]
pub struct JobsArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Job ID returned by the payment challenge
    pub job_id: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
pub struct HealthArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn list_jobs(args: JobsArgs) -> Result<()> {
    let config = args.connection.load_config()?;
    let client = backend(&config)?;
    let catalog = jobs::load_jobs(client.as_ref()).await?;

    println!("\n📋 Available jobs ({}):", config.api_url);
    for job in catalog.iter() {
        println!("  {:<16} {:<28} {} tokens", job.key, job.title(), job.price);
    }
    println!("\n  Token:     {:?}", catalog.token_address);
    println!("  Recipient: {:?}", catalog.recipient_address);
    Ok(())
}

pub async fn job_status(args: StatusArgs) -> Result<()> {
    let config = args.connection.load_config()?;
    let client = backend(&config)?;
    let report = client.job_status(&args.job_id).await?;

    print!("📊 Job {}: ", args.job_id);
    match report.status {
        JobState::Pending => println!("⏳ Awaiting payment"),
        JobState::Paid => println!("✅ Paid"),
        JobState::Expired => println!("⏰ Expired"),
        JobState::NotFound => println!("❌ Not found"),
    }
    if let Some(expires_at) = report.expires_at {
        println!("   Expires at: {}", expires_at);
    }
    if let Some(price) = report.price {
        println!("   Price:      {} tokens", price);
    }
    Ok(())
}

pub async fn health(args: HealthArgs) -> Result<()> {
    let config = args.connection.load_config()?;
    let client = backend(&config)?;
    let health = client.health().await?;

    println!("🩺 {} is {}", health.service, health.status);
    if let Some(network) = health.network {
        println!("   Network:   {}", network);
    }
    println!("   Connected: {}", if health.connected { "yes" } else { "no" });
    Ok(())
}
