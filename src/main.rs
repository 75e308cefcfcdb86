// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::fs;
use std::time::Instant;
use the_switchyard::backends::local::{parse_input, DeliveryKind, LocalPlatform};
use the_switchyard::config::{load_and_validate_config, Config};
use the_switchyard::engine::HopOutcome;
use tracing_subscriber::EnvFilter;

fn usage(program: &str) -> String {
    format!(
        "Usage: {0} run <config.yaml> <entry-node> <input.json>\n       {0} validate <config.yaml>\nExample: {0} run configs/fan-out-fan-in.yaml split input.json",
        program
    )
}

fn load(path: &str) -> Result<Config> {
    load_and_validate_config(path).map_err(|e| anyhow!("{}: {}", path, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("switchyard");

    match args.get(1).map(String::as_str) {
        Some("validate") if args.len() == 3 => validate(&args[2]),
        Some("run") if args.len() == 5 => run(&args[2], &args[3], &args[4]).await,
        _ => bail!(usage(program)),
    }
}

fn validate(config_path: &str) -> Result<()> {
    let config = load(config_path)?;
    println!("✅ {} is valid ({} nodes)", config_path, config.nodes.len());
    Ok(())
}

async fn run(config_path: &str, entry: &str, input_path: &str) -> Result<()> {
    let config = load(config_path)?;
    let raw = fs::read_to_string(input_path)
        .with_context(|| format!("reading input from {}", input_path))?;
    let input = parse_input(&raw)?;

    println!("🚀 Switchyard local run");
    println!("═══════════════════════════════════");
    println!("Config: {}", config_path);
    println!("Entry:  {}", entry);
    println!();

    let platform = LocalPlatform::builder(config).build().await?;
    let start = Instant::now();
    let outcome = platform.start(entry, input).await?;
    platform.run_until_idle().await;
    let elapsed = start.elapsed();

    let deliveries = platform.deliveries().await;
    let count = |kind: DeliveryKind| deliveries.iter().filter(|d| d.kind == kind).count();
    println!("📊 Deliveries:");
    println!("   invocations: {}", count(DeliveryKind::Async));
    println!("   synchronous: {}", count(DeliveryKind::Sync));
    println!("   publishes:   {}", count(DeliveryKind::Publish));
    println!("   queue batches: {}", count(DeliveryKind::QueueBatch));
    println!("⏱️  Completed in {:.2?}", elapsed);

    match outcome {
        HopOutcome::Failed(message) => bail!("❌ {} failed: {}", entry, message),
        HopOutcome::Response(response) | HopOutcome::Temporary { result: response, .. } => {
            println!("\n📤 Response:");
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        HopOutcome::Acknowledged | HopOutcome::Dispatched(_) => {}
    }
    Ok(())
}
