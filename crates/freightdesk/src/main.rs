use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use freightdesk_models::{CargoOffer, FreightdeskConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "freightdesk", about = "Negotiation engine for freight dispatchers")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/freightdesk.toml")]
    config: String,

    /// Read the CargoOffer JSON array from a file instead of stdin
    #[arg(short, long)]
    input: Option<String>,

    /// QuoteFeedback JSON array to apply after the offers. Records that do
    /// not decode are reported and skipped
    #[arg(short, long)]
    feedback: Option<String>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str, what: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what}: {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {what} JSON: {path}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: FreightdeskConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;

    // Offers come from --input, or stdin unless this is a feedback-only run.
    let offers: Vec<CargoOffer> = match (&cli.input, &cli.feedback) {
        (Some(path), _) => read_json(path, "offers")?,
        (None, Some(_)) => Vec::new(),
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            serde_json::from_str(&buf).context("Failed to parse offers JSON")?
        }
    };
    let feedback: Vec<serde_json::Value> = match &cli.feedback {
        Some(path) => read_json(path, "feedback")?,
        None => Vec::new(),
    };

    let desk = freightdesk::build_desk(&config).context("Failed to build engine")?;
    let report = desk.run_batch(offers, feedback).await;
    desk.engine.shutdown().await;
    let report = report.context("Batch failed")?;

    let output = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{output}");

    Ok(())
}
