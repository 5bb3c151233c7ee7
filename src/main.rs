use allowance_core::Address;
use anyhow::{Context, Result};
use clap::Parser;
use config_manager::SystemConfig;
use event_orchestrator::{build_pipeline, EventsQuery};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "allowance_tracker")]
#[command(about = "Reconstruct the token approval history of an account")]
#[command(version)]
struct Cli {
    /// Account address (0x-prefixed)
    account: String,

    /// Chain to scan; defaults to system.default_chain_id
    #[arg(long)]
    chain_id: Option<u64>,

    /// Configuration file path [default: config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,event_orchestrator=debug".into());

    // Logs go to stderr so stdout stays parseable JSON
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => SystemConfig::load_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SystemConfig::load().context("loading configuration")?,
    };
    init_tracing(config.system.json_logs);

    let account: Address = cli
        .account
        .trim()
        .parse()
        .with_context(|| format!("invalid account address '{}'", cli.account))?;
    let chain_id = cli.chain_id.unwrap_or(config.system.default_chain_id);

    let pipeline = build_pipeline(&config)?;
    info!("Scanning approval history of {} on chain {}", account, chain_id);

    let snapshot = pipeline
        .load(EventsQuery::new(account, chain_id))
        .await
        .context("request was superseded")?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(e) = &snapshot.error {
        error!("Approval history incomplete: {}", e);
        return Ok(false);
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
