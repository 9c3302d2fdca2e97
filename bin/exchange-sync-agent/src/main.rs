//! Exchange Synchronization Agent binary.
//!
//! A thin process shell around `exchange-sync-core`: loads configuration,
//! opens the cursor store, and drives the Change Worker until it shuts
//! down. Everything that implements the actual protocol lives in the
//! library crate; this binary only wires it to the operating system.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Result, WrapErr};

use exchange_sync_core::{AgentEvent, ChangeWorker, ExchangeClient, ExchangeConfig, SledCursorStore};

#[derive(Parser, Debug)]
#[command(name = "exchange-sync-agent")]
#[command(about = "Edge-node agent that synchronizes state with the Exchange")]
struct Args {
    /// Path to the agent's configuration file.
    #[arg(short, long, default_value = "exchange-sync-agent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the agent until it is signalled to stop.
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("exchange_sync_agent=info".parse()?),
        )
        .init();

    let args = Args::parse();

    match args.cmd {
        Command::Run => run(&args.config).await?,
    }

    Ok(())
}

async fn run(config_path: &PathBuf) -> Result<()> {
    tracing::info!(config = ?config_path, "loading configuration");
    let config = ExchangeConfig::load(config_path)
        .wrap_err_with(|| format!("loading configuration from {}", config_path.display()))?;

    let client = ExchangeClient::new(
        config.exchange_url.clone(),
        String::new(),
        String::new(),
        config.connect_timeout(),
        config.read_timeout(),
    )
    .wrap_err("building exchange client")?;

    let store = SledCursorStore::open(&config.store_path)
        .wrap_err_with(|| format!("opening cursor store at {}", config.store_path))?;

    tracing::info!(exchange_url = %config.exchange_url, "starting change worker");
    let worker = ChangeWorker::new(config, Arc::new(client), Arc::new(store));

    // Nothing external feeds agent-wide bus events into this standalone
    // binary yet; a real deployment wires `agent_tx` to its registration
    // and policy workers. Here it only carries the shutdown signal.
    let (agent_tx, agent_rx) = tokio::sync::broadcast::channel::<AgentEvent>(16);

    let handle = worker.spawn(agent_rx);
    shutdown_on_signal().await;
    tracing::info!("shutdown signal received");
    let _ = agent_tx.send(AgentEvent::Shutdown {
        reason: exchange_sync_core::ShutdownReason::MessageStop,
    });
    handle.join().await;

    Ok(())
}

async fn shutdown_on_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
