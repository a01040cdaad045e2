mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::{
    CallArgs, epoch::EpochCommands, participant::ParticipantCommands, pool::PoolCommands,
    query::QueryCommands,
};
use cocoon_pool_operator::settings::Settings;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "cocoon-pool",
    about = "Operator tooling for a Cocoon GPU pool: stakes, contributions and epoch payouts",
    version,
    author,
    after_help = r#"Configuration:
    Configuration can be provided via:
    1. Environment variables with COCOON__ prefix (e.g., COCOON__POOL__MAX_BATCH_SIZE)
    2. .env file in the current directory
    3. Config file with -c option (TOML)

Examples:
    # Start a pool at 10% commission
    cocoon-pool init --commission-bps 1000 --operator-stake 100

    # Register, report work, pay revenue in
    cocoon-pool register --participant EQBalice --stake 15 --caller EQBalice
    cocoon-pool report --participant EQBalice --work-units 1200 --uptime-seconds 86000
    cocoon-pool revenue --amount 100 --caller EQBclient

    # Settle the epoch
    cocoon-pool finalize
    cocoon-pool calculate --epoch 0
    cocoon-pool pay --epoch 0

    # Inspect
    cocoon-pool status
    cocoon-pool export --report summary --format json-pretty"#
)]
pub struct Cli {
    /// Path to the configuration file (TOML format)
    ///
    /// If not provided, will attempt to load from environment variables
    #[clap(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub call: CallArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(flatten)]
    Pool(PoolCommands),
    #[command(flatten)]
    Participant(ParticipantCommands),
    #[command(flatten)]
    Epoch(EpochCommands),
    #[command(flatten)]
    Query(QueryCommands),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings = if let Some(config_path) = &self.config {
            Settings::from_path(config_path)?
        } else {
            Settings::from_env()?
        };
        init_logging(&settings.log_level)?;
        debug!("{settings}");

        if let Some(addr) = settings.metrics_addr() {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("Failed to install Prometheus exporter")?;
            info!(%addr, "Prometheus exporter listening");
        }

        match self.command {
            Commands::Pool(cmd) => cli::pool::handle(&settings, &self.call, cmd).await,
            Commands::Participant(cmd) => {
                cli::participant::handle(&settings, &self.call, cmd).await
            }
            Commands::Epoch(cmd) => cli::epoch::handle(&settings, &self.call, cmd).await,
            Commands::Query(cmd) => cli::query::handle(&settings, cmd).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run().await
}

fn init_logging(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_writer(std::io::stderr),
        )
        .init();

    Ok(())
}
