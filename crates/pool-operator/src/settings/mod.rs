pub mod validation;

use anyhow::{Context, Result};
use cocoon_pool_settlement::{PoolConfig, format_amount};
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use validation::validate_config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Identity of the pool operator; operator-only commands run as this caller
    pub operator: String,
    /// JSON snapshot holding pool state and sent transfers between invocations
    pub state_file: PathBuf,
    /// Pool-wide configuration handed to the settlement engine
    #[serde(default)]
    pub pool: PoolConfig,
    /// Retry policy for payout transfers
    #[serde(default)]
    pub payout: PayoutSettings,
    /// Prometheus exporter, disabled when absent
    pub metrics: Option<MetricsSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutSettings {
    /// Maximum retries for a failed batch
    pub max_retries: usize,
    /// Initial backoff in milliseconds
    pub min_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,
}

impl Default for PayoutSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

impl PayoutSettings {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Listen address of the Prometheus exporter, e.g. 0.0.0.0:9090
    pub addr: SocketAddr,
}

impl Settings {
    /// Load settings from a TOML file, overlaid with `COCOON__*` environment variables
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings = ConfigBuilder::builder()
            .add_source(File::with_name(&path.to_string_lossy()))
            .add_source(Environment::with_prefix("COCOON").separator("__").try_parsing(true))
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path.display()))?;

        let settings: Settings = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        validate_config(&settings)?;
        Ok(settings)
    }

    /// Load settings from the environment, reading `.env` first when present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = ConfigBuilder::builder()
            .add_source(Environment::with_prefix("COCOON").separator("__").try_parsing(true))
            .build()
            .context("Failed to build configuration from environment")?;

        let settings: Settings = settings
            .try_deserialize()
            .context("Failed to deserialize configuration from environment")?;

        validate_config(&settings)?;
        Ok(settings)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics.as_ref().map(|metrics| metrics.addr)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Settings:")?;
        writeln!(f, "  log_level: {}", self.log_level)?;
        writeln!(f, "  operator: {}", self.operator)?;
        writeln!(f, "  state_file: {}", self.state_file.display())?;
        writeln!(f, "  pool:")?;
        writeln!(
            f,
            "    min_operator_stake: {}",
            format_amount(self.pool.min_operator_stake)
        )?;
        writeln!(
            f,
            "    min_participant_stake: {}",
            format_amount(self.pool.min_participant_stake)
        )?;
        writeln!(f, "    max_participants: {}", self.pool.max_participants)?;
        writeln!(f, "    epoch_duration_secs: {}", self.pool.epoch_duration_secs)?;
        writeln!(f, "    withdrawal_delay_secs: {}", self.pool.withdrawal_delay_secs)?;
        writeln!(f, "    slash_bps: {}", self.pool.slash_bps)?;
        writeln!(f, "    max_batch_size: {}", self.pool.max_batch_size)?;
        let weights = &self.pool.scoring.weights;
        writeln!(
            f,
            "    scoring: work={} uptime={} tasks={} quality={}",
            weights.work, weights.uptime, weights.tasks, weights.quality
        )?;
        writeln!(f, "  payout:")?;
        writeln!(f, "    max_retries: {}", self.payout.max_retries)?;
        writeln!(f, "    min_delay_ms: {}", self.payout.min_delay_ms)?;
        writeln!(f, "    max_delay_ms: {}", self.payout.max_delay_ms)?;
        if let Some(metrics) = &self.metrics {
            writeln!(f, "  metrics:")?;
            writeln!(f, "    addr: {}", metrics.addr)?;
        }
        Ok(())
    }
}
