use crate::settings::Settings;
use anyhow::{Result, bail};
use std::net::{IpAddr, SocketAddr};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate the configuration values
pub fn validate_config(settings: &Settings) -> Result<()> {
    if !LOG_LEVELS.contains(&settings.log_level.to_lowercase().as_str()) {
        bail!(
            "Invalid log level: {}. Must be one of: {}",
            settings.log_level,
            LOG_LEVELS.join(", ")
        );
    }

    if settings.operator.trim().is_empty() {
        bail!("Operator identity cannot be empty");
    }

    if settings.state_file.as_os_str().is_empty() {
        bail!("State file path cannot be empty");
    }

    // Validate pool settings
    let pool = &settings.pool;
    if pool.min_operator_stake == 0 {
        bail!("Pool min_operator_stake must be greater than 0");
    }

    if pool.min_participant_stake == 0 {
        bail!("Pool min_participant_stake must be greater than 0");
    }

    if pool.max_participants == 0 {
        bail!("Pool max_participants must be greater than 0");
    }

    if pool.epoch_duration_secs <= 0 {
        bail!(
            "Pool epoch_duration_secs must be positive, got {}",
            pool.epoch_duration_secs
        );
    }

    if pool.withdrawal_delay_secs < 0 {
        bail!(
            "Pool withdrawal_delay_secs must be non-negative, got {}",
            pool.withdrawal_delay_secs
        );
    }

    if pool.slash_bps > 10_000 {
        bail!(
            "Pool slash_bps must be between 0 and 10000, got {}",
            pool.slash_bps
        );
    }

    if pool.max_batch_size == 0 {
        bail!("Pool max_batch_size must be greater than 0");
    }

    if let Err(err) = pool.scoring.validate() {
        bail!("Invalid scoring configuration: {err}");
    }

    // Validate payout retry settings
    if settings.payout.min_delay_ms > settings.payout.max_delay_ms {
        bail!(
            "Payout min_delay_ms ({}) cannot exceed max_delay_ms ({})",
            settings.payout.min_delay_ms,
            settings.payout.max_delay_ms
        );
    }

    if let Some(metrics) = &settings.metrics
        && !validate_socket_addr(&metrics.addr)
    {
        bail!("Invalid SocketAddr: {}", metrics.addr)
    }

    Ok(())
}

fn validate_socket_addr(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(ipv4) => !ipv4.is_broadcast() && !ipv4.is_multicast(),
        IpAddr::V6(ipv6) => !ipv6.is_unspecified() && !ipv6.is_multicast(),
    }
}
