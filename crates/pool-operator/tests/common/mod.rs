#![allow(dead_code)]

use cocoon_pool_operator::settings::{PayoutSettings, Settings};
use cocoon_pool_settlement::PoolConfig;
use std::{fs, path::PathBuf};
use tempfile::TempDir;

pub const OPERATOR: &str = "EQBoperator";
pub const DAY: i64 = 86_400;

/// Create test settings pointing at a state file inside `dir`
pub fn create_test_settings(dir: &TempDir) -> Settings {
    Settings {
        log_level: "info".to_string(),
        operator: OPERATOR.to_string(),
        state_file: dir.path().join("pool.state.json"),
        pool: PoolConfig::default(),
        payout: PayoutSettings {
            max_retries: 3,
            min_delay_ms: 1,
            max_delay_ms: 5,
        },
        metrics: None,
    }
}

/// Write a TOML config with the required keys plus `extra` and return its path
pub fn write_config(dir: &TempDir, extra: toml::Table) -> PathBuf {
    let mut table = toml::Table::new();
    table.insert("log_level".into(), "info".into());
    table.insert("operator".into(), OPERATOR.into());
    table.insert(
        "state_file".into(),
        dir.path()
            .join("pool.state.json")
            .to_string_lossy()
            .into_owned()
            .into(),
    );
    table.extend(extra);

    let path = dir.path().join("cocoon.toml");
    fs::write(&path, toml::to_string(&table).unwrap()).unwrap();
    path
}
