use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use cocoon_pool_settlement::{
    OutboxGateway, PoolConfig, PoolState, SettlementEngine, TransferInstruction,
};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

const TEMP_SUFFIX: &str = ".tmp";
const BACKUP_SUFFIX: &str = ".backup";

/// `pool.json` -> `pool.json<suffix>`, next to the original.
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(suffix);
    path.with_file_name(name)
}

/// Writes `contents` to a sibling temp file, syncs it and renames it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {parent:?}"))?;
    }

    let temp_path = sibling(path, TEMP_SUFFIX);
    let mut temp_file = fs::File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {temp_path:?}"))?;
    temp_file
        .write_all(contents)
        .and_then(|()| temp_file.sync_all())
        .with_context(|| format!("Failed to write temp file: {temp_path:?}"))?;
    drop(temp_file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {temp_path:?} to {path:?}"))
}

/// Pool state and outbound transfer history persisted between invocations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: PoolState,
    /// Every transfer issued so far, in order. Rebuilds the outbox dedup index on load
    #[serde(default)]
    pub transfers: Vec<TransferInstruction>,
    pub saved_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(operator: &str, config: PoolConfig) -> Self {
        Self {
            state: PoolState::new(operator.into(), config),
            transfers: Vec::new(),
            saved_at: Utc::now(),
        }
    }

    /// Load the snapshot, or start a fresh pool if none exists.
    ///
    /// A file that fails to parse is copied aside to `<file>.backup` and the load fails.
    pub fn load_or_new(path: &Path, operator: &str, config: PoolConfig) -> Result<Self> {
        if !path.exists() {
            debug!("No existing snapshot found at {:?}, starting a new pool", path);
            return Ok(Self::new(operator, config));
        }

        debug!("Loading snapshot from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {path:?}"))?;

        match serde_json::from_str::<Snapshot>(&contents) {
            Ok(snapshot) => {
                info!(
                    status = %snapshot.state.pool.status,
                    participants = snapshot.state.ledger.len(),
                    transfers = snapshot.transfers.len(),
                    saved_at = %snapshot.saved_at,
                    "Loaded pool snapshot"
                );
                if snapshot.state.pool.operator.as_str() != operator {
                    bail!(
                        "State file {path:?} belongs to operator {}, configured operator is {operator}",
                        snapshot.state.pool.operator
                    );
                }
                Ok(snapshot)
            }
            Err(e) => {
                let backup_path = sibling(path, BACKUP_SUFFIX);
                warn!(
                    "State file corrupted: {}. Creating backup at {:?}",
                    e, backup_path
                );
                if let Err(backup_err) = fs::copy(path, &backup_path) {
                    warn!("Failed to backup corrupted state file: {}", backup_err);
                }
                Err(e).with_context(|| format!("Failed to parse state file: {path:?}"))
            }
        }
    }

    /// Save the snapshot atomically, stamping `saved_at`.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.saved_at = Utc::now();
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize pool snapshot")?;
        write_atomic(path, contents.as_bytes())?;
        debug!(
            transfers = self.transfers.len(),
            bytes = contents.len(),
            "Saved pool snapshot to {:?}",
            path
        );
        Ok(())
    }

    pub fn into_engine(self) -> SettlementEngine<OutboxGateway> {
        SettlementEngine::from_state(self.state, OutboxGateway::with_history(self.transfers))
    }

    pub fn from_engine(engine: SettlementEngine<OutboxGateway>) -> Self {
        let (state, gateway) = engine.into_parts();
        Self {
            state,
            transfers: gateway.sent(),
            saved_at: Utc::now(),
        }
    }
}
