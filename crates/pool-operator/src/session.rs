use crate::{settings::Settings, snapshot::Snapshot};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use cocoon_pool_settlement::{
    Amount, CallContext, OutboxGateway, PoolEvent, SettlementEngine, Timestamp,
    constants::NANOS_PER_UNIT,
};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::{path::PathBuf, str::FromStr};
use tracing::{debug, info};

/// One CLI invocation against the persisted pool: load, operate, save.
pub struct Session {
    operator: String,
    state_file: PathBuf,
    engine: SettlementEngine<OutboxGateway>,
}

impl Session {
    pub fn open(settings: &Settings) -> Result<Self> {
        let snapshot = Snapshot::load_or_new(
            &settings.state_file,
            &settings.operator,
            settings.pool.clone(),
        )?;
        if snapshot.state.pool.config != settings.pool {
            debug!("Configured pool settings differ from the snapshot; the snapshot wins");
        }
        Ok(Self {
            operator: settings.operator.clone(),
            state_file: settings.state_file.clone(),
            engine: snapshot.into_engine(),
        })
    }

    pub fn engine(&self) -> &SettlementEngine<OutboxGateway> {
        &self.engine
    }

    /// Call context for `caller` (the operator when absent) at `now` (the wall clock when absent).
    pub fn ctx(&self, caller: Option<&str>, now: Option<Timestamp>) -> CallContext {
        CallContext::new(
            caller.unwrap_or(self.operator.as_str()),
            now.unwrap_or_else(|| Utc::now().timestamp()),
        )
    }

    /// Persists the state and returns the events committed during this session.
    ///
    /// Called whether or not the operation succeeded: a partially paid batch has already moved
    /// funds and must be recorded.
    pub fn commit(self) -> Result<Vec<PoolEvent>> {
        let events = self.engine.take_events();
        for event in &events {
            let payload = serde_json::to_string(event).context("Failed to serialize event")?;
            info!(event = event.name(), %payload, "committed");
        }
        let mut snapshot = Snapshot::from_engine(self.engine);
        snapshot
            .save(&self.state_file)
            .with_context(|| format!("Failed to persist pool state to {:?}", self.state_file))?;
        Ok(events)
    }
}

/// Parses a decimal unit amount such as `12.5` into base units.
pub fn parse_amount(value: &str) -> Result<Amount> {
    let units = Decimal::from_str(value.trim())
        .with_context(|| format!("Invalid amount: {value}"))?;
    if units.is_sign_negative() {
        bail!("Amount cannot be negative: {value}");
    }
    let base = units
        .checked_mul(Decimal::from(NANOS_PER_UNIT))
        .with_context(|| format!("Amount out of range: {value}"))?;
    if !base.fract().is_zero() {
        bail!("Amount has more than 9 decimal places: {value}");
    }
    base.to_u64()
        .with_context(|| format!("Amount out of range: {value}"))
}
