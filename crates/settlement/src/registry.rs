//! Pool Registry: pool-wide configuration and lifecycle.
//!
//! Lifecycle: `Uninitialized -> Active <-> Paused -> Closed`. `Closed` is terminal.

use crate::{
    constants::{
        DEFAULT_EPOCH_DURATION_SECS, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_PARTICIPANTS,
        DEFAULT_MIN_OPERATOR_STAKE, DEFAULT_MIN_PARTICIPANT_STAKE, DEFAULT_SLASH_BPS,
        DEFAULT_WITHDRAWAL_DELAY_SECS, MAX_COMMISSION_BPS, MIN_COMMISSION_BPS,
    },
    error::{PoolError, Result},
    scorer::ScoringConfig,
    types::{Amount, Bps, ParticipantId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Pool-wide configuration consumed by the ledger, scorer and distribution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Minimum operator stake accepted by `initialize`
    pub min_operator_stake: Amount,
    /// Minimum stake a participant must keep to stay Active
    pub min_participant_stake: Amount,
    /// Upper bound on registered participants
    pub max_participants: u32,
    /// Wall-clock length of an epoch in seconds
    pub epoch_duration_secs: i64,
    /// Delay between a withdrawal request and its completion
    pub withdrawal_delay_secs: i64,
    /// Fraction of stake taken by an automatic slash
    pub slash_bps: Bps,
    /// Largest participant subset accepted by a single `execute_batch`
    pub max_batch_size: usize,
    /// Contribution score weights and normalization
    pub scoring: ScoringConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_operator_stake: DEFAULT_MIN_OPERATOR_STAKE,
            min_participant_stake: DEFAULT_MIN_PARTICIPANT_STAKE,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            epoch_duration_secs: DEFAULT_EPOCH_DURATION_SECS,
            withdrawal_delay_secs: DEFAULT_WITHDRAWAL_DELAY_SECS,
            slash_bps: DEFAULT_SLASH_BPS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            scoring: ScoringConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    Uninitialized,
    Active,
    Paused,
    Closed,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub operator: ParticipantId,
    pub status: PoolStatus,
    pub commission_bps: Bps,
    pub operator_stake: Amount,
    pub config: PoolConfig,
    /// Commission plus reconciliation residuals booked to the operator
    pub operator_earnings: Amount,
    /// Stake removed by slashing, held by the pool
    pub slashed_total: Amount,
    pub initialized_at: Option<Timestamp>,
}

pub fn validate_commission(commission_bps: Bps) -> Result<()> {
    if !(MIN_COMMISSION_BPS..=MAX_COMMISSION_BPS).contains(&commission_bps) {
        return Err(PoolError::InvalidCommission(commission_bps));
    }
    Ok(())
}

impl Pool {
    pub fn new(operator: ParticipantId, config: PoolConfig) -> Self {
        Self {
            operator,
            status: PoolStatus::Uninitialized,
            commission_bps: MIN_COMMISSION_BPS,
            operator_stake: 0,
            config,
            operator_earnings: 0,
            slashed_total: 0,
            initialized_at: None,
        }
    }

    pub fn is_operator(&self, caller: &ParticipantId) -> bool {
        &self.operator == caller
    }

    pub fn ensure_operator(&self, caller: &ParticipantId, operation: &'static str) -> Result<()> {
        if !self.is_operator(caller) {
            return Err(PoolError::Unauthorized {
                caller: caller.clone(),
                operation,
            });
        }
        Ok(())
    }

    pub fn ensure_active(&self) -> Result<()> {
        match self.status {
            PoolStatus::Active => Ok(()),
            _ => Err(PoolError::PoolNotActive),
        }
    }

    /// Active or Paused: the pool exists and still holds funds.
    pub fn ensure_open(&self) -> Result<()> {
        match self.status {
            PoolStatus::Active | PoolStatus::Paused => Ok(()),
            _ => Err(PoolError::PoolNotActive),
        }
    }

    pub fn initialize(
        &mut self,
        commission_bps: Bps,
        operator_stake: Amount,
        now: Timestamp,
    ) -> Result<()> {
        if self.status != PoolStatus::Uninitialized {
            return Err(PoolError::AlreadyInitialized);
        }
        validate_commission(commission_bps)?;
        if operator_stake < self.config.min_operator_stake {
            return Err(PoolError::InsufficientStake {
                required: self.config.min_operator_stake,
                provided: operator_stake,
            });
        }

        self.commission_bps = commission_bps;
        self.operator_stake = operator_stake;
        self.status = PoolStatus::Active;
        self.initialized_at = Some(now);

        info!(
            operator = %self.operator,
            commission_bps,
            operator_stake,
            "pool initialized"
        );
        Ok(())
    }

    /// Returns the previous rate.
    pub fn set_commission(&mut self, commission_bps: Bps) -> Result<Bps> {
        validate_commission(commission_bps)?;
        match self.status {
            PoolStatus::Uninitialized => return Err(PoolError::PoolNotActive),
            PoolStatus::Closed => {
                return Err(PoolError::InvalidState(
                    "commission is frozen once the pool is closed".to_string(),
                ));
            }
            PoolStatus::Active | PoolStatus::Paused => {}
        }

        let previous = self.commission_bps;
        self.commission_bps = commission_bps;
        info!(previous, commission_bps, "commission updated");
        Ok(previous)
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.status != PoolStatus::Active {
            return Err(PoolError::InvalidState(format!(
                "cannot pause a {} pool",
                self.status
            )));
        }
        self.status = PoolStatus::Paused;
        info!("pool paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.status != PoolStatus::Paused {
            return Err(PoolError::InvalidState(format!(
                "cannot resume a {} pool",
                self.status
            )));
        }
        self.status = PoolStatus::Active;
        info!("pool resumed");
        Ok(())
    }

    /// Settlement preconditions are checked by the engine before calling this.
    pub fn close(&mut self) -> Result<()> {
        match self.status {
            PoolStatus::Active | PoolStatus::Paused => {
                self.status = PoolStatus::Closed;
                info!("pool closed");
                Ok(())
            }
            status => Err(PoolError::InvalidState(format!(
                "cannot close a {status} pool"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::units;

    fn pool() -> Pool {
        Pool::new(ParticipantId::from("operator"), PoolConfig::default())
    }

    #[test]
    fn test_initialize_success() {
        let mut pool = pool();
        pool.initialize(1_000, units(100), 1_700_000_000).unwrap();
        assert_eq!(pool.status, PoolStatus::Active);
        assert_eq!(pool.commission_bps, 1_000);
        assert_eq!(pool.operator_stake, units(100));
        assert_eq!(pool.initialized_at, Some(1_700_000_000));
    }

    #[test]
    fn test_initialize_rejects_bad_commission_and_stake() {
        let mut pool = pool();
        assert_eq!(
            pool.initialize(499, units(100), 0),
            Err(PoolError::InvalidCommission(499))
        );
        assert_eq!(
            pool.initialize(1_501, units(100), 0),
            Err(PoolError::InvalidCommission(1_501))
        );
        assert!(matches!(
            pool.initialize(1_000, units(99), 0),
            Err(PoolError::InsufficientStake { .. })
        ));
        assert_eq!(pool.status, PoolStatus::Uninitialized);
    }

    #[test]
    fn test_initialize_twice() {
        let mut pool = pool();
        pool.initialize(500, units(100), 0).unwrap();
        assert_eq!(
            pool.initialize(500, units(100), 0),
            Err(PoolError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_commission_bounds_are_inclusive() {
        let mut pool = pool();
        pool.initialize(1_000, units(100), 0).unwrap();
        assert_eq!(pool.set_commission(500), Ok(1_000));
        assert_eq!(pool.set_commission(1_500), Ok(500));
        assert_eq!(pool.set_commission(1_501), Err(PoolError::InvalidCommission(1_501)));
        assert_eq!(pool.commission_bps, 1_500);
    }

    #[test]
    fn test_commission_frozen_after_close() {
        let mut pool = pool();
        pool.initialize(1_000, units(100), 0).unwrap();
        pool.close().unwrap();
        assert!(matches!(
            pool.set_commission(700),
            Err(PoolError::InvalidState(_))
        ));
        assert_eq!(pool.commission_bps, 1_000);
    }

    #[test]
    fn test_pause_resume_close_transitions() {
        let mut pool = pool();
        assert!(pool.pause().is_err());
        pool.initialize(1_000, units(100), 0).unwrap();

        assert!(pool.resume().is_err());
        pool.pause().unwrap();
        assert_eq!(pool.status, PoolStatus::Paused);
        assert!(pool.pause().is_err());
        assert_eq!(pool.ensure_active(), Err(PoolError::PoolNotActive));
        assert!(pool.ensure_open().is_ok());

        pool.resume().unwrap();
        assert_eq!(pool.status, PoolStatus::Active);

        pool.pause().unwrap();
        pool.close().unwrap();
        assert_eq!(pool.status, PoolStatus::Closed);
        assert!(pool.resume().is_err());
        assert!(pool.close().is_err());
        assert_eq!(pool.ensure_open(), Err(PoolError::PoolNotActive));
    }

    #[test]
    fn test_ensure_operator() {
        let pool = pool();
        assert!(pool.ensure_operator(&ParticipantId::from("operator"), "pause").is_ok());
        assert_eq!(
            pool.ensure_operator(&ParticipantId::from("mallory"), "pause"),
            Err(PoolError::Unauthorized {
                caller: ParticipantId::from("mallory"),
                operation: "pause",
            })
        );
    }
}
