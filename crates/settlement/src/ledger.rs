//! Participant Ledger.
//!
//! Holds per-participant stake, status, cumulative metrics and reputation, together with the
//! running `total_stake` that must always equal the sum of individual stakes.

use crate::{
    constants::{
        BPS_DENOMINATOR, INITIAL_REPUTATION, MAX_QUALITY, MAX_REPUTATION,
        SLASH_REPUTATION_PENALTY,
    },
    error::{PoolError, Result},
    registry::Pool,
    types::{Amount, Bps, ParticipantId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantStatus {
    Active,
    Inactive,
    Suspended,
    Withdrawing,
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Suspended => write!(f, "suspended"),
            Self::Withdrawing => write!(f, "withdrawing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub amount: Amount,
    pub requested_at: Timestamp,
}

impl PendingWithdrawal {
    pub fn unlocks_at(&self, delay_secs: i64) -> Timestamp {
        self.requested_at.saturating_add(delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub stake: Amount,
    pub status: ParticipantStatus,
    pub running_time_secs: u64,
    pub work_units: u64,
    pub task_count: u64,
    pub uptime_bps: Bps,
    pub outage_count: u32,
    pub reputation: u16,
    pub quality: u16,
    pub joined_at: Timestamp,
    pub last_heartbeat: Timestamp,
    pub pending_withdrawal: Option<PendingWithdrawal>,
    /// Lifetime rewards paid out, push and pull combined
    #[serde(default)]
    pub rewards_paid: Amount,
}

impl Participant {
    fn new(id: ParticipantId, stake: Amount, now: Timestamp) -> Self {
        Self {
            id,
            stake,
            status: ParticipantStatus::Active,
            running_time_secs: 0,
            work_units: 0,
            task_count: 0,
            uptime_bps: 0,
            outage_count: 0,
            reputation: INITIAL_REPUTATION,
            quality: 0,
            joined_at: now,
            last_heartbeat: now,
            pending_withdrawal: None,
            rewards_paid: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }
}

/// Lifetime metric increments carried by a single contribution update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionDelta {
    pub tasks: u64,
    pub work_units: u64,
    pub uptime_seconds: u64,
    pub quality: u16,
}

impl ContributionDelta {
    pub fn validate(&self, epoch_duration_secs: i64) -> Result<()> {
        if self.quality > MAX_QUALITY {
            return Err(PoolError::InvalidAmount(format!(
                "quality {} exceeds {MAX_QUALITY}",
                self.quality
            )));
        }
        let limit = u64::try_from(epoch_duration_secs).unwrap_or(0);
        if self.uptime_seconds > limit {
            return Err(PoolError::InvalidUptime(format!(
                "{} seconds exceeds the epoch duration of {limit}",
                self.uptime_seconds
            )));
        }
        Ok(())
    }
}

/// What a completed withdrawal did to the participant entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WithdrawalDisposition {
    /// Enough stake remained, participant is Active again
    Retained,
    /// Stake fell below the minimum but obligations remain
    Deactivated,
    /// Stake fell below the minimum and the entry was dropped
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalOutcome {
    pub amount: Amount,
    pub remaining_stake: Amount,
    pub disposition: WithdrawalDisposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlashOutcome {
    pub amount: Amount,
    pub remaining_stake: Amount,
    pub reputation: u16,
    pub suspended: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantLedger {
    participants: BTreeMap<ParticipantId, Participant>,
    total_stake: Amount,
}

impl ParticipantLedger {
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn total_stake(&self) -> Amount {
        self.total_stake
    }

    /// Recomputed sum of individual stakes, compared against `total_stake` by the invariant check.
    pub fn staked_sum(&self) -> Option<Amount> {
        self.participants
            .values()
            .try_fold(0u64, |acc, p| acc.checked_add(p.stake))
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn require(&self, id: &ParticipantId) -> Result<&Participant> {
        self.participants
            .get(id)
            .ok_or_else(|| PoolError::ParticipantNotFound(id.clone()))
    }

    fn require_mut(&mut self, id: &ParticipantId) -> Result<&mut Participant> {
        self.participants
            .get_mut(id)
            .ok_or_else(|| PoolError::ParticipantNotFound(id.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn register(
        &mut self,
        pool: &Pool,
        id: ParticipantId,
        stake: Amount,
        now: Timestamp,
    ) -> Result<&Participant> {
        let config = &pool.config;
        if stake < config.min_participant_stake {
            return Err(PoolError::InsufficientStake {
                required: config.min_participant_stake,
                provided: stake,
            });
        }
        pool.ensure_active()?;
        if self.participants.contains_key(&id) {
            return Err(PoolError::AlreadyRegistered(id));
        }
        let count = u32::try_from(self.participants.len()).unwrap_or(u32::MAX);
        if count >= config.max_participants {
            return Err(PoolError::PoolFull(config.max_participants));
        }
        let total_stake = self
            .total_stake
            .checked_add(stake)
            .ok_or(PoolError::ArithmeticOverflow("total stake"))?;

        self.total_stake = total_stake;
        info!(participant = %id, stake, "participant registered");
        let participant = self
            .participants
            .entry(id.clone())
            .or_insert_with(|| Participant::new(id, stake, now));
        Ok(participant)
    }

    /// Adds lifetime totals and refreshes uptime and heartbeat.
    pub fn apply_contribution(
        &mut self,
        id: &ParticipantId,
        delta: &ContributionDelta,
        uptime_bps: Bps,
        now: Timestamp,
    ) -> Result<()> {
        let participant = self.require_mut(id)?;
        participant.running_time_secs = participant
            .running_time_secs
            .saturating_add(delta.uptime_seconds);
        participant.work_units = participant.work_units.saturating_add(delta.work_units);
        participant.task_count = participant.task_count.saturating_add(delta.tasks);
        participant.quality = delta.quality;
        participant.uptime_bps = uptime_bps;
        participant.last_heartbeat = now;
        debug!(
            participant = %id,
            work_units = participant.work_units,
            uptime_bps,
            "contribution applied"
        );
        Ok(())
    }

    pub fn heartbeat(&mut self, id: &ParticipantId, now: Timestamp) -> Result<()> {
        let participant = self.require_mut(id)?;
        participant.last_heartbeat = now;
        Ok(())
    }

    /// Returns the lifetime outage count.
    pub fn record_outage(&mut self, id: &ParticipantId) -> Result<u32> {
        let participant = self.require_mut(id)?;
        participant.outage_count = participant.outage_count.saturating_add(1);
        Ok(participant.outage_count)
    }

    /// Returns the new stake.
    pub fn deposit(&mut self, id: &ParticipantId, amount: Amount, min_stake: Amount) -> Result<Amount> {
        if amount == 0 {
            return Err(PoolError::InvalidAmount("deposit must be greater than 0".to_string()));
        }
        let total_stake = self
            .total_stake
            .checked_add(amount)
            .ok_or(PoolError::ArithmeticOverflow("total stake"))?;
        let participant = self.require_mut(id)?;
        let stake = participant
            .stake
            .checked_add(amount)
            .ok_or(PoolError::ArithmeticOverflow("participant stake"))?;

        participant.stake = stake;
        if matches!(
            participant.status,
            ParticipantStatus::Suspended | ParticipantStatus::Inactive
        ) && stake >= min_stake
        {
            info!(participant = %id, stake, previous = %participant.status, "reactivated by deposit");
            participant.status = ParticipantStatus::Active;
        }
        self.total_stake = total_stake;
        Ok(stake)
    }

    pub fn request_withdrawal(
        &mut self,
        id: &ParticipantId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(PoolError::InvalidAmount(
                "withdrawal must be greater than 0".to_string(),
            ));
        }
        let participant = self.require_mut(id)?;
        if amount > participant.stake {
            return Err(PoolError::InsufficientStake {
                required: amount,
                provided: participant.stake,
            });
        }
        if participant.pending_withdrawal.is_some() {
            return Err(PoolError::WithdrawalAlreadyPending(id.clone()));
        }

        participant.pending_withdrawal = Some(PendingWithdrawal {
            amount,
            requested_at: now,
        });
        if amount == participant.stake {
            participant.status = ParticipantStatus::Withdrawing;
        }
        info!(participant = %id, amount, "withdrawal requested");
        Ok(())
    }

    /// Settles a matured withdrawal against the ledger. The caller issues the transfer.
    ///
    /// Pays `min(pending, stake)` since a slash may have landed after the request. When the
    /// remaining stake would fall below `min_stake` the remainder is paid out too and the entry
    /// is either dropped or, while `has_obligations`, kept as `Inactive` with zero stake.
    pub fn settle_withdrawal(
        &mut self,
        id: &ParticipantId,
        now: Timestamp,
        delay_secs: i64,
        min_stake: Amount,
        has_obligations: bool,
    ) -> Result<WithdrawalOutcome> {
        let participant = self.require_mut(id)?;
        let pending = participant.pending_withdrawal.ok_or_else(|| {
            PoolError::InvalidState(format!("no pending withdrawal for {id}"))
        })?;
        let unlocks_at = pending.unlocks_at(delay_secs);
        if now < unlocks_at {
            return Err(PoolError::TimelockActive { unlocks_at });
        }

        let mut amount = pending.amount.min(participant.stake);
        let mut remaining_stake = participant.stake - amount;
        let disposition = if remaining_stake < min_stake {
            amount = participant.stake;
            remaining_stake = 0;
            if has_obligations {
                WithdrawalDisposition::Deactivated
            } else {
                WithdrawalDisposition::Removed
            }
        } else {
            WithdrawalDisposition::Retained
        };

        participant.stake = remaining_stake;
        participant.pending_withdrawal = None;
        participant.status = match disposition {
            WithdrawalDisposition::Retained => ParticipantStatus::Active,
            WithdrawalDisposition::Deactivated | WithdrawalDisposition::Removed => {
                ParticipantStatus::Inactive
            }
        };
        self.total_stake = self.total_stake.saturating_sub(amount);
        if disposition == WithdrawalDisposition::Removed {
            self.participants.remove(id);
        }

        info!(participant = %id, amount, remaining_stake, ?disposition, "withdrawal settled");
        Ok(WithdrawalOutcome {
            amount,
            remaining_stake,
            disposition,
        })
    }

    /// `amount = None` slashes `stake * slash_bps / 10000`.
    pub fn slash(
        &mut self,
        id: &ParticipantId,
        amount: Option<Amount>,
        slash_bps: Bps,
        min_stake: Amount,
    ) -> Result<SlashOutcome> {
        let participant = self.require_mut(id)?;
        let amount = match amount {
            Some(0) => {
                return Err(PoolError::InvalidAmount("slash must be greater than 0".to_string()));
            }
            Some(amount) => amount,
            None => {
                let product = u128::from(participant.stake) * u128::from(slash_bps)
                    / u128::from(BPS_DENOMINATOR);
                u64::try_from(product).map_err(|_| PoolError::ArithmeticOverflow("slash amount"))?
            }
        };
        if amount > participant.stake {
            return Err(PoolError::ExcessiveSlash {
                requested: amount,
                stake: participant.stake,
            });
        }

        participant.stake -= amount;
        participant.reputation = participant.reputation.saturating_sub(SLASH_REPUTATION_PENALTY);
        let suspended = participant.stake < min_stake
            && matches!(
                participant.status,
                ParticipantStatus::Active | ParticipantStatus::Suspended
            );
        if suspended {
            participant.status = ParticipantStatus::Suspended;
        }
        let outcome = SlashOutcome {
            amount,
            remaining_stake: participant.stake,
            reputation: participant.reputation,
            suspended,
        };
        self.total_stake = self.total_stake.saturating_sub(amount);

        info!(
            participant = %id,
            amount,
            remaining_stake = outcome.remaining_stake,
            suspended,
            "participant slashed"
        );
        Ok(outcome)
    }

    /// Returns the previous reputation.
    pub fn update_reputation(&mut self, id: &ParticipantId, reputation: u16) -> Result<u16> {
        if reputation > MAX_REPUTATION {
            return Err(PoolError::InvalidAmount(format!(
                "reputation {reputation} exceeds {MAX_REPUTATION}"
            )));
        }
        let participant = self.require_mut(id)?;
        let previous = participant.reputation;
        participant.reputation = reputation;
        Ok(previous)
    }

    pub fn credit_reward(&mut self, id: &ParticipantId, amount: Amount) {
        if let Some(participant) = self.participants.get_mut(id) {
            participant.rewards_paid = participant.rewards_paid.saturating_add(amount);
        }
    }

    /// Undoes a credited reward after its transfer failed.
    pub fn debit_reward(&mut self, id: &ParticipantId, amount: Amount) {
        if let Some(participant) = self.participants.get_mut(id) {
            participant.rewards_paid = participant.rewards_paid.saturating_sub(amount);
        }
    }

    /// Drops an `Inactive`, zero-stake entry whose obligations are settled.
    pub fn release(&mut self, id: &ParticipantId) -> bool {
        let releasable = self.participants.get(id).is_some_and(|p| {
            p.status == ParticipantStatus::Inactive && p.stake == 0 && p.pending_withdrawal.is_none()
        });
        if releasable {
            self.participants.remove(id);
            info!(participant = %id, "participant released");
        }
        releasable
    }

    /// Puts an entry back exactly as it was before a failed operation.
    pub fn restore(&mut self, id: &ParticipantId, snapshot: Option<Participant>, total_stake: Amount) {
        match snapshot {
            Some(participant) => {
                self.participants.insert(id.clone(), participant);
            }
            None => {
                self.participants.remove(id);
            }
        }
        self.total_stake = total_stake;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{registry::PoolConfig, types::units};

    const MIN: Amount = units(10);

    fn active_pool() -> Pool {
        let mut pool = Pool::new(ParticipantId::from("operator"), PoolConfig::default());
        pool.initialize(1_000, units(100), 0).unwrap();
        pool
    }

    fn ledger_with(ids: &[(&str, u64)]) -> ParticipantLedger {
        let pool = active_pool();
        let mut ledger = ParticipantLedger::default();
        for (id, stake) in ids {
            ledger
                .register(&pool, ParticipantId::from(*id), units(*stake), 100)
                .unwrap();
        }
        ledger
    }

    fn alice() -> ParticipantId {
        ParticipantId::from("alice")
    }

    #[test]
    fn test_register_defaults() {
        let ledger = ledger_with(&[("alice", 15)]);
        let p = ledger.get(&alice()).unwrap();
        assert_eq!(p.status, ParticipantStatus::Active);
        assert_eq!(p.reputation, INITIAL_REPUTATION);
        assert_eq!(p.joined_at, 100);
        assert_eq!(p.last_heartbeat, 100);
        assert_eq!(ledger.total_stake(), units(15));
    }

    #[test]
    fn test_register_rejections() {
        let mut pool = active_pool();
        pool.config.max_participants = 1;
        let mut ledger = ParticipantLedger::default();

        assert_eq!(
            ledger.register(&pool, alice(), units(9), 0).map(|_| ()),
            Err(PoolError::InsufficientStake {
                required: MIN,
                provided: units(9),
            })
        );
        ledger.register(&pool, alice(), units(10), 0).unwrap();
        assert_eq!(
            ledger.register(&pool, alice(), units(10), 0).map(|_| ()),
            Err(PoolError::AlreadyRegistered(alice()))
        );
        assert_eq!(
            ledger
                .register(&pool, ParticipantId::from("bob"), units(10), 0)
                .map(|_| ()),
            Err(PoolError::PoolFull(1))
        );

        pool.pause().unwrap();
        assert_eq!(
            ledger
                .register(&pool, ParticipantId::from("carol"), units(10), 0)
                .map(|_| ()),
            Err(PoolError::PoolNotActive)
        );
        assert_eq!(ledger.total_stake(), units(10));
    }

    #[test]
    fn test_contribution_delta_validation() {
        let delta = ContributionDelta {
            uptime_seconds: 86_401,
            ..Default::default()
        };
        assert!(matches!(delta.validate(86_400), Err(PoolError::InvalidUptime(_))));

        let delta = ContributionDelta {
            quality: 1_001,
            ..Default::default()
        };
        assert!(matches!(delta.validate(86_400), Err(PoolError::InvalidAmount(_))));

        let delta = ContributionDelta {
            uptime_seconds: 86_400,
            quality: 1_000,
            ..Default::default()
        };
        assert!(delta.validate(86_400).is_ok());
    }

    #[test]
    fn test_apply_contribution_accumulates() {
        let mut ledger = ledger_with(&[("alice", 15)]);
        let delta = ContributionDelta {
            tasks: 5,
            work_units: 100,
            uptime_seconds: 3_600,
            quality: 900,
        };
        ledger.apply_contribution(&alice(), &delta, 4_166, 200).unwrap();
        ledger.apply_contribution(&alice(), &delta, 8_333, 300).unwrap();

        let p = ledger.get(&alice()).unwrap();
        assert_eq!(p.task_count, 10);
        assert_eq!(p.work_units, 200);
        assert_eq!(p.running_time_secs, 7_200);
        assert_eq!(p.uptime_bps, 8_333);
        assert_eq!(p.last_heartbeat, 300);
    }

    #[test]
    fn test_withdrawal_request_rules() {
        let mut ledger = ledger_with(&[("alice", 15)]);
        assert!(matches!(
            ledger.request_withdrawal(&alice(), 0, 0),
            Err(PoolError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.request_withdrawal(&alice(), units(16), 0),
            Err(PoolError::InsufficientStake { .. })
        ));
        ledger.request_withdrawal(&alice(), units(5), 0).unwrap();
        assert_eq!(
            ledger.request_withdrawal(&alice(), units(1), 0),
            Err(PoolError::WithdrawalAlreadyPending(alice()))
        );
        assert_eq!(ledger.get(&alice()).unwrap().status, ParticipantStatus::Active);
    }

    #[test]
    fn test_full_withdrawal_marks_withdrawing_and_removes() {
        let mut ledger = ledger_with(&[("alice", 15)]);
        ledger.request_withdrawal(&alice(), units(15), 0).unwrap();
        assert_eq!(
            ledger.get(&alice()).unwrap().status,
            ParticipantStatus::Withdrawing
        );

        assert_eq!(
            ledger.settle_withdrawal(&alice(), 10, 100, MIN, false),
            Err(PoolError::TimelockActive { unlocks_at: 100 })
        );
        let outcome = ledger.settle_withdrawal(&alice(), 100, 100, MIN, false).unwrap();
        assert_eq!(outcome.amount, units(15));
        assert_eq!(outcome.disposition, WithdrawalDisposition::Removed);
        assert!(ledger.get(&alice()).is_none());
        assert_eq!(ledger.total_stake(), 0);
    }

    #[test]
    fn test_partial_withdrawal_keeps_participant() {
        let mut ledger = ledger_with(&[("alice", 20)]);
        ledger.request_withdrawal(&alice(), units(5), 0).unwrap();
        let outcome = ledger.settle_withdrawal(&alice(), 100, 100, MIN, false).unwrap();
        assert_eq!(outcome.amount, units(5));
        assert_eq!(outcome.remaining_stake, units(15));
        assert_eq!(outcome.disposition, WithdrawalDisposition::Retained);
        assert_eq!(ledger.total_stake(), units(15));
    }

    #[test]
    fn test_withdrawal_below_minimum_pays_remainder() {
        let mut ledger = ledger_with(&[("alice", 15)]);
        ledger.request_withdrawal(&alice(), units(10), 0).unwrap();
        let outcome = ledger.settle_withdrawal(&alice(), 100, 100, MIN, true).unwrap();
        assert_eq!(outcome.amount, units(15));
        assert_eq!(outcome.disposition, WithdrawalDisposition::Deactivated);

        let p = ledger.get(&alice()).unwrap();
        assert_eq!(p.status, ParticipantStatus::Inactive);
        assert_eq!(p.stake, 0);
        assert_eq!(ledger.total_stake(), 0);
        assert!(ledger.release(&alice()));
        assert!(ledger.get(&alice()).is_none());
    }

    #[test]
    fn test_withdrawal_after_slash_pays_min_of_pending_and_stake() {
        let mut ledger = ledger_with(&[("alice", 15)]);
        ledger.request_withdrawal(&alice(), units(15), 0).unwrap();
        ledger.slash(&alice(), Some(units(3)), 1_000, MIN).unwrap();
        let outcome = ledger.settle_withdrawal(&alice(), 100, 100, MIN, false).unwrap();
        assert_eq!(outcome.amount, units(12));
    }

    #[test]
    fn test_settle_without_request() {
        let mut ledger = ledger_with(&[("alice", 15)]);
        assert!(matches!(
            ledger.settle_withdrawal(&alice(), 100, 100, MIN, false),
            Err(PoolError::InvalidState(_))
        ));
    }

    #[test]
    fn test_auto_slash_and_suspension() {
        let mut ledger = ledger_with(&[("alice", 10)]);
        let outcome = ledger.slash(&alice(), None, 1_000, MIN).unwrap();
        assert_eq!(outcome.amount, units(1));
        assert_eq!(outcome.remaining_stake, units(9));
        assert_eq!(outcome.reputation, 400);
        assert!(outcome.suspended);
        assert_eq!(
            ledger.get(&alice()).unwrap().status,
            ParticipantStatus::Suspended
        );
        assert_eq!(ledger.total_stake(), units(9));

        ledger.deposit(&alice(), units(1), MIN).unwrap();
        assert_eq!(ledger.get(&alice()).unwrap().status, ParticipantStatus::Active);
        assert_eq!(ledger.total_stake(), units(10));
    }

    #[test]
    fn test_excessive_slash_and_zero_slash() {
        let mut ledger = ledger_with(&[("alice", 10)]);
        assert_eq!(
            ledger.slash(&alice(), Some(units(11)), 1_000, MIN),
            Err(PoolError::ExcessiveSlash {
                requested: units(11),
                stake: units(10),
            })
        );
        assert!(matches!(
            ledger.slash(&alice(), Some(0), 1_000, MIN),
            Err(PoolError::InvalidAmount(_))
        ));
        assert_eq!(ledger.get(&alice()).unwrap().stake, units(10));
    }

    #[test]
    fn test_reputation_floor_on_repeated_slash() {
        let mut ledger = ledger_with(&[("alice", 100)]);
        ledger.update_reputation(&alice(), 150).unwrap();
        ledger.slash(&alice(), Some(1), 1_000, MIN).unwrap();
        let outcome = ledger.slash(&alice(), Some(1), 1_000, MIN).unwrap();
        assert_eq!(outcome.reputation, 0);
    }

    #[test]
    fn test_update_reputation_bounds() {
        let mut ledger = ledger_with(&[("alice", 10)]);
        assert_eq!(ledger.update_reputation(&alice(), 900), Ok(INITIAL_REPUTATION));
        assert!(matches!(
            ledger.update_reputation(&alice(), 1_001),
            Err(PoolError::InvalidAmount(_))
        ));
        assert_eq!(
            ledger.update_reputation(&ParticipantId::from("ghost"), 1),
            Err(PoolError::ParticipantNotFound(ParticipantId::from("ghost")))
        );
    }

    #[test]
    fn test_restore_reverts_entry_and_total() {
        let mut ledger = ledger_with(&[("alice", 15)]);
        let before = ledger.get(&alice()).cloned();
        let total = ledger.total_stake();
        ledger.request_withdrawal(&alice(), units(15), 0).unwrap();
        ledger.settle_withdrawal(&alice(), 100, 100, MIN, false).unwrap();
        assert!(ledger.get(&alice()).is_none());

        ledger.restore(&alice(), before.clone(), total);
        assert_eq!(ledger.get(&alice()).cloned(), before);
        assert_eq!(ledger.total_stake(), units(15));
        assert_eq!(ledger.staked_sum(), Some(units(15)));
    }
}
