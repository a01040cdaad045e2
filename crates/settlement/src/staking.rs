//! Staking/Withdrawal Manager.
//!
//! Couples ledger stake mutations with the transfer primitive. Every operation validates,
//! mutates and only then transfers; a failed transfer puts the participant entry back exactly
//! as it was.

use crate::{
    error::{PoolError, Result},
    ledger::{SlashOutcome, WithdrawalOutcome},
    state::PoolState,
    transfer::{TransferGateway, TransferInstruction},
    types::{Amount, ParticipantId, Timestamp},
};
use tracing::{error, info};

pub struct StakingManager<'a, G: TransferGateway + ?Sized> {
    state: &'a mut PoolState,
    gateway: &'a G,
}

impl<'a, G: TransferGateway + ?Sized> StakingManager<'a, G> {
    pub fn new(state: &'a mut PoolState, gateway: &'a G) -> Self {
        Self { state, gateway }
    }

    /// Returns the new stake.
    pub fn deposit(&mut self, participant: &ParticipantId, amount: Amount) -> Result<Amount> {
        self.state.ledger.require(participant)?;
        if amount == 0 {
            return Err(PoolError::InvalidAmount(
                "deposit must be greater than 0".to_string(),
            ));
        }
        self.state.pool.ensure_open()?;
        let min_stake = self.state.pool.config.min_participant_stake;
        let stake = self.state.ledger.deposit(participant, amount, min_stake)?;
        info!(participant = %participant, amount, stake, "stake deposited");
        Ok(stake)
    }

    /// Returns the unlock timestamp.
    pub fn request_withdrawal(
        &mut self,
        participant: &ParticipantId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Timestamp> {
        self.state.ledger.request_withdrawal(participant, amount, now)?;
        Ok(now.saturating_add(self.state.pool.config.withdrawal_delay_secs))
    }

    pub fn complete_withdrawal(
        &mut self,
        participant: &ParticipantId,
        now: Timestamp,
    ) -> Result<WithdrawalOutcome> {
        let snapshot = self.state.ledger.require(participant)?.clone();
        let total_before = self.state.ledger.total_stake();
        let seq_before = self.state.withdrawal_seq;

        let config = &self.state.pool.config;
        let (delay, min_stake) = (config.withdrawal_delay_secs, config.min_participant_stake);
        let has_obligations = self.state.distribution.has_obligations(participant);
        let outcome = self.state.ledger.settle_withdrawal(
            participant,
            now,
            delay,
            min_stake,
            has_obligations,
        )?;

        if outcome.amount > 0 {
            let seq = seq_before.saturating_add(1);
            self.state.withdrawal_seq = seq;
            let instruction = TransferInstruction {
                destination: participant.clone(),
                amount: outcome.amount,
                correlation_id: format!("withdrawal:{participant}:{seq}"),
            };
            if let Err(err) = self.gateway.transfer(&instruction) {
                self.state
                    .ledger
                    .restore(participant, Some(snapshot), total_before);
                self.state.withdrawal_seq = seq_before;
                error!(
                    participant = %participant,
                    correlation_id = %instruction.correlation_id,
                    error = %err,
                    "withdrawal transfer failed, stake restored"
                );
                return Err(PoolError::TransferFailed {
                    correlation_id: instruction.correlation_id,
                    completed: 0,
                    reason: err.to_string(),
                });
            }
        }

        assert_stake_invariant(self.state);
        Ok(outcome)
    }

    /// `amount = None` applies the configured automatic slash.
    pub fn slash(
        &mut self,
        participant: &ParticipantId,
        amount: Option<Amount>,
    ) -> Result<SlashOutcome> {
        let config = &self.state.pool.config;
        let (slash_bps, min_stake) = (config.slash_bps, config.min_participant_stake);
        let outcome = self
            .state
            .ledger
            .slash(participant, amount, slash_bps, min_stake)?;

        self.state.pool.slashed_total = self.state.pool.slashed_total.saturating_add(outcome.amount);
        if outcome.suspended {
            self.state.distribution.revoke_eligibility(participant);
        }
        assert_stake_invariant(self.state);
        Ok(outcome)
    }
}

/// Checked after every stake mutation in debug builds.
pub fn assert_stake_invariant(state: &PoolState) {
    debug_assert!(
        state.stake_invariant_holds(),
        "total stake {} does not match the sum of participant stakes {:?}",
        state.ledger.total_stake(),
        state.ledger.staked_sum()
    );
}
