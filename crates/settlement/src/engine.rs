//! Single-writer settlement engine.
//!
//! Every public operation takes the state lock once, checks authorization, validates, mutates
//! and issues any outbound transfer last. Committed operations append [`PoolEvent`]s that a host
//! drains with [`SettlementEngine::take_events`].

use crate::{
    distribution::{CalculationOutcome, ClaimProof, Epoch, PayoutChannel, PlannedPayout},
    error::{PoolError, Result},
    events::PoolEvent,
    ledger::{ContributionDelta, Participant, WithdrawalDisposition},
    registry::{Pool, PoolConfig, PoolStatus},
    staking::{StakingManager, assert_stake_invariant},
    state::PoolState,
    transfer::{TransferGateway, TransferInstruction, TransferStatus},
    types::{Amount, Bps, CallContext, EpochId, ParticipantId, Timestamp},
};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaidEntry {
    pub participant: ParticipantId,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub epoch: EpochId,
    pub paid: Vec<PaidEntry>,
    /// Entries that were already paid or repeated in the request
    pub skipped: usize,
    pub epoch_closed: bool,
}

impl BatchReport {
    pub fn total_paid(&self) -> Amount {
        self.paid
            .iter()
            .fold(0u64, |acc, entry| acc.saturating_add(entry.amount))
    }
}

#[derive(Debug)]
struct Inner {
    state: PoolState,
    events: Vec<PoolEvent>,
}

#[derive(Debug)]
pub struct SettlementEngine<G: TransferGateway> {
    inner: Mutex<Inner>,
    gateway: G,
}

impl<G: TransferGateway> SettlementEngine<G> {
    pub fn new(operator: impl Into<ParticipantId>, config: PoolConfig, gateway: G) -> Result<Self> {
        config.scoring.validate()?;
        Ok(Self::from_state(
            PoolState::new(operator.into(), config),
            gateway,
        ))
    }

    /// Resumes from previously persisted state.
    pub fn from_state(state: PoolState, gateway: G) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                events: Vec::new(),
            }),
            gateway,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn snapshot(&self) -> PoolState {
        self.lock().state.clone()
    }

    pub fn into_parts(self) -> (PoolState, G) {
        let inner = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        (inner.state, self.gateway)
    }

    pub fn take_events(&self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.lock().events)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut PoolState, &mut Vec<PoolEvent>, &G) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.lock();
        let Inner { state, events } = &mut *guard;
        let result = f(state, events, &self.gateway);

        match &result {
            Ok(_) => {
                metrics::counter!("cocoon_pool_operations_total", "operation" => operation)
                    .increment(1);
            }
            Err(err) => {
                warn!(operation, code = err.code(), class = %err.class(), error = %err, "operation rejected");
                metrics::counter!(
                    "cocoon_pool_rejections_total",
                    "operation" => operation,
                    "error" => err.name()
                )
                .increment(1);
            }
        }
        metrics::gauge!("cocoon_pool_total_stake").set(state.ledger.total_stake() as f64);
        metrics::gauge!("cocoon_pool_participants").set(state.ledger.len() as f64);
        assert_stake_invariant(state);
        result
    }

    // Pool Registry

    pub fn initialize(&self, ctx: &CallContext, commission_bps: Bps, operator_stake: Amount) -> Result {
        self.run("initialize", |state, events, _| {
            state.pool.ensure_operator(&ctx.caller, "initialize")?;
            state.pool.initialize(commission_bps, operator_stake, ctx.now)?;
            let first_epoch = state
                .distribution
                .start(ctx.now, state.pool.config.epoch_duration_secs)?;
            emit(
                events,
                PoolEvent::PoolInitialized {
                    operator: state.pool.operator.clone(),
                    commission_bps,
                    operator_stake,
                    first_epoch,
                },
            );
            Ok(())
        })
    }

    pub fn set_commission(&self, ctx: &CallContext, commission_bps: Bps) -> Result {
        self.run("set_commission", |state, events, _| {
            state.pool.ensure_operator(&ctx.caller, "set_commission")?;
            let previous_bps = state.pool.set_commission(commission_bps)?;
            emit(
                events,
                PoolEvent::CommissionUpdated {
                    previous_bps,
                    commission_bps,
                },
            );
            Ok(())
        })
    }

    pub fn pause(&self, ctx: &CallContext) -> Result {
        self.run("pause", |state, events, _| {
            state.pool.ensure_operator(&ctx.caller, "pause")?;
            state.pool.pause()?;
            emit(events, PoolEvent::PoolPaused);
            Ok(())
        })
    }

    pub fn resume(&self, ctx: &CallContext) -> Result {
        self.run("resume", |state, events, _| {
            state.pool.ensure_operator(&ctx.caller, "resume")?;
            state.pool.resume()?;
            emit(events, PoolEvent::PoolResumed);
            Ok(())
        })
    }

    pub fn close(&self, ctx: &CallContext) -> Result {
        self.run("close", |state, events, _| {
            state.pool.ensure_operator(&ctx.caller, "close")?;
            if matches!(state.pool.status, PoolStatus::Active | PoolStatus::Paused) {
                state.distribution.ensure_settled()?;
            }
            state.pool.close()?;
            emit(events, PoolEvent::PoolClosed);
            Ok(())
        })
    }

    // Participant Ledger

    /// The participant may register itself, or the operator may register on its behalf.
    pub fn register(&self, ctx: &CallContext, participant: &ParticipantId, stake: Amount) -> Result {
        self.run("register", |state, events, _| {
            if &ctx.caller != participant && !state.pool.is_operator(&ctx.caller) {
                return Err(PoolError::Unauthorized {
                    caller: ctx.caller.clone(),
                    operation: "register",
                });
            }
            state
                .ledger
                .register(&state.pool, participant.clone(), stake, ctx.now)?;
            emit(
                events,
                PoolEvent::ParticipantRegistered {
                    participant: participant.clone(),
                    stake,
                    at: ctx.now,
                },
            );
            Ok(())
        })
    }

    /// Adds metric deltas to the open epoch and lifetime totals. Returns the participant's
    /// uptime in bps for the open epoch.
    pub fn update_contribution(
        &self,
        ctx: &CallContext,
        participant: &ParticipantId,
        delta: ContributionDelta,
    ) -> Result<Bps> {
        self.run("update_contribution", |state, _, _| {
            state.pool.ensure_operator(&ctx.caller, "update_contribution")?;
            delta.validate(state.pool.config.epoch_duration_secs)?;
            let eligible = state.ledger.require(participant)?.is_active();
            state.pool.ensure_open()?;

            let uptime_bps = state
                .distribution
                .record_contribution(participant, &delta, eligible)?;
            state
                .ledger
                .apply_contribution(participant, &delta, uptime_bps, ctx.now)?;
            metrics::counter!("cocoon_pool_work_units_total").increment(delta.work_units);
            debug!(participant = %participant, uptime_bps, eligible, "contribution recorded");
            Ok(uptime_bps)
        })
    }

    pub fn heartbeat(&self, ctx: &CallContext, participant: &ParticipantId) -> Result {
        self.run("heartbeat", |state, _, _| {
            state.pool.ensure_operator(&ctx.caller, "heartbeat")?;
            state.ledger.heartbeat(participant, ctx.now)
        })
    }

    /// Returns the participant's outage count for the open epoch.
    pub fn record_outage(&self, ctx: &CallContext, participant: &ParticipantId) -> Result<u32> {
        self.run("record_outage", |state, _, _| {
            state.pool.ensure_operator(&ctx.caller, "record_outage")?;
            let eligible = state.ledger.require(participant)?.is_active();
            state.pool.ensure_open()?;

            let outages = state.distribution.record_outage(participant, eligible)?;
            let lifetime = state.ledger.record_outage(participant)?;
            info!(participant = %participant, outages, lifetime, "outage recorded");
            Ok(outages)
        })
    }

    /// Returns the previous reputation.
    pub fn update_reputation(
        &self,
        ctx: &CallContext,
        participant: &ParticipantId,
        reputation: u16,
    ) -> Result<u16> {
        self.run("update_reputation", |state, events, _| {
            state.pool.ensure_operator(&ctx.caller, "update_reputation")?;
            let previous = state.ledger.update_reputation(participant, reputation)?;
            emit(
                events,
                PoolEvent::ReputationUpdated {
                    participant: participant.clone(),
                    previous,
                    reputation,
                },
            );
            Ok(previous)
        })
    }

    // Staking/Withdrawal Manager

    /// Returns the caller's new stake.
    pub fn deposit_stake(&self, ctx: &CallContext, amount: Amount) -> Result<Amount> {
        self.run("deposit_stake", |state, events, gateway| {
            let stake = StakingManager::new(state, gateway).deposit(&ctx.caller, amount)?;
            emit(
                events,
                PoolEvent::StakeDeposited {
                    participant: ctx.caller.clone(),
                    amount,
                    stake,
                },
            );
            Ok(stake)
        })
    }

    /// Returns the time at which the withdrawal can be completed.
    pub fn request_withdrawal(&self, ctx: &CallContext, amount: Amount) -> Result<Timestamp> {
        self.run("request_withdrawal", |state, events, gateway| {
            let unlocks_at =
                StakingManager::new(state, gateway).request_withdrawal(&ctx.caller, amount, ctx.now)?;
            emit(
                events,
                PoolEvent::WithdrawalRequested {
                    participant: ctx.caller.clone(),
                    amount,
                    unlocks_at,
                },
            );
            Ok(unlocks_at)
        })
    }

    /// Returns the amount transferred to the caller.
    pub fn complete_withdrawal(&self, ctx: &CallContext) -> Result<Amount> {
        self.run("complete_withdrawal", |state, events, gateway| {
            let outcome =
                StakingManager::new(state, gateway).complete_withdrawal(&ctx.caller, ctx.now)?;
            emit(
                events,
                PoolEvent::WithdrawalCompleted {
                    participant: ctx.caller.clone(),
                    amount: outcome.amount,
                    removed: outcome.disposition == WithdrawalDisposition::Removed,
                },
            );
            metrics::counter!("cocoon_pool_withdrawn_total").increment(outcome.amount);
            Ok(outcome.amount)
        })
    }

    /// `amount = None` slashes the configured fraction of stake. Returns the amount slashed.
    pub fn slash(
        &self,
        ctx: &CallContext,
        participant: &ParticipantId,
        amount: Option<Amount>,
        reason: &str,
    ) -> Result<Amount> {
        self.run("slash", |state, events, gateway| {
            state.pool.ensure_operator(&ctx.caller, "slash")?;
            let outcome = StakingManager::new(state, gateway).slash(participant, amount)?;
            warn!(participant = %participant, amount = outcome.amount, reason, "participant slashed");
            emit(
                events,
                PoolEvent::ParticipantSlashed {
                    participant: participant.clone(),
                    amount: outcome.amount,
                    reason: reason.to_string(),
                    suspended: outcome.suspended,
                },
            );
            metrics::counter!("cocoon_pool_slashed_total").increment(outcome.amount);
            Ok(outcome.amount)
        })
    }

    // Distribution Engine

    /// Any caller may pay revenue in. Returns the epoch credited.
    pub fn receive_revenue(&self, ctx: &CallContext, amount: Amount) -> Result<EpochId> {
        self.run("receive_revenue", |state, events, _| {
            state.pool.ensure_open()?;
            let epoch = state.distribution.receive_revenue(amount)?;
            emit(
                events,
                PoolEvent::RevenueReceived {
                    epoch,
                    payer: ctx.caller.clone(),
                    amount,
                },
            );
            metrics::counter!("cocoon_pool_revenue_total").increment(amount);
            Ok(epoch)
        })
    }

    /// Seals the open epoch. Returns its id; the next epoch opens at its end.
    pub fn finalize_epoch(&self, ctx: &CallContext) -> Result<EpochId> {
        self.run("finalize_epoch", |state, events, _| {
            state.pool.ensure_operator(&ctx.caller, "finalize_epoch")?;
            state.pool.ensure_active()?;
            let (epoch, next_epoch) = state
                .distribution
                .finalize(ctx.now, state.pool.config.epoch_duration_secs)?;
            let total_revenue = state.distribution.epoch(epoch)?.total_revenue;
            emit(
                events,
                PoolEvent::EpochFinalized {
                    epoch,
                    next_epoch,
                    total_revenue,
                },
            );
            Ok(epoch)
        })
    }

    pub fn calculate_distribution(
        &self,
        ctx: &CallContext,
        epoch: EpochId,
    ) -> Result<CalculationOutcome> {
        self.run("calculate_distribution", |state, events, _| {
            state.pool.ensure_operator(&ctx.caller, "calculate_distribution")?;
            let outcome = state.distribution.calculate(
                epoch,
                state.pool.commission_bps,
                &state.ledger,
                &state.pool.config,
                ctx.now,
            )?;
            state.pool.operator_earnings = state
                .pool
                .operator_earnings
                .saturating_add(outcome.operator_credit());

            emit(
                events,
                PoolEvent::DistributionCalculated {
                    epoch,
                    operator_fee: outcome.operator_fee,
                    participant_pool: outcome.participant_pool,
                    reconciliation: outcome.reconciliation,
                    participants: outcome.participants,
                },
            );
            if let Some((into_epoch, amount)) = outcome.rolled_over {
                emit(
                    events,
                    PoolEvent::RewardsRolledOver {
                        from_epoch: epoch,
                        into_epoch,
                        amount,
                    },
                );
            }
            if outcome.participants == 0 {
                emit(events, PoolEvent::EpochClosed { epoch });
            }
            // contributors left without a payable share have nothing more to settle here
            let contributors: Vec<ParticipantId> = state
                .distribution
                .epoch(epoch)?
                .contributions
                .keys()
                .cloned()
                .collect();
            release_settled(state, &contributors);
            Ok(outcome)
        })
    }

    /// Pushes payouts to a subset of an epoch's participants.
    ///
    /// Already-paid entries are skipped, so re-submitting a batch after a `TransferFailed` only
    /// pays what is still owed.
    pub fn execute_batch(
        &self,
        ctx: &CallContext,
        epoch: EpochId,
        participants: &[ParticipantId],
    ) -> Result<BatchReport> {
        self.run("execute_batch", |state, events, gateway| {
            state.pool.ensure_operator(&ctx.caller, "execute_batch")?;
            let planned = state.distribution.plan_batch(
                epoch,
                participants,
                state.pool.config.max_batch_size,
            )?;
            let skipped = participants.len() - planned.len();

            let mut paid = Vec::with_capacity(planned.len());
            let mut failure = None;
            for payout in &planned {
                let completed = u32::try_from(paid.len()).unwrap_or(u32::MAX);
                if let Err(err) =
                    pay_out(state, gateway, epoch, payout, PayoutChannel::Batch, ctx.now, completed)
                {
                    failure = Some(err);
                    break;
                }
                emit_paid(events, epoch, payout, PayoutChannel::Batch);
                paid.push(PaidEntry {
                    participant: payout.participant.clone(),
                    amount: payout.amount,
                });
            }

            // retries skip entries already paid, so release over the whole request
            release_settled(state, participants);
            if let Some(err) = failure {
                return Err(err);
            }

            let epoch_closed = state.distribution.close_if_settled(epoch, ctx.now);
            if epoch_closed {
                emit(events, PoolEvent::EpochClosed { epoch });
            }

            info!(epoch, paid = paid.len(), skipped, epoch_closed, "batch executed");
            Ok(BatchReport {
                epoch,
                paid,
                skipped,
                epoch_closed,
            })
        })
    }

    /// Pull path: the caller presents its amount and merkle path. Returns the amount paid.
    pub fn claim(&self, ctx: &CallContext, epoch: EpochId, proof: &ClaimProof) -> Result<Amount> {
        self.run("claim", |state, events, gateway| {
            let payout = state.distribution.plan_claim(epoch, &ctx.caller, proof)?;
            pay_out(state, gateway, epoch, &payout, PayoutChannel::Claim, ctx.now, 0)?;
            emit_paid(events, epoch, &payout, PayoutChannel::Claim);

            if state.distribution.close_if_settled(epoch, ctx.now) {
                emit(events, PoolEvent::EpochClosed { epoch });
            }
            release_settled(state, std::slice::from_ref(&ctx.caller));
            Ok(payout.amount)
        })
    }

    // Reads

    pub fn pool(&self) -> Pool {
        self.lock().state.pool.clone()
    }

    pub fn participant(&self, id: &ParticipantId) -> Result<Participant> {
        self.lock().state.ledger.require(id).cloned()
    }

    pub fn total_stake(&self) -> Amount {
        self.lock().state.ledger.total_stake()
    }

    pub fn epoch(&self, id: EpochId) -> Result<Epoch> {
        self.lock().state.distribution.epoch(id).cloned()
    }

    pub fn current_epoch(&self) -> Result<Epoch> {
        self.lock().state.distribution.current().cloned()
    }

    pub fn proof_for(&self, epoch: EpochId, participant: &ParticipantId) -> Result<ClaimProof> {
        self.lock().state.distribution.proof_for(epoch, participant)
    }

    /// Participants still owed a payout in `epoch`, in batch order.
    pub fn unpaid(&self, epoch: EpochId) -> Result<Vec<ParticipantId>> {
        self.lock().state.distribution.unpaid(epoch)
    }
}

fn emit(events: &mut Vec<PoolEvent>, event: PoolEvent) {
    debug!(event = event.name(), "event emitted");
    events.push(event);
}

fn emit_paid(events: &mut Vec<PoolEvent>, epoch: EpochId, payout: &PlannedPayout, channel: PayoutChannel) {
    emit(
        events,
        PoolEvent::RewardPaid {
            epoch,
            participant: payout.participant.clone(),
            amount: payout.amount,
            channel,
            correlation_id: payout.correlation_id.clone(),
        },
    );
}

/// Marks the record paid, then transfers. A failed transfer reverts the record.
fn pay_out<G: TransferGateway + ?Sized>(
    state: &mut PoolState,
    gateway: &G,
    epoch: EpochId,
    payout: &PlannedPayout,
    channel: PayoutChannel,
    now: Timestamp,
    completed: u32,
) -> Result {
    state
        .distribution
        .mark_paid(epoch, &payout.participant, channel, now)?;
    state.ledger.credit_reward(&payout.participant, payout.amount);

    let instruction = TransferInstruction {
        destination: payout.participant.clone(),
        amount: payout.amount,
        correlation_id: payout.correlation_id.clone(),
    };
    match gateway.transfer(&instruction) {
        Ok(status) => {
            if status == TransferStatus::Duplicate {
                debug!(correlation_id = %instruction.correlation_id, "payout already delivered");
            }
            metrics::counter!("cocoon_pool_payouts_total", "channel" => channel.to_string())
                .increment(1);
            metrics::counter!("cocoon_pool_paid_amount_total").increment(payout.amount);
            Ok(())
        }
        Err(err) => {
            state.distribution.revert_paid(epoch, &payout.participant);
            state.ledger.debit_reward(&payout.participant, payout.amount);
            error!(
                epoch,
                participant = %payout.participant,
                correlation_id = %instruction.correlation_id,
                completed,
                error = %err,
                "payout transfer failed"
            );
            Err(PoolError::TransferFailed {
                correlation_id: instruction.correlation_id,
                completed,
                reason: err.to_string(),
            })
        }
    }
}

/// Drops Inactive entries whose last obligation was just settled.
fn release_settled(state: &mut PoolState, candidates: &[ParticipantId]) {
    for participant in candidates {
        if !state.distribution.has_obligations(participant) {
            state.ledger.release(participant);
        }
    }
}
