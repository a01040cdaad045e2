//! Distribution Engine.
//!
//! Each epoch moves through `Open -> Calculating -> Distributing -> Closed`. Exactly one epoch
//! is Open at a time and epochs are contiguous: the next epoch starts where the previous ended.

pub mod epoch;
pub mod modifier;
pub mod proof;

pub use epoch::{ContributionRecord, DistributionRecord, Epoch, EpochStatus, PayoutChannel};
pub use modifier::{Allocation, ShareInput, allocate, performance_modifier};
pub use proof::{ClaimProof, DistributionTree, Hash};

use crate::{
    constants::{BPS_DENOMINATOR, MAX_UPTIME_BPS},
    error::{PoolError, Result},
    ledger::{ContributionDelta, ParticipantLedger},
    registry::PoolConfig,
    scorer::contribution_score,
    types::{Amount, Bps, EpochId, ParticipantId, Timestamp},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Epoch uptime as basis points of the epoch duration, capped at 100%.
pub fn uptime_bps(uptime_seconds: u64, epoch_duration_secs: i64) -> Bps {
    let Ok(duration) = u64::try_from(epoch_duration_secs) else {
        return 0;
    };
    if duration == 0 {
        return 0;
    }
    let bps = u128::from(uptime_seconds) * u128::from(BPS_DENOMINATOR) / u128::from(duration);
    Bps::try_from(bps.min(u128::from(MAX_UPTIME_BPS))).unwrap_or(MAX_UPTIME_BPS)
}

pub fn correlation_id(epoch: EpochId, participant: &ParticipantId) -> String {
    format!("payout:{epoch}:{participant}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalculationOutcome {
    pub epoch: EpochId,
    pub commission_bps: Bps,
    pub operator_fee: Amount,
    pub participant_pool: Amount,
    pub reconciliation: Amount,
    pub participants: u32,
    /// `(into_epoch, amount)` when nobody scored
    pub rolled_over: Option<(EpochId, Amount)>,
    pub status: EpochStatus,
}

impl CalculationOutcome {
    /// Fee plus reconciliation residual.
    pub fn operator_credit(&self) -> Amount {
        self.operator_fee.saturating_add(self.reconciliation)
    }
}

/// A payout ready to be marked paid and transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPayout {
    pub participant: ParticipantId,
    pub amount: Amount,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEngine {
    epochs: BTreeMap<EpochId, Epoch>,
    current: Option<EpochId>,
}

impl DistributionEngine {
    /// Opens epoch 0 at `now`.
    pub fn start(&mut self, now: Timestamp, duration_secs: i64) -> Result<EpochId> {
        if self.current.is_some() {
            return Err(PoolError::InvalidState("epochs already started".to_string()));
        }
        self.epochs.insert(0, Epoch::open(0, now, duration_secs));
        self.current = Some(0);
        info!(epoch = 0, start = now, "first epoch opened");
        Ok(0)
    }

    pub fn current_id(&self) -> Option<EpochId> {
        self.current
    }

    pub fn current(&self) -> Result<&Epoch> {
        self.current
            .and_then(|id| self.epochs.get(&id))
            .ok_or_else(|| PoolError::InvalidState("no open epoch".to_string()))
    }

    fn current_mut(&mut self) -> Result<&mut Epoch> {
        self.current
            .and_then(|id| self.epochs.get_mut(&id))
            .ok_or_else(|| PoolError::InvalidState("no open epoch".to_string()))
    }

    pub fn epoch(&self, id: EpochId) -> Result<&Epoch> {
        self.epochs.get(&id).ok_or(PoolError::EpochNotFound(id))
    }

    fn epoch_mut(&mut self, id: EpochId) -> Result<&mut Epoch> {
        self.epochs.get_mut(&id).ok_or(PoolError::EpochNotFound(id))
    }

    pub fn epochs(&self) -> impl Iterator<Item = &Epoch> {
        self.epochs.values()
    }

    pub fn receive_revenue(&mut self, amount: Amount) -> Result<EpochId> {
        if amount == 0 {
            return Err(PoolError::InvalidAmount(
                "revenue must be greater than 0".to_string(),
            ));
        }
        let epoch = self.current_mut()?;
        epoch.total_revenue = epoch
            .total_revenue
            .checked_add(amount)
            .ok_or(PoolError::ArithmeticOverflow("epoch revenue"))?;
        debug!(epoch = epoch.id, amount, total = epoch.total_revenue, "revenue received");
        Ok(epoch.id)
    }

    /// Adds `delta` to the open epoch's record and returns the participant's epoch uptime in bps.
    pub fn record_contribution(
        &mut self,
        participant: &ParticipantId,
        delta: &ContributionDelta,
        eligible: bool,
    ) -> Result<Bps> {
        let epoch = self.current_mut()?;
        let duration = epoch.duration_secs();
        let record = epoch
            .contributions
            .entry(participant.clone())
            .or_insert_with(|| ContributionRecord::new(eligible));
        record.apply(delta);
        Ok(uptime_bps(record.uptime_seconds, duration))
    }

    /// Returns the outage count for the open epoch.
    pub fn record_outage(&mut self, participant: &ParticipantId, eligible: bool) -> Result<u32> {
        let epoch = self.current_mut()?;
        let record = epoch
            .contributions
            .entry(participant.clone())
            .or_insert_with(|| ContributionRecord::new(eligible));
        record.outages = record.outages.saturating_add(1);
        Ok(record.outages)
    }

    /// Excludes the participant from scoring in the open epoch.
    pub fn revoke_eligibility(&mut self, participant: &ParticipantId) {
        if let Ok(epoch) = self.current_mut()
            && let Some(record) = epoch.contributions.get_mut(participant)
        {
            record.eligible = false;
        }
    }

    /// Seals the open epoch and opens the next one. Returns `(finalized, opened)`.
    pub fn finalize(
        &mut self,
        now: Timestamp,
        duration_secs: i64,
    ) -> Result<(EpochId, EpochId)> {
        let current = self.current()?;
        if now < current.end {
            return Err(PoolError::InvalidState(format!(
                "epoch {} runs until {}",
                current.id, current.end
            )));
        }
        let (id, end) = (current.id, current.end);
        let next_id = id
            .checked_add(1)
            .ok_or(PoolError::ArithmeticOverflow("epoch id"))?;

        let epoch = self.epoch_mut(id)?;
        epoch.status = EpochStatus::Calculating;
        epoch.finalized_at = Some(now);
        let revenue = epoch.total_revenue;

        self.epochs
            .insert(next_id, Epoch::open(next_id, end, duration_secs));
        self.current = Some(next_id);
        info!(epoch = id, next_epoch = next_id, revenue, "epoch finalized");
        Ok((id, next_id))
    }

    /// Computes fee, scores, modifiers and shares for a Calculating epoch.
    pub fn calculate(
        &mut self,
        id: EpochId,
        commission_bps: Bps,
        ledger: &ParticipantLedger,
        config: &PoolConfig,
        now: Timestamp,
    ) -> Result<CalculationOutcome> {
        let epoch = self.epoch(id)?;
        if epoch.status != EpochStatus::Calculating {
            return Err(PoolError::InvalidState(format!(
                "epoch {id} is {}, expected calculating",
                epoch.status
            )));
        }

        let revenue = epoch.total_revenue;
        let fee = u128::from(revenue) * u128::from(commission_bps) / u128::from(BPS_DENOMINATOR);
        let operator_fee =
            Amount::try_from(fee).map_err(|_| PoolError::ArithmeticOverflow("operator fee"))?;
        let participant_pool = revenue - operator_fee;
        let duration = epoch.duration_secs();

        let scores: BTreeMap<ParticipantId, Decimal> = epoch
            .contributions
            .iter()
            .filter(|(_, record)| record.eligible)
            .map(|(participant, record)| {
                let reputation = ledger.get(participant).map_or(0, |p| p.reputation);
                let score = contribution_score(&record.inputs(reputation), &config.scoring, duration);
                (participant.clone(), score)
            })
            .collect();
        let inputs: Vec<ShareInput> = scores
            .iter()
            .filter(|(_, score)| **score > Decimal::ZERO)
            .filter_map(|(participant, score)| {
                let record = epoch.contributions.get(participant)?;
                Some(ShareInput {
                    participant: participant.clone(),
                    score: *score,
                    modifier: performance_modifier(
                        uptime_bps(record.uptime_seconds, duration),
                        record.outages,
                    ),
                })
            })
            .collect();
        let allocation = allocate(participant_pool, &inputs)?;
        let into_epoch = self.current()?.id;

        let epoch = self.epoch_mut(id)?;
        epoch.commission_bps = Some(commission_bps);
        epoch.operator_fee = operator_fee;
        epoch.participant_pool = participant_pool;
        for (participant, score) in &scores {
            if let Some(record) = epoch.contributions.get_mut(participant) {
                record.score = *score;
            }
        }

        let mut rolled_over = None;
        match allocation {
            None => {
                epoch.rolled_out = participant_pool;
                if participant_pool > 0 {
                    rolled_over = Some((into_epoch, participant_pool));
                }
            }
            Some(allocation) => {
                let modifiers: BTreeMap<&ParticipantId, (Decimal, Decimal)> = inputs
                    .iter()
                    .map(|input| (&input.participant, (input.score, input.modifier)))
                    .collect();
                for (participant, amount) in allocation.shares.iter().filter(|(_, a)| *a > 0) {
                    let (score, modifier) = modifiers
                        .get(participant)
                        .copied()
                        .unwrap_or((Decimal::ZERO, Decimal::ONE));
                    epoch.distributions.insert(
                        participant.clone(),
                        DistributionRecord {
                            score,
                            modifier,
                            amount: *amount,
                            paid: false,
                            paid_via: None,
                            paid_at: None,
                        },
                    );
                }
                let distributed: Amount = epoch.distributions.values().map(|r| r.amount).sum();
                epoch.reconciliation = participant_pool - distributed;
            }
        }

        epoch.total_participants = u32::try_from(epoch.distributions.len())
            .map_err(|_| PoolError::ArithmeticOverflow("participant count"))?;
        epoch.merkle_root = DistributionTree::new(
            id,
            epoch.distributions.iter().map(|(p, r)| (p, r.amount)),
        )
        .and_then(|tree| tree.root());
        if epoch.distributions.is_empty() {
            epoch.status = EpochStatus::Closed;
            epoch.closed_at = Some(now);
        } else {
            epoch.status = EpochStatus::Distributing;
        }

        let outcome = CalculationOutcome {
            epoch: id,
            commission_bps,
            operator_fee,
            participant_pool,
            reconciliation: epoch.reconciliation,
            participants: epoch.total_participants,
            rolled_over,
            status: epoch.status,
        };

        if let Some((into, amount)) = rolled_over {
            let open = self.epoch_mut(into)?;
            open.rolled_in = open
                .rolled_in
                .checked_add(amount)
                .ok_or(PoolError::ArithmeticOverflow("rolled in revenue"))?;
            open.total_revenue = open
                .total_revenue
                .checked_add(amount)
                .ok_or(PoolError::ArithmeticOverflow("epoch revenue"))?;
        }

        info!(
            epoch = id,
            operator_fee,
            participant_pool,
            reconciliation = outcome.reconciliation,
            participants = outcome.participants,
            status = %outcome.status,
            "distribution calculated"
        );
        Ok(outcome)
    }

    /// Validates a payout batch and returns the entries still owed, deduplicated.
    pub fn plan_batch(
        &self,
        id: EpochId,
        participants: &[ParticipantId],
        max_batch_size: usize,
    ) -> Result<Vec<PlannedPayout>> {
        if participants.len() > max_batch_size {
            return Err(PoolError::InvalidAmount(format!(
                "batch of {} exceeds the maximum of {max_batch_size}",
                participants.len()
            )));
        }
        let epoch = self.epoch(id)?;
        if !matches!(epoch.status, EpochStatus::Distributing | EpochStatus::Closed) {
            return Err(PoolError::InvalidState(format!(
                "epoch {id} is {}, expected distributing",
                epoch.status
            )));
        }

        let mut seen = BTreeSet::new();
        let mut planned = Vec::new();
        for participant in participants {
            let record = epoch
                .distributions
                .get(participant)
                .ok_or_else(|| PoolError::ParticipantNotFound(participant.clone()))?;
            if record.paid || !seen.insert(participant) {
                continue;
            }
            planned.push(PlannedPayout {
                participant: participant.clone(),
                amount: record.amount,
                correlation_id: correlation_id(id, participant),
            });
        }

        let required = planned
            .iter()
            .try_fold(0u64, |acc, p| acc.checked_add(p.amount))
            .ok_or(PoolError::ArithmeticOverflow("batch total"))?;
        if required > epoch.remaining_pool() {
            return Err(PoolError::InsufficientRewards {
                epoch: id,
                required,
                available: epoch.remaining_pool(),
            });
        }
        Ok(planned)
    }

    /// Checks a pull claim and returns the payout it entitles.
    pub fn plan_claim(
        &self,
        id: EpochId,
        participant: &ParticipantId,
        claim: &ClaimProof,
    ) -> Result<PlannedPayout> {
        let epoch = self.epoch(id)?;
        let root = match (epoch.status, epoch.merkle_root) {
            (EpochStatus::Distributing | EpochStatus::Closed, Some(root)) => root,
            (EpochStatus::Distributing | EpochStatus::Closed, None) => {
                return Err(PoolError::InvalidProof {
                    epoch: id,
                    participant: participant.clone(),
                });
            }
            (status, _) => {
                return Err(PoolError::InvalidState(format!(
                    "epoch {id} is {status}, expected distributing"
                )));
            }
        };
        let invalid = || PoolError::InvalidProof {
            epoch: id,
            participant: participant.clone(),
        };
        if !claim.verify(&root, id, participant) {
            return Err(invalid());
        }
        let record = epoch.distributions.get(participant).ok_or_else(invalid)?;
        if record.amount != claim.amount {
            return Err(invalid());
        }
        if record.paid {
            return Err(PoolError::AlreadyClaimed {
                epoch: id,
                participant: participant.clone(),
            });
        }
        if record.amount > epoch.remaining_pool() {
            return Err(PoolError::InsufficientRewards {
                epoch: id,
                required: record.amount,
                available: epoch.remaining_pool(),
            });
        }
        Ok(PlannedPayout {
            participant: participant.clone(),
            amount: record.amount,
            correlation_id: correlation_id(id, participant),
        })
    }

    /// Write-ahead half of a payout. Must be followed by the transfer or `revert_paid`.
    pub fn mark_paid(
        &mut self,
        id: EpochId,
        participant: &ParticipantId,
        channel: PayoutChannel,
        now: Timestamp,
    ) -> Result<Amount> {
        let epoch = self.epoch_mut(id)?;
        let record = epoch
            .distributions
            .get_mut(participant)
            .ok_or_else(|| PoolError::ParticipantNotFound(participant.clone()))?;
        if record.paid {
            return Err(PoolError::AlreadyClaimed {
                epoch: id,
                participant: participant.clone(),
            });
        }
        record.paid = true;
        record.paid_via = Some(channel);
        record.paid_at = Some(now);
        let amount = record.amount;
        epoch.amount_paid = epoch.amount_paid.saturating_add(amount);
        epoch.participants_paid = epoch.participants_paid.saturating_add(1);
        Ok(amount)
    }

    pub fn revert_paid(&mut self, id: EpochId, participant: &ParticipantId) {
        let Ok(epoch) = self.epoch_mut(id) else {
            return;
        };
        if let Some(record) = epoch.distributions.get_mut(participant)
            && record.paid
        {
            record.paid = false;
            record.paid_via = None;
            record.paid_at = None;
            epoch.amount_paid = epoch.amount_paid.saturating_sub(record.amount);
            epoch.participants_paid = epoch.participants_paid.saturating_sub(1);
        }
    }

    /// Closes a Distributing epoch once every record is paid. Returns true on the transition.
    pub fn close_if_settled(&mut self, id: EpochId, now: Timestamp) -> bool {
        match self.epochs.get_mut(&id) {
            Some(epoch)
                if epoch.status == EpochStatus::Distributing
                    && epoch.participants_paid >= epoch.total_participants =>
            {
                epoch.status = EpochStatus::Closed;
                epoch.closed_at = Some(now);
                info!(epoch = id, paid = epoch.amount_paid, "epoch closed");
                true
            }
            _ => false,
        }
    }

    pub fn proof_for(&self, id: EpochId, participant: &ParticipantId) -> Result<ClaimProof> {
        let epoch = self.epoch(id)?;
        if !matches!(epoch.status, EpochStatus::Distributing | EpochStatus::Closed) {
            return Err(PoolError::InvalidState(format!(
                "epoch {id} is {}, no distribution yet",
                epoch.status
            )));
        }
        let record = epoch
            .distributions
            .get(participant)
            .ok_or_else(|| PoolError::ParticipantNotFound(participant.clone()))?;
        let proof = DistributionTree::new(
            id,
            epoch.distributions.iter().map(|(p, r)| (p, r.amount)),
        )
        .and_then(|tree| tree.proof_for(participant))
        .ok_or_else(|| PoolError::ParticipantNotFound(participant.clone()))?;
        Ok(ClaimProof {
            amount: record.amount,
            proof,
        })
    }

    pub fn unpaid(&self, id: EpochId) -> Result<Vec<ParticipantId>> {
        Ok(self
            .epoch(id)?
            .unpaid()
            .map(|(participant, _)| participant.clone())
            .collect())
    }

    /// Unsealed eligible contributions or unpaid distributions in any epoch.
    pub fn has_obligations(&self, participant: &ParticipantId) -> bool {
        self.epochs
            .values()
            .filter(|epoch| epoch.status != EpochStatus::Closed)
            .any(|epoch| epoch.owes(participant))
    }

    /// `close` is refused while an epoch is mid-settlement or the open epoch holds revenue or
    /// eligible work. Nothing can finalize the open epoch once the pool is closed.
    pub fn ensure_settled(&self) -> Result<()> {
        if let Some(epoch) = self.epochs.values().find(|epoch| epoch.is_settling()) {
            return Err(PoolError::InvalidState(format!(
                "epoch {} is {}",
                epoch.id, epoch.status
            )));
        }
        let Ok(open) = self.current() else {
            return Ok(());
        };
        if open.total_revenue > 0 {
            return Err(PoolError::InvalidState(format!(
                "open epoch {} holds {} of unsettled revenue",
                open.id, open.total_revenue
            )));
        }
        if let Some(participant) = open
            .contributions
            .iter()
            .find(|(_, record)| record.eligible && record.has_activity())
            .map(|(participant, _)| participant)
        {
            return Err(PoolError::InvalidState(format!(
                "open epoch {} holds unsettled work from {participant}",
                open.id
            )));
        }
        Ok(())
    }
}
