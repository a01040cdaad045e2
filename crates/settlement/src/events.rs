use crate::{
    distribution::PayoutChannel,
    types::{Amount, Bps, EpochId, ParticipantId, Timestamp},
};
use serde::{Deserialize, Serialize};

/// Events emitted by committed operations, consumed read-only by dashboards and bots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    PoolInitialized {
        operator: ParticipantId,
        commission_bps: Bps,
        operator_stake: Amount,
        first_epoch: EpochId,
    },
    CommissionUpdated {
        previous_bps: Bps,
        commission_bps: Bps,
    },
    PoolPaused,
    PoolResumed,
    PoolClosed,
    ParticipantRegistered {
        participant: ParticipantId,
        stake: Amount,
        at: Timestamp,
    },
    StakeDeposited {
        participant: ParticipantId,
        amount: Amount,
        stake: Amount,
    },
    WithdrawalRequested {
        participant: ParticipantId,
        amount: Amount,
        unlocks_at: Timestamp,
    },
    WithdrawalCompleted {
        participant: ParticipantId,
        amount: Amount,
        removed: bool,
    },
    ParticipantSlashed {
        participant: ParticipantId,
        amount: Amount,
        reason: String,
        suspended: bool,
    },
    ReputationUpdated {
        participant: ParticipantId,
        previous: u16,
        reputation: u16,
    },
    RevenueReceived {
        epoch: EpochId,
        payer: ParticipantId,
        amount: Amount,
    },
    EpochFinalized {
        epoch: EpochId,
        next_epoch: EpochId,
        total_revenue: Amount,
    },
    DistributionCalculated {
        epoch: EpochId,
        operator_fee: Amount,
        participant_pool: Amount,
        reconciliation: Amount,
        participants: u32,
    },
    RewardsRolledOver {
        from_epoch: EpochId,
        into_epoch: EpochId,
        amount: Amount,
    },
    RewardPaid {
        epoch: EpochId,
        participant: ParticipantId,
        amount: Amount,
        channel: PayoutChannel,
        correlation_id: String,
    },
    EpochClosed {
        epoch: EpochId,
    },
}

impl PoolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PoolInitialized { .. } => "pool_initialized",
            Self::CommissionUpdated { .. } => "commission_updated",
            Self::PoolPaused => "pool_paused",
            Self::PoolResumed => "pool_resumed",
            Self::PoolClosed => "pool_closed",
            Self::ParticipantRegistered { .. } => "participant_registered",
            Self::StakeDeposited { .. } => "stake_deposited",
            Self::WithdrawalRequested { .. } => "withdrawal_requested",
            Self::WithdrawalCompleted { .. } => "withdrawal_completed",
            Self::ParticipantSlashed { .. } => "participant_slashed",
            Self::ReputationUpdated { .. } => "reputation_updated",
            Self::RevenueReceived { .. } => "revenue_received",
            Self::EpochFinalized { .. } => "epoch_finalized",
            Self::DistributionCalculated { .. } => "distribution_calculated",
            Self::RewardsRolledOver { .. } => "rewards_rolled_over",
            Self::RewardPaid { .. } => "reward_paid",
            Self::EpochClosed { .. } => "epoch_closed",
        }
    }
}
