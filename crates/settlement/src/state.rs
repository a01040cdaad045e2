use crate::{
    distribution::DistributionEngine,
    ledger::ParticipantLedger,
    registry::{Pool, PoolConfig},
    types::ParticipantId,
};
use serde::{Deserialize, Serialize};

/// Everything the engine owns. Serializable so a host can persist it between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub pool: Pool,
    pub ledger: ParticipantLedger,
    pub distribution: DistributionEngine,
    /// Sequence for withdrawal correlation ids
    #[serde(default)]
    pub withdrawal_seq: u64,
}

impl PoolState {
    pub fn new(operator: ParticipantId, config: PoolConfig) -> Self {
        Self {
            pool: Pool::new(operator, config),
            ledger: ParticipantLedger::default(),
            distribution: DistributionEngine::default(),
            withdrawal_seq: 0,
        }
    }

    /// `total_stake` matches the sum of individual stakes.
    pub fn stake_invariant_holds(&self) -> bool {
        self.ledger.staked_sum() == Some(self.ledger.total_stake())
    }
}
