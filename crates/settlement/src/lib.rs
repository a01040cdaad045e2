//! Settlement state machine for the Cocoon GPU pool.
//!
//! Participants stake into an operator-managed pool, report measured work per epoch, and are
//! paid out of each epoch's revenue in proportion to their contribution score, net of the
//! operator commission and adjusted by uptime modifiers.
//!
//! The entry point is [`SettlementEngine`]. It serializes every operation behind one lock and
//! emits [`PoolEvent`]s for external consumers; funds leave only through a [`TransferGateway`].

pub mod constants;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod registry;
pub mod scorer;
pub mod staking;
pub mod state;
pub mod transfer;
pub mod types;

pub use distribution::{
    CalculationOutcome, ClaimProof, DistributionRecord, Epoch, EpochStatus, PayoutChannel,
};
pub use engine::{BatchReport, PaidEntry, SettlementEngine};
pub use error::{ErrorClass, PoolError, Result};
pub use events::PoolEvent;
pub use ledger::{ContributionDelta, Participant, ParticipantStatus};
pub use registry::{Pool, PoolConfig, PoolStatus};
pub use scorer::{ScoreWeights, ScoringConfig};
pub use state::PoolState;
pub use transfer::{OutboxGateway, TransferGateway, TransferInstruction};
pub use types::{Amount, Bps, CallContext, EpochId, ParticipantId, Timestamp, format_amount, units};
