use crate::types::{Amount, EpochId, ParticipantId, Timestamp};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type Result<T = ()> = std::result::Result<T, PoolError>;

/// Every error carries a stable numeric code (see [`PoolError::code`]) so bots and dashboards
/// can branch on it without parsing the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("unauthorized: {caller} may not call {operation}")]
    Unauthorized {
        caller: ParticipantId,
        operation: &'static str,
    },
    #[error("invalid commission: {0} bps is outside [500, 1500]")]
    InvalidCommission(u16),
    #[error("insufficient stake: required {required}, got {provided}")]
    InsufficientStake { required: Amount, provided: Amount },
    #[error("pool is not active")]
    PoolNotActive,
    #[error("pool is full: {0} participants")]
    PoolFull(u32),
    #[error("pool is already initialized")]
    AlreadyInitialized,
    #[error("participant already registered: {0}")]
    AlreadyRegistered(ParticipantId),
    #[error("participant not found: {0}")]
    ParticipantNotFound(ParticipantId),
    #[error("invalid uptime: {0}")]
    InvalidUptime(String),
    #[error("insufficient rewards in epoch {epoch}: need {required}, have {available}")]
    InsufficientRewards {
        epoch: EpochId,
        required: Amount,
        available: Amount,
    },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("withdrawal already pending for {0}")]
    WithdrawalAlreadyPending(ParticipantId),
    #[error("withdrawal timelock active until {unlocks_at}")]
    TimelockActive { unlocks_at: Timestamp },
    #[error("excessive slash: {requested} exceeds stake {stake}")]
    ExcessiveSlash { requested: Amount, stake: Amount },
    #[error("epoch not found: {0}")]
    EpochNotFound(EpochId),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("reward for epoch {epoch} already claimed by {participant}")]
    AlreadyClaimed {
        epoch: EpochId,
        participant: ParticipantId,
    },
    #[error("invalid proof for {participant} in epoch {epoch}")]
    InvalidProof {
        epoch: EpochId,
        participant: ParticipantId,
    },
    #[error("transfer {correlation_id} failed after {completed} payouts: {reason}")]
    TransferFailed {
        correlation_id: String,
        completed: u32,
        reason: String,
    },
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    Authorization,
    Validation,
    StateConflict,
    Resource,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorization => write!(f, "authorization"),
            Self::Validation => write!(f, "validation"),
            Self::StateConflict => write!(f, "state-conflict"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

impl PoolError {
    pub fn code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => 1,
            Self::InvalidCommission(_) => 2,
            Self::InsufficientStake { .. } => 3,
            Self::PoolNotActive => 4,
            Self::PoolFull(_) => 5,
            Self::AlreadyInitialized => 6,
            Self::AlreadyRegistered(_) => 7,
            Self::ParticipantNotFound(_) => 8,
            Self::InvalidUptime(_) => 9,
            Self::InsufficientRewards { .. } => 10,
            Self::InvalidAmount(_) => 11,
            Self::WithdrawalAlreadyPending(_) => 12,
            Self::TimelockActive { .. } => 13,
            Self::ExcessiveSlash { .. } => 14,
            Self::EpochNotFound(_) => 15,
            Self::InvalidState(_) => 16,
            Self::AlreadyClaimed { .. } => 17,
            Self::InvalidProof { .. } => 18,
            Self::TransferFailed { .. } => 19,
            Self::ArithmeticOverflow(_) => 20,
        }
    }

    /// Short stable name, used as a metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidCommission(_) => "invalid_commission",
            Self::InsufficientStake { .. } => "insufficient_stake",
            Self::PoolNotActive => "pool_not_active",
            Self::PoolFull(_) => "pool_full",
            Self::AlreadyInitialized => "already_initialized",
            Self::AlreadyRegistered(_) => "already_registered",
            Self::ParticipantNotFound(_) => "participant_not_found",
            Self::InvalidUptime(_) => "invalid_uptime",
            Self::InsufficientRewards { .. } => "insufficient_rewards",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::WithdrawalAlreadyPending(_) => "withdrawal_already_pending",
            Self::TimelockActive { .. } => "timelock_active",
            Self::ExcessiveSlash { .. } => "excessive_slash",
            Self::EpochNotFound(_) => "epoch_not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::AlreadyClaimed { .. } => "already_claimed",
            Self::InvalidProof { .. } => "invalid_proof",
            Self::TransferFailed { .. } => "transfer_failed",
            Self::ArithmeticOverflow(_) => "arithmetic_overflow",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unauthorized { .. } => ErrorClass::Authorization,
            Self::InvalidCommission(_)
            | Self::InsufficientStake { .. }
            | Self::ParticipantNotFound(_)
            | Self::InvalidUptime(_)
            | Self::InvalidAmount(_)
            | Self::ExcessiveSlash { .. }
            | Self::EpochNotFound(_)
            | Self::InvalidProof { .. } => ErrorClass::Validation,
            Self::PoolNotActive
            | Self::PoolFull(_)
            | Self::AlreadyInitialized
            | Self::AlreadyRegistered(_)
            | Self::InsufficientRewards { .. }
            | Self::WithdrawalAlreadyPending(_)
            | Self::TimelockActive { .. }
            | Self::InvalidState(_)
            | Self::AlreadyClaimed { .. } => ErrorClass::StateConflict,
            Self::TransferFailed { .. } | Self::ArithmeticOverflow(_) => ErrorClass::Resource,
        }
    }

    /// Only outbound transfer failures are worth re-issuing unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransferFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_unique() {
        let errors = vec![
            PoolError::Unauthorized {
                caller: ParticipantId::from("eve"),
                operation: "pause",
            },
            PoolError::InvalidCommission(1600),
            PoolError::InsufficientStake {
                required: 10,
                provided: 9,
            },
            PoolError::PoolNotActive,
            PoolError::PoolFull(3),
            PoolError::AlreadyInitialized,
            PoolError::AlreadyRegistered(ParticipantId::from("alice")),
            PoolError::ParticipantNotFound(ParticipantId::from("bob")),
            PoolError::InvalidUptime("too long".into()),
            PoolError::InsufficientRewards {
                epoch: 1,
                required: 2,
                available: 1,
            },
            PoolError::InvalidAmount("zero".into()),
            PoolError::WithdrawalAlreadyPending(ParticipantId::from("alice")),
            PoolError::TimelockActive { unlocks_at: 10 },
            PoolError::ExcessiveSlash {
                requested: 2,
                stake: 1,
            },
            PoolError::EpochNotFound(9),
            PoolError::InvalidState("closed".into()),
            PoolError::AlreadyClaimed {
                epoch: 1,
                participant: ParticipantId::from("alice"),
            },
            PoolError::InvalidProof {
                epoch: 1,
                participant: ParticipantId::from("alice"),
            },
            PoolError::TransferFailed {
                correlation_id: "payout:1:alice".into(),
                completed: 0,
                reason: "offline".into(),
            },
            PoolError::ArithmeticOverflow("fee"),
        ];

        let codes: Vec<u16> = errors.iter().map(PoolError::code).collect();
        assert_eq!(codes, (1..=20).collect::<Vec<u16>>());
    }

    #[test]
    fn authorization_is_its_own_class() {
        let err = PoolError::Unauthorized {
            caller: ParticipantId::from("eve"),
            operation: "slash",
        };
        assert_eq!(err.class(), ErrorClass::Authorization);
        assert_eq!(err.to_string(), "unauthorized: eve may not call slash");
    }

    #[test]
    fn only_transfer_failures_are_retryable() {
        assert!(
            PoolError::TransferFailed {
                correlation_id: "payout:0:a".into(),
                completed: 3,
                reason: "timeout".into(),
            }
            .is_retryable()
        );
        assert!(!PoolError::PoolNotActive.is_retryable());
        assert!(!PoolError::ArithmeticOverflow("share").is_retryable());
    }
}
