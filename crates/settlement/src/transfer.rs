//! Outbound transfer primitive.
//!
//! The engine never moves funds itself; it hands a [`TransferInstruction`] to a
//! [`TransferGateway`] as the last step of an operation. Gateways must treat the correlation id
//! as an idempotency key so a retried payout is never sent twice.

use crate::types::{Amount, ParticipantId};
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub destination: ParticipantId,
    pub amount: Amount,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Executed,
    /// Same correlation id and payload seen before; nothing was sent
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("transfer gateway unavailable: {0}")]
    Unavailable(String),
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

#[automock]
pub trait TransferGateway {
    fn transfer(&self, instruction: &TransferInstruction) -> Result<TransferStatus, TransferError>;
}

#[derive(Debug, Default)]
struct Outbox {
    sent: Vec<TransferInstruction>,
    index: BTreeMap<String, usize>,
    failures_armed: u32,
}

/// In-process gateway that records every transfer in order.
#[derive(Debug, Default)]
pub struct OutboxGateway {
    inner: Mutex<Outbox>,
}

impl OutboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the outbox from previously persisted transfers.
    pub fn with_history(sent: Vec<TransferInstruction>) -> Self {
        let index = sent
            .iter()
            .enumerate()
            .map(|(i, instruction)| (instruction.correlation_id.clone(), i))
            .collect();
        Self {
            inner: Mutex::new(Outbox {
                sent,
                index,
                failures_armed: 0,
            }),
        }
    }

    /// The next `count` new transfers fail with `Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.lock().failures_armed = count;
    }

    pub fn sent(&self) -> Vec<TransferInstruction> {
        self.lock().sent.clone()
    }

    pub fn total_sent(&self) -> Amount {
        self.lock()
            .sent
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.amount))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Outbox> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransferGateway for OutboxGateway {
    fn transfer(&self, instruction: &TransferInstruction) -> Result<TransferStatus, TransferError> {
        let mut outbox = self.lock();
        if let Some(&position) = outbox.index.get(&instruction.correlation_id) {
            let previous = &outbox.sent[position];
            if previous == instruction {
                debug!(correlation_id = %instruction.correlation_id, "duplicate transfer ignored");
                return Ok(TransferStatus::Duplicate);
            }
            warn!(
                correlation_id = %instruction.correlation_id,
                "correlation id reused with a different payload"
            );
            return Err(TransferError::Rejected(format!(
                "correlation id {} already used for a different transfer",
                instruction.correlation_id
            )));
        }

        if outbox.failures_armed > 0 {
            outbox.failures_armed -= 1;
            return Err(TransferError::Unavailable(format!(
                "outbox refused {}",
                instruction.correlation_id
            )));
        }

        let position = outbox.sent.len();
        outbox.sent.push(instruction.clone());
        outbox
            .index
            .insert(instruction.correlation_id.clone(), position);
        debug!(
            destination = %instruction.destination,
            amount = instruction.amount,
            correlation_id = %instruction.correlation_id,
            "transfer recorded"
        );
        Ok(TransferStatus::Executed)
    }
}
