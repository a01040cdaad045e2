use super::proof::Hash;
use crate::{
    ledger::ContributionDelta,
    scorer::ContributionInputs,
    types::{Amount, Bps, EpochId, ParticipantId, Timestamp},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochStatus {
    Open,
    Calculating,
    Distributing,
    Closed,
}

impl fmt::Display for EpochStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Calculating => write!(f, "calculating"),
            Self::Distributing => write!(f, "distributing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutChannel {
    /// Pushed by the operator through `execute_batch`
    Batch,
    /// Pulled by the participant through `claim`
    Claim,
}

impl fmt::Display for PayoutChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch => write!(f, "batch"),
            Self::Claim => write!(f, "claim"),
        }
    }
}

/// Metrics accumulated for one participant during one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub tasks: u64,
    pub work_units: u64,
    pub uptime_seconds: u64,
    pub outages: u32,
    pub quality: u16,
    /// Written at calculation time
    pub score: Decimal,
    pub eligible: bool,
}

impl ContributionRecord {
    pub fn new(eligible: bool) -> Self {
        Self {
            tasks: 0,
            work_units: 0,
            uptime_seconds: 0,
            outages: 0,
            quality: 0,
            score: Decimal::ZERO,
            eligible,
        }
    }

    pub fn apply(&mut self, delta: &ContributionDelta) {
        self.tasks = self.tasks.saturating_add(delta.tasks);
        self.work_units = self.work_units.saturating_add(delta.work_units);
        self.uptime_seconds = self.uptime_seconds.saturating_add(delta.uptime_seconds);
        self.quality = delta.quality;
    }

    pub fn inputs(&self, reputation: u16) -> ContributionInputs {
        ContributionInputs {
            work_units: self.work_units,
            uptime_seconds: self.uptime_seconds,
            task_count: self.tasks,
            quality: self.quality,
            reputation,
        }
    }

    pub fn has_activity(&self) -> bool {
        self.work_units > 0 || self.uptime_seconds > 0 || self.tasks > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub score: Decimal,
    pub modifier: Decimal,
    pub amount: Amount,
    pub paid: bool,
    pub paid_via: Option<PayoutChannel>,
    pub paid_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub id: EpochId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub status: EpochStatus,
    /// Includes `rolled_in`
    pub total_revenue: Amount,
    pub rolled_in: Amount,
    /// Snapshot taken by `calculate_distribution`
    pub commission_bps: Option<Bps>,
    pub operator_fee: Amount,
    pub participant_pool: Amount,
    pub reconciliation: Amount,
    /// Forwarded to the open epoch when no one scored
    pub rolled_out: Amount,
    pub amount_paid: Amount,
    pub participants_paid: u32,
    pub total_participants: u32,
    pub merkle_root: Option<Hash>,
    pub finalized_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub contributions: BTreeMap<ParticipantId, ContributionRecord>,
    pub distributions: BTreeMap<ParticipantId, DistributionRecord>,
}

impl Epoch {
    pub fn open(id: EpochId, start: Timestamp, duration_secs: i64) -> Self {
        Self {
            id,
            start,
            end: start.saturating_add(duration_secs),
            status: EpochStatus::Open,
            total_revenue: 0,
            rolled_in: 0,
            commission_bps: None,
            operator_fee: 0,
            participant_pool: 0,
            reconciliation: 0,
            rolled_out: 0,
            amount_paid: 0,
            participants_paid: 0,
            total_participants: 0,
            merkle_root: None,
            finalized_at: None,
            closed_at: None,
            contributions: BTreeMap::new(),
            distributions: BTreeMap::new(),
        }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_settling(&self) -> bool {
        matches!(
            self.status,
            EpochStatus::Calculating | EpochStatus::Distributing
        )
    }

    pub fn remaining_pool(&self) -> Amount {
        self.participant_pool.saturating_sub(self.amount_paid)
    }

    pub fn unpaid(&self) -> impl Iterator<Item = (&ParticipantId, &DistributionRecord)> {
        self.distributions.iter().filter(|(_, record)| !record.paid)
    }

    /// True while `participant` still has something to settle in this epoch.
    pub fn owes(&self, participant: &ParticipantId) -> bool {
        match self.status {
            EpochStatus::Open | EpochStatus::Calculating => self
                .contributions
                .get(participant)
                .is_some_and(|record| record.eligible && record.has_activity()),
            EpochStatus::Distributing => self
                .distributions
                .get(participant)
                .is_some_and(|record| !record.paid),
            EpochStatus::Closed => false,
        }
    }
}
