//! Contribution Scorer.
//!
//! Converts raw per-epoch metrics into a weighted, comparable score:
//!
//! ```text
//! score = (w_work * work_units
//!        + w_uptime * uptime_norm
//!        + w_tasks * task_norm
//!        + w_quality * quality_norm) * reputation / 1000
//! ```
//!
//! Uptime, tasks and quality are normalized onto `reference_units` so that they are
//! comparable with raw work units. All arithmetic is `Decimal`, so the same inputs always
//! produce the same score.

use crate::{
    constants::{
        DEFAULT_REFERENCE_UNITS, DEFAULT_TASK_TARGET, MAX_QUALITY, MAX_REPUTATION, SCORE_DECIMALS,
    },
    error::{PoolError, Result},
};
use rust_decimal::{Decimal, RoundingStrategy, dec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub work: Decimal,
    pub uptime: Decimal,
    pub tasks: Decimal,
    pub quality: Decimal,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            work: dec!(0.50),
            uptime: dec!(0.20),
            tasks: dec!(0.20),
            quality: dec!(0.10),
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> Decimal {
        self.work + self.uptime + self.tasks + self.quality
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    /// Scale that normalized metrics are mapped onto
    pub reference_units: u64,
    /// Task count that earns the full task component in one epoch
    pub task_target: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            reference_units: DEFAULT_REFERENCE_UNITS,
            task_target: DEFAULT_TASK_TARGET,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        if [w.work, w.uptime, w.tasks, w.quality]
            .iter()
            .any(|weight| weight.is_sign_negative())
        {
            return Err(PoolError::InvalidAmount(
                "score weights must be non-negative".to_string(),
            ));
        }
        if w.total() != Decimal::ONE {
            return Err(PoolError::InvalidAmount(format!(
                "score weights must sum to 1, got {}",
                w.total()
            )));
        }
        if self.reference_units == 0 {
            return Err(PoolError::InvalidAmount(
                "reference_units must be greater than 0".to_string(),
            ));
        }
        if self.task_target == 0 {
            return Err(PoolError::InvalidAmount(
                "task_target must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Metrics for one participant over one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContributionInputs {
    pub work_units: u64,
    pub uptime_seconds: u64,
    pub task_count: u64,
    /// 0..=1000
    pub quality: u16,
    /// 0..=1000
    pub reputation: u16,
}

impl ContributionInputs {
    pub fn has_activity(&self) -> bool {
        self.work_units > 0 || self.uptime_seconds > 0 || self.task_count > 0
    }
}

/// `value / cap * reference`, with `value` clamped to `cap`.
fn normalize(value: u64, cap: u64, reference: u64) -> Decimal {
    if cap == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(value.min(cap)) / Decimal::from(cap) * Decimal::from(reference)
}

pub fn contribution_score(
    inputs: &ContributionInputs,
    config: &ScoringConfig,
    epoch_duration_secs: i64,
) -> Decimal {
    if !inputs.has_activity() {
        return Decimal::ZERO;
    }

    let reference = config.reference_units;
    let epoch_duration = u64::try_from(epoch_duration_secs).unwrap_or(0);

    let uptime_norm = normalize(inputs.uptime_seconds, epoch_duration, reference);
    let task_norm = normalize(inputs.task_count, config.task_target, reference);
    let quality_norm = normalize(inputs.quality.into(), MAX_QUALITY.into(), reference);

    let w = &config.weights;
    let base = w.work * Decimal::from(inputs.work_units)
        + w.uptime * uptime_norm
        + w.tasks * task_norm
        + w.quality * quality_norm;

    let reputation = Decimal::from(inputs.reputation.min(MAX_REPUTATION))
        / Decimal::from(MAX_REPUTATION);

    (base * reputation)
        .max(Decimal::ZERO)
        .round_dp_with_strategy(SCORE_DECIMALS, RoundingStrategy::ToZero)
}
