use crate::types::{Amount, Bps};

// 1 unit = 10^9 base units
pub const NANOS_PER_UNIT: u64 = 1_000_000_000;

pub const BPS_DENOMINATOR: u64 = 10_000;

// commission bounds, 5%..15%
pub const MIN_COMMISSION_BPS: Bps = 500;
pub const MAX_COMMISSION_BPS: Bps = 1_500;

pub const DEFAULT_MIN_OPERATOR_STAKE: Amount = 100 * NANOS_PER_UNIT;
pub const DEFAULT_MIN_PARTICIPANT_STAKE: Amount = 10 * NANOS_PER_UNIT;
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 1_000;

// 1 day
pub const DEFAULT_EPOCH_DURATION_SECS: i64 = 86_400;

// 7 days
pub const DEFAULT_WITHDRAWAL_DELAY_SECS: i64 = 7 * 86_400;

pub const DEFAULT_SLASH_BPS: Bps = 1_000;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

pub const MAX_REPUTATION: u16 = 1_000;
pub const INITIAL_REPUTATION: u16 = 500;
pub const SLASH_REPUTATION_PENALTY: u16 = 100;

pub const MAX_QUALITY: u16 = 1_000;

// 100.00% with two implied decimals
pub const MAX_UPTIME_BPS: Bps = 10_000;

// modifier thresholds
pub const STABILITY_BONUS_UPTIME_BPS: Bps = 9_500;
pub const DEGRADED_UPTIME_BPS: Bps = 8_000;
pub const OUTAGE_PENALTY_THRESHOLD: u32 = 3;

// scoring
pub const SCORE_DECIMALS: u32 = 6;
pub const DEFAULT_REFERENCE_UNITS: u64 = 10_000;
pub const DEFAULT_TASK_TARGET: u64 = 1_000;
