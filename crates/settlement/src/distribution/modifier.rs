//! Performance modifiers and share allocation for one epoch's participant pool.

use crate::{
    constants::{DEGRADED_UPTIME_BPS, OUTAGE_PENALTY_THRESHOLD, STABILITY_BONUS_UPTIME_BPS},
    error::{PoolError, Result},
    types::{Amount, Bps, ParticipantId},
};
use rust_decimal::{Decimal, dec, prelude::ToPrimitive};

pub const STABILITY_BONUS: Decimal = dec!(1.10);
pub const DEGRADED_PENALTY: Decimal = dec!(0.95);
pub const POOR_UPTIME_PENALTY: Decimal = dec!(0.80);
pub const OUTAGE_PENALTY: Decimal = dec!(0.90);

/// Uptime above 95% earns the bonus; 80%..=95% is degraded; below 80% is poor.
/// Three or more outages in the epoch compound a further penalty.
pub fn performance_modifier(uptime_bps: Bps, outages: u32) -> Decimal {
    let base = if uptime_bps > STABILITY_BONUS_UPTIME_BPS {
        STABILITY_BONUS
    } else if uptime_bps >= DEGRADED_UPTIME_BPS {
        DEGRADED_PENALTY
    } else {
        POOR_UPTIME_PENALTY
    };
    if outages >= OUTAGE_PENALTY_THRESHOLD {
        base * OUTAGE_PENALTY
    } else {
        base
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareInput {
    pub participant: ParticipantId,
    pub score: Decimal,
    pub modifier: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub shares: Vec<(ParticipantId, Amount)>,
    pub distributed: Amount,
    /// `pool - distributed`, booked as the epoch's reconciliation line
    pub residual: Amount,
    pub renormalized: bool,
}

/// Splits `pool` across `inputs` by score, applying each modifier.
///
/// `final = pool * score / sum(score) * modifier`. If the modified shares add up to more than the
/// pool they are recomputed as `pool * (score * modifier) / sum(score * modifier)`. Amounts are
/// floored, so the distributed total never exceeds the pool. Returns `None` when the total score
/// is zero.
pub fn allocate(pool: Amount, inputs: &[ShareInput]) -> Result<Option<Allocation>> {
    let total_score: Decimal = inputs.iter().map(|input| input.score).sum();
    if total_score <= Decimal::ZERO {
        return Ok(None);
    }
    let pool_dec = Decimal::from(pool);

    let mut finals = inputs
        .iter()
        .map(|input| {
            pool_dec
                .checked_mul(input.score / total_score)
                .and_then(|raw| raw.checked_mul(input.modifier))
                .ok_or(PoolError::ArithmeticOverflow("modified share"))
        })
        .collect::<Result<Vec<Decimal>>>()?;

    let renormalized = finals.iter().copied().sum::<Decimal>() > pool_dec;
    if renormalized {
        let weighted: Vec<Decimal> = inputs
            .iter()
            .map(|input| input.score * input.modifier)
            .collect();
        let total_weighted: Decimal = weighted.iter().copied().sum();
        finals = weighted
            .iter()
            .map(|w| {
                pool_dec
                    .checked_mul(*w / total_weighted)
                    .ok_or(PoolError::ArithmeticOverflow("renormalized share"))
            })
            .collect::<Result<Vec<Decimal>>>()?;
    }

    let mut shares = Vec::with_capacity(inputs.len());
    let mut distributed: Amount = 0;
    for (input, value) in inputs.iter().zip(finals) {
        let amount = value
            .floor()
            .to_u64()
            .ok_or(PoolError::ArithmeticOverflow("share amount"))?;
        distributed = distributed
            .checked_add(amount)
            .ok_or(PoolError::ArithmeticOverflow("distributed total"))?;
        shares.push((input.participant.clone(), amount));
    }
    let residual = pool
        .checked_sub(distributed)
        .ok_or(PoolError::ArithmeticOverflow("allocation exceeds pool"))?;

    Ok(Some(Allocation {
        shares,
        distributed,
        residual,
        renormalized,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::units;

    fn input(id: &str, score: Decimal, modifier: Decimal) -> ShareInput {
        ShareInput {
            participant: ParticipantId::from(id),
            score,
            modifier,
        }
    }

    #[test]
    fn test_modifier_thresholds() {
        assert_eq!(performance_modifier(10_000, 0), dec!(1.10));
        assert_eq!(performance_modifier(9_501, 0), dec!(1.10));
        assert_eq!(performance_modifier(9_500, 0), dec!(0.95));
        assert_eq!(performance_modifier(8_000, 0), dec!(0.95));
        assert_eq!(performance_modifier(7_999, 0), dec!(0.80));
        assert_eq!(performance_modifier(0, 0), dec!(0.80));
    }

    #[test]
    fn test_outage_penalty_compounds() {
        assert_eq!(performance_modifier(9_900, 2), dec!(1.10));
        assert_eq!(performance_modifier(9_900, 3), dec!(0.990));
        assert_eq!(performance_modifier(9_000, 5), dec!(0.855));
        assert_eq!(performance_modifier(5_000, 3), dec!(0.720));
    }

    #[test]
    fn test_penalties_leave_residual() {
        let inputs = vec![
            input("a", dec!(100), dec!(0.95)),
            input("b", dec!(100), dec!(0.80)),
        ];
        let allocation = allocate(units(100), &inputs).unwrap().unwrap();
        assert!(!allocation.renormalized);
        assert_eq!(
            allocation.shares,
            vec![
                (ParticipantId::from("a"), 47_500_000_000),
                (ParticipantId::from("b"), 40_000_000_000),
            ]
        );
        assert_eq!(allocation.residual, 12_500_000_000);
        assert_eq!(allocation.distributed + allocation.residual, units(100));
    }

    #[test]
    fn test_uniform_bonus_renormalizes_to_raw_shares() {
        let inputs = vec![
            input("a", dec!(3), dec!(1.10)),
            input("b", dec!(1), dec!(1.10)),
        ];
        let allocation = allocate(units(100), &inputs).unwrap().unwrap();
        assert!(allocation.renormalized);
        assert_eq!(allocation.shares[0].1, units(75));
        assert_eq!(allocation.shares[1].1, units(25));
        assert_eq!(allocation.residual, 0);
    }

    #[test]
    fn test_mixed_modifiers_never_exceed_pool() {
        let inputs = vec![
            input("a", dec!(1), dec!(1.10)),
            input("b", dec!(1), dec!(1.10)),
            input("c", dec!(1), dec!(0.95)),
        ];
        let allocation = allocate(1_000, &inputs).unwrap().unwrap();
        assert!(allocation.renormalized);
        assert!(allocation.distributed <= 1_000);
        // a and b outrank c after the bonus
        assert!(allocation.shares[0].1 > allocation.shares[2].1);
        assert_eq!(allocation.shares[0].1, allocation.shares[1].1);
    }

    #[test]
    fn test_flooring_sends_dust_to_residual() {
        let inputs = vec![
            input("a", dec!(1), dec!(0.95)),
            input("b", dec!(1), dec!(0.95)),
            input("c", dec!(1), dec!(0.95)),
        ];
        let allocation = allocate(10, &inputs).unwrap().unwrap();
        // 10 / 3 * 0.95 = 3.1666.. floors to 3
        assert_eq!(allocation.distributed, 9);
        assert_eq!(allocation.residual, 1);
    }

    #[test]
    fn test_zero_total_score() {
        let inputs = vec![input("a", Decimal::ZERO, dec!(1.10))];
        assert_eq!(allocate(units(5), &inputs).unwrap(), None);
        assert_eq!(allocate(units(5), &[]).unwrap(), None);
    }
}
