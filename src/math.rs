//! Money arithmetic for settlement.
//!
//! Stakes are integer cents, fee rates and shares are [`Decimal`]. Whenever a
//! calculation lands between two cents we truncate, so the platform keeps the
//! fraction and a market can never pay out more than it took in. The only
//! exception is [`split_proportionally`], which hands leftover whole cents back
//! to the bettors with the largest remainders.
use crate::api::Cents;
use crate::error::{MarketError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub fn check_fee_rate(fee_rate: Decimal) -> Result<()> {
    if fee_rate < Decimal::ZERO || fee_rate > Decimal::ONE {
        return Err(MarketError::InvalidFeeRate(fee_rate));
    }
    Ok(())
}

/// `amount * (1 - fee_rate)`, truncated to whole cents.
pub fn after_fee(amount: Cents, fee_rate: Decimal) -> Result<Cents> {
    let kept = Decimal::from(amount)
        .checked_mul(Decimal::ONE - fee_rate)
        .ok_or(MarketError::Overflow)?;
    kept.trunc().to_i64().ok_or(MarketError::Overflow)
}

/// Fraction of `total` held by `amount`, as stored alongside a payout.
pub fn share(amount: Cents, total: Cents) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(amount) / Decimal::from(total)
}

/// Splits `pool` over `weights` proportionally with the largest remainder
/// method. Every part gets `floor(pool * weight / Σweights)`, then the cents
/// left over go one each to the parts with the largest remainder, earlier
/// parts first on ties. The parts always add up to exactly `pool`.
pub fn split_proportionally(pool: Cents, weights: &[Cents]) -> Result<Vec<Cents>> {
    let total: i128 = weights.iter().map(|w| i128::from(*w)).sum();
    if pool <= 0 || total <= 0 {
        return Ok(vec![0; weights.len()]);
    }
    let pool = i128::from(pool);
    let mut parts = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (index, weight) in weights.iter().enumerate() {
        let numerator = pool * i128::from(*weight);
        parts.push(numerator / total);
        remainders.push((numerator % total, index));
    }
    let mut leftover = pool - parts.iter().sum::<i128>();
    // sort_by is stable, so equal remainders keep their original order
    remainders.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, index) in remainders {
        if leftover == 0 {
            break;
        }
        parts[index] += 1;
        leftover -= 1;
    }
    parts
        .into_iter()
        .map(|part| Cents::try_from(part).map_err(|_| MarketError::Overflow))
        .collect()
}
