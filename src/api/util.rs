use anyhow::{anyhow, bail, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::Cents;

/// Converts a coin amount like `126.67` into cents. More than two fractional
/// digits are refused instead of rounded.
pub fn to_cents(amount: Decimal) -> Result<Cents> {
    let amount = amount.normalize();
    if amount.scale() > 2 {
        bail!("{} has more than two decimal places", amount)
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or(anyhow!("{} is out of range", amount))
}
pub fn from_cents(cents: Cents) -> Decimal {
    Decimal::new(cents, 2)
}
