//! Fee schedules applied to seller proceeds.
//!
//! A [`FeeSchedule`] splits a quote notional into royalty, protocol and burn portions.
//! Portions are floored to whole quote units, so a seller never receives less than
//! `notional - split.total()`.
//!
//! Rates are given as [`Decimal`] fractions and held as integer parts per
//! [`RATE_SCALE`], which keeps every split exact for any `u128` notional.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BookError;
use crate::types::{amount_str, ItemId, QuoteAmount};

/// Fees withheld from one payout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    #[serde(with = "amount_str")]
    pub royalty: QuoteAmount,
    #[serde(with = "amount_str")]
    pub protocol: QuoteAmount,
    #[serde(with = "amount_str")]
    pub burn: QuoteAmount,
}

impl FeeSplit {
    pub fn total(&self) -> QuoteAmount {
        self.royalty + self.protocol + self.burn
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    pub fn accumulate(&mut self, other: FeeSplit) {
        self.royalty += other.royalty;
        self.protocol += other.protocol;
        self.burn += other.burn;
    }
}

pub trait FeeSchedule: Send + Sync {
    fn split(&self, item_id: ItemId, notional: QuoteAmount) -> FeeSplit;
}

/// Charges nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFees;

impl FeeSchedule for NoFees {
    fn split(&self, _item_id: ItemId, _notional: QuoteAmount) -> FeeSplit {
        FeeSplit::default()
    }
}

/// Parts per unit in which rates are held: 18 decimal places.
pub const RATE_SCALE: u128 = 1_000_000_000_000_000_000;

/// Fixed rates, with an optional royalty rate per item.
#[derive(Clone, Debug)]
pub struct FlatFeeSchedule {
    royalty: u128,
    protocol: u128,
    burn: u128,
    royalty_overrides: HashMap<ItemId, u128>,
}

impl FlatFeeSchedule {
    /// Rates are fractions of the notional with at most 18 decimal places; each must
    /// lie in [0, 1] and together they may not exceed 1.
    pub fn new(royalty: Decimal, protocol: Decimal, burn: Decimal) -> Result<Self, BookError> {
        let royalty = scaled_rate("royalty", royalty)?;
        let protocol = scaled_rate("protocol", protocol)?;
        let burn = scaled_rate("burn", burn)?;
        check_total(royalty + protocol + burn)?;
        Ok(Self {
            royalty,
            protocol,
            burn,
            royalty_overrides: HashMap::new(),
        })
    }

    pub fn with_royalty(mut self, item_id: ItemId, rate: Decimal) -> Result<Self, BookError> {
        let rate = scaled_rate("royalty", rate)?;
        check_total(rate + self.protocol + self.burn)?;
        self.royalty_overrides.insert(item_id, rate);
        Ok(self)
    }

    fn royalty_rate(&self, item_id: ItemId) -> u128 {
        self.royalty_overrides
            .get(&item_id)
            .copied()
            .unwrap_or(self.royalty)
    }
}

impl FeeSchedule for FlatFeeSchedule {
    fn split(&self, item_id: ItemId, notional: QuoteAmount) -> FeeSplit {
        FeeSplit {
            royalty: portion(notional, self.royalty_rate(item_id)),
            protocol: portion(notional, self.protocol),
            burn: portion(notional, self.burn),
        }
    }
}

/// `floor(notional * rate / RATE_SCALE)` for `rate <= RATE_SCALE`, without overflow:
/// the whole multiples of `RATE_SCALE` scale exactly, and the remainder times the rate
/// stays below `RATE_SCALE^2 < 2^120`.
fn portion(notional: QuoteAmount, rate: u128) -> QuoteAmount {
    let whole = notional / RATE_SCALE;
    let rest = notional % RATE_SCALE;
    whole * rate + rest * rate / RATE_SCALE
}

/// Converts a fractional rate to parts per [`RATE_SCALE`].
fn scaled_rate(field: &'static str, rate: Decimal) -> Result<u128, BookError> {
    if rate.is_sign_negative() || rate > Decimal::ONE {
        return Err(BookError::InvalidConfig {
            field,
            reason: format!("rate {} outside [0, 1]", rate),
        });
    }
    let scaled = rate * Decimal::from(RATE_SCALE as u64);
    if !scaled.fract().is_zero() {
        return Err(BookError::InvalidConfig {
            field,
            reason: format!("rate {} has more than 18 decimal places", rate),
        });
    }
    scaled.to_u128().ok_or_else(|| BookError::InvalidConfig {
        field,
        reason: format!("rate {} out of range", rate),
    })
}

fn check_total(total: u128) -> Result<(), BookError> {
    if total > RATE_SCALE {
        return Err(BookError::InvalidConfig {
            field: "fees",
            reason: format!("combined rate {} exceeds 1", Decimal::from_i128_with_scale(total as i128, 18)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(n: i64) -> Decimal {
        Decimal::new(n, 2)
    }

    #[test]
    fn no_fees_is_zero() {
        assert!(NoFees.split(ItemId(1), 1_000).is_zero());
    }

    #[test]
    fn flat_split_floors_each_portion() {
        let fees = FlatFeeSchedule::new(pct(5), pct(2), pct(1)).unwrap();
        let split = fees.split(ItemId(1), 999);
        assert_eq!(split.royalty, 49);
        assert_eq!(split.protocol, 19);
        assert_eq!(split.burn, 9);
        assert_eq!(split.total(), 77);
    }

    #[test]
    fn per_item_royalty_override() {
        let fees = FlatFeeSchedule::new(pct(5), pct(0), pct(0))
            .unwrap()
            .with_royalty(ItemId(7), pct(10))
            .unwrap();
        assert_eq!(fees.split(ItemId(7), 1_000).royalty, 100);
        assert_eq!(fees.split(ItemId(8), 1_000).royalty, 50);
    }

    #[test]
    fn rates_must_fit_within_notional() {
        assert!(FlatFeeSchedule::new(pct(60), pct(50), pct(0)).is_err());
        assert!(FlatFeeSchedule::new(pct(-1), pct(0), pct(0)).is_err());
        let fees = FlatFeeSchedule::new(pct(50), pct(0), pct(0)).unwrap();
        assert!(fees.with_royalty(ItemId(1), pct(101)).is_err());
    }

    #[test]
    fn large_notionals_do_not_wrap() {
        let fees = FlatFeeSchedule::new(pct(10), pct(0), pct(0)).unwrap();
        let notional = u64::MAX as u128 * 1_000;
        let split = fees.split(ItemId(1), notional);
        assert_eq!(split.royalty, notional / 10);
    }

    #[test]
    fn notionals_beyond_decimal_range_are_still_charged() {
        let fees = FlatFeeSchedule::new(pct(10), pct(2), pct(0)).unwrap();
        // above 2^96, where a Decimal product no longer fits
        let notional = u64::MAX as u128 * ((1 << 24) - 1) * 300;
        let split = fees.split(ItemId(1), notional);
        assert_eq!(split.royalty, notional / 10);
        assert_eq!(split.protocol, notional / 50);

        let split = fees.split(ItemId(1), u128::MAX);
        assert_eq!(split.royalty, u128::MAX / 10);
        assert_eq!(split.protocol, u128::MAX / 50);
        assert!(split.total() < u128::MAX);
    }

    #[test]
    fn full_rate_takes_everything() {
        let fees = FlatFeeSchedule::new(Decimal::ONE, pct(0), pct(0)).unwrap();
        assert_eq!(fees.split(ItemId(1), u128::MAX).royalty, u128::MAX);
        assert_eq!(fees.split(ItemId(1), 7).royalty, 7);
    }

    #[test]
    fn rates_finer_than_scale_rejected() {
        let too_fine = Decimal::new(1, 19);
        assert!(FlatFeeSchedule::new(too_fine, pct(0), pct(0)).is_err());
        let finest = Decimal::new(1, 18);
        let fees = FlatFeeSchedule::new(finest, pct(0), pct(0)).unwrap();
        assert_eq!(fees.split(ItemId(1), RATE_SCALE * 3).royalty, 3);
    }

    #[test]
    fn accumulate_sums_portions() {
        let mut total = FeeSplit::default();
        total.accumulate(FeeSplit { royalty: 1, protocol: 2, burn: 3 });
        total.accumulate(FeeSplit { royalty: 1, protocol: 0, burn: 0 });
        assert_eq!(total, FeeSplit { royalty: 2, protocol: 2, burn: 3 });
    }
}
