use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::traits::AdapterError;

/// Arithmetic context for size and price conversions.
///
/// Every result is rounded half-to-even to `significant_digits`. Each adapter
/// owns its own context, so two adapters configured differently never see
/// each other's precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalContext {
    pub significant_digits: u32,
}

impl Default for DecimalContext {
    fn default() -> Self {
        Self {
            significant_digits: 10,
        }
    }
}

impl DecimalContext {
    pub fn new(significant_digits: u32) -> Self {
        Self { significant_digits }
    }

    /// Round `value` to the context precision.
    pub fn round(&self, value: Decimal) -> Decimal {
        if value.is_zero() {
            return Decimal::ZERO;
        }
        value
            .round_sf(self.significant_digits)
            .map(|v| v.normalize())
            .unwrap_or(value)
    }

    pub fn mul(&self, lhs: Decimal, rhs: Decimal) -> Result<Decimal, AdapterError> {
        lhs.checked_mul(rhs)
            .map(|v| self.round(v))
            .ok_or_else(|| AdapterError::Arithmetic(format!("{} * {} overflows", lhs, rhs)))
    }

    pub fn div(&self, lhs: Decimal, rhs: Decimal) -> Result<Decimal, AdapterError> {
        if rhs.is_zero() {
            return Err(AdapterError::Arithmetic(format!("{} / 0", lhs)));
        }
        lhs.checked_div(rhs)
            .map(|v| self.round(v))
            .ok_or_else(|| AdapterError::Arithmetic(format!("{} / {} overflows", lhs, rhs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_division_rounds_to_significant_digits() {
        let ctx = DecimalContext::default();
        assert_eq!(ctx.div(dec!(1), dec!(3)).unwrap(), dec!(0.3333333333));
        assert_eq!(ctx.div(dec!(2), dec!(3)).unwrap(), dec!(0.6666666667));
    }

    #[test]
    fn test_contexts_are_independent() {
        let coarse = DecimalContext::new(3);
        let fine = DecimalContext::default();
        assert_eq!(coarse.div(dec!(10), dec!(3)).unwrap(), dec!(3.33));
        assert_eq!(fine.div(dec!(10), dec!(3)).unwrap(), dec!(3.333333333));
    }

    #[test]
    fn test_exact_products_are_kept() {
        let ctx = DecimalContext::default();
        assert_eq!(ctx.mul(dec!(12), dec!(0.001)).unwrap(), dec!(0.012));
        assert_eq!(ctx.mul(Decimal::ZERO, dec!(0.001)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_division_by_zero() {
        let ctx = DecimalContext::default();
        assert!(matches!(
            ctx.div(dec!(1), Decimal::ZERO),
            Err(AdapterError::Arithmetic(_))
        ));
    }
}
