//! Checked decimal arithmetic
//!
//! `Decimal` operators panic on overflow; the ledgers go through these helpers
//! so a bad input surfaces as an error and leaves state untouched.

use crate::{Error, Result};
use rust_decimal::Decimal;

/// `a + b`
pub fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| Error::Overflow(format!("{} + {}", a, b)))
}

/// `a - b`
pub fn sub(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_sub(b)
        .ok_or_else(|| Error::Overflow(format!("{} - {}", a, b)))
}

/// `a * b`
pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| Error::Overflow(format!("{} * {}", a, b)))
}

/// `a / b`, rejecting a zero divisor
pub fn div(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    if b.is_zero() {
        return Err(Error::DivisionByZero(format!("{} is zero", what)));
    }
    a.checked_div(b)
        .ok_or_else(|| Error::Overflow(format!("{} / {}", a, b)))
}

/// Reject zero and negative amounts
pub fn ensure_positive(amount: Decimal, what: &str) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "{} must be positive, got {}",
            what, amount
        )));
    }
    Ok(())
}

/// Reject negative amounts
pub fn ensure_non_negative(amount: Decimal, what: &str) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "{} must not be negative, got {}",
            what, amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_div_by_zero_rejected() {
        let err = div(Decimal::ONE, Decimal::ZERO, "aggregate debt").unwrap_err();
        assert!(matches!(err, Error::DivisionByZero(_)));
        assert!(err.to_string().contains("aggregate debt"));
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(matches!(
            mul(Decimal::MAX, Decimal::from(2)),
            Err(Error::Overflow(_))
        ));
        assert!(matches!(add(Decimal::MAX, Decimal::MAX), Err(Error::Overflow(_))));
    }

    #[test]
    fn test_amount_guards() {
        assert!(ensure_positive(Decimal::ONE, "amount").is_ok());
        assert!(ensure_positive(Decimal::ZERO, "amount").is_err());
        assert!(ensure_non_negative(Decimal::ZERO, "amount").is_ok());
        assert!(ensure_non_negative(Decimal::NEGATIVE_ONE, "amount").is_err());
    }
}
