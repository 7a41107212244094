//! Reconciliation checks
//!
//! Both ledgers keep running aggregates next to per-account state. A
//! reconciliation recomputes the aggregates from the accounts and compares
//! them by absolute difference against the configured tolerance. Exact
//! equality is not expected: every lazy settlement goes through a division.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::Serialize;

/// Ledgers that can prove conservation of value
pub trait Reconcile {
    /// Run every conservation check; a violation is an error
    fn reconcile_checks(&mut self, tag: &str) -> Result<ReconciliationSummary>;
}

/// One compared pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    /// What was compared
    pub name: String,
    /// Recomputed from accounts
    pub computed: Decimal,
    /// Held by the ledger
    pub expected: Decimal,
    /// `|computed - expected|`
    pub drift: Decimal,
}

/// Outcome of a passing reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    /// Caller-supplied label
    pub tag: String,
    /// Every check that ran
    pub checks: Vec<Check>,
}

impl ReconciliationSummary {
    /// Empty summary
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            checks: Vec::new(),
        }
    }

    /// Largest drift observed
    pub fn max_drift(&self) -> Decimal {
        self.checks
            .iter()
            .map(|c| c.drift)
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    /// Compare and record; the first failure short-circuits
    pub fn check(
        &mut self,
        name: &str,
        computed: Decimal,
        expected: Decimal,
        tolerance: Decimal,
    ) -> Result<()> {
        let check = ensure_within_tolerance(name, computed, expected, tolerance)?;
        self.checks.push(check);
        Ok(())
    }
}

/// `|computed - expected| <= tolerance`, or `InvariantViolation`
pub fn ensure_within_tolerance(
    name: &str,
    computed: Decimal,
    expected: Decimal,
    tolerance: Decimal,
) -> Result<Check> {
    let drift = computed
        .checked_sub(expected)
        .map(|d| d.abs())
        .ok_or_else(|| Error::Overflow(format!("{} - {}", computed, expected)))?;

    if drift > tolerance {
        return Err(Error::InvariantViolation(format!(
            "{}: computed {} vs expected {} (drift {} > {})",
            name, computed, expected, drift, tolerance
        )));
    }

    Ok(Check {
        name: name.to_string(),
        computed,
        expected,
        drift,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn tol() -> Decimal {
        Decimal::new(1, 8)
    }

    #[test]
    fn test_within_tolerance() {
        let a = Decimal::from_str("59000.000000000000001").unwrap();
        let check =
            ensure_within_tolerance("aggregate debt", a, Decimal::from(59000), tol()).unwrap();
        assert!(check.drift < tol());
    }

    #[test]
    fn test_violation_is_error() {
        let err = ensure_within_tolerance(
            "aggregate debt",
            Decimal::from_str("59000.0001").unwrap(),
            Decimal::from(59000),
            tol(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert!(err.to_string().contains("aggregate debt"));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        assert!(ensure_within_tolerance("edge", tol(), Decimal::ZERO, tol()).is_ok());
    }

    #[test]
    fn test_summary_max_drift() {
        let mut summary = ReconciliationSummary::new("after redistribution");
        summary
            .check("a", Decimal::from_str("1.000000001").unwrap(), Decimal::ONE, tol())
            .unwrap();
        summary.check("b", Decimal::ONE, Decimal::ONE, tol()).unwrap();
        assert_eq!(summary.max_drift(), Decimal::from_str("0.000000001").unwrap());
        assert_eq!(summary.checks.len(), 2);
    }
}
