//! Metrics collection for observability
//!
//! Each collector owns its own Prometheus registry so several ledgers (and
//! tests) can coexist in one process.
//!
//! # Metrics
//!
//! - `ledger_operations_total{ledger,operation}` - Mutating operations applied
//! - `ledger_distributions_total{ledger}` - Redistributions / liquidations
//! - `ledger_settlements_total{ledger}` - Account settlements that moved value
//! - `ledger_reconciliations_total{ledger}` - Successful reconciliations
//! - `ledger_invariant_violations_total{ledger}` - Failed reconciliations

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Mutating operations applied
    pub operations_total: IntCounterVec,

    /// Global distribution events
    pub distributions_total: IntCounterVec,

    /// Settlements that attributed a non-zero amount
    pub settlements_total: IntCounterVec,

    /// Successful reconciliations
    pub reconciliations_total: IntCounterVec,

    /// Reconciliations that found a conservation break
    pub invariant_violations_total: IntCounterVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("ledger_operations_total", "Mutating operations applied"),
            &["ledger", "operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let distributions_total = IntCounterVec::new(
            Opts::new(
                "ledger_distributions_total",
                "Redistribution and liquidation events",
            ),
            &["ledger"],
        )?;
        registry.register(Box::new(distributions_total.clone()))?;

        let settlements_total = IntCounterVec::new(
            Opts::new(
                "ledger_settlements_total",
                "Account settlements that moved value",
            ),
            &["ledger"],
        )?;
        registry.register(Box::new(settlements_total.clone()))?;

        let reconciliations_total = IntCounterVec::new(
            Opts::new("ledger_reconciliations_total", "Successful reconciliations"),
            &["ledger"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let invariant_violations_total = IntCounterVec::new(
            Opts::new(
                "ledger_invariant_violations_total",
                "Reconciliations that found a conservation break",
            ),
            &["ledger"],
        )?;
        registry.register(Box::new(invariant_violations_total.clone()))?;

        Ok(Self {
            operations_total,
            distributions_total,
            settlements_total,
            reconciliations_total,
            invariant_violations_total,
            registry,
        })
    }

    /// Record an applied operation
    pub fn record_operation(&self, ledger: &str, operation: &str) {
        self.operations_total
            .with_label_values(&[ledger, operation])
            .inc();
    }

    /// Record a redistribution or liquidation
    pub fn record_distribution(&self, ledger: &str) {
        self.distributions_total.with_label_values(&[ledger]).inc();
    }

    /// Record a settlement that attributed value
    pub fn record_settlement(&self, ledger: &str) {
        self.settlements_total.with_label_values(&[ledger]).inc();
    }

    /// Record a reconciliation result
    pub fn record_reconciliation(&self, ledger: &str, passed: bool) {
        if passed {
            self.reconciliations_total.with_label_values(&[ledger]).inc();
        } else {
            self.invariant_violations_total
                .with_label_values(&[ledger])
                .inc();
        }
    }

    /// Text exposition of every metric
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
