//! Distribution Ledger
//!
//! Scaled distribution ledgers for a collateralized-debt protocol: protocol-wide
//! events are applied in O(1) and each account settles its share lazily, the
//! next time it is touched.
//!
//! # Architecture
//!
//! - **Vault ledger**: redistributed debt and collateral, spread per unit of
//!   stake through an additive accumulator
//! - **Stability pool**: liquidations burn principal through a multiplicative
//!   factor and credit rewards through an additive one
//! - **Reconciliation**: aggregates recomputed from accounts must match the
//!   ledger totals within tolerance
//! - **Report**: write-only sink for actions and reconciliation rows
//!
//! # Invariants
//!
//! - Debt conservation: Σ(native + attributed debt) == aggregate debt
//! - Distribution conservation: Σ(redistributed) == unattributed + Σ(attributed)
//! - Pool conservation: Σ(compounded deposits) == pool deposits
//! - Reward conservation: Σ(pending rewards) == unclaimed rewards

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod math;
pub mod metrics;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod scenario;
pub mod stability;
pub mod types;
pub mod vault;

// Re-exports
pub use config::{Config, FullLiquidationPolicy};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use reconcile::{Reconcile, ReconciliationSummary};
pub use report::{ReconciliationRow, Report, ReportSink, ReportValue};
pub use scenario::Scenario;
pub use stability::StabilityPool;
pub use types::{
    AccountId, Outcome, Provider, ProviderPosition, Vault, VaultBalances, VaultTotals,
};
pub use vault::VaultLedger;
