//! Scripted operation sequences
//!
//! Each scenario drives a fresh ledger through a fixed list of operations and
//! returns the report it produced. Any ledger error, including a failed
//! reconciliation, aborts the scenario.

use crate::{
    metrics::Metrics, report::Report, AccountId, Config, Error, Outcome, Result, StabilityPool,
    VaultLedger,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Available scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Repeated redistributions around repayments
    Smoketest,
    /// Debt and collateral movements between reconciliations
    Balances,
    /// Deposits, liquidations and a withdrawal in the stability pool
    Stability,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::Smoketest => "smoketest",
            Scenario::Balances => "balances",
            Scenario::Stability => "stability",
        };
        write!(f, "{}", name)
    }
}

impl Scenario {
    /// Run against a fresh ledger
    pub fn run(self, config: &Config, metrics: Option<&Metrics>) -> Result<Report> {
        tracing::info!(scenario = %self, "Running scenario");
        match self {
            Scenario::Smoketest => smoketest(config, metrics),
            Scenario::Balances => balances(config, metrics),
            Scenario::Stability => stability(config, metrics),
        }
    }
}

fn vault_ledger(config: &Config, metrics: Option<&Metrics>) -> VaultLedger {
    let ledger = VaultLedger::new(config.clone());
    match metrics {
        Some(m) => ledger.with_metrics(m.clone()),
        None => ledger,
    }
}

/// Two vaults absorb three redistributions, with repayments in between
pub fn smoketest(config: &Config, metrics: Option<&Metrics>) -> Result<Report> {
    let alice = AccountId::new("Alice");
    let bob = AccountId::new("Bob");

    let mut ledger = vault_ledger(config, metrics);
    ledger.create_vault(alice.clone(), Decimal::from(10_000), Decimal::new(15, 2))?;
    ledger.create_vault(bob.clone(), Decimal::from(20_000), Decimal::new(30, 2))?;
    ledger.redistribute(Decimal::from(3_000), Decimal::new(25, 2))?;
    ledger.redistribute(Decimal::from(3_000), Decimal::new(25, 2))?;
    ledger.repay(Decimal::from(1_000), &alice)?;
    ledger.repay(Decimal::from(2_000), &bob)?;
    ledger.redistribute(Decimal::from(9_000), Decimal::new(25, 2))?;
    ledger.reconcile("smoketest")?;

    Ok(ledger.into_report())
}

/// Debt and collateral moves on both sides of two redistributions
pub fn balances(config: &Config, metrics: Option<&Metrics>) -> Result<Report> {
    let alice = AccountId::new("Alice");
    let bob = AccountId::new("Bob");

    let mut ledger = vault_ledger(config, metrics);
    ledger.create_vault(alice.clone(), Decimal::from(10_000), Decimal::new(15, 2))?;
    ledger.create_vault(bob.clone(), Decimal::from(50_000), Decimal::new(75, 2))?;
    ledger.repay(Decimal::from(1_000), &alice)?;
    ledger.deposit(Decimal::new(25, 2), &alice)?;
    ledger.reconcile("before redistribution")?;

    ledger.redistribute(Decimal::from(3_000), Decimal::new(25, 2))?;
    ledger.reconcile("after redistribution")?;

    ledger.withdraw(Decimal::new(1, 1), &alice)?;
    ledger.repay(Decimal::from(1_000), &alice)?;
    ledger.reconcile("after redistribution & first repay")?;

    ledger.borrow(Decimal::from(2_000), &alice)?;
    ledger.reconcile("borrow")?;

    ledger.redistribute(Decimal::from(3_000), Decimal::new(25, 2))?;
    ledger.withdraw(Decimal::new(1, 1), &bob)?;
    ledger.reconcile("after second redistribution")?;

    Ok(ledger.into_report())
}

/// Soft failure of a scripted step as an error
fn applied(outcome: Outcome, step: &str) -> Result<()> {
    if outcome.is_applied() {
        Ok(())
    } else {
        Err(Error::Other(format!("{} was not applied: {:?}", step, outcome)))
    }
}

/// Two depositors through two liquidations and a partial withdrawal
pub fn stability(config: &Config, metrics: Option<&Metrics>) -> Result<Report> {
    let alice = AccountId::new("Alice");
    let bob = AccountId::new("Bob");

    let mut pool = StabilityPool::new(config.clone());
    if let Some(m) = metrics {
        pool = pool.with_metrics(m.clone());
    }

    applied(pool.add_provider(alice.clone()), "add provider Alice")?;
    applied(pool.add_provider(bob.clone()), "add provider Bob")?;
    applied(pool.deposit(Decimal::from(100), &alice)?, "deposit for Alice")?;
    applied(pool.deposit(Decimal::from(50), &bob)?, "deposit for Bob")?;
    pool.reconcile("before liquidation")?;

    pool.liquidate(Decimal::from(50), Decimal::new(1, 2))?;
    pool.reconcile("after liquidation")?;

    applied(pool.withdraw(Decimal::from(20), &alice)?, "withdraw for Alice")?;
    pool.liquidate(Decimal::from(30), Decimal::new(2, 2))?;
    pool.reconcile("after second liquidation")?;

    Ok(pool.into_report())
}
