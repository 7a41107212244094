//! Vault debt ledger
//!
//! Redistributed debt (and collateral) is spread over open vaults in O(1):
//! `redistribute` only bumps a per-unit accumulator, and each vault picks up
//! its share the next time it is touched.
//!
//! # Attribution
//!
//! ```text
//! pending_debt = (debt + protocol_debt) * (sum_debt - sum_debt_snapshot)
//! ```
//!
//! The multiplicand includes debt already attributed by earlier
//! redistributions, so attributed protocol debt bears its share of later
//! ones. The per-unit increment divides by the native debt aggregate, which
//! also carries attributed protocol debt; both sides of the fraction count the
//! same quantity and the pending shares of all vaults add up to exactly the
//! amount redistributed.
//!
//! # Example
//!
//! ```
//! use distribution_ledger::{AccountId, Config, VaultLedger};
//! use rust_decimal::Decimal;
//!
//! # fn main() -> distribution_ledger::Result<()> {
//! let mut ledger = VaultLedger::new(Config::default());
//! ledger.create_vault("Alice", Decimal::from(10_000), Decimal::new(15, 2))?;
//! ledger.create_vault("Bob", Decimal::from(50_000), Decimal::new(75, 2))?;
//! ledger.redistribute(Decimal::from(3_000), Decimal::ZERO)?;
//!
//! let alice = ledger.current_balances(&AccountId::new("Alice"))?;
//! assert_eq!(alice.pending_debt, Decimal::from(500));
//! ledger.reconcile("after redistribution")?;
//! # Ok(())
//! # }
//! ```

use crate::{
    math::{add, div, ensure_non_negative, ensure_positive, mul, sub},
    metrics::Metrics,
    reconcile::{Reconcile, ReconciliationSummary},
    registry::Registry,
    report::{ReconciliationRow, Report, ReportSink},
    types::{AccountId, Vault, VaultBalances, VaultTotals},
    Config, Error, Result,
};
use rust_decimal::Decimal;

const LEDGER: &str = "vault";

/// Vault debt ledger
#[derive(Debug)]
pub struct VaultLedger<R: ReportSink = Report> {
    vaults: Registry<Vault>,
    totals: VaultTotals,

    /// Debt redistributed per unit of debt stake, since genesis
    sum_debt: Decimal,

    /// Collateral redistributed per unit of collateral stake, since genesis
    sum_collateral: Decimal,

    config: Config,
    report: R,
    metrics: Option<Metrics>,
}

impl VaultLedger<Report> {
    /// Ledger writing to an in-memory [`Report`]
    pub fn new(config: Config) -> Self {
        Self::with_report(config, Report::new())
    }
}

impl<R: ReportSink> VaultLedger<R> {
    /// Ledger writing to `report`
    pub fn with_report(config: Config, report: R) -> Self {
        Self {
            vaults: Registry::new(),
            totals: VaultTotals::default(),
            sum_debt: Decimal::ZERO,
            sum_collateral: Decimal::ZERO,
            config,
            report,
            metrics: None,
        }
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Open a vault
    ///
    /// The vault snapshots the current accumulators, so it takes no share of
    /// earlier redistributions.
    pub fn create_vault(
        &mut self,
        id: impl Into<AccountId>,
        debt: Decimal,
        collateral: Decimal,
    ) -> Result<()> {
        let id = id.into();
        if self.vaults.contains(&id) {
            return Err(Error::VaultAlreadyExists(id));
        }
        ensure_non_negative(debt, "opening debt")?;
        ensure_non_negative(collateral, "opening collateral")?;

        let native_debt = add(self.totals.native_debt, debt)?;
        let native_collateral = add(self.totals.native_collateral, collateral)?;

        self.vaults.insert(Vault {
            id: id.clone(),
            debt,
            protocol_debt: Decimal::ZERO,
            sum_debt_snapshot: self.sum_debt,
            collateral,
            protocol_collateral: Decimal::ZERO,
            sum_collateral_snapshot: self.sum_collateral,
        });
        self.totals.native_debt = native_debt;
        self.totals.native_collateral = native_collateral;

        tracing::info!(vault = %id, %debt, %collateral, "Vault created");
        self.report.record_action(format!("Added vault: {}", id));
        self.record_operation("create_vault");
        Ok(())
    }

    /// Attribute the vault's pending share of past redistributions
    ///
    /// Calling it again with no redistribution in between changes nothing.
    pub fn settle(&mut self, id: &AccountId) -> Result<()> {
        self.apply(id, "settle", |_, _| Ok(()))
    }

    /// Pay down native debt
    pub fn repay(&mut self, amount: Decimal, id: &AccountId) -> Result<()> {
        ensure_positive(amount, "repay amount")?;
        self.apply(id, "repay", |vault, totals| {
            if amount > vault.debt {
                return Err(Error::InsufficientBalance(format!(
                    "vault {} owes {} native debt, cannot repay {}",
                    vault.id, vault.debt, amount
                )));
            }
            vault.debt = sub(vault.debt, amount)?;
            totals.native_debt = sub(totals.native_debt, amount)?;
            Ok(())
        })?;
        self.report
            .record_action(format!("Repaid {} for vault: {}", amount, id));
        Ok(())
    }

    /// Draw more native debt
    pub fn borrow(&mut self, amount: Decimal, id: &AccountId) -> Result<()> {
        ensure_positive(amount, "borrow amount")?;
        self.apply(id, "borrow", |vault, totals| {
            vault.debt = add(vault.debt, amount)?;
            totals.native_debt = add(totals.native_debt, amount)?;
            Ok(())
        })?;
        self.report
            .record_action(format!("Borrowed {} for vault: {}", amount, id));
        Ok(())
    }

    /// Add native collateral
    pub fn deposit(&mut self, amount: Decimal, id: &AccountId) -> Result<()> {
        ensure_positive(amount, "deposit amount")?;
        self.apply(id, "deposit", |vault, totals| {
            vault.collateral = add(vault.collateral, amount)?;
            totals.native_collateral = add(totals.native_collateral, amount)?;
            Ok(())
        })?;
        self.report.record_action(format!(
            "Deposited {} collateral for vault: {}",
            amount, id
        ));
        Ok(())
    }

    /// Remove native collateral
    pub fn withdraw(&mut self, amount: Decimal, id: &AccountId) -> Result<()> {
        ensure_positive(amount, "withdraw amount")?;
        self.apply(id, "withdraw", |vault, totals| {
            if amount > vault.collateral {
                return Err(Error::InsufficientBalance(format!(
                    "vault {} holds {} native collateral, cannot withdraw {}",
                    vault.id, vault.collateral, amount
                )));
            }
            vault.collateral = sub(vault.collateral, amount)?;
            totals.native_collateral = sub(totals.native_collateral, amount)?;
            Ok(())
        })?;
        self.report.record_action(format!(
            "Withdrew {} collateral for vault: {}",
            amount, id
        ));
        Ok(())
    }

    /// Spread debt (and collateral) over every open vault
    ///
    /// Fails with `DivisionByZero` when there is no debt to spread over.
    pub fn redistribute(&mut self, debt_amount: Decimal, collateral_amount: Decimal) -> Result<()> {
        ensure_non_negative(debt_amount, "redistributed debt")?;
        ensure_non_negative(collateral_amount, "redistributed collateral")?;

        let debt_increment = div(debt_amount, self.totals.native_debt, "aggregate vault debt")?;
        let sum_debt = add(self.sum_debt, debt_increment)?;
        let mut totals = self.totals;
        totals.unattributed_debt = add(totals.unattributed_debt, debt_amount)?;
        totals.distributed_debt = add(totals.distributed_debt, debt_amount)?;

        let mut sum_collateral = self.sum_collateral;
        if self.config.vault.redistribute_collateral {
            if collateral_amount > Decimal::ZERO {
                let increment = div(
                    collateral_amount,
                    self.totals.native_collateral,
                    "aggregate vault collateral",
                )?;
                sum_collateral = add(sum_collateral, increment)?;
                totals.unattributed_collateral =
                    add(totals.unattributed_collateral, collateral_amount)?;
                totals.distributed_collateral =
                    add(totals.distributed_collateral, collateral_amount)?;
            }
        } else if collateral_amount > Decimal::ZERO {
            tracing::debug!(
                %collateral_amount,
                "Collateral redistribution disabled, amount ignored"
            );
        }

        self.sum_debt = sum_debt;
        self.sum_collateral = sum_collateral;
        self.totals = totals;

        tracing::info!(
            %debt_amount,
            %collateral_amount,
            sum_debt = %self.sum_debt,
            sum_collateral = %self.sum_collateral,
            "Redistributed"
        );
        self.report.record_action(format!(
            "Redistributed {} debt and {} collateral",
            debt_amount, collateral_amount
        ));
        if let Some(metrics) = &self.metrics {
            metrics.record_distribution(LEDGER);
        }
        self.record_operation("redistribute");
        Ok(())
    }

    /// Balances of a vault, including the share not yet attributed
    pub fn current_balances(&self, id: &AccountId) -> Result<VaultBalances> {
        let vault = self
            .vaults
            .get(id)
            .ok_or_else(|| Error::VaultNotFound(id.clone()))?;
        self.balances_of(vault)
    }

    /// Settle every vault and prove conservation of debt and collateral
    ///
    /// Emits one report row per vault (balances as they stood before the
    /// forced settlement) and a summary row. On a violation nothing is
    /// committed and `InvariantViolation` is returned.
    pub fn reconcile(&mut self, tag: &str) -> Result<ReconciliationSummary> {
        let mut totals = self.totals;
        let mut staged = Vec::with_capacity(self.vaults.len());
        let mut rows = Vec::with_capacity(self.vaults.len() + 1);

        for vault in self.vaults.iter() {
            let balances = self.balances_of(vault)?;
            rows.push(self.vault_row(tag, vault, &balances)?);

            let mut settled = vault.clone();
            self.attribute(&mut settled, &mut totals)?;
            staged.push(settled);
        }

        let summary = match self.conservation_checks(tag, &staged, &totals) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(tag, error = %e, "Vault reconciliation failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_reconciliation(LEDGER, false);
                }
                return Err(e);
            }
        };

        for (slot, vault) in staged.into_iter().enumerate() {
            self.vaults.replace(slot, vault);
        }
        self.totals = totals;

        rows.push(self.summary_row(tag)?);
        for row in rows {
            self.report.record_reconciliation_row(row);
        }

        tracing::info!(
            tag,
            vaults = self.vaults.len(),
            max_drift = %summary.max_drift(),
            "Vault reconciliation passed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_reconciliation(LEDGER, true);
        }
        Ok(summary)
    }

    /// Vault record
    pub fn vault(&self, id: &AccountId) -> Option<&Vault> {
        self.vaults.get(id)
    }

    /// Vaults in creation order
    pub fn vaults(&self) -> impl Iterator<Item = &Vault> {
        self.vaults.iter()
    }

    /// Ledger-level aggregates
    pub fn totals(&self) -> &VaultTotals {
        &self.totals
    }

    /// Debt accumulator
    pub fn sum_debt(&self) -> Decimal {
        self.sum_debt
    }

    /// Collateral accumulator
    pub fn sum_collateral(&self) -> Decimal {
        self.sum_collateral
    }

    /// Report sink
    pub fn report(&self) -> &R {
        &self.report
    }

    /// Consume the ledger, keeping its report
    pub fn into_report(self) -> R {
        self.report
    }

    /// Settle `id`, run `op` on staged copies, commit only if both succeed
    fn apply<F>(&mut self, id: &AccountId, operation: &str, op: F) -> Result<()>
    where
        F: FnOnce(&mut Vault, &mut VaultTotals) -> Result<()>,
    {
        let slot = self
            .vaults
            .slot(id)
            .ok_or_else(|| Error::VaultNotFound(id.clone()))?;

        let mut vault = self.vaults.at(slot).clone();
        let mut totals = self.totals;
        self.attribute(&mut vault, &mut totals)?;
        op(&mut vault, &mut totals)?;

        self.vaults.replace(slot, vault);
        self.totals = totals;
        self.record_operation(operation);
        Ok(())
    }

    /// Pending (debt, collateral) share since the vault's snapshots
    fn pending(&self, vault: &Vault) -> Result<(Decimal, Decimal)> {
        let debt = mul(
            vault.debt_stake()?,
            sub(self.sum_debt, vault.sum_debt_snapshot)?,
        )?;
        let collateral = mul(
            vault.collateral_stake()?,
            sub(self.sum_collateral, vault.sum_collateral_snapshot)?,
        )?;
        Ok((debt, collateral))
    }

    /// Move the pending share from the unattributed pools into the vault
    fn attribute(&self, vault: &mut Vault, totals: &mut VaultTotals) -> Result<()> {
        let (pending_debt, pending_collateral) = self.pending(vault)?;

        if !pending_debt.is_zero() {
            totals.unattributed_debt = sub(totals.unattributed_debt, pending_debt)?;
            totals.native_debt = add(totals.native_debt, pending_debt)?;
            vault.protocol_debt = add(vault.protocol_debt, pending_debt)?;
        }
        if !pending_collateral.is_zero() {
            totals.unattributed_collateral =
                sub(totals.unattributed_collateral, pending_collateral)?;
            totals.native_collateral = add(totals.native_collateral, pending_collateral)?;
            vault.protocol_collateral = add(vault.protocol_collateral, pending_collateral)?;
        }
        vault.sum_debt_snapshot = self.sum_debt;
        vault.sum_collateral_snapshot = self.sum_collateral;

        if !pending_debt.is_zero() || !pending_collateral.is_zero() {
            tracing::debug!(
                vault = %vault.id,
                %pending_debt,
                %pending_collateral,
                "Attributed redistribution"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_settlement(LEDGER);
            }
        }
        Ok(())
    }

    fn balances_of(&self, vault: &Vault) -> Result<VaultBalances> {
        let (pending_debt, pending_collateral) = self.pending(vault)?;
        Ok(VaultBalances {
            native_debt: vault.debt,
            protocol_debt: vault.protocol_debt,
            pending_debt,
            total_debt: add(vault.debt_stake()?, pending_debt)?,
            native_collateral: vault.collateral,
            protocol_collateral: vault.protocol_collateral,
            pending_collateral,
            total_collateral: add(vault.collateral_stake()?, pending_collateral)?,
        })
    }

    fn conservation_checks(
        &self,
        tag: &str,
        staged: &[Vault],
        totals: &VaultTotals,
    ) -> Result<ReconciliationSummary> {
        let tolerance = self.config.tolerance;
        let mut native_debt = Decimal::ZERO;
        let mut protocol_debt = Decimal::ZERO;
        let mut native_collateral = Decimal::ZERO;
        let mut protocol_collateral = Decimal::ZERO;
        for vault in staged {
            native_debt = add(native_debt, vault.debt)?;
            protocol_debt = add(protocol_debt, vault.protocol_debt)?;
            native_collateral = add(native_collateral, vault.collateral)?;
            protocol_collateral = add(protocol_collateral, vault.protocol_collateral)?;
        }

        let mut summary = ReconciliationSummary::new(tag);

        summary.check(
            "vault debt vs aggregate debt",
            add(native_debt, protocol_debt)?,
            totals.native_debt,
            tolerance,
        )?;
        summary.check(
            "distributed debt vs unattributed + attributed",
            totals.distributed_debt,
            add(totals.unattributed_debt, protocol_debt)?,
            tolerance,
        )?;
        summary.check(
            "native debt + distributed vs unattributed + aggregate debt",
            add(native_debt, totals.distributed_debt)?,
            add(totals.unattributed_debt, totals.native_debt)?,
            tolerance,
        )?;

        summary.check(
            "vault collateral vs aggregate collateral",
            add(native_collateral, protocol_collateral)?,
            totals.native_collateral,
            tolerance,
        )?;
        summary.check(
            "distributed collateral vs unattributed + attributed",
            totals.distributed_collateral,
            add(totals.unattributed_collateral, protocol_collateral)?,
            tolerance,
        )?;
        summary.check(
            "native collateral + distributed vs unattributed + aggregate collateral",
            add(native_collateral, totals.distributed_collateral)?,
            add(totals.unattributed_collateral, totals.native_collateral)?,
            tolerance,
        )?;

        Ok(summary)
    }

    fn vault_row(
        &self,
        tag: &str,
        vault: &Vault,
        balances: &VaultBalances,
    ) -> Result<ReconciliationRow> {
        let collateral_ratio = if balances.total_debt.is_zero() {
            None
        } else {
            Some(div(
                mul(balances.total_collateral, self.config.collateral_price)?,
                balances.total_debt,
                "total vault debt",
            )?)
        };

        Ok(ReconciliationRow::new()
            .with("state", tag)
            .with("vault", vault.id.as_str())
            .with("vault_debt", balances.native_debt)
            .with("vault_protocol_debt", balances.protocol_debt)
            .with("pending_protocol_debt", balances.pending_debt)
            .with("total_debt", balances.total_debt)
            .with("vault_collateral", balances.total_collateral)
            .with("collateral_ratio", collateral_ratio))
    }

    fn summary_row(&self, tag: &str) -> Result<ReconciliationRow> {
        let mut native_debt = Decimal::ZERO;
        let mut vault_debt = Decimal::ZERO;
        for vault in self.vaults.iter() {
            native_debt = add(native_debt, vault.debt)?;
            vault_debt = add(vault_debt, vault.debt_stake()?)?;
        }

        Ok(ReconciliationRow::new()
            .with("state", tag)
            .with("vault", "*")
            .with("aggregate_native_debt", native_debt)
            .with("aggregate_debt", vault_debt)
            .with("aggregate_vaults_debt", self.totals.native_debt)
            .with("unattributed_debt", self.totals.unattributed_debt)
            .with("distributed_debt", self.totals.distributed_debt)
            .with("aggregate_vaults_collateral", self.totals.native_collateral)
            .with("unattributed_collateral", self.totals.unattributed_collateral)
            .with("distributed_collateral", self.totals.distributed_collateral))
    }

    fn record_operation(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_operation(LEDGER, operation);
        }
    }
}

impl<R: ReportSink> Reconcile for VaultLedger<R> {
    fn reconcile_checks(&mut self, tag: &str) -> Result<ReconciliationSummary> {
        self.reconcile(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn eps() -> Decimal {
        Decimal::new(1, 8)
    }

    fn assert_close(actual: Decimal, expected: Decimal) {
        assert!(
            (actual - expected).abs() < eps(),
            "expected {} ≈ {}",
            actual,
            expected
        );
    }

    fn alice() -> AccountId {
        AccountId::new("Alice")
    }

    fn bob() -> AccountId {
        AccountId::new("Bob")
    }

    fn two_vaults() -> VaultLedger {
        let mut ledger = VaultLedger::new(Config::default());
        ledger.create_vault("Alice", dec("10000"), dec("0.15")).unwrap();
        ledger.create_vault("Bob", dec("50000"), dec("0.75")).unwrap();
        ledger
    }

    #[test]
    fn test_redistribution_split_by_debt() {
        let mut ledger = two_vaults();
        ledger.repay(dec("1000"), &alice()).unwrap();
        ledger.redistribute(dec("3000"), dec("0.25")).unwrap();

        let a = ledger.current_balances(&alice()).unwrap();
        let b = ledger.current_balances(&bob()).unwrap();
        assert_close(a.pending_debt, dec("457.62711864406779661016949"));
        assert_close(b.pending_debt, dec("2542.37288135593220338983050"));
        assert_close(a.pending_debt + b.pending_debt, dec("3000"));
        assert_eq!(a.native_debt, dec("9000"));

        let summary = ledger.reconcile("after redistribution").unwrap();
        assert!(summary.max_drift() < eps());
        assert_close(ledger.totals().native_debt, dec("62000"));
    }

    #[test]
    fn test_collateral_redistributed_by_collateral_stake() {
        let mut ledger = two_vaults();
        ledger.redistribute(dec("3000"), dec("0.3")).unwrap();

        let a = ledger.current_balances(&alice()).unwrap();
        let b = ledger.current_balances(&bob()).unwrap();
        assert_close(a.pending_collateral, dec("0.05"));
        assert_close(b.pending_collateral, dec("0.25"));
        ledger.reconcile("collateral").unwrap();
    }

    #[test]
    fn test_collateral_extension_disabled() {
        let config = Config {
            vault: VaultConfig {
                redistribute_collateral: false,
            },
            ..Config::default()
        };
        let mut ledger = VaultLedger::new(config);
        ledger.create_vault("Alice", dec("100"), dec("1")).unwrap();
        ledger.redistribute(dec("10"), dec("0.5")).unwrap();

        assert_eq!(ledger.sum_collateral(), Decimal::ZERO);
        assert_eq!(ledger.totals().distributed_collateral, Decimal::ZERO);
        ledger.reconcile("no collateral").unwrap();
    }

    #[test]
    fn test_duplicate_vault_rejected() {
        let mut ledger = two_vaults();
        let err = ledger
            .create_vault("Alice", dec("1"), Decimal::ZERO)
            .unwrap_err();
        assert!(matches!(err, Error::VaultAlreadyExists(id) if id == alice()));
        assert_eq!(ledger.totals().native_debt, dec("60000"));
    }

    #[test]
    fn test_unknown_vault_rejected() {
        let mut ledger = two_vaults();
        let before = *ledger.totals();
        let carol = AccountId::new("Carol");

        assert!(matches!(ledger.repay(dec("1"), &carol), Err(Error::VaultNotFound(_))));
        assert!(matches!(ledger.borrow(dec("1"), &carol), Err(Error::VaultNotFound(_))));
        assert!(matches!(ledger.current_balances(&carol), Err(Error::VaultNotFound(_))));
        assert_eq!(*ledger.totals(), before);
    }

    #[test]
    fn test_redistribute_against_empty_ledger() {
        let mut ledger = VaultLedger::new(Config::default());
        let err = ledger.redistribute(dec("100"), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, Error::DivisionByZero(_)));
        assert_eq!(ledger.sum_debt(), Decimal::ZERO);
        assert_eq!(ledger.totals().unattributed_debt, Decimal::ZERO);
    }

    #[test]
    fn test_collateral_against_empty_collateral_leaves_state() {
        let mut ledger = VaultLedger::new(Config::default());
        ledger.create_vault("Alice", dec("100"), Decimal::ZERO).unwrap();

        let err = ledger.redistribute(dec("10"), dec("1")).unwrap_err();
        assert!(matches!(err, Error::DivisionByZero(_)));
        assert_eq!(ledger.sum_debt(), Decimal::ZERO);
        assert_eq!(ledger.totals().distributed_debt, Decimal::ZERO);
    }

    #[test]
    fn test_settle_is_idempotent() {
        let mut ledger = two_vaults();
        ledger.redistribute(dec("600"), Decimal::ZERO).unwrap();

        ledger.settle(&alice()).unwrap();
        let once = ledger.vault(&alice()).unwrap().clone();
        let totals_once = *ledger.totals();
        ledger.settle(&alice()).unwrap();

        assert_eq!(ledger.vault(&alice()).unwrap(), &once);
        assert_eq!(*ledger.totals(), totals_once);
        assert_close(once.protocol_debt, dec("100"));
    }

    #[test]
    fn test_new_vault_does_not_absorb_past_redistribution() {
        let mut ledger = VaultLedger::new(Config::default());
        ledger.create_vault("Alice", dec("1000"), Decimal::ZERO).unwrap();
        ledger.redistribute(dec("100"), Decimal::ZERO).unwrap();
        ledger.create_vault("Bob", dec("1000"), Decimal::ZERO).unwrap();

        let b = ledger.current_balances(&bob()).unwrap();
        assert_eq!(b.pending_debt, Decimal::ZERO);
        let a = ledger.current_balances(&alice()).unwrap();
        assert_close(a.pending_debt, dec("100"));
        ledger.reconcile("late vault").unwrap();
    }

    #[test]
    fn test_attributed_debt_bears_later_redistributions() {
        let mut ledger = VaultLedger::new(Config::default());
        ledger.create_vault("Alice", dec("100"), Decimal::ZERO).unwrap();
        ledger.create_vault("Bob", dec("100"), Decimal::ZERO).unwrap();

        ledger.redistribute(dec("100"), Decimal::ZERO).unwrap();
        ledger.settle(&alice()).unwrap();
        ledger.redistribute(dec("100"), Decimal::ZERO).unwrap();

        // Alice: 50 + 150 * 0.4; Bob, unsettled: 100 * (0.5 + 0.4)
        let a = ledger.current_balances(&alice()).unwrap();
        let b = ledger.current_balances(&bob()).unwrap();
        assert_close(a.protocol_debt + a.pending_debt, dec("110"));
        assert_close(b.pending_debt, dec("90"));
        ledger.reconcile("compounding").unwrap();
    }

    #[test]
    fn test_repay_more_than_native_debt() {
        let mut ledger = two_vaults();
        ledger.redistribute(dec("6000"), Decimal::ZERO).unwrap();

        let err = ledger.repay(dec("10500"), &alice()).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance(_)));
        // Settlement staged by the failed repay is discarded too
        assert_eq!(ledger.vault(&alice()).unwrap().protocol_debt, Decimal::ZERO);
        ledger.reconcile("after failed repay").unwrap();
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let mut ledger = two_vaults();
        assert!(matches!(ledger.borrow(Decimal::ZERO, &alice()), Err(Error::InvalidAmount(_))));
        assert!(matches!(ledger.deposit(dec("-1"), &alice()), Err(Error::InvalidAmount(_))));
        assert!(matches!(
            ledger.redistribute(dec("-5"), Decimal::ZERO),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_collateral_deposit_and_withdraw() {
        let mut ledger = two_vaults();
        ledger.deposit(dec("0.25"), &alice()).unwrap();
        ledger.withdraw(dec("0.1"), &alice()).unwrap();

        assert_eq!(ledger.vault(&alice()).unwrap().collateral, dec("0.30"));
        assert_eq!(ledger.totals().native_collateral, dec("1.05"));
        assert!(matches!(
            ledger.withdraw(dec("5"), &alice()),
            Err(Error::InsufficientBalance(_))
        ));
    }

    #[test]
    fn test_reconcile_rows() {
        let mut ledger = two_vaults();
        ledger.repay(dec("1000"), &alice()).unwrap();
        ledger.redistribute(dec("3000"), dec("0.25")).unwrap();
        ledger.reconcile("after redistribution").unwrap();

        let rows = ledger.report().reconciliation_rows();
        assert_eq!(rows.len(), 3);
        assert_close(
            rows[0].decimal("pending_protocol_debt").unwrap(),
            dec("457.62711864406779661016949"),
        );
        assert_close(rows[2].decimal("aggregate_native_debt").unwrap(), dec("59000"));
        assert_close(rows[2].decimal("aggregate_debt").unwrap(), dec("62000"));
        assert_close(rows[2].decimal("distributed_debt").unwrap(), dec("3000"));

        // Once reconciled the shares are attributed
        let a = ledger.current_balances(&alice()).unwrap();
        assert_eq!(a.pending_debt, Decimal::ZERO);
        assert_close(a.protocol_debt, dec("457.62711864406779661016949"));
    }

    #[test]
    fn test_actions_recorded() {
        let mut ledger = two_vaults();
        ledger.borrow(dec("5"), &bob()).unwrap();
        let actions: Vec<&str> = ledger
            .report()
            .actions()
            .iter()
            .map(|a| a.action.as_str())
            .collect();
        assert_eq!(
            actions,
            vec!["Added vault: Alice", "Added vault: Bob", "Borrowed 5 for vault: Bob"]
        );
    }

    #[test]
    fn test_metrics_counted() {
        let metrics = Metrics::new().unwrap();
        let mut ledger = VaultLedger::new(Config::default()).with_metrics(metrics.clone());
        ledger.create_vault("Alice", dec("100"), Decimal::ZERO).unwrap();
        ledger.redistribute(dec("10"), Decimal::ZERO).unwrap();
        ledger.reconcile("metrics").unwrap();

        assert_eq!(metrics.distributions_total.with_label_values(&["vault"]).get(), 1);
        assert_eq!(metrics.settlements_total.with_label_values(&["vault"]).get(), 1);
        assert_eq!(metrics.reconciliations_total.with_label_values(&["vault"]).get(), 1);
    }
}
