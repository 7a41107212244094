//! Stability pool reward ledger
//!
//! Depositors absorb liquidated debt in proportion to their principal and earn
//! the liquidation reward in the same proportion. A liquidation updates two
//! numbers, regardless of how many depositors there are:
//!
//! ```text
//! sum     += reward / pool * product
//! product *= 1 - debt / pool
//! ```
//!
//! A depositor settled at `(sum_t, product_t)` is owed
//! `deposited * (sum - sum_t) / product_t` in rewards and holds
//! `deposited * product / product_t` of principal.
//!
//! A liquidation equal to the whole pool would set `product` to zero. Under
//! [`FullLiquidationPolicy::NewEpoch`] the epoch is closed instead: its final
//! `sum` is kept for depositors who settle later, and the next epoch starts
//! from `sum = 0`, `product = 1`.
//!
//! # Scales
//!
//! `Decimal` carries at most 28 decimal places, so a `product` far below one
//! keeps few significant digits. Whenever a liquidation would take it under
//! [`MIN_PRODUCT`] it is multiplied by [`SCALE_FACTOR`] and the scale counter
//! moves up; `sum` restarts at zero for the new scale. A depositor snapshotted
//! `n` scales back sees the later sums and the current `product` divided by
//! `SCALE_FACTOR^n`.

use crate::{
    config::FullLiquidationPolicy,
    math::{add, div, ensure_non_negative, ensure_positive, mul, sub},
    metrics::Metrics,
    reconcile::{Reconcile, ReconciliationSummary},
    registry::Registry,
    report::{ReconciliationRow, Report, ReportSink},
    types::{AccountId, Outcome, Provider, ProviderPosition},
    Config, Error, Result,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

const LEDGER: &str = "stability";

/// Smallest `product` kept within a scale
pub const MIN_PRODUCT: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

/// Factor applied to `product` when it moves to the next scale
pub const SCALE_FACTOR: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Stability pool
#[derive(Debug)]
pub struct StabilityPool<R: ReportSink = Report> {
    providers: Registry<Provider>,

    /// Principal held by the pool
    pool_deposits: Decimal,

    /// Rewards credited by liquidations and not yet settled to a provider
    unclaimed_rewards: Decimal,

    sum: Decimal,
    product: Decimal,
    epoch: u64,
    scale: u64,

    /// Final `sum` of every closed (epoch, scale)
    closed_sums: HashMap<(u64, u64), Decimal>,

    config: Config,
    report: R,
    metrics: Option<Metrics>,
}

impl StabilityPool<Report> {
    /// Pool writing to an in-memory [`Report`]
    pub fn new(config: Config) -> Self {
        Self::with_report(config, Report::new())
    }
}

impl<R: ReportSink> StabilityPool<R> {
    /// Pool writing to `report`
    pub fn with_report(config: Config, report: R) -> Self {
        Self {
            providers: Registry::new(),
            pool_deposits: Decimal::ZERO,
            unclaimed_rewards: Decimal::ZERO,
            sum: Decimal::ZERO,
            product: Decimal::ONE,
            epoch: 0,
            scale: 0,
            closed_sums: HashMap::new(),
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

    /// Register a depositor; a duplicate is logged and ignored
    pub fn add_provider(&mut self, id: impl Into<AccountId>) -> Outcome {
        let id = id.into();
        let inserted = self.providers.insert(Provider {
            id: id.clone(),
            deposited: Decimal::ZERO,
            sum_snapshot: self.sum,
            product_snapshot: self.product,
            epoch_snapshot: self.epoch,
            scale_snapshot: self.scale,
            rewards_claimed: Decimal::ZERO,
        });
        if !inserted {
            tracing::warn!(provider = %id, "Provider already exists");
            return Outcome::AlreadyExists;
        }

        tracing::info!(provider = %id, "Provider added");
        self.report.record_action(format!("Added provider: {}", id));
        self.record_operation("add_provider");
        Outcome::Applied
    }

    /// Add principal; an unknown provider is logged and ignored
    pub fn deposit(&mut self, amount: Decimal, id: &AccountId) -> Result<Outcome> {
        ensure_positive(amount, "deposit amount")?;
        let outcome = self.apply(id, "deposit", |provider, pool| {
            provider.deposited = add(provider.deposited, amount)?;
            *pool = add(*pool, amount)?;
            Ok(())
        })?;
        if outcome.is_applied() {
            self.report
                .record_action(format!("Deposited {} for provider: {}", amount, id));
        }
        Ok(outcome)
    }

    /// Remove principal; an unknown provider is logged and ignored
    pub fn withdraw(&mut self, amount: Decimal, id: &AccountId) -> Result<Outcome> {
        ensure_positive(amount, "withdraw amount")?;
        let outcome = self.apply(id, "withdraw", |provider, pool| {
            if amount > provider.deposited {
                return Err(Error::InsufficientBalance(format!(
                    "provider {} holds {} after compounding, cannot withdraw {}",
                    provider.id, provider.deposited, amount
                )));
            }
            provider.deposited = sub(provider.deposited, amount)?;
            *pool = sub(*pool, amount)?;
            Ok(())
        })?;
        if outcome.is_applied() {
            self.report
                .record_action(format!("Withdrew {} for provider: {}", amount, id));
        }
        Ok(outcome)
    }

    /// Burn `debt_amount` of pooled principal and credit `reward_amount`
    ///
    /// Pool deposits at or below the reconciliation tolerance count as an
    /// empty pool and fail with `DivisionByZero`.
    pub fn liquidate(&mut self, debt_amount: Decimal, reward_amount: Decimal) -> Result<()> {
        ensure_non_negative(debt_amount, "liquidated debt")?;
        ensure_non_negative(reward_amount, "liquidation reward")?;

        let pool = self.pool_deposits;
        if pool <= self.config.tolerance {
            return Err(Error::DivisionByZero(format!(
                "stability pool deposits of {} are empty",
                pool
            )));
        }
        let reward_per_unit = div(reward_amount, pool, "stability pool deposits")?;
        if debt_amount > pool {
            return Err(Error::InsufficientBalance(format!(
                "cannot liquidate {} against pool deposits of {}",
                debt_amount, pool
            )));
        }

        let sum = add(self.sum, mul(reward_per_unit, self.product)?)?;
        let unclaimed_rewards = add(self.unclaimed_rewards, reward_amount)?;

        if debt_amount == pool {
            if self.config.stability.full_liquidation == FullLiquidationPolicy::Reject {
                return Err(Error::FullLiquidation(format!(
                    "liquidating {} would empty the pool",
                    debt_amount
                )));
            }

            self.closed_sums.insert((self.epoch, self.scale), sum);
            self.epoch += 1;
            self.scale = 0;
            self.sum = Decimal::ZERO;
            self.product = Decimal::ONE;
            self.pool_deposits = Decimal::ZERO;
            tracing::info!(epoch = self.epoch, "Pool emptied, new epoch started");
        } else {
            let pool_deposits = sub(pool, debt_amount)?;
            let (product, rescales) = self.next_product(pool_deposits, pool)?;

            if rescales == 0 {
                self.sum = sum;
            } else {
                self.closed_sums.insert((self.epoch, self.scale), sum);
                for skipped in 1..rescales {
                    self.closed_sums
                        .insert((self.epoch, self.scale + skipped), Decimal::ZERO);
                }
                self.scale += rescales;
                self.sum = Decimal::ZERO;
                tracing::info!(epoch = self.epoch, scale = self.scale, "Product rescaled");
            }
            self.product = product;
            self.pool_deposits = pool_deposits;
        }
        self.unclaimed_rewards = unclaimed_rewards;

        tracing::info!(
            %debt_amount,
            %reward_amount,
            sum = %self.sum,
            product = %self.product,
            pool_deposits = %self.pool_deposits,
            "Liquidated"
        );
        self.report.record_action(format!(
            "Liquidated {} debt for {} reward",
            debt_amount, reward_amount
        ));
        if let Some(metrics) = &self.metrics {
            metrics.record_distribution(LEDGER);
        }
        self.record_operation("liquidate");
        Ok(())
    }

    /// Rewards owed and compounded principal, without settling
    pub fn position(&self, id: &AccountId) -> Option<Result<ProviderPosition>> {
        self.providers.get(id).map(|p| self.position_of(p))
    }

    /// Check principal and rewards against the pool totals
    ///
    /// Reads every provider without settling it. Emits one row per provider
    /// when the checks pass.
    pub fn reconcile(&mut self, tag: &str) -> Result<ReconciliationSummary> {
        let tolerance = self.config.tolerance;
        let mut aggregate_balance = Decimal::ZERO;
        let mut aggregate_rewards = Decimal::ZERO;
        let mut rows = Vec::with_capacity(self.providers.len());

        for provider in self.providers.iter() {
            let position = self.position_of(provider)?;
            aggregate_rewards = add(aggregate_rewards, position.pending_rewards)?;
            aggregate_balance = add(aggregate_balance, position.compounded_deposit)?;
            rows.push(
                ReconciliationRow::new()
                    .with("state", tag)
                    .with("provider", provider.id.as_str())
                    .with("rewards", position.pending_rewards)
                    .with("balance", position.compounded_deposit)
                    .with("rewards_claimed", provider.rewards_claimed)
                    .with("pool_rewards", self.unclaimed_rewards)
                    .with("pool_balance", self.pool_deposits),
            );
        }

        let mut summary = ReconciliationSummary::new(tag);
        let checked = summary
            .check(
                "provider balances vs pool deposits",
                aggregate_balance,
                self.pool_deposits,
                tolerance,
            )
            .and_then(|_| {
                summary.check(
                    "provider rewards vs unclaimed rewards",
                    aggregate_rewards,
                    self.unclaimed_rewards,
                    tolerance,
                )
            });

        if let Err(e) = checked {
            tracing::error!(tag, error = %e, "Stability pool reconciliation failed");
            if let Some(metrics) = &self.metrics {
                metrics.record_reconciliation(LEDGER, false);
            }
            return Err(e);
        }

        for row in rows {
            self.report.record_reconciliation_row(row);
        }
        tracing::info!(
            tag,
            providers = self.providers.len(),
            max_drift = %summary.max_drift(),
            "Stability pool reconciliation passed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_reconciliation(LEDGER, true);
        }
        Ok(summary)
    }

    /// Provider record
    pub fn provider(&self, id: &AccountId) -> Option<&Provider> {
        self.providers.get(id)
    }

    /// Providers in registration order
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    /// Principal held by the pool
    pub fn pool_deposits(&self) -> Decimal {
        self.pool_deposits
    }

    /// Rewards not yet settled to a provider
    pub fn unclaimed_rewards(&self) -> Decimal {
        self.unclaimed_rewards
    }

    /// Reward accumulator of the current epoch
    pub fn sum(&self) -> Decimal {
        self.sum
    }

    /// Compounding factor of the current epoch
    pub fn product(&self) -> Decimal {
        self.product
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Current compounding scale within the epoch
    pub fn scale(&self) -> u64 {
        self.scale
    }

    /// Report sink
    pub fn report(&self) -> &R {
        &self.report
    }

    /// Consume the pool, keeping its report
    pub fn into_report(self) -> R {
        self.report
    }

    /// Settle `id`, let `op` adjust principal and pool on staged copies,
    /// re-snapshot, commit
    fn apply<F>(&mut self, id: &AccountId, operation: &str, op: F) -> Result<Outcome>
    where
        F: FnOnce(&mut Provider, &mut Decimal) -> Result<()>,
    {
        let Some(slot) = self.providers.slot(id) else {
            tracing::warn!(provider = %id, operation, "Provider does not exist");
            return Ok(Outcome::NotFound);
        };

        let mut provider = self.providers.at(slot).clone();
        let mut pool = self.pool_deposits;

        let position = self.position_of(&provider)?;
        let unclaimed_rewards = sub(self.unclaimed_rewards, position.pending_rewards)?;
        provider.rewards_claimed = add(provider.rewards_claimed, position.pending_rewards)?;
        provider.deposited = position.compounded_deposit;

        op(&mut provider, &mut pool)?;

        if provider.deposited.is_zero() && !pool.is_zero() && self.only_principal(slot)? {
            tracing::debug!(residue = %pool, "Last principal left the pool, clearing residue");
            pool = Decimal::ZERO;
        }

        provider.sum_snapshot = self.sum;
        provider.product_snapshot = self.product;
        provider.epoch_snapshot = self.epoch;
        provider.scale_snapshot = self.scale;

        if !position.pending_rewards.is_zero() {
            tracing::debug!(
                provider = %provider.id,
                rewards = %position.pending_rewards,
                compounded = %position.compounded_deposit,
                "Settled provider"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_settlement(LEDGER);
            }
        }

        self.providers.replace(slot, provider);
        self.pool_deposits = pool;
        self.unclaimed_rewards = unclaimed_rewards;
        self.record_operation(operation);
        Ok(Outcome::Applied)
    }

    /// Whether no provider other than `slot` still holds principal
    fn only_principal(&self, slot: usize) -> Result<bool> {
        for (other, provider) in self.providers.iter().enumerate() {
            if other != slot && !self.position_of(provider)?.compounded_deposit.is_zero() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `product * remaining / pool`, rescaled until it is at least
    /// [`MIN_PRODUCT`]; returns the new product and the number of rescales
    fn next_product(&self, remaining: Decimal, pool: Decimal) -> Result<(Decimal, u64)> {
        let mut scaled_remaining = remaining;
        let mut rescales = 0;
        loop {
            let ratio = div(scaled_remaining, pool, "stability pool deposits")?;
            let product = mul(self.product, ratio)?;
            if product >= MIN_PRODUCT {
                return Ok((product, rescales));
            }
            scaled_remaining = mul(scaled_remaining, SCALE_FACTOR)?;
            rescales += 1;
        }
    }

    /// Final `sum` of `(epoch, scale)`, or the running one if it is current
    fn sum_at(&self, epoch: u64, scale: u64) -> Option<Decimal> {
        if (epoch, scale) == (self.epoch, self.scale) {
            Some(self.sum)
        } else {
            self.closed_sums.get(&(epoch, scale)).copied()
        }
    }

    fn position_of(&self, provider: &Provider) -> Result<ProviderPosition> {
        if provider.deposited.is_zero() {
            return Ok(ProviderPosition {
                pending_rewards: Decimal::ZERO,
                compounded_deposit: Decimal::ZERO,
            });
        }

        let epoch = provider.epoch_snapshot;
        let first = self.sum_at(epoch, provider.scale_snapshot).ok_or_else(|| {
            Error::Other(format!(
                "no sum for epoch {} scale {} of provider {}",
                epoch, provider.scale_snapshot, provider.id
            ))
        })?;

        // Sums of later scales count SCALE_FACTOR times less per scale
        let mut reward_per_unit = sub(first, provider.sum_snapshot)?;
        let mut shrink = Decimal::ONE;
        let mut scale = provider.scale_snapshot;
        loop {
            scale += 1;
            shrink = div(shrink, SCALE_FACTOR, "scale factor")?;
            let Some(later) = self.sum_at(epoch, scale) else {
                break;
            };
            if shrink.is_zero() {
                break;
            }
            reward_per_unit = add(reward_per_unit, mul(later, shrink)?)?;
        }

        let pending_rewards = div(
            mul(provider.deposited, reward_per_unit)?,
            provider.product_snapshot,
            "provider product snapshot",
        )?;

        let compounded_deposit = if epoch == self.epoch {
            let mut compounded = div(
                mul(provider.deposited, self.product)?,
                provider.product_snapshot,
                "provider product snapshot",
            )?;
            for _ in provider.scale_snapshot..self.scale {
                if compounded.is_zero() {
                    break;
                }
                compounded = div(compounded, SCALE_FACTOR, "scale factor")?;
            }
            compounded
        } else {
            Decimal::ZERO
        };

        Ok(ProviderPosition {
            pending_rewards,
            compounded_deposit,
        })
    }

    fn record_operation(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_operation(LEDGER, operation);
        }
    }
}

impl<R: ReportSink> Reconcile for StabilityPool<R> {
    fn reconcile_checks(&mut self, tag: &str) -> Result<ReconciliationSummary> {
        self.reconcile(tag)
    }
}
