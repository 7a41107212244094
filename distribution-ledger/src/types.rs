//! Core types for the distribution ledgers
//!
//! All monetary quantities are `Decimal`: exact in base ten, 28 significant
//! digits, so chained divisions stay well inside the reconciliation tolerance.

use crate::{math::add, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier (vault owner or stability provider)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Vault record held by the vault ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// Owner
    pub id: AccountId,

    /// Native debt (moved by repay / borrow)
    pub debt: Decimal,

    /// Redistributed debt already attributed to this vault
    pub protocol_debt: Decimal,

    /// Debt accumulator at last settlement
    pub sum_debt_snapshot: Decimal,

    /// Native collateral (moved by deposit / withdraw)
    pub collateral: Decimal,

    /// Redistributed collateral already attributed to this vault
    pub protocol_collateral: Decimal,

    /// Collateral accumulator at last settlement
    pub sum_collateral_snapshot: Decimal,
}

impl Vault {
    /// Debt that takes part in redistribution
    pub fn debt_stake(&self) -> Result<Decimal> {
        add(self.debt, self.protocol_debt)
    }

    /// Collateral that takes part in redistribution
    pub fn collateral_stake(&self) -> Result<Decimal> {
        add(self.collateral, self.protocol_collateral)
    }
}

/// Point-in-time view of a vault, including the share not yet attributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultBalances {
    /// Native debt
    pub native_debt: Decimal,
    /// Attributed protocol debt
    pub protocol_debt: Decimal,
    /// Pending share of redistributions since the last settlement
    pub pending_debt: Decimal,
    /// native + protocol + pending
    pub total_debt: Decimal,
    /// Native collateral
    pub native_collateral: Decimal,
    /// Attributed protocol collateral
    pub protocol_collateral: Decimal,
    /// Pending collateral share
    pub pending_collateral: Decimal,
    /// native + protocol + pending
    pub total_collateral: Decimal,
}

/// Ledger-level aggregates of the vault ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTotals {
    /// Native debt plus attributed protocol debt across all vaults
    pub native_debt: Decimal,
    /// Native collateral plus attributed protocol collateral across all vaults
    pub native_collateral: Decimal,
    /// Redistributed debt not yet attributed to any vault
    pub unattributed_debt: Decimal,
    /// Redistributed collateral not yet attributed to any vault
    pub unattributed_collateral: Decimal,
    /// Every debt amount ever redistributed
    pub distributed_debt: Decimal,
    /// Every collateral amount ever redistributed
    pub distributed_collateral: Decimal,
}

/// Stability pool depositor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Depositor
    pub id: AccountId,

    /// Compounded principal at last settlement
    pub deposited: Decimal,

    /// Reward accumulator at last settlement
    pub sum_snapshot: Decimal,

    /// Compounding factor at last settlement
    pub product_snapshot: Decimal,

    /// Pool epoch at last settlement
    pub epoch_snapshot: u64,

    /// Compounding scale at last settlement
    pub scale_snapshot: u64,

    /// Rewards settled to this provider so far
    pub rewards_claimed: Decimal,
}

/// Read-only view of a provider against the current pool state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPosition {
    /// Rewards accrued since the last settlement
    pub pending_rewards: Decimal,
    /// Principal after every liquidation since the last settlement
    pub compounded_deposit: Decimal,
}

/// Result of a stability-pool operation that tolerates unknown or duplicate providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum Outcome {
    /// State changed
    Applied,
    /// Provider unknown; nothing changed
    NotFound,
    /// Provider already registered; nothing changed
    AlreadyExists,
}

impl Outcome {
    /// Whether the operation changed the ledger
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_display() {
        let id = AccountId::new("Alice");
        assert_eq!(id.to_string(), "Alice");
        assert_eq!(AccountId::from("Alice"), id);
    }

    #[test]
    fn test_vault_stakes() {
        let vault = Vault {
            id: AccountId::new("Alice"),
            debt: Decimal::from(9000),
            protocol_debt: Decimal::from(450),
            sum_debt_snapshot: Decimal::ZERO,
            collateral: Decimal::new(40, 2),
            protocol_collateral: Decimal::new(3, 2),
            sum_collateral_snapshot: Decimal::ZERO,
        };
        assert_eq!(vault.debt_stake().unwrap(), Decimal::from(9450));
        assert_eq!(vault.collateral_stake().unwrap(), Decimal::new(43, 2));
    }

    #[test]
    fn test_vault_stake_overflow_is_error() {
        let vault = Vault {
            id: AccountId::new("Alice"),
            debt: Decimal::MAX,
            protocol_debt: Decimal::ONE,
            sum_debt_snapshot: Decimal::ZERO,
            collateral: Decimal::MAX,
            protocol_collateral: Decimal::ONE,
            sum_collateral_snapshot: Decimal::ZERO,
        };
        assert!(matches!(vault.debt_stake(), Err(crate::Error::Overflow(_))));
        assert!(matches!(
            vault.collateral_stake(),
            Err(crate::Error::Overflow(_))
        ));
    }

    #[test]
    fn test_outcome_applied() {
        assert!(Outcome::Applied.is_applied());
        assert!(!Outcome::NotFound.is_applied());
    }
}
