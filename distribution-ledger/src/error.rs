//! Error types for the distribution ledgers

use crate::types::AccountId;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Vault created twice
    #[error("Vault already exists: {0}")]
    VaultAlreadyExists(AccountId),

    /// Vault not found
    #[error("Vault not found: {0}")]
    VaultNotFound(AccountId),

    /// Amount rejected before touching state
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Balance too small for the requested debit
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Distribution against an empty aggregate
    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    /// Liquidation would empty the stability pool and the policy forbids it
    #[error("Full liquidation rejected: {0}")]
    FullLiquidation(String),

    /// Decimal overflow
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Invariant violation (conservation of debt, rewards, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
