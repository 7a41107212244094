//! Configuration for the ledgers

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Maximum absolute drift accepted by reconciliation
    pub tolerance: Decimal,

    /// Collateral price used for collateralization ratios in reports
    pub collateral_price: Decimal,

    /// Vault ledger configuration
    pub vault: VaultConfig,

    /// Stability pool configuration
    pub stability: StabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "distribution-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            tolerance: Decimal::new(1, 8),           // 1e-8
            collateral_price: Decimal::from(60_000), // quote units per collateral unit
            vault: VaultConfig::default(),
            stability: StabilityConfig::default(),
        }
    }
}

/// Vault ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Redistribute collateral alongside debt
    pub redistribute_collateral: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            redistribute_collateral: true,
        }
    }
}

/// Stability pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StabilityConfig {
    /// What a liquidation that empties the pool does
    pub full_liquidation: FullLiquidationPolicy,
}

/// Handling of a liquidation equal to the whole pool
///
/// Such a liquidation drives the compounding factor to zero, after which no
/// unsettled depositor could be compounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FullLiquidationPolicy {
    /// Refuse the liquidation
    Reject,
    /// Close the current epoch and restart the factor at one
    #[default]
    NewEpoch,
}

impl FromStr for FullLiquidationPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "reject" => Ok(FullLiquidationPolicy::Reject),
            "new_epoch" => Ok(FullLiquidationPolicy::NewEpoch),
            other => Err(crate::Error::Config(format!(
                "Unknown full liquidation policy: {}",
                other
            ))),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(price) = std::env::var("LEDGER_COLLATERAL_PRICE") {
            config.collateral_price = parse_decimal("LEDGER_COLLATERAL_PRICE", &price)?;
        }

        if let Ok(tolerance) = std::env::var("LEDGER_TOLERANCE") {
            config.tolerance = parse_decimal("LEDGER_TOLERANCE", &tolerance)?;
        }

        if let Ok(flag) = std::env::var("LEDGER_REDISTRIBUTE_COLLATERAL") {
            config.vault.redistribute_collateral = flag.parse().map_err(|_| {
                crate::Error::Config(format!(
                    "LEDGER_REDISTRIBUTE_COLLATERAL must be true or false, got {}",
                    flag
                ))
            })?;
        }

        if let Ok(policy) = std::env::var("LEDGER_FULL_LIQUIDATION") {
            config.stability.full_liquidation = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> crate::Result<()> {
        if self.tolerance <= Decimal::ZERO {
            return Err(crate::Error::Config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.collateral_price <= Decimal::ZERO {
            return Err(crate::Error::Config(format!(
                "collateral_price must be positive, got {}",
                self.collateral_price
            )));
        }
        Ok(())
    }
}

fn parse_decimal(var: &str, value: &str) -> crate::Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|e| crate::Error::Config(format!("{} is not a decimal ({}): {}", var, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "distribution-ledger");
        assert_eq!(config.tolerance, Decimal::from_str("0.00000001").unwrap());
        assert!(config.vault.redistribute_collateral);
        assert_eq!(
            config.stability.full_liquidation,
            FullLiquidationPolicy::NewEpoch
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
collateral_price = "42000"

[stability]
full_liquidation = "reject"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.collateral_price, Decimal::from(42_000));
        assert_eq!(config.stability.full_liquidation, FullLiquidationPolicy::Reject);
        assert_eq!(config.tolerance, Decimal::new(1, 8));
    }

    #[test]
    fn test_invalid_tolerance_rejected() {
        let config = Config {
            tolerance: Decimal::ZERO,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "reject".parse::<FullLiquidationPolicy>().unwrap(),
            FullLiquidationPolicy::Reject
        );
        assert!("sometimes".parse::<FullLiquidationPolicy>().is_err());
    }
}
