//! Service configuration.
//!
//! Everything except the chain private key lives in a TOML file; the key is
//! supplied on the command line or through the environment.

use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Ledger platform access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Ledger API base url
    pub url: String,
    /// Signer proxy that builds, signs and submits review transactions
    pub signer_proxy_url: String,
    /// Account owning the bridged assets; reviews withdraw requests
    pub owner: String,
}

/// ERC20 chain access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// RPC endpoint url
    pub rpc_url: String,
    /// Blocks required on top of the transfer block before approval
    pub confirmations: u64,
    /// Gas limit of payout transactions
    pub gas_limit: u64,
    /// Legacy gas price of payout transactions, in wei
    pub gas_price: u64,
}

/// Poll cadence of the workers and the asset watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub period_secs: u64,
    pub retry_delay_secs: u64,
    /// Continuous failure time after which a worker gives up
    pub max_failure_window_secs: u64,
    pub page_limit: u32,
    pub asset_period_secs: u64,
    /// Attempts at recording a broadcast transfer on the ledger
    pub record_retries: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            period_secs: 15,
            retry_delay_secs: 15,
            max_failure_window_secs: 3600,
            page_limit: 10,
            asset_period_secs: 30,
            record_retries: 5,
        }
    }
}

impl PollConfig {
    pub const fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub const fn max_failure_window(&self) -> Duration {
        Duration::from_secs(self.max_failure_window_secs)
    }

    pub const fn asset_period(&self) -> Duration {
        Duration::from_secs(self.asset_period_secs)
    }
}

/// Prometheus exporter; disabled unless a port is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub port: Option<u16>,
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub ledger: LedgerConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ServiceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.owner.is_empty() {
            return Err(ConfigError::Invalid("ledger.owner is empty".to_string()));
        }
        if self.poll.page_limit == 0 {
            return Err(ConfigError::Invalid("poll.page_limit must be positive".to_string()));
        }
        if self.poll.retry_delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll.retry_delay_secs must be positive".to_string(),
            ));
        }
        if self.poll.max_failure_window_secs < self.poll.retry_delay_secs {
            return Err(ConfigError::Invalid(
                "poll.max_failure_window_secs is shorter than poll.retry_delay_secs".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [ledger]
        url = "http://localhost:8000"
        signer_proxy_url = "http://localhost:9061"
        owner = "GBA4EX43M25UPV4WIE6RRMQOFTWXZZRIPFAI5VPY6Z2ZVVXVWZ6NEOOB"

        [chain]
        rpc_url = "http://localhost:8545"
        confirmations = 12
        gas_limit = 100000
        gas_price = 20000000000
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ServiceConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.poll, PollConfig::default());
        assert_eq!(config.poll.period(), Duration::from_secs(15));
        assert_eq!(config.poll.max_failure_window(), Duration::from_secs(3600));
        assert_eq!(config.metrics.port, None);
        assert_eq!(config.chain.confirmations, 12);
    }

    #[test]
    fn test_partial_poll_section() {
        let contents = format!("{MINIMAL}\n[poll]\npage_limit = 25\n");
        let config = ServiceConfig::from_toml(&contents).unwrap();

        assert_eq!(config.poll.page_limit, 25);
        assert_eq!(config.poll.retry_delay_secs, 15);
    }

    #[test]
    fn test_zero_page_limit_rejected() {
        let contents = format!("{MINIMAL}\n[poll]\npage_limit = 0\n");
        let result = ServiceConfig::from_toml(&contents);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_failure_window_shorter_than_retry_delay_rejected() {
        let contents =
            format!("{MINIMAL}\n[poll]\nretry_delay_secs = 30\nmax_failure_window_secs = 10\n");
        let result = ServiceConfig::from_toml(&contents);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_chain_section_fails() {
        let result = ServiceConfig::from_toml(
            r#"
            [ledger]
            url = "http://localhost:8000"
            signer_proxy_url = "http://localhost:9061"
            owner = "G"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
