//! Anchoring configuration.
//!
//! Defaults are usable for a local chain. Override via environment variables
//! or a YAML config file loaded by the CLI.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Default number of items per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Default gas price ceiling: 100 gwei.
pub const DEFAULT_GAS_PRICE_CEILING_WEI: u64 = 100_000_000_000;

/// Submission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Maximum items per batch. Larger item sets are chunked by the caller.
    pub max_batch_size: usize,
    /// Attempts per retry cycle.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles each attempt after that.
    pub base_backoff_ms: u64,
    /// Upper bound for a single backoff.
    pub max_backoff_ms: u64,
    /// Submissions are refused while the network fee estimate is above this.
    pub gas_price_ceiling_wei: u64,
    /// How long one attempt waits for its transaction to be mined.
    pub confirmation_timeout_secs: u64,
    /// Interval between transaction status polls.
    pub poll_interval_ms: u64,
    /// Timeout for registry reads.
    pub rpc_timeout_secs: u64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_attempts: 5,
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
            gas_price_ceiling_wei: DEFAULT_GAS_PRICE_CEILING_WEI,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 2_000,
            rpc_timeout_secs: 30,
        }
    }
}

impl AnchorConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// Variables:
    /// - `GITCHAIN_MAX_BATCH_SIZE` (default: 1000)
    /// - `GITCHAIN_ANCHOR_MAX_ATTEMPTS` (default: 5)
    /// - `GITCHAIN_ANCHOR_BASE_BACKOFF_MS` (default: 500)
    /// - `GITCHAIN_ANCHOR_MAX_BACKOFF_MS` (default: 30000)
    /// - `GITCHAIN_GAS_PRICE_CEILING_WEI` (default: 100 gwei)
    /// - `GITCHAIN_CONFIRMATION_TIMEOUT_SECS` (default: 120)
    /// - `GITCHAIN_POLL_INTERVAL_MS` (default: 2000)
    /// - `GITCHAIN_RPC_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let config = Self {
            max_batch_size: env_parse("GITCHAIN_MAX_BATCH_SIZE", self.max_batch_size)?,
            max_attempts: env_parse("GITCHAIN_ANCHOR_MAX_ATTEMPTS", self.max_attempts)?,
            base_backoff_ms: env_parse("GITCHAIN_ANCHOR_BASE_BACKOFF_MS", self.base_backoff_ms)?,
            max_backoff_ms: env_parse("GITCHAIN_ANCHOR_MAX_BACKOFF_MS", self.max_backoff_ms)?,
            gas_price_ceiling_wei: env_parse(
                "GITCHAIN_GAS_PRICE_CEILING_WEI",
                self.gas_price_ceiling_wei,
            )?,
            confirmation_timeout_secs: env_parse(
                "GITCHAIN_CONFIRMATION_TIMEOUT_SECS",
                self.confirmation_timeout_secs,
            )?,
            poll_interval_ms: env_parse("GITCHAIN_POLL_INTERVAL_MS", self.poll_interval_ms)?,
            rpc_timeout_secs: env_parse("GITCHAIN_RPC_TIMEOUT_SECS", self.rpc_timeout_secs)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make submission impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.base_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// Delay before attempt `attempt` (1-based) of a retry cycle.
    ///
    /// Zero for the first attempt, then `base × 2^(attempt-2)` capped at
    /// `max_backoff_ms`, so the wait before attempt `n + 1` is `base × 2^(n-1)`.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(32);
        let ms = self.base_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }

    /// Confirmation window for one attempt.
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Status poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Registry read timeout.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

/// Connection settings for an EVM JSON-RPC endpoint.
///
/// Transactions are signed by the node (`eth_sendTransaction`), so no key
/// material lives here. `Debug` prints only the RPC origin because hosted
/// endpoints often carry an API key in the path.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmLedgerConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Certification contract address (`0x` + 40 hex).
    pub contract_address: String,
    /// Account the node signs with (`0x` + 40 hex).
    pub from_address: String,
    /// Human-readable chain name for logs and reports.
    #[serde(default = "default_chain_name")]
    pub chain_name: String,
    /// Expected chain id. Checked against `eth_chainId` when set.
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Blocks (including the one it was mined in) before a transaction
    /// counts as confirmed.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

fn default_chain_name() -> String {
    "evm".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_confirmations() -> u64 {
    1
}

impl std::fmt::Debug for EvmLedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmLedgerConfig")
            .field("rpc_origin", &self.rpc_url.origin().ascii_serialization())
            .field("contract_address", &self.contract_address)
            .field("from_address", &self.from_address)
            .field("chain_name", &self.chain_name)
            .field("chain_id", &self.chain_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("confirmations", &self.confirmations)
            .finish()
    }
}

impl EvmLedgerConfig {
    /// Load from environment variables.
    ///
    /// Variables:
    /// - `GITCHAIN_EVM_RPC_URL` (default: `http://127.0.0.1:8545`)
    /// - `GITCHAIN_CONTRACT_ADDRESS` (required)
    /// - `GITCHAIN_FROM_ADDRESS` (required)
    /// - `GITCHAIN_CHAIN_NAME` (default: `evm`)
    /// - `GITCHAIN_CHAIN_ID` (optional)
    /// - `GITCHAIN_EVM_TIMEOUT_SECS` (default: 30)
    /// - `GITCHAIN_EVM_CONFIRMATIONS` (default: 1)
    pub fn from_env() -> Result<Self, ConfigError> {
        let contract_address = env_required("GITCHAIN_CONTRACT_ADDRESS")?;
        let from_address = env_required("GITCHAIN_FROM_ADDRESS")?;
        let chain_id = match std::env::var("GITCHAIN_CHAIN_ID") {
            Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "GITCHAIN_CHAIN_ID".into(),
                value: raw,
            })?),
            Err(_) => None,
        };
        let config = Self {
            rpc_url: env_url("GITCHAIN_EVM_RPC_URL", "http://127.0.0.1:8545")?,
            contract_address,
            from_address,
            chain_name: std::env::var("GITCHAIN_CHAIN_NAME").unwrap_or_else(|_| default_chain_name()),
            chain_id,
            timeout_secs: env_parse("GITCHAIN_EVM_TIMEOUT_SECS", default_timeout_secs())?,
            confirmations: env_parse("GITCHAIN_EVM_CONFIRMATIONS", default_confirmations())?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check address formats.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("contract_address", &self.contract_address),
            ("from_address", &self.from_address),
        ] {
            if !is_valid_eth_address(value) {
                return Err(ConfigError::InvalidValue {
                    var: name.into(),
                    value: value.clone(),
                });
            }
        }
        if self.confirmations == 0 {
            return Err(ConfigError::Invalid("confirmations must be at least 1".into()));
        }
        Ok(())
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `0x` followed by exactly 40 hex characters.
pub fn is_valid_eth_address(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn env_required(var: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::Missing(var.to_string()))
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}
