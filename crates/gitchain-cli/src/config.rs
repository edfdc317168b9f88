//! # CLI Configuration
//!
//! Layering, lowest to highest precedence: built-in defaults, the YAML file
//! given with `--config`, `GITCHAIN_*` environment variables, then flags.
//!
//! ```yaml
//! store:
//!   base_dir: /var/lib/gitchain
//! anchor:
//!   max_batch_size: 500
//!   gas_price_ceiling_wei: 50000000000
//! evm:
//!   rpc_url: https://rpc.example.org
//!   contract_address: "0x…"
//!   from_address: "0x…"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gitchain_anchor::{AnchorConfig, EvmLedgerConfig};
use gitchain_store::StoreConfig;
use serde::{Deserialize, Serialize};

/// Everything the CLI can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Version store settings.
    pub store: StoreConfig,
    /// Submission policy.
    pub anchor: AnchorConfig,
    /// EVM endpoint. Falls back to `GITCHAIN_EVM_*` variables when absent.
    pub evm: Option<EvmLedgerConfig>,
}

impl CliConfig {
    /// Parse a YAML config file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Resolve the effective configuration.
    pub fn load(file: Option<&Path>, data_dir: Option<&PathBuf>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.store = config.store.with_env_overrides();
        config.anchor = config
            .anchor
            .with_env_overrides()
            .context("invalid anchor settings in environment")?;
        if let Some(dir) = data_dir {
            config.store.base_dir = dir.clone();
        }
        config.anchor.validate().context("invalid anchor configuration")?;
        if let Some(evm) = &config.evm {
            evm.validate().context("invalid evm configuration")?;
        }
        tracing::debug!(base_dir = %config.store.base_dir.display(), "configuration resolved");
        Ok(config)
    }

    /// The EVM settings from the file, or else from the environment.
    pub fn evm_or_env(&self) -> Result<EvmLedgerConfig> {
        match &self.evm {
            Some(evm) => Ok(evm.clone()),
            None => EvmLedgerConfig::from_env().context("no evm section in config and GITCHAIN_EVM_* incomplete"),
        }
    }
}
