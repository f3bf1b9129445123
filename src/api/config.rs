// Configuration for Integrity Verify
//
// The batch configuration file (chains and contracts) and the per-run options.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::types::ContractConfig;
use crate::ethereum::ChainConfig;

/// Named-immutable upgrade threshold used when none is configured
pub const DEFAULT_PASS_THRESHOLD: u8 = 90;

/// Chains and contracts of a verification batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Chain descriptors keyed by the name contracts refer to
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,

    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
}

impl VerifierConfig {
    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.get(name)
    }
}

/// Configuration manager for Integrity Verify
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<VerifierConfig> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(config: &VerifierConfig, path: P) -> Result<()> {
        let config_str = serde_json::to_string_pretty(config)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    /// Create a builder for configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for creating configurations
#[derive(Default)]
pub struct ConfigBuilder {
    config: VerifierConfig,
}

impl ConfigBuilder {
    /// Register a chain under `name`
    pub fn chain(mut self, name: impl Into<String>, chain: ChainConfig) -> Self {
        self.config.chains.insert(name.into(), chain);
        self
    }

    /// Append a contract
    pub fn contract(mut self, contract: ContractConfig) -> Self {
        self.config.contracts.push(contract);
        self
    }

    pub fn build(self) -> VerifierConfig {
        self.config
    }
}

/// Options for a verification run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Log matched constructor arguments and per-check detail
    pub verbose: bool,

    pub skip_bytecode: bool,

    pub skip_abi: bool,

    pub skip_state: bool,

    /// Only verify the contract with this name (case-insensitive)
    pub contract_filter: Option<String>,

    /// Only verify contracts on this chain (case-insensitive)
    pub chain_filter: Option<String>,

    /// Minimum heuristic match percentage for named immutables to upgrade a failed comparison
    pub pass_threshold: u8,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            skip_bytecode: false,
            skip_abi: false,
            skip_state: false,
            contract_filter: None,
            chain_filter: None,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

impl VerifyOptions {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Whether `contract` passes the name and chain filters
    pub fn selects(&self, contract: &ContractConfig) -> bool {
        let matches = |filter: &Option<String>, value: &str| {
            filter
                .as_deref()
                .map_or(true, |filter| filter.eq_ignore_ascii_case(value))
        };
        matches(&self.contract_filter, &contract.name) && matches(&self.chain_filter, &contract.chain)
    }
}

/// Builder for `VerifyOptions`
#[derive(Default)]
pub struct OptionsBuilder {
    options: VerifyOptions,
}

impl OptionsBuilder {
    pub fn verbose(mut self, value: bool) -> Self {
        self.options.verbose = value;
        self
    }

    pub fn skip_bytecode(mut self, value: bool) -> Self {
        self.options.skip_bytecode = value;
        self
    }

    pub fn skip_abi(mut self, value: bool) -> Self {
        self.options.skip_abi = value;
        self
    }

    pub fn skip_state(mut self, value: bool) -> Self {
        self.options.skip_state = value;
        self
    }

    pub fn contract_filter(mut self, name: impl Into<String>) -> Self {
        self.options.contract_filter = Some(name.into());
        self
    }

    pub fn chain_filter(mut self, chain: impl Into<String>) -> Self {
        self.options.chain_filter = Some(chain.into());
        self
    }

    /// Clamped to 100
    pub fn pass_threshold(mut self, value: u8) -> Self {
        self.options.pass_threshold = value.min(100);
        self
    }

    pub fn build(self) -> VerifyOptions {
        self.options
    }
}
