// API Types for Integrity Verify
//
// Inputs describing what to verify and the result records produced for each
// contract and for a whole batch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::CheckStatus;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bytecode::{
    AbiComparisonResult, ArgsValidation, BytecodeComparisonResult, ConstructorArgs, DefinitiveBytecodeResult,
    GroupedImmutableDifference, ImmutableValuesResult, LinkedLibraryResult,
};
use crate::compare::Comparison;
use crate::ethereum::ChainConfig;
use crate::storage::{NamespaceConfig, NamespaceResult, SlotConfig, SlotResult, StoragePathConfig, StoragePathResult};

/// A deployed contract to verify
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractConfig {
    /// Display name
    pub name: String,

    /// Key into the configured chains
    pub chain: String,

    /// Deployed address (the proxy address for proxies)
    pub address: Address,

    /// Artifact identifier handed to the artifact source
    pub artifact_file: String,

    /// Follow the EIP-1967 implementation slot before comparing bytecode
    #[serde(default)]
    pub is_proxy: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor_args: Option<ConstructorArgs>,

    /// Expected immutable values by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable_values: Option<BTreeMap<String, Value>>,

    /// Deployed library addresses, keyed by `sourcePath:LibraryName` or bare library name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_libraries: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_verification: Option<StateVerificationConfig>,
}

impl ContractConfig {
    pub fn new(name: impl Into<String>, chain: impl Into<String>, address: Address, artifact_file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: chain.into(),
            address,
            artifact_file: artifact_file.into(),
            is_proxy: false,
            constructor_args: None,
            immutable_values: None,
            linked_libraries: None,
            state_verification: None,
        }
    }
}

/// State checks to run against a contract
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateVerificationConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub view_calls: Vec<ViewCallConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<NamespaceConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<SlotConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_paths: Vec<StoragePathConfig>,

    /// Schema identifier used to resolve `storage_paths`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<String>,
}

impl StateVerificationConfig {
    /// Number of top-level checks configured
    pub fn check_count(&self) -> usize {
        self.view_calls.len() + self.namespaces.len() + self.slots.len() + self.storage_paths.len()
    }
}

/// A read-only function call and its expected result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewCallConfig {
    pub function: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,

    pub expected: Value,

    #[serde(default)]
    pub comparison: Comparison,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewCallResult {
    pub function: String,
    pub expected: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub status: CheckStatus,
    pub message: String,
}

/// Outcome of every state check of one contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateVerificationResult {
    pub status: CheckStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub view_call_results: Vec<ViewCallResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace_results: Vec<NamespaceResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slot_results: Vec<SlotResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_path_results: Vec<StoragePathResult>,
}

impl StateVerificationResult {
    /// Statuses of every top-level state check in configuration order
    pub fn statuses(&self) -> Vec<CheckStatus> {
        self.view_call_results
            .iter()
            .map(|r| r.status)
            .chain(self.namespace_results.iter().map(|r| r.status))
            .chain(self.slot_results.iter().map(|r| r.status))
            .chain(self.storage_path_results.iter().map(|r| r.status))
            .collect()
    }
}

/// Overall verdict for one contract within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractOutcome {
    Passed,
    Failed,
    Warnings,
    Skipped,
}

/// Everything learned about one contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractVerificationResult {
    pub contract: ContractConfig,

    pub chain: ChainConfig,

    /// Address whose code was compared (the implementation for resolved proxies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_address: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode_result: Option<BytecodeComparisonResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi_result: Option<AbiComparisonResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_result: Option<StateVerificationResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args_validation: Option<ArgsValidation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable_values_result: Option<ImmutableValuesResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definitive_result: Option<DefinitiveBytecodeResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_immutables: Option<Vec<GroupedImmutableDifference>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_libraries_result: Option<Vec<LinkedLibraryResult>>,

    /// Fatal error that stopped verification of this contract
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContractVerificationResult {
    pub fn new(contract: ContractConfig, chain: ChainConfig) -> Self {
        Self {
            contract,
            chain,
            implementation_address: None,
            bytecode_result: None,
            abi_result: None,
            state_result: None,
            args_validation: None,
            immutable_values_result: None,
            definitive_result: None,
            grouped_immutables: None,
            linked_libraries_result: None,
            error: None,
        }
    }

    /// Statuses of the sub-checks that ran
    fn check_statuses(&self) -> Vec<CheckStatus> {
        let mut statuses = Vec::new();
        if let Some(bytecode) = &self.bytecode_result {
            statuses.push(bytecode.status);
        }
        if let Some(abi) = &self.abi_result {
            statuses.push(abi.status);
        }
        if let Some(state) = &self.state_result {
            statuses.push(state.status);
        }
        if let Some(libraries) = &self.linked_libraries_result {
            statuses.extend(libraries.iter().map(|library| library.status));
        }
        statuses
    }

    /// Aggregates sub-check statuses into a batch verdict.
    ///
    /// A recorded error or any failed check fails the contract; otherwise any
    /// warning wins; a contract where nothing but skips ran is skipped.
    pub fn outcome(&self) -> ContractOutcome {
        if self.error.is_some() {
            return ContractOutcome::Failed;
        }

        let statuses = self.check_statuses();
        if statuses.iter().any(CheckStatus::is_fail) {
            ContractOutcome::Failed
        } else if statuses.contains(&CheckStatus::Warn) {
            ContractOutcome::Warnings
        } else if statuses.iter().all(|status| *status == CheckStatus::Skip) {
            ContractOutcome::Skipped
        } else {
            ContractOutcome::Passed
        }
    }

    /// Labelled messages of the sub-checks that failed or errored
    pub fn failures(&self) -> Vec<(&'static str, String)> {
        let mut failures = Vec::new();
        if let Some(error) = &self.error {
            failures.push(("Error", error.clone()));
        }
        if let Some(bytecode) = self.bytecode_result.as_ref().filter(|r| r.status.is_fail()) {
            failures.push(("Bytecode", bytecode.message.clone()));
        }
        if let Some(abi) = self.abi_result.as_ref().filter(|r| r.status.is_fail()) {
            failures.push(("ABI", abi.message.clone()));
        }
        if let Some(state) = self.state_result.as_ref().filter(|r| r.status.is_fail()) {
            failures.push(("State", state.message.clone()));
        }
        for library in self.linked_libraries_result.iter().flatten().filter(|r| r.status.is_fail()) {
            failures.push(("Library", library.message.clone()));
        }
        failures
    }
}

/// Result of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    /// When the batch finished
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub skipped: usize,
    pub results: Vec<ContractVerificationResult>,
}

impl VerificationSummary {
    pub fn new(total: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            total,
            passed: 0,
            failed: 0,
            warnings: 0,
            skipped: 0,
            results: Vec::new(),
        }
    }

    /// Counts `result` under its outcome and keeps it
    pub fn record(&mut self, result: ContractVerificationResult) {
        match result.outcome() {
            ContractOutcome::Passed => self.passed += 1,
            ContractOutcome::Failed => self.failed += 1,
            ContractOutcome::Warnings => self.warnings += 1,
            ContractOutcome::Skipped => self.skipped += 1,
        }
        self.results.push(result);
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Results whose outcome is `Failed`
    pub fn failed_results(&self) -> impl Iterator<Item = &ContractVerificationResult> {
        self.results
            .iter()
            .filter(|result| result.outcome() == ContractOutcome::Failed)
    }
}
