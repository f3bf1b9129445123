// Storage verification
//
// Reads storage words through the chain adapter and checks decoded values
// against expectations. Every check folds its own failures (RPC errors, bad
// slots, unresolvable paths) into a `fail` result so siblings are unaffected.

use common::CheckStatus;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decode::decode_slot_value;
use super::erc7201::calculate_erc7201_base_slot;
use super::path::{compute_slot, parse_path, parse_slot, ComputedSlot};
use super::schema::StorageSchema;
use super::{slot_hex, word_from_u256};
use crate::compare::{abbreviate, compare_values, Comparison};
use crate::ethereum::ChainAdapter;

/// An explicit storage slot to check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotConfig {
    /// Slot as hex
    pub slot: String,
    /// Solidity type of the stored value
    #[serde(rename = "type")]
    pub solidity_type: String,
    /// Display name
    pub name: String,
    pub expected: Value,
    /// Byte offset inside the slot for packed values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotResult {
    pub slot: String,
    pub name: String,
    pub expected: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub status: CheckStatus,
    pub message: String,
}

/// A variable at a fixed offset from an ERC-7201 namespace base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceVariable {
    /// Slot offset from the namespace base
    pub offset: u64,
    #[serde(rename = "type")]
    pub solidity_type: String,
    pub name: String,
    pub expected: Value,
    /// Byte offset inside the slot for packed values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceConfig {
    /// Namespace id, e.g. `linea.storage.YieldManagerStorage`
    pub id: String,
    pub variables: Vec<NamespaceVariable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceResult {
    pub namespace_id: String,
    pub base_slot: String,
    pub variables: Vec<SlotResult>,
    pub status: CheckStatus,
    pub message: String,
}

/// A schema-resolved storage path to check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoragePathConfig {
    pub path: String,
    pub expected: Value,
    #[serde(default)]
    pub comparison: Comparison,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoragePathResult {
    pub path: String,
    pub computed_slot: String,
    #[serde(rename = "type")]
    pub solidity_type: String,
    pub expected: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub status: CheckStatus,
    pub message: String,
}

/// Reads and decodes a packed value
pub async fn read_storage_value(
    adapter: &dyn ChainAdapter,
    address: Address,
    slot: H256,
    solidity_type: &str,
    byte_offset: usize,
) -> anyhow::Result<Value> {
    let word = adapter.get_storage_at(address, slot).await?;
    Ok(decode_slot_value(adapter, &word, solidity_type, byte_offset)?)
}

/// Checks one explicit slot with equality
pub async fn verify_slot(adapter: &dyn ChainAdapter, address: Address, config: &SlotConfig) -> SlotResult {
    let outcome = match parse_slot(&config.slot) {
        Ok(slot) => {
            let slot = word_from_u256(slot);
            read_storage_value(adapter, address, slot, &config.solidity_type, config.offset.unwrap_or(0)).await
        }
        Err(e) => Err(e.into()),
    };

    match outcome {
        Ok(actual) => {
            let pass = compare_values(&actual, &config.expected, Comparison::Eq);
            let message = if pass {
                format!("{} = {}", config.name, abbreviate(&actual, 8))
            } else {
                format!(
                    "{}: expected {}, got {}",
                    config.name,
                    abbreviate(&config.expected, 8),
                    abbreviate(&actual, 8)
                )
            };
            SlotResult {
                slot: config.slot.clone(),
                name: config.name.clone(),
                expected: config.expected.clone(),
                actual: Some(actual),
                status: CheckStatus::from_pass(pass),
                message,
            }
        }
        Err(e) => SlotResult {
            slot: config.slot.clone(),
            name: config.name.clone(),
            expected: config.expected.clone(),
            actual: None,
            status: CheckStatus::Fail,
            message: format!("Failed to read slot: {:#}", e),
        },
    }
}

/// Checks every variable of an ERC-7201 namespace
pub async fn verify_namespace(
    adapter: &dyn ChainAdapter,
    address: Address,
    config: &NamespaceConfig,
) -> NamespaceResult {
    let base_slot = calculate_erc7201_base_slot(adapter, &config.id);
    let base = U256::from_big_endian(base_slot.as_bytes());

    let mut variables = Vec::with_capacity(config.variables.len());
    for variable in &config.variables {
        let slot = word_from_u256(base.overflowing_add(U256::from(variable.offset)).0);
        let slot_config = SlotConfig {
            slot: slot_hex(&slot),
            solidity_type: variable.solidity_type.clone(),
            name: variable.name.clone(),
            expected: variable.expected.clone(),
            offset: variable.byte_offset,
        };
        variables.push(verify_slot(adapter, address, &slot_config).await);
    }

    let passed = variables.iter().filter(|v| v.status.is_pass()).count();
    let all_pass = passed == variables.len();

    NamespaceResult {
        namespace_id: config.id.clone(),
        base_slot: slot_hex(&base_slot),
        message: if all_pass {
            format!("All {} variable(s) in {} match", variables.len(), config.id)
        } else {
            format!("{}/{} variable(s) in {} match", passed, variables.len(), config.id)
        },
        variables,
        status: CheckStatus::from_pass(all_pass),
    }
}

/// Resolves a storage path through `schema` and checks the value with the configured operator
pub async fn verify_storage_path(
    adapter: &dyn ChainAdapter,
    address: Address,
    config: &StoragePathConfig,
    schema: &StorageSchema,
) -> StoragePathResult {
    let computed = parse_path(&config.path).and_then(|parsed| compute_slot(adapter, &parsed, schema));

    let computed = match computed {
        Ok(computed) => computed,
        Err(e) => return failed_path(config, "error", "unknown", format!("Error: {}", e)),
    };

    let ComputedSlot {
        slot,
        solidity_type,
        byte_offset,
    } = computed;

    match read_storage_value(adapter, address, slot, &solidity_type, byte_offset).await {
        Ok(actual) => {
            let pass = compare_values(&actual, &config.expected, config.comparison);
            let message = if pass {
                format!("{} = {}", config.path, abbreviate(&actual, 6))
            } else {
                format!(
                    "{}: expected {}, got {}",
                    config.path,
                    abbreviate(&config.expected, 6),
                    abbreviate(&actual, 6)
                )
            };
            StoragePathResult {
                path: config.path.clone(),
                computed_slot: slot_hex(&slot),
                solidity_type,
                expected: config.expected.clone(),
                actual: Some(actual),
                status: CheckStatus::from_pass(pass),
                message,
            }
        }
        Err(e) => failed_path(config, &slot_hex(&slot), &solidity_type, format!("Error: {:#}", e)),
    }
}

fn failed_path(config: &StoragePathConfig, slot: &str, solidity_type: &str, message: String) -> StoragePathResult {
    StoragePathResult {
        path: config.path.clone(),
        computed_slot: slot.to_string(),
        solidity_type: solidity_type.to_string(),
        expected: config.expected.clone(),
        actual: None,
        status: CheckStatus::Fail,
        message,
    }
}
