// Storage schema
//
// Struct layouts used to resolve storage paths. A schema file looks like
// `{"structs": {"Name": {"namespace": "...", "fields": {"f": {"slot": 0, "type": "uint256"}}}}}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{VerifyError, VerifyResult};

/// Named struct definitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSchema {
    pub structs: BTreeMap<String, StructDef>,
}

/// Layout of one struct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructDef {
    /// ERC-7201 namespace id the struct lives under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Explicit base slot (hex), takes precedence over `namespace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_slot: Option<String>,
    pub fields: BTreeMap<String, FieldDef>,
}

impl StructDef {
    /// Number of slots one instance occupies
    pub fn slot_count(&self) -> u64 {
        self.fields.values().map(|field| field.slot + 1).max().unwrap_or(1)
    }
}

/// One field of a struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Slot offset from the start of the struct
    pub slot: u64,
    /// Solidity type, a struct name, `T[]` or `mapping(K => V)`
    #[serde(rename = "type")]
    pub solidity_type: String,
    /// Byte offset inside the slot for packed fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_offset: Option<usize>,
}

impl FieldDef {
    pub fn new(slot: u64, solidity_type: impl Into<String>) -> Self {
        Self {
            slot,
            solidity_type: solidity_type.into(),
            byte_offset: None,
        }
    }

    pub fn packed(slot: u64, solidity_type: impl Into<String>, byte_offset: usize) -> Self {
        Self {
            byte_offset: Some(byte_offset),
            ..Self::new(slot, solidity_type)
        }
    }
}

fn invalid(location: &str, reason: impl Into<String>) -> VerifyError {
    VerifyError::InvalidSchema {
        location: location.to_string(),
        reason: reason.into(),
    }
}

impl StorageSchema {
    /// Validates the shape of raw JSON before deserializing it.
    ///
    /// `location` names the source in error messages.
    pub fn from_value(value: Value, location: &str) -> VerifyResult<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| invalid(location, "expected object"))?;
        let structs = root
            .get("structs")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(location, "missing 'structs' object"))?;

        for (struct_name, struct_def) in structs {
            let struct_def = struct_def
                .as_object()
                .ok_or_else(|| invalid(location, format!("struct '{}' must be an object", struct_name)))?;
            let fields = struct_def
                .get("fields")
                .and_then(Value::as_object)
                .ok_or_else(|| invalid(location, format!("struct '{}' missing 'fields' object", struct_name)))?;

            for (field_name, field_def) in fields {
                let qualified = format!("{}.{}", struct_name, field_name);
                let field_def = field_def
                    .as_object()
                    .ok_or_else(|| invalid(location, format!("field '{}' must be an object", qualified)))?;
                if !field_def.get("slot").map_or(false, Value::is_u64) {
                    return Err(invalid(location, format!("field '{}' missing numeric 'slot'", qualified)));
                }
                if !field_def.get("type").map_or(false, Value::is_string) {
                    return Err(invalid(location, format!("field '{}' missing string 'type'", qualified)));
                }
            }
        }

        serde_json::from_value(value).map_err(|e| invalid(location, e.to_string()))
    }

    /// Parses and validates schema JSON text
    pub fn from_json(json: &str, location: &str) -> VerifyResult<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| invalid(location, e.to_string()))?;
        Self::from_value(value, location)
    }

    /// Loads a schema file, resolving relative paths against `config_dir`
    pub fn load_from_file<P: AsRef<Path>>(schema_path: P, config_dir: &Path) -> Result<Self> {
        let resolved = resolve_path(schema_path.as_ref(), config_dir);
        let content = fs::read_to_string(&resolved)
            .with_context(|| format!("Failed to read schema file at {}", resolved.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse schema JSON at {}", resolved.display()))?;
        Ok(Self::from_value(value, &resolved.display().to_string())?)
    }

    pub fn get(&self, name: &str) -> Option<&StructDef> {
        self.structs.get(name)
    }
}

/// Joins relative paths onto `base`, leaving absolute paths alone
pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
