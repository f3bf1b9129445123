// Storage path resolution
//
// Paths look like `StructName:field.sub[key].nested`. `[N]` indexes a dynamic
// array, `[length]` or a trailing `.length` reads its length, and any other
// bracket content is a mapping key.

use ethers::abi::Token;
use ethers::types::{Address, H256, I256, U256};

use super::decode::type_bytes;
use super::erc7201::calculate_erc7201_base_slot;
use super::schema::{StorageSchema, StructDef};
use super::word_from_u256;
use crate::error::{VerifyError, VerifyResult};
use crate::ethereum::CryptoOps;

/// One step of a storage path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    ArrayIndex(u64),
    ArrayLength,
    MappingKey(String),
}

/// A parsed storage path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub raw: String,
    pub struct_name: String,
    pub segments: Vec<PathSegment>,
}

/// Resolved location of a storage path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedSlot {
    pub slot: H256,
    pub solidity_type: String,
    pub byte_offset: usize,
}

fn path_error(path: &str, reason: impl Into<String>) -> VerifyError {
    VerifyError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits a storage path into its struct name and segments
pub fn parse_path(path: &str) -> VerifyResult<ParsedPath> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(path_error(path, "path cannot be empty or whitespace"));
    }

    let (struct_name, field_path) = trimmed
        .split_once(':')
        .ok_or_else(|| path_error(path, "expected \"StructName:path.to.field\""))?;

    if struct_name.is_empty() {
        return Err(path_error(path, "struct name cannot be empty"));
    }
    if !is_identifier(struct_name) {
        return Err(path_error(
            path,
            format!("struct name {} must be a valid identifier", struct_name),
        ));
    }
    if field_path.is_empty() {
        return Err(path_error(path, "field path cannot be empty"));
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut rest = field_path;

    while let Some(c) = rest.chars().next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut current)));
                }
                rest = &rest[1..];
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Field(std::mem::take(&mut current)));
                }
                let close = rest
                    .find(']')
                    .ok_or_else(|| path_error(path, "unclosed bracket"))?;
                let content = &rest[1..close];
                segments.push(if content == "length" {
                    PathSegment::ArrayLength
                } else if !content.is_empty() && content.bytes().all(|b| b.is_ascii_digit()) {
                    let index = content
                        .parse()
                        .map_err(|_| path_error(path, format!("array index {} out of range", content)))?;
                    PathSegment::ArrayIndex(index)
                } else {
                    PathSegment::MappingKey(content.to_string())
                });
                rest = &rest[close + 1..];
            }
            _ => {
                current.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    if !current.is_empty() {
        segments.push(if current == "length" {
            PathSegment::ArrayLength
        } else {
            PathSegment::Field(current)
        });
    }

    Ok(ParsedPath {
        raw: path.to_string(),
        struct_name: struct_name.to_string(),
        segments,
    })
}

/// Value types that never name a schema struct
pub fn is_primitive_type(solidity_type: &str) -> bool {
    solidity_type.starts_with("uint")
        || solidity_type.starts_with("int")
        || solidity_type.starts_with("bytes")
        || solidity_type == "address"
        || solidity_type == "bool"
        || solidity_type == "string"
}

/// Element type of `T[]`
pub fn array_element_type(solidity_type: &str) -> Option<&str> {
    solidity_type.strip_suffix("[]")
}

/// Key and value types of `mapping(K => V)`
pub fn mapping_types(solidity_type: &str) -> Option<(&str, &str)> {
    let inner = solidity_type.strip_prefix("mapping(")?.strip_suffix(')')?;
    let (key, value) = inner.split_once("=>")?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

/// How a mapping key enters the slot hash
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedKey {
    /// Value types are ABI-encoded to a full word
    Word(Token),
    /// `string` and `bytes` keys are hashed as raw bytes
    Raw(Vec<u8>),
}

fn is_hex_of_len(key: &str, hex_chars: Option<usize>) -> bool {
    let Some(digits) = key.strip_prefix("0x") else {
        return false;
    };
    !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_hexdigit())
        && hex_chars.map_or(true, |n| digits.len() == n)
}

fn key_error(key_type: &str, key: &str, reason: &str) -> VerifyError {
    VerifyError::InvalidMappingKey {
        key_type: key_type.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Validates a textual mapping key and encodes it for `key_type`
pub fn encode_key(key: &str, key_type: &str) -> VerifyResult<EncodedKey> {
    match key_type {
        "address" => {
            if !is_hex_of_len(key, Some(40)) {
                return Err(key_error("address", key, "Expected 0x followed by 40 hex characters."));
            }
            let address: Address = key
                .parse()
                .map_err(|_| key_error("address", key, "Expected 0x followed by 40 hex characters."))?;
            Ok(EncodedKey::Word(Token::Address(address)))
        }
        "bool" => match key {
            "true" => Ok(EncodedKey::Word(Token::Bool(true))),
            "false" => Ok(EncodedKey::Word(Token::Bool(false))),
            _ => Err(key_error("bool", key, "Expected true or false.")),
        },
        "string" => Ok(EncodedKey::Raw(key.as_bytes().to_vec())),
        "bytes" => {
            if key != "0x" && !is_hex_of_len(key, None) {
                return Err(key_error("bytes", key, "Expected 0x-prefixed hex."));
            }
            hex::decode(&key[2..])
                .map(EncodedKey::Raw)
                .map_err(|_| key_error("bytes", key, "Expected 0x-prefixed hex."))
        }
        t if t.starts_with("uint") || t.starts_with("int") => encode_numeric_key(key, t.starts_with("int")),
        t if t.starts_with("bytes") => {
            let width = type_bytes(t);
            if !is_hex_of_len(key, Some(width * 2)) {
                return Err(key_error(
                    t,
                    key,
                    &format!("Expected 0x followed by {} hex characters.", width * 2),
                ));
            }
            hex::decode(&key[2..])
                .map(|bytes| EncodedKey::Word(Token::FixedBytes(bytes)))
                .map_err(|_| key_error(t, key, "Expected hex."))
        }
        other => Err(key_error(other, key, "Unsupported mapping key type.")),
    }
}

fn encode_numeric_key(key: &str, signed: bool) -> VerifyResult<EncodedKey> {
    let invalid = || key_error("numeric", key, "Expected decimal or hex number.");

    if is_hex_of_len(key, None) {
        let value = U256::from_str_radix(&key[2..], 16).map_err(|_| invalid())?;
        return Ok(EncodedKey::Word(if signed { Token::Int(value) } else { Token::Uint(value) }));
    }

    let (negative, digits) = match key.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, key),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let magnitude = U256::from_dec_str(digits).map_err(|_| invalid())?;

    if !negative {
        return Ok(EncodedKey::Word(if signed { Token::Int(magnitude) } else { Token::Uint(magnitude) }));
    }
    if !signed {
        return Err(key_error("numeric", key, "Negative key for an unsigned mapping."));
    }
    let value = I256::try_from(magnitude).map_err(|_| invalid())?;
    Ok(EncodedKey::Word(Token::Int((-value).into_raw())))
}

/// Slot of `mapping[key]` for a mapping stored at `slot`
pub fn mapping_slot<C: CryptoOps + ?Sized>(crypto: &C, key: &EncodedKey, slot: U256) -> H256 {
    match key {
        EncodedKey::Word(token) => {
            crypto.keccak256(&crypto.encode_abi_parameters(&[token.clone(), Token::Uint(slot)]))
        }
        EncodedKey::Raw(bytes) => {
            let mut preimage = bytes.clone();
            preimage.extend_from_slice(word_from_u256(slot).as_bytes());
            crypto.keccak256(&preimage)
        }
    }
}

/// First data slot of a dynamic array stored at `slot`
pub fn array_data_slot<C: CryptoOps + ?Sized>(crypto: &C, slot: U256) -> U256 {
    let hash = crypto.keccak256(&crypto.encode_abi_parameters(&[Token::Uint(slot)]));
    U256::from_big_endian(hash.as_bytes())
}

/// Parses an explicit hex slot into a word
pub fn parse_slot(slot: &str) -> VerifyResult<U256> {
    let digits = slot.trim().strip_prefix("0x").unwrap_or(slot.trim());
    if digits.is_empty() || digits.len() > 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(VerifyError::InvalidSlot(slot.to_string()));
    }
    U256::from_str_radix(digits, 16).map_err(|_| VerifyError::InvalidSlot(slot.to_string()))
}

/// Walks `parsed` through `schema`, producing the final slot, type and byte offset
pub fn compute_slot<C: CryptoOps + ?Sized>(
    crypto: &C,
    parsed: &ParsedPath,
    schema: &StorageSchema,
) -> VerifyResult<ComputedSlot> {
    let root = schema
        .get(&parsed.struct_name)
        .ok_or_else(|| VerifyError::UnknownStruct(parsed.struct_name.clone()))?;

    let base = if let Some(base_slot) = &root.base_slot {
        parse_slot(base_slot)?
    } else if let Some(namespace) = &root.namespace {
        U256::from_big_endian(calculate_erc7201_base_slot(crypto, namespace).as_bytes())
    } else {
        return Err(VerifyError::MissingBaseSlot(parsed.struct_name.clone()));
    };

    let mut slot = base;
    let mut solidity_type = "uint256".to_string();
    let mut byte_offset = 0;
    let mut current: Option<(&str, &StructDef)> = Some((parsed.struct_name.as_str(), root));

    for segment in &parsed.segments {
        match segment {
            PathSegment::Field(name) => {
                let (struct_name, def) = current.ok_or_else(|| VerifyError::NotAStruct(name.clone()))?;
                let field = def.fields.get(name).ok_or_else(|| VerifyError::UnknownField {
                    structure: struct_name.to_string(),
                    field: name.clone(),
                })?;

                slot = slot.overflowing_add(U256::from(field.slot)).0;
                solidity_type = field.solidity_type.clone();
                byte_offset = field.byte_offset.unwrap_or(0);
                current = struct_for(schema, &field.solidity_type);
            }
            PathSegment::ArrayLength => {
                if array_element_type(&solidity_type).is_none() {
                    return Err(path_error(&parsed.raw, format!("{} is not a dynamic array", solidity_type)));
                }
                solidity_type = "uint256".to_string();
                byte_offset = 0;
                current = None;
            }
            PathSegment::ArrayIndex(index) => {
                let element = array_element_type(&solidity_type)
                    .ok_or_else(|| path_error(&parsed.raw, format!("cannot index {} with [{}]", solidity_type, index)))?
                    .to_string();
                let data = array_data_slot(crypto, slot);
                let index = U256::from(*index);

                match schema.get(&element) {
                    Some(def) => {
                        slot = data.overflowing_add(index * U256::from(def.slot_count())).0;
                        byte_offset = 0;
                    }
                    None => {
                        let width = type_bytes(&element);
                        let per_slot = if width < 32 { 32 / width } else { 1 };
                        slot = data.overflowing_add(index / U256::from(per_slot)).0;
                        byte_offset = (index % U256::from(per_slot)).as_usize() * width;
                    }
                }
                current = struct_for(schema, &element);
                solidity_type = element;
            }
            PathSegment::MappingKey(key) => {
                let (key_type, value_type) = mapping_types(&solidity_type)
                    .ok_or_else(|| path_error(&parsed.raw, format!("cannot look up [{}] in {}", key, solidity_type)))?;
                let encoded = encode_key(key, key_type)?;
                let value_type = value_type.to_string();

                slot = U256::from_big_endian(mapping_slot(crypto, &encoded, slot).as_bytes());
                byte_offset = 0;
                current = struct_for(schema, &value_type);
                solidity_type = value_type;
            }
        }
    }

    Ok(ComputedSlot {
        slot: word_from_u256(slot),
        solidity_type,
        byte_offset,
    })
}

fn struct_for<'s>(schema: &'s StorageSchema, solidity_type: &str) -> Option<(&'s str, &'s StructDef)> {
    if is_primitive_type(solidity_type) {
        return None;
    }
    schema
        .structs
        .get_key_value(solidity_type)
        .map(|(name, def)| (name.as_str(), def))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_segments() {
        let parsed = parse_path("YieldManagerStorage:yieldProviderStorage[0xAbC0000000000000000000000000000000000001].userFunds").unwrap();
        assert_eq!(parsed.struct_name, "YieldManagerStorage");
        assert_eq!(
            parsed.segments,
            vec![
                PathSegment::Field("yieldProviderStorage".into()),
                PathSegment::MappingKey("0xAbC0000000000000000000000000000000000001".into()),
                PathSegment::Field("userFunds".into()),
            ]
        );

        let parsed = parse_path("S:items[3]").unwrap();
        assert_eq!(parsed.segments[1], PathSegment::ArrayIndex(3));

        let parsed = parse_path("S:items.length").unwrap();
        assert_eq!(parsed.segments[1], PathSegment::ArrayLength);

        let parsed = parse_path("S:items[length]").unwrap();
        assert_eq!(parsed.segments[1], PathSegment::ArrayLength);
    }

    #[test]
    fn test_parse_path_errors() {
        let reason = |path: &str| match parse_path(path) {
            Err(VerifyError::InvalidPath { reason, .. }) => reason,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(reason("   "), "path cannot be empty or whitespace");
        assert_eq!(reason("noColon"), "expected \"StructName:path.to.field\"");
        assert_eq!(reason(":field"), "struct name cannot be empty");
        assert_eq!(reason("1abc:field"), "struct name 1abc must be a valid identifier");
        assert_eq!(reason("S:"), "field path cannot be empty");
        assert_eq!(reason("S:map[0x01"), "unclosed bracket");
    }

    #[test]
    fn test_mapping_types() {
        assert_eq!(mapping_types("mapping(address => bool)"), Some(("address", "bool")));
        assert_eq!(
            mapping_types("mapping(uint64=>YieldProviderStorage)"),
            Some(("uint64", "YieldProviderStorage"))
        );
        assert_eq!(mapping_types("uint256"), None);
        assert_eq!(array_element_type("address[]"), Some("address"));
    }

    #[test]
    fn test_encode_key_validation() {
        let err = encode_key("0x123", "address").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid address key: 0x123. Expected 0x followed by 40 hex characters."
        );
        assert!(encode_key("12a", "uint256").unwrap_err().to_string().starts_with("Invalid numeric key"));
        assert!(encode_key("-1", "uint64").is_err());
        assert_eq!(
            encode_key("-1", "int64").unwrap(),
            EncodedKey::Word(Token::Int(U256::MAX))
        );
        assert_eq!(encode_key("0x10", "uint64").unwrap(), EncodedKey::Word(Token::Uint(U256::from(16u64))));
        assert!(encode_key("0x00", "bytes32").is_err());
        assert_eq!(encode_key("abc", "string").unwrap(), EncodedKey::Raw(b"abc".to_vec()));
        assert!(encode_key("maybe", "bool").is_err());
    }

    #[test]
    fn test_parse_slot() {
        assert_eq!(parse_slot("0x0a").unwrap(), U256::from(10u64));
        assert_eq!(parse_slot("ff").unwrap(), U256::from(255u64));
        assert!(matches!(parse_slot("0xzz"), Err(VerifyError::InvalidSlot(_))));
    }
}
