// Storage word decoding
//
// Values are packed right-aligned: a field of `n` bytes at byte offset `o`
// occupies bytes `[32 - o - n, 32 - o)` of the big-endian word.

use ethers::types::{H256, I256, U256};
use serde_json::Value;

use crate::error::{VerifyError, VerifyResult};
use crate::ethereum::CryptoOps;

/// Width in bytes of a Solidity value type; reference and unknown types take a full word
pub fn type_bytes(solidity_type: &str) -> usize {
    match solidity_type {
        "address" => 20,
        "bool" => 1,
        _ => scalar_width(solidity_type).unwrap_or(32),
    }
}

/// Byte width of `uintN`, `intN` or `bytesN`
fn scalar_width(solidity_type: &str) -> Option<usize> {
    let (bits_per_unit, digits) = if let Some(d) = solidity_type.strip_prefix("uint") {
        (8, d)
    } else if let Some(d) = solidity_type.strip_prefix("int") {
        (8, d)
    } else if let Some(d) = solidity_type.strip_prefix("bytes") {
        (1, d)
    } else {
        return None;
    };

    if digits.is_empty() {
        // `uint`/`int` alias the 256-bit types; dynamic `bytes` takes a full word
        return Some(32);
    }
    let size: usize = digits.parse().ok()?;
    let width = if bits_per_unit == 8 { size / 8 } else { size };
    let valid = if bits_per_unit == 8 {
        size % 8 == 0 && (8..=256).contains(&size)
    } else {
        (1..=32).contains(&size)
    };
    valid.then_some(width)
}

fn is_unsigned(solidity_type: &str) -> bool {
    solidity_type.starts_with("uint")
}

fn is_signed(solidity_type: &str) -> bool {
    solidity_type.starts_with("int")
}

/// Raw bytes of a packed field
pub fn extract_field(word: &H256, solidity_type: &str, byte_offset: usize) -> VerifyResult<Vec<u8>> {
    let width = type_bytes(solidity_type);
    if byte_offset + width > 32 {
        return Err(VerifyError::PackedFieldOverflow {
            solidity_type: solidity_type.to_string(),
            offset: byte_offset,
        });
    }
    let start = 32 - byte_offset - width;
    Ok(word.as_bytes()[start..start + width].to_vec())
}

/// Decodes a packed field from a storage word into a JSON value.
///
/// Addresses come back checksummed, integers as decimal strings, `bool` as a
/// JSON boolean and everything else as 0x-prefixed hex.
pub fn decode_slot_value<C: CryptoOps + ?Sized>(
    crypto: &C,
    word: &H256,
    solidity_type: &str,
    byte_offset: usize,
) -> VerifyResult<Value> {
    let bytes = extract_field(word, solidity_type, byte_offset)?;

    let value = match solidity_type {
        "address" => {
            let address = ethers::types::Address::from_slice(&bytes);
            Value::String(crypto.checksum_address(&address))
        }
        "bool" => Value::Bool(bytes.iter().any(|b| *b != 0)),
        t if is_unsigned(t) => Value::String(U256::from_big_endian(&bytes).to_string()),
        t if is_signed(t) => Value::String(decode_signed(&bytes)),
        _ => Value::String(format!("0x{}", hex::encode(&bytes))),
    };
    Ok(value)
}

/// Two's complement decoding at the width of `bytes`
pub fn decode_signed(bytes: &[u8]) -> String {
    let negative = bytes.first().map_or(false, |b| b & 0x80 != 0);
    if !negative {
        return U256::from_big_endian(bytes).to_string();
    }

    // sign-extend to 256 bits
    let mut extended = [0xffu8; 32];
    extended[32 - bytes.len()..].copy_from_slice(bytes);
    I256::from_raw(U256::from_big_endian(&extended)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::EthersCrypto;

    fn word(hex_str: &str) -> H256 {
        let padded = format!("{:0>64}", hex_str);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hex::decode(padded).unwrap());
        H256(bytes)
    }

    #[test]
    fn test_type_bytes() {
        assert_eq!(type_bytes("address"), 20);
        assert_eq!(type_bytes("bool"), 1);
        assert_eq!(type_bytes("uint96"), 12);
        assert_eq!(type_bytes("int24"), 3);
        assert_eq!(type_bytes("bytes4"), 4);
        assert_eq!(type_bytes("bytes32"), 32);
        assert_eq!(type_bytes("uint"), 32);
        assert_eq!(type_bytes("mapping(address => uint256)"), 32);
        assert_eq!(type_bytes("uint7"), 32);
    }

    #[test]
    fn test_decode_packed_fields() {
        // uint16 at offset 0 = 0x1388 (5000), uint16 at offset 2 = 0x07d0 (2000)
        let packed = word("07d01388");
        let crypto = EthersCrypto;
        assert_eq!(decode_slot_value(&crypto, &packed, "uint16", 0).unwrap(), Value::String("5000".into()));
        assert_eq!(decode_slot_value(&crypto, &packed, "uint16", 2).unwrap(), Value::String("2000".into()));
    }

    #[test]
    fn test_decode_address_and_bool() {
        // address at offset 4 follows three bools and a uint8
        let packed = word("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed01000102");
        let crypto = EthersCrypto;
        assert_eq!(
            decode_slot_value(&crypto, &packed, "address", 4).unwrap(),
            Value::String("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into())
        );
        assert_eq!(decode_slot_value(&crypto, &packed, "uint8", 0).unwrap(), Value::String("2".into()));
        assert_eq!(decode_slot_value(&crypto, &packed, "bool", 1).unwrap(), Value::Bool(true));
        assert_eq!(decode_slot_value(&crypto, &packed, "bool", 2).unwrap(), Value::Bool(false));
        assert_eq!(decode_slot_value(&crypto, &packed, "bool", 3).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_decode_signed() {
        let crypto = EthersCrypto;
        assert_eq!(decode_slot_value(&crypto, &word("ff"), "int8", 0).unwrap(), Value::String("-1".into()));
        assert_eq!(decode_slot_value(&crypto, &word("7f"), "int8", 0).unwrap(), Value::String("127".into()));
        assert_eq!(
            decode_slot_value(&crypto, &word(&"f".repeat(64)), "int256", 0).unwrap(),
            Value::String("-1".into())
        );
        assert_eq!(decode_signed(&[0x80, 0x00]), "-32768");
    }

    #[test]
    fn test_decode_bytes_and_overflow() {
        let crypto = EthersCrypto;
        let value = word("deadbeef");
        assert_eq!(
            decode_slot_value(&crypto, &value, "bytes4", 0).unwrap(),
            Value::String("0xdeadbeef".into())
        );
        assert!(matches!(
            decode_slot_value(&crypto, &value, "address", 16),
            Err(VerifyError::PackedFieldOverflow { .. })
        ));
    }
}
