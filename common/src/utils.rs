// Hex and CBOR helpers
//
// Bytecode is handled as lowercase hex text without a `0x` prefix. Offsets
// exposed by these helpers are always byte offsets; hex offsets are twice that.

use thiserror::Error;

/// CBOR map prefixes Solidity uses for its metadata blob (1-item and 2-item maps)
const CBOR_MAP_MARKERS: [&str; 2] = ["a1", "a2"];

/// Errors raised while validating hex input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HexError {
    #[error("hex string has odd length {0}")]
    OddLength(usize),

    #[error("invalid hex character '{character}' at index {index}")]
    InvalidCharacter { character: char, index: usize },
}

/// Lowercases a hex string and removes a leading `0x`/`0X`
pub fn normalize_hex(value: &str) -> String {
    let trimmed = value.trim();
    let without_prefix = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    without_prefix.to_ascii_lowercase()
}

/// Normalizes and validates a hex string
pub fn ensure_hex(value: &str) -> Result<String, HexError> {
    let normalized = normalize_hex(value);
    if let Some((index, character)) = normalized
        .char_indices()
        .find(|(_, c)| !c.is_ascii_hexdigit())
    {
        return Err(HexError::InvalidCharacter { character, index });
    }
    if normalized.len() % 2 != 0 {
        return Err(HexError::OddLength(normalized.len()));
    }
    Ok(normalized)
}

/// Strips the trailing Solidity CBOR metadata blob from deployed bytecode.
///
/// The last two bytes hold the metadata length `L`; the blob plus its length
/// suffix span `(L + 2) * 2` hex characters. The blob is only removed when it
/// begins with a CBOR map marker, so bytecode without metadata comes back
/// untouched (apart from normalization).
pub fn strip_cbor_metadata(bytecode: &str) -> String {
    let normalized = normalize_hex(bytecode);

    if normalized.len() < 4 {
        return normalized;
    }

    let length_hex = match normalized.get(normalized.len() - 4..) {
        Some(suffix) => suffix,
        None => return normalized,
    };
    let metadata_length = match usize::from_str_radix(length_hex, 16) {
        Ok(length) => length,
        Err(_) => return normalized,
    };

    let strip_len = (metadata_length + 2) * 2;
    if strip_len >= normalized.len() {
        return normalized;
    }

    let metadata_start = normalized.len() - strip_len;
    let marker = normalized.get(metadata_start..metadata_start + 2).unwrap_or("");
    if CBOR_MAP_MARKERS.contains(&marker) {
        normalized[..metadata_start].to_string()
    } else {
        normalized
    }
}

/// Number of whole bytes in a normalized hex string
pub fn byte_len(hex: &str) -> usize {
    hex.len() / 2
}

/// Hex text for the byte range `[start, start + length)`, or `None` when out of bounds
pub fn byte_slice(hex: &str, start: usize, length: usize) -> Option<&str> {
    hex.get(start * 2..(start + length) * 2)
}

/// Hex text of the single byte at `position`
pub fn byte_at(hex: &str, position: usize) -> Option<&str> {
    byte_slice(hex, position, 1)
}

/// True when every character is `0` (an empty string counts as zero)
pub fn is_zero_hex(hex: &str) -> bool {
    hex.bytes().all(|b| b == b'0')
}

/// Removes leading zero characters, keeping a single `0` for an all-zero value
pub fn strip_leading_zeros(hex: &str) -> &str {
    let stripped = hex.trim_start_matches('0');
    if stripped.is_empty() {
        "0"
    } else {
        stripped
    }
}

/// Left-pads hex text with zeros up to `width` characters
pub fn pad_left(hex: &str, width: usize) -> String {
    format!("{:0>width$}", hex, width = width)
}

/// Last `count` bytes of text of `hex` (the whole string when shorter or when
/// the cut would split a multi-byte character)
pub fn tail(hex: &str, count: usize) -> &str {
    if hex.len() <= count {
        hex
    } else {
        hex.get(hex.len() - count..).unwrap_or(hex)
    }
}
