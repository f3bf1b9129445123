// Immutable value matching
//
// Matches constructor arguments and user-declared immutable values against
// the difference regions found by the comparator.

use std::collections::{BTreeMap, BTreeSet};

use common::utils::{normalize_hex, pad_left, strip_leading_zeros, tail};
use common::CheckStatus;
use ethers::types::{I256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::*;

/// Hex characters in one ABI word
const WORD_CHARS: usize = 64;

/// Hex characters in an address
const ADDRESS_CHARS: usize = 40;

/// Shortest raw fragment accepted by substring matching
const MIN_FRAGMENT_CHARS: usize = 4;

/// Constructor arguments as supplied in a contract config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstructorArgs {
    /// ABI-encoded argument blob
    Encoded(String),
    /// One JSON value per argument
    Values(Vec<Value>),
}

impl ConstructorArgs {
    /// Expands the arguments into 64-character hex words
    pub fn words(&self) -> Vec<String> {
        match self {
            Self::Encoded(blob) => {
                let normalized = normalize_hex(blob);
                normalized
                    .as_bytes()
                    .chunks(WORD_CHARS)
                    .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                    .collect()
            }
            Self::Values(values) => values.iter().map(value_to_word).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Encoded(blob) => normalize_hex(blob).is_empty(),
            Self::Values(values) => values.is_empty(),
        }
    }
}

/// Encodes a JSON value as a left-padded 32-byte hex word (no prefix).
///
/// Hex strings are padded as-is, decimal strings and numbers are encoded
/// big-endian (negative numbers in two's complement) and booleans set only the
/// low bit. Other text is hex-encoded from its UTF-8 bytes and padded.
pub fn value_to_word(value: &Value) -> String {
    match value {
        Value::Bool(flag) => pad_left(if *flag { "1" } else { "0" }, WORD_CHARS),
        Value::Number(number) => {
            if let Some(unsigned) = number.as_u64() {
                format!("{:064x}", U256::from(unsigned))
            } else if let Some(signed) = number.as_i64() {
                format!("{:064x}", I256::from(signed).into_raw())
            } else {
                pad_left(&number.to_string().to_ascii_lowercase(), WORD_CHARS)
            }
        }
        Value::String(text) => string_to_word(text),
        other => pad_left(&other.to_string().to_ascii_lowercase(), WORD_CHARS),
    }
}

fn string_to_word(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        let digits = normalize_hex(trimmed);
        if digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return pad_left(&digits, WORD_CHARS);
        }
        return pad_left(&hex::encode(trimmed.as_bytes()), WORD_CHARS);
    }
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(number) = U256::from_dec_str(trimmed) {
            return format!("{:064x}", number);
        }
    }
    if let Some(digits) = trimmed.strip_prefix('-') {
        if let Ok(magnitude) = U256::from_dec_str(digits) {
            if let Ok(signed) = I256::try_from(magnitude) {
                return format!("{:064x}", (-signed).into_raw());
            }
        }
    }
    if trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return pad_left(&trimmed.to_ascii_lowercase(), WORD_CHARS);
    }
    // free text is compared by its UTF-8 bytes
    pad_left(&hex::encode(trimmed.as_bytes()), WORD_CHARS)
}

fn is_address_type(difference: &ImmutableDifference) -> bool {
    difference.possible_type.as_deref() == Some("address")
}

/// Checks every immutable difference against the constructor argument words.
///
/// A difference matches an argument by exact word, by value ignoring leading
/// zeros, or (for address-typed differences) by the trailing 20 bytes of a
/// non-zero address. Failed lines are always reported; matched lines only
/// when `verbose` is set.
pub fn validate_immutables_against_args(
    immutables: &[ImmutableDifference],
    constructor_args: &ConstructorArgs,
    verbose: bool,
) -> ArgsValidation {
    if immutables.is_empty() {
        return ArgsValidation {
            valid: true,
            message: "No immutable differences to validate".to_string(),
            details: None,
        };
    }

    let expected_words = constructor_args.words();
    let zero_address = "0".repeat(ADDRESS_CHARS);

    let mut details = Vec::new();
    let mut matched = 0;

    for immutable in immutables {
        let remote = pad_left(&immutable.remote_value.to_ascii_lowercase(), WORD_CHARS);
        let remote_stripped = strip_leading_zeros(&remote);

        let found = expected_words.iter().any(|expected| {
            let exact = remote == *expected;
            let stripped = remote_stripped == strip_leading_zeros(expected);
            let address = is_address_type(immutable)
                && tail(&remote, ADDRESS_CHARS) == tail(expected, ADDRESS_CHARS)
                && tail(expected, ADDRESS_CHARS) != zero_address;
            exact || stripped || address
        });

        if found {
            matched += 1;
            if verbose {
                details.push(format!(
                    "✓ Immutable at position {}: {} matches expected arg",
                    immutable.position, immutable.remote_value
                ));
            }
        } else {
            details.push(format!(
                "✗ Immutable at position {}: {} ({}) - no matching constructor arg found",
                immutable.position,
                immutable.remote_value,
                immutable.possible_type.as_deref().unwrap_or("unknown type")
            ));
        }
    }

    if matched == immutables.len() {
        return ArgsValidation {
            valid: true,
            message: format!(
                "All {} immutable value(s) match constructor args",
                immutables.len()
            ),
            details: if verbose { Some(details) } else { None },
        };
    }

    ArgsValidation {
        valid: false,
        message: format!(
            "{}/{} immutable values matched constructor args",
            matched,
            immutables.len()
        ),
        details: Some(details),
    }
}

struct RemoteValue {
    position: usize,
    raw: String,
    word: String,
}

fn direct_match<'r>(
    remotes: &'r [RemoteValue],
    expected: &str,
) -> Option<(&'r RemoteValue, ImmutableMatchKind)> {
    let expected_stripped = strip_leading_zeros(expected);

    remotes.iter().find_map(|remote| {
        if remote.word == expected {
            Some((remote, ImmutableMatchKind::Exact))
        } else if strip_leading_zeros(&remote.word) == expected_stripped {
            Some((remote, ImmutableMatchKind::Stripped))
        } else if expected.len() >= ADDRESS_CHARS
            && tail(&remote.word, ADDRESS_CHARS) == tail(expected, ADDRESS_CHARS)
        {
            Some((remote, ImmutableMatchKind::Address))
        } else {
            None
        }
    })
}

fn fragment_match<'r>(
    remotes: &'r [RemoteValue],
    expected: &str,
) -> Option<(&'r RemoteValue, ImmutableMatchKind)> {
    remotes.iter().find_map(|remote| {
        if remote.raw.len() >= MIN_FRAGMENT_CHARS && expected.contains(remote.raw.as_str()) {
            Some((remote, ImmutableMatchKind::Fragment))
        } else if remote.raw.len() == ADDRESS_CHARS && expected.ends_with(remote.raw.as_str()) {
            Some((remote, ImmutableMatchKind::Address))
        } else {
            None
        }
    })
}

/// Verifies user-declared immutable values by name against detected differences.
///
/// Each name passes when some difference matches its expected word directly
/// (exact, stripped or address tail) or, failing that, when a raw fragment of
/// a split value is contained in the expected word. Differences no name
/// claimed are listed in `unclaimed_positions`.
pub fn verify_immutable_values(
    immutable_values: &BTreeMap<String, Value>,
    immutable_differences: &[ImmutableDifference],
) -> ImmutableValuesResult {
    let remotes: Vec<RemoteValue> = immutable_differences
        .iter()
        .map(|difference| {
            let raw = difference.remote_value.to_ascii_lowercase();
            RemoteValue {
                position: difference.position,
                word: pad_left(&raw, WORD_CHARS),
                raw,
            }
        })
        .collect();

    let mut results = Vec::with_capacity(immutable_values.len());
    let mut claimed = BTreeSet::new();

    for (name, expected_value) in immutable_values {
        let expected = value_to_word(expected_value);

        let matched = direct_match(&remotes, &expected).or_else(|| fragment_match(&remotes, &expected));

        match matched {
            Some((remote, kind)) => {
                claimed.insert(remote.position);
                let display = if remote.raw.len() <= ADDRESS_CHARS {
                    remote.raw.as_str()
                } else {
                    tail(&remote.raw, ADDRESS_CHARS)
                };
                results.push(ImmutableValueResult {
                    name: name.clone(),
                    expected: format!("0x{}", expected),
                    actual: Some(format!("0x{}", remote.word)),
                    position: Some(remote.position),
                    match_kind: Some(kind),
                    status: CheckStatus::Pass,
                    message: format!(
                        "{} = 0x{}... ({} match at position {})",
                        name, display, kind, remote.position
                    ),
                });
            }
            None => results.push(ImmutableValueResult {
                name: name.clone(),
                expected: format!("0x{}", expected),
                actual: None,
                position: None,
                match_kind: None,
                status: CheckStatus::Fail,
                message: format!(
                    "{}: expected 0x{}... not found in bytecode immutables",
                    name,
                    tail(&expected, ADDRESS_CHARS)
                ),
            }),
        }
    }

    let unclaimed_positions: Vec<usize> = remotes
        .iter()
        .map(|remote| remote.position)
        .filter(|position| !claimed.contains(position))
        .collect();

    let passed = results.iter().filter(|r| r.status.is_pass()).count();
    let total = results.len();
    let all_passed = passed == total;

    let message = if !all_passed {
        format!("{}/{} named immutables verified", passed, total)
    } else if !unclaimed_positions.is_empty() {
        format!(
            "All {} named immutables verified ({} additional region(s) in bytecode - likely duplicates or fragments)",
            total,
            unclaimed_positions.len()
        )
    } else {
        format!("All {} named immutables verified", total)
    };

    ImmutableValuesResult {
        status: CheckStatus::from_pass(all_passed),
        message,
        results,
        unclaimed_positions,
    }
}
