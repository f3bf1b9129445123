// Value comparison
//
// Compares observed values (decoded storage words, view-call outputs) with
// expected values taken from the contract config.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator applied between an actual and an expected value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    #[default]
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
        };
        f.write_str(label)
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Ok(Self::Eq),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "contains" => Ok(Self::Contains),
            other => Err(format!("unknown comparison operator: {}", other)),
        }
    }
}

/// Canonical text form used for comparison.
///
/// 20-byte hex addresses are lowercased so checksummed and plain forms compare
/// equal; arrays are joined with commas.
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::String(text) => {
            if text.starts_with("0x") && text.len() == 42 {
                text.to_ascii_lowercase()
            } else {
                text.clone()
            }
        }
        Value::Array(items) => items.iter().map(normalize_value).collect::<Vec<_>>().join(","),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Parses a decimal (optionally negative) or `0x` hex integer into sign and magnitude
fn parse_integer(text: &str) -> Option<(bool, U256)> {
    if let Some(hex) = text.strip_prefix("0x") {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return U256::from_str_radix(hex, 16).ok().map(|value| (false, value));
    }

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_dec_str(digits)
        .ok()
        .map(|value| (negative && !value.is_zero(), value))
}

fn compare_integers((a_neg, a): (bool, U256), (b_neg, b): (bool, U256)) -> Ordering {
    match (a_neg, b_neg) {
        (false, false) => a.cmp(&b),
        (true, true) => b.cmp(&a),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
    }
}

/// Applies `comparison` to normalized forms of `actual` and `expected`.
///
/// Ordering operators fall back to equality unless both sides are integers.
pub fn compare_values(actual: &Value, expected: &Value, comparison: Comparison) -> bool {
    let actual = normalize_value(actual);
    let expected = normalize_value(expected);

    match comparison {
        Comparison::Eq => actual == expected,
        Comparison::Contains => actual.contains(expected.as_str()),
        Comparison::Gt | Comparison::Gte | Comparison::Lt | Comparison::Lte => {
            let (Some(a), Some(b)) = (parse_integer(&actual), parse_integer(&expected)) else {
                return actual == expected;
            };
            let ordering = compare_integers(a, b);
            match comparison {
                Comparison::Gt => ordering == Ordering::Greater,
                Comparison::Gte => ordering != Ordering::Less,
                Comparison::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }
        }
    }
}

/// Shortens long strings for messages, keeping the first 10 and last `tail` characters
pub fn abbreviate(value: &Value, tail: usize) -> String {
    let text = match value {
        Value::String(text) => text.clone(),
        other => normalize_value(other),
    };
    if matches!(value, Value::String(_)) && text.chars().count() > 20 {
        let chars: Vec<char> = text.chars().collect();
        let head: String = chars[..10].iter().collect();
        let end: String = chars[chars.len().saturating_sub(tail)..].iter().collect();
        format!("{}...{}", head, end)
    } else {
        text
    }
}
