// Function selector extraction
//
// Finds PUSH4 operands in deployed bytecode and cross-checks them against
// the selectors an ABI declares.

use std::collections::BTreeSet;

use common::utils::normalize_hex;
use common::CheckStatus;
use ethers::abi::{Abi, Function};

use super::types::AbiComparisonResult;

const PUSH4: &str = "63";
const SENTINELS: [&str; 2] = ["00000000", "ffffffff"];

/// Missing signatures listed in a failure message
const MAX_LISTED_MISSING: usize = 10;

/// Collects candidate 4-byte selectors following every PUSH4 byte.
///
/// Every byte position is scanned, so operands of other instructions can
/// produce false candidates. Returns a sorted, de-duplicated list.
pub fn extract_selectors_from_bytecode(bytecode: &str) -> Vec<String> {
    let normalized = normalize_hex(bytecode);
    if normalized.len() < 10 {
        return Vec::new();
    }

    let mut selectors = BTreeSet::new();
    let mut position = 0;
    while position + 10 <= normalized.len() {
        if normalized.get(position..position + 2) == Some(PUSH4) {
            if let Some(candidate) = normalized.get(position + 2..position + 10) {
                if !SENTINELS.contains(&candidate) {
                    selectors.insert(candidate.to_string());
                }
            }
        }
        position += 2;
    }

    selectors.into_iter().collect()
}

/// Function selectors declared by an ABI, paired with their signatures
pub fn abi_selectors(abi: &Abi) -> Vec<(String, String)> {
    let mut selectors: Vec<(String, String)> = abi
        .functions()
        .map(|function| (hex::encode(function.short_signature()), canonical_signature(function)))
        .collect();
    selectors.sort();
    selectors.dedup();
    selectors
}

/// `name(type,...)` without outputs, matching solc's `methodIdentifiers` keys
fn canonical_signature(function: &Function) -> String {
    let inputs: Vec<String> = function.inputs.iter().map(|param| param.kind.to_string()).collect();
    format!("{}({})", function.name, inputs.join(","))
}

/// Checks that every declared `(selector, signature)` appears among the bytecode candidates
pub fn compare_selectors(declared: &[(String, String)], bytecode: &str) -> AbiComparisonResult {
    let found = extract_selectors_from_bytecode(bytecode);

    if declared.is_empty() {
        return AbiComparisonResult {
            status: CheckStatus::Skip,
            message: "ABI declares no functions".to_string(),
            abi_selector_count: 0,
            bytecode_selector_count: found.len(),
            missing: Vec::new(),
        };
    }

    let found: BTreeSet<&str> = found.iter().map(String::as_str).collect();
    let missing: Vec<String> = declared
        .iter()
        .filter(|(selector, _)| !found.contains(selector.as_str()))
        .map(|(selector, signature)| format!("{} ({})", signature, selector))
        .collect();

    if missing.is_empty() {
        return AbiComparisonResult {
            status: CheckStatus::Pass,
            message: format!(
                "All {} ABI function selector(s) found in bytecode",
                declared.len()
            ),
            abi_selector_count: declared.len(),
            bytecode_selector_count: found.len(),
            missing,
        };
    }

    let listed = missing
        .iter()
        .take(MAX_LISTED_MISSING)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let more = if missing.len() > MAX_LISTED_MISSING { ", ..." } else { "" };

    AbiComparisonResult {
        status: CheckStatus::Fail,
        message: format!(
            "{}/{} ABI function selector(s) missing from bytecode: {}{}",
            missing.len(),
            declared.len(),
            listed,
            more
        ),
        abi_selector_count: declared.len(),
        bytecode_selector_count: found.len(),
        missing,
    }
}
