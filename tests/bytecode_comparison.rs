use std::collections::BTreeMap;

use common::utils::strip_cbor_metadata;
use common::CheckStatus;
use integrity_verify::artifact::{ArtifactFormat, NormalizedArtifact};
use integrity_verify::bytecode::{
    compare_bytecode, compare_selectors, definitive_compare_bytecode, format_grouped_immutables,
    group_immutable_differences, validate_immutables_against_args, verify_immutable_values, ConstructorArgs,
    ImmutableMatchKind, MatchConfidence,
};
use serde_json::json;

const LOCAL_METADATA: &str = "a164736f6c634300080a000a";
const REMOTE_METADATA: &str = "a2646970667358220000000a";

/// An address with a zero run in the middle, so its window diffs in two pieces
const TOKEN: &str = "1111111111000000000022222222222222222222";

fn token_selector() -> String {
    hex::encode(ethers::utils::id("token()"))
}

/// PUSH1s, PUSH32 <window>, PUSH4 token(), JUMPDEST. The window covers bytes [6, 38).
fn body(window: &str) -> String {
    format!("60806040527f{}63{}5b", window, token_selector())
}

fn local_bytecode() -> String {
    format!("0x{}{}", body(&"0".repeat(64)), LOCAL_METADATA)
}

fn remote_bytecode() -> String {
    format!("0x{}{}", body(&format!("{}{}", "0".repeat(24), TOKEN)), REMOTE_METADATA)
}

fn foundry_artifact() -> NormalizedArtifact {
    NormalizedArtifact::from_value(&json!({
        "abi": [{"type":"function","name":"token","inputs":[],"outputs":[{"name":"","type":"address"}],"stateMutability":"view"}],
        "deployedBytecode": {
            "object": local_bytecode(),
            "immutableReferences": {"41": [{"start": 6, "length": 32}]}
        }
    }))
    .unwrap()
}

#[test]
fn test_fragmented_address_with_artifact_references() {
    let artifact = foundry_artifact();
    assert_eq!(artifact.format, ArtifactFormat::Foundry);
    let references = artifact.references();
    let remote = remote_bytecode();

    let comparison = compare_bytecode(&artifact.deployed_bytecode, &remote, Some(references));
    assert_eq!(comparison.status, CheckStatus::Pass);
    assert_eq!(comparison.confidence, MatchConfidence::ArtifactReferences);
    assert_eq!(
        comparison.message,
        "Bytecode matches (2 immutable value(s) differ at known positions)"
    );

    let positions: Vec<usize> = comparison.immutables().iter().map(|d| d.position).collect();
    assert_eq!(positions, vec![18, 28]);

    let definitive = definitive_compare_bytecode(&artifact.deployed_bytecode, &remote, references);
    assert!(definitive.exact_match);
    assert_eq!(definitive.immutables_substituted, 1);

    let grouped = group_immutable_differences(comparison.immutables(), references, &remote);
    assert_eq!(grouped.len(), 1);
    assert!(grouped[0].is_fragmented);
    assert_eq!(
        format_grouped_immutables(&grouped),
        vec![
            "1) Fragmented immutable at position 6 (address):".to_string(),
            format!("   Full value: 0x{}", TOKEN),
            "   1.1) Position 18: 1111111111".to_string(),
            "   1.2) Position 28: 22222222222222222222".to_string(),
        ]
    );
}

#[test]
fn test_fragments_need_named_values_not_constructor_args() {
    let artifact = foundry_artifact();
    let remote = remote_bytecode();
    let comparison = compare_bytecode(&artifact.deployed_bytecode, &remote, Some(artifact.references()));

    // Neither fragment is a whole argument word
    let args = ConstructorArgs::Values(vec![json!(format!("0x{}", TOKEN))]);
    let validation = validate_immutables_against_args(comparison.immutables(), &args, false);
    assert!(!validation.valid);
    assert_eq!(validation.message, "0/2 immutable values matched constructor args");
    assert_eq!(validation.details.as_ref().map(Vec::len), Some(2));

    let mut named = BTreeMap::new();
    named.insert("token".to_string(), json!(format!("0x{}", TOKEN)));
    let result = verify_immutable_values(&named, comparison.immutables());

    assert_eq!(result.status, CheckStatus::Pass);
    assert_eq!(result.results[0].match_kind, Some(ImmutableMatchKind::Fragment));
    assert_eq!(result.unclaimed_positions, vec![28]);
    assert_eq!(
        result.message,
        "All 1 named immutables verified (1 additional region(s) in bytecode - likely duplicates or fragments)"
    );
}

#[test]
fn test_hardhat_artifact_falls_back_to_heuristics() {
    let artifact = NormalizedArtifact::from_value(&json!({
        "abi": [{"type":"function","name":"token","inputs":[],"outputs":[{"name":"","type":"address"}],"stateMutability":"view"}],
        "deployedBytecode": local_bytecode()
    }))
    .unwrap();
    assert_eq!(artifact.format, ArtifactFormat::Hardhat);
    assert!(artifact.references().is_empty());

    let remote = remote_bytecode();
    let comparison = compare_bytecode(&artifact.deployed_bytecode, &remote, None);
    assert_eq!(comparison.confidence, MatchConfidence::Heuristic);
    assert_eq!(comparison.only_immutables_differ, Some(true));

    let abi = compare_selectors(&artifact.selectors(), &remote);
    assert_eq!(abi.status, CheckStatus::Pass);
    assert_eq!(abi.message, "All 1 ABI function selector(s) found in bytecode");
}

#[test]
fn test_metadata_only_difference_is_exact() {
    let local = local_bytecode();
    let remote = format!("0x{}{}", body(&"0".repeat(64)), REMOTE_METADATA);
    assert_eq!(strip_cbor_metadata(&local), strip_cbor_metadata(&remote));

    let comparison = compare_bytecode(&local, &remote, None);
    assert_eq!(comparison.status, CheckStatus::Pass);
    assert_eq!(comparison.confidence, MatchConfidence::Exact);
    assert_eq!(comparison.message, "Bytecode matches exactly");
}

#[test]
fn test_tampered_byte_outside_window() {
    let artifact = foundry_artifact();
    // JUMPDEST at byte 43 replaced with STOP
    let selector = token_selector();
    let tampered = remote_bytecode().replacen(&format!("{}5b", selector), &format!("{}00", selector), 1);

    let comparison = compare_bytecode(&artifact.deployed_bytecode, &tampered, Some(artifact.references()));
    assert_eq!(comparison.status, CheckStatus::Fail);
    assert_eq!(comparison.message, "Bytecode mismatch: 1 unexpected difference(s)");

    let definitive = definitive_compare_bytecode(&artifact.deployed_bytecode, &tampered, artifact.references());
    assert!(!definitive.exact_match);
    assert_eq!(definitive.differing_positions, vec![43]);
}
