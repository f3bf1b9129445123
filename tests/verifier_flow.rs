mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::CheckStatus;
use ethers::abi::{Abi, Token};
use ethers::types::Address;
use integrity_verify::api::{
    ConfigManager, ContractConfig, ContractOutcome, StateVerificationConfig, Verifier, VerifierConfig,
    VerifyOptions, ViewCallConfig,
};
use integrity_verify::artifact::{InlineSource, NormalizedArtifact};
use integrity_verify::bytecode::{ConstructorArgs, MatchConfidence};
use integrity_verify::compare::Comparison;
use integrity_verify::ethereum::EIP1967_IMPLEMENTATION_SLOT;
use integrity_verify::storage::SlotConfig;
use integrity_verify::{ChainAdapter, ChainConfig};
use serde_json::{json, Value};

use support::{address, address_word, uint_word, MockChain};

// PUSH4 retrieve() sits at the end of the first half
const FILLER: &str = "6080604052348015600f57600080fd5b506004361060285760003560e01c8063\
                      2e64cec114602d575b600080fd5b60336047565b604051603e91906067565b60";
const LOCAL_METADATA: &str = "a164736f6c634300080a000a";
const REMOTE_METADATA: &str = "a2646970667358220000000a";

const OWNER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

/// Filler, PUSH32 <window>, PUSH4 owner(), JUMPDEST. The window covers bytes [65, 97).
fn body(window: &str) -> String {
    assert_eq!(window.len(), 64);
    format!("{}7f{}638da5cb5b5b", FILLER, window)
}

fn zero_window() -> String {
    "0".repeat(64)
}

fn owner_window() -> String {
    format!("{}{}", "0".repeat(24), OWNER.trim_start_matches("0x").to_lowercase())
}

fn remote_code(body: &str) -> Vec<u8> {
    hex::decode(format!("{}{}", body, REMOTE_METADATA)).unwrap()
}

fn abi() -> Value {
    json!([
        {"type":"function","name":"owner","inputs":[],"outputs":[{"name":"","type":"address"}],"stateMutability":"view"},
        {"type":"function","name":"retrieve","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}
    ])
}

fn parsed_abi() -> Abi {
    serde_json::from_value(abi()).unwrap()
}

fn foundry_artifact(local_body: &str) -> NormalizedArtifact {
    NormalizedArtifact::from_value(&json!({
        "abi": abi(),
        "deployedBytecode": {
            "object": format!("0x{}{}", local_body, LOCAL_METADATA),
            "immutableReferences": {"41": [{"start": 65, "length": 32}]}
        }
    }))
    .unwrap()
}

fn hardhat_artifact(local_body: &str) -> NormalizedArtifact {
    NormalizedArtifact::from_value(&json!({
        "abi": abi(),
        "deployedBytecode": format!("0x{}{}", local_body, LOCAL_METADATA)
    }))
    .unwrap()
}

fn local_chain() -> ChainConfig {
    ChainConfig::new(31337, "http://localhost:8545")
}

fn contract(name: &str, at: Address, artifact: &str) -> ContractConfig {
    ContractConfig::new(name, "local", at, artifact)
}

fn verifier(source: InlineSource, chain: MockChain) -> Verifier<InlineSource> {
    Verifier::with_adapter(source, Arc::new(chain) as Arc<dyn ChainAdapter>)
}

#[tokio::test]
async fn test_definitive_match_with_args_and_named_values() {
    let at = address(0x1000);
    let source = InlineSource::new().with_artifact("Owned.json", foundry_artifact(&body(&zero_window())));
    let chain = MockChain::new().with_code(at, remote_code(&body(&owner_window())));

    let mut config = contract("Owned", at, "Owned.json");
    config.constructor_args = Some(ConstructorArgs::Values(vec![json!(OWNER)]));
    config.immutable_values = Some(BTreeMap::from([("owner".to_string(), json!(OWNER))]));

    let result = verifier(source, chain)
        .verify_contract(&config, &local_chain(), &VerifyOptions::default())
        .await;

    assert!(result.error.is_none(), "{:?}", result.error);
    let bytecode = result.bytecode_result.as_ref().unwrap();
    assert_eq!(bytecode.status, CheckStatus::Pass);
    assert_eq!(bytecode.match_percentage, 100);
    assert_eq!(bytecode.confidence, MatchConfidence::Definitive);
    assert_eq!(
        bytecode.message,
        "Bytecode matches exactly after substituting 1 immutable(s) - NO alterations detected"
    );

    assert!(result.args_validation.as_ref().unwrap().valid);
    assert!(result.immutable_values_result.as_ref().unwrap().status.is_pass());
    assert!(result.definitive_result.as_ref().unwrap().exact_match);

    let grouped = result.grouped_immutables.as_ref().unwrap();
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].ref_start, 65);
    assert!(!grouped[0].is_fragmented);
    assert_eq!(grouped[0].full_value, owner_window());

    assert_eq!(result.abi_result.as_ref().unwrap().status, CheckStatus::Pass);
    assert_eq!(result.outcome(), ContractOutcome::Passed);
}

#[tokio::test]
async fn test_definitive_mismatch_overrides_everything() {
    let at = address(0x1000);
    let mut tampered = body(&owner_window());
    // byte 5: CALLVALUE -> 0x35
    tampered.replace_range(10..12, "35");

    let source = InlineSource::new().with_artifact("Owned.json", foundry_artifact(&body(&zero_window())));
    let chain = MockChain::new().with_code(at, remote_code(&tampered));
    let mut config = contract("Owned", at, "Owned.json");
    config.immutable_values = Some(BTreeMap::from([("owner".to_string(), json!(OWNER))]));

    let result = verifier(source, chain)
        .verify_contract(&config, &local_chain(), &VerifyOptions::default())
        .await;

    let bytecode = result.bytecode_result.as_ref().unwrap();
    assert_eq!(bytecode.status, CheckStatus::Fail);
    assert_eq!(bytecode.confidence, MatchConfidence::None);
    assert_eq!(
        bytecode.message,
        "Bytecode mismatch after immutable substitution: 1 bytes differ at positions 5"
    );
    assert_eq!(result.definitive_result.as_ref().unwrap().differing_positions, vec![5]);
    assert_eq!(result.outcome(), ContractOutcome::Failed);
    assert_eq!(result.failures()[0].0, "Bytecode");
}

/// Filler, PUSH20 <library>, PUSH4 owner(), JUMPDEST. The library address covers bytes [65, 85).
fn library_body(library: &str) -> String {
    format!("{}73{}638da5cb5b", FILLER, library)
}

fn linked_artifact() -> NormalizedArtifact {
    let placeholder = format!("__${}$__", "4".repeat(34));
    NormalizedArtifact::from_value(&json!({
        "abi": abi(),
        "deployedBytecode": format!("0x{}{}", library_body(&placeholder), LOCAL_METADATA),
        "deployedLinkReferences": {"src/MathLib.sol": {"MathLib": [{"start": 65, "length": 20}]}}
    }))
    .unwrap()
}

#[tokio::test]
async fn test_linked_library_is_written_into_local_bytecode() {
    let at = address(0x5000);
    let library = "00000000000000000000000000000000000000aa";
    let source = InlineSource::new().with_artifact("Pricing.json", linked_artifact());
    let chain = MockChain::new().with_code(at, remote_code(&library_body(library)));

    let mut config = contract("Pricing", at, "Pricing.json");
    config.linked_libraries = Some(BTreeMap::from([("MathLib".to_string(), format!("0x{}", library))]));

    let result = verifier(source, chain)
        .verify_contract(&config, &local_chain(), &VerifyOptions::default())
        .await;

    let bytecode = result.bytecode_result.as_ref().unwrap();
    assert_eq!(bytecode.status, CheckStatus::Pass);
    assert_eq!(bytecode.confidence, MatchConfidence::Exact);
    let libraries = result.linked_libraries_result.as_ref().unwrap();
    assert_eq!(libraries[0].name, "src/MathLib.sol:MathLib");
    assert_eq!(libraries[0].status, CheckStatus::Pass);
    assert_eq!(result.outcome(), ContractOutcome::Passed);
}

#[tokio::test]
async fn test_swapped_library_address_fails_despite_heuristics() {
    let at = address(0x5000);
    let configured = "00000000000000000000000000000000000000aa";
    let deployed = "00000000000000000000000000000000000000bb";
    let source = InlineSource::new().with_artifact("Pricing.json", linked_artifact());

    let mut config = contract("Pricing", at, "Pricing.json");
    config.linked_libraries = Some(BTreeMap::from([(
        "src/MathLib.sol:MathLib".to_string(),
        format!("0x{}", configured),
    )]));

    let swapped = verifier(source.clone(), MockChain::new().with_code(at, remote_code(&library_body(deployed))))
        .verify_contract(&config, &local_chain(), &VerifyOptions::default())
        .await;
    let bytecode = swapped.bytecode_result.as_ref().unwrap();
    assert_eq!(bytecode.status, CheckStatus::Fail);
    assert!(
        bytecode.message.starts_with("Linked library address mismatch (1): MathLib - "),
        "{}",
        bytecode.message
    );
    let libraries = swapped.linked_libraries_result.as_ref().unwrap();
    assert_eq!(libraries[0].actual_address, Some(format!("0x{}", deployed)));
    assert_eq!(swapped.outcome(), ContractOutcome::Failed);
    assert!(swapped.failures().iter().any(|(label, _)| *label == "Library"));

    let unconfigured = verifier(source, MockChain::new().with_code(at, remote_code(&library_body(configured))))
        .verify_contract(&contract("Pricing", at, "Pricing.json"), &local_chain(), &VerifyOptions::default())
        .await;
    assert_eq!(unconfigured.bytecode_result.as_ref().unwrap().status, CheckStatus::Fail);
    assert_eq!(
        unconfigured.linked_libraries_result.as_ref().unwrap()[0].message,
        "Library src/MathLib.sol:MathLib requires an address but none provided in linkedLibraries config"
    );
}

#[tokio::test]
async fn test_wrong_named_value_downgrades_heuristic_pass() {
    let at = address(0x2000);
    let source = InlineSource::new().with_artifact("Owned.json", hardhat_artifact(&body(&zero_window())));
    let chain = MockChain::new().with_code(at, remote_code(&body(&owner_window())));

    let mut config = contract("Owned", at, "Owned.json");
    config.immutable_values = Some(BTreeMap::from([(
        "owner".to_string(),
        json!("0x000000000000000000000000000000000000bEEF"),
    )]));

    let result = verifier(source, chain)
        .verify_contract(&config, &local_chain(), &VerifyOptions::default())
        .await;

    let bytecode = result.bytecode_result.as_ref().unwrap();
    assert_eq!(bytecode.status, CheckStatus::Warn);
    assert_eq!(bytecode.confidence, MatchConfidence::Heuristic);
    assert!(result.definitive_result.is_none());
    assert!(result.grouped_immutables.is_none());
    assert_eq!(result.outcome(), ContractOutcome::Warnings);
}

#[tokio::test]
async fn test_named_values_upgrade_heuristic_fail_above_threshold() {
    let at = address(0x3000);
    let local = body(&format!("{}ffffff", "0".repeat(58)));
    let remote = body(&format!("{}123456", "0".repeat(58)));
    let source = InlineSource::new().with_artifact("Fee.json", hardhat_artifact(&local));

    let mut config = contract("Fee", at, "Fee.json");
    config.immutable_values = Some(BTreeMap::from([("fee".to_string(), json!("0x123456"))]));

    let upgraded = verifier(source.clone(), MockChain::new().with_code(at, remote_code(&remote)))
        .verify_contract(&config, &local_chain(), &VerifyOptions::default())
        .await;
    let bytecode = upgraded.bytecode_result.as_ref().unwrap();
    assert_eq!(bytecode.status, CheckStatus::Pass);
    assert_eq!(bytecode.match_percentage, 100);
    assert_eq!(bytecode.only_immutables_differ, Some(true));
    assert_eq!(bytecode.confidence, MatchConfidence::NamedValues);

    let strict = VerifyOptions::builder().pass_threshold(98).build();
    let kept = verifier(source, MockChain::new().with_code(at, remote_code(&remote)))
        .verify_contract(&config, &local_chain(), &strict)
        .await;
    let bytecode = kept.bytecode_result.as_ref().unwrap();
    assert_eq!(bytecode.status, CheckStatus::Fail);
    assert_eq!(
        bytecode.message,
        "Bytecode mismatch: 97% match, 1 difference region(s) - immutable values verified"
    );
}

#[tokio::test]
async fn test_constructor_arg_mismatch_downgrades_to_warn() {
    let at = address(0x1000);
    let source = InlineSource::new().with_artifact("Owned.json", foundry_artifact(&body(&zero_window())));
    let chain = MockChain::new().with_code(at, remote_code(&body(&owner_window())));

    let mut config = contract("Owned", at, "Owned.json");
    config.constructor_args = Some(ConstructorArgs::Values(vec![json!("0x000000000000000000000000000000000000bEEF")]));

    let result = verifier(source, chain)
        .verify_contract(&config, &local_chain(), &VerifyOptions::builder().skip_abi(true).build())
        .await;

    assert!(!result.args_validation.as_ref().unwrap().valid);
    // definitive substitution still confirms the structure
    let bytecode = result.bytecode_result.as_ref().unwrap();
    assert_eq!(bytecode.confidence, MatchConfidence::Definitive);
    assert_eq!(bytecode.status, CheckStatus::Pass);
    assert!(result.abi_result.is_none());
}

#[tokio::test]
async fn test_missing_code_is_recorded_as_error() {
    let at = address(0xdead);
    let source = InlineSource::new().with_artifact("Owned.json", hardhat_artifact(&body(&zero_window())));

    let result = verifier(source, MockChain::new())
        .verify_contract(&contract("Ghost", at, "Owned.json"), &local_chain(), &VerifyOptions::default())
        .await;

    assert_eq!(
        result.error.as_deref(),
        Some("No bytecode found at address 0x000000000000000000000000000000000000dead")
    );
    assert!(result.bytecode_result.is_none());
    assert_eq!(result.outcome(), ContractOutcome::Failed);
}

#[tokio::test]
async fn test_missing_artifact_is_recorded_as_error() {
    let result = verifier(InlineSource::new(), MockChain::new())
        .verify_contract(&contract("Owned", address(1), "Owned.json"), &local_chain(), &VerifyOptions::default())
        .await;
    assert_eq!(result.error.as_deref(), Some("No artifact supplied for Owned.json"));
}

#[tokio::test]
async fn test_proxy_follows_eip1967_slot() {
    let proxy = address(0x4000);
    let implementation = address(0x4001);
    let source = InlineSource::new().with_artifact("Owned.json", foundry_artifact(&body(&zero_window())));
    let chain = MockChain::new()
        .with_code(proxy, hex::decode("363d3d373d3d3d363d73").unwrap())
        .with_code(implementation, remote_code(&body(&owner_window())))
        .with_storage(proxy, EIP1967_IMPLEMENTATION_SLOT, address_word(implementation));

    let mut config = contract("OwnedProxy", proxy, "Owned.json");
    config.is_proxy = true;

    let result = verifier(source, chain)
        .verify_contract(&config, &local_chain(), &VerifyOptions::default())
        .await;

    assert_eq!(result.implementation_address, Some(implementation));
    assert_eq!(result.bytecode_result.as_ref().unwrap().status, CheckStatus::Pass);
}

#[tokio::test]
async fn test_proxy_without_implementation_compares_proxy_code() {
    let proxy = address(0x4000);
    let source = InlineSource::new().with_artifact("Owned.json", foundry_artifact(&body(&zero_window())));
    let chain = MockChain::new().with_code(proxy, hex::decode("363d3d373d3d3d363d73").unwrap());

    let mut config = contract("OwnedProxy", proxy, "Owned.json");
    config.is_proxy = true;

    let result = verifier(source, chain)
        .verify_contract(&config, &local_chain(), &VerifyOptions::default())
        .await;

    assert!(result.error.is_none());
    assert!(result.implementation_address.is_none());
    assert_eq!(result.bytecode_result.as_ref().unwrap().match_percentage, 0);
}

#[tokio::test]
async fn test_state_checks_are_isolated() {
    let at = address(0x5000);
    let owner: Address = OWNER.parse().unwrap();
    let abi = parsed_abi();
    let source = InlineSource::new().with_artifact("Owned.json", hardhat_artifact(&body(&owner_window())));
    let chain = MockChain::new()
        .with_code(at, remote_code(&body(&owner_window())))
        .with_call(at, &abi, "owner", &[], &[Token::Address(owner)])
        .with_storage(at, uint_word(0), uint_word(1000));

    let mut config = contract("Owned", at, "Owned.json");
    config.state_verification = Some(StateVerificationConfig {
        view_calls: vec![
            ViewCallConfig {
                function: "owner".to_string(),
                params: Vec::new(),
                expected: json!(OWNER.to_lowercase()),
                comparison: Comparison::Eq,
            },
            ViewCallConfig {
                function: "retrieve".to_string(),
                params: Vec::new(),
                expected: json!("1000"),
                comparison: Comparison::Eq,
            },
            ViewCallConfig {
                function: "paused".to_string(),
                params: Vec::new(),
                expected: json!(false),
                comparison: Comparison::Eq,
            },
        ],
        slots: vec![SlotConfig {
            slot: "0x0".to_string(),
            solidity_type: "uint256".to_string(),
            name: "stored".to_string(),
            expected: json!("1000"),
            offset: None,
        }],
        ..Default::default()
    });

    let result = verifier(source, chain)
        .verify_contract(&config, &local_chain(), &VerifyOptions::builder().skip_bytecode(true).build())
        .await;

    let state = result.state_result.as_ref().unwrap();
    assert_eq!(state.status, CheckStatus::Fail);
    assert_eq!(state.message, "2/4 state checks passed");

    let calls = &state.view_call_results;
    assert_eq!(calls[0].status, CheckStatus::Pass);
    assert_eq!(calls[0].actual, Some(json!(OWNER)));
    assert_eq!(calls[1].status, CheckStatus::Fail);
    assert!(calls[1].message.starts_with("Call failed:"), "{}", calls[1].message);
    assert_eq!(calls[2].message, "Function 'paused' not found in ABI");
    assert_eq!(state.slot_results[0].actual, Some(json!("1000")));
    assert_eq!(state.slot_results[0].status, CheckStatus::Pass);

    assert_eq!(result.failures(), vec![("State", "2/4 state checks passed".to_string())]);
}

#[tokio::test]
async fn test_storage_paths_without_schema_fail_individually() {
    let at = address(0x5000);
    let source = InlineSource::new().with_artifact("Owned.json", hardhat_artifact(&body(&zero_window())));
    let chain = MockChain::new().with_code(at, remote_code(&body(&zero_window())));

    let mut config = contract("Owned", at, "Owned.json");
    config.state_verification = Some(StateVerificationConfig {
        storage_paths: vec![serde_json::from_value(json!({"path": "Main:owner", "expected": OWNER})).unwrap()],
        ..Default::default()
    });

    let result = verifier(source, chain)
        .verify_contract(&config, &local_chain(), &VerifyOptions::default())
        .await;

    let path = &result.state_result.as_ref().unwrap().storage_path_results[0];
    assert_eq!(path.status, CheckStatus::Fail);
    assert_eq!(path.message, "Error: storage paths require a schemaFile");
    assert_eq!(path.computed_slot, "error");
}

fn batch() -> (VerifierConfig, MockChain, InlineSource) {
    let good = address(0x1000);
    let missing = address(0x2000);
    let config = ConfigManager::builder()
        .chain("local", local_chain())
        .contract(contract("Owned", good, "Owned.json"))
        .contract(contract("Ghost", missing, "Owned.json"))
        .contract(ContractConfig::new("Elsewhere", "unknown", good, "Owned.json"))
        .build();
    let chain = MockChain::new().with_code(good, remote_code(&body(&owner_window())));
    let source = InlineSource::new().with_artifact("Owned.json", foundry_artifact(&body(&zero_window())));
    (config, chain, source)
}

#[tokio::test]
async fn test_batch_summary_counts() {
    let (config, chain, source) = batch();
    let summary = verifier(source, chain).verify_all(&config, &VerifyOptions::default()).await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.failed_results().next().unwrap().contract.name, "Ghost");
}

#[tokio::test]
async fn test_batch_filters_are_case_insensitive() {
    let (config, chain, source) = batch();
    let verifier = verifier(source, chain);

    let only_owned = verifier
        .verify_all(&config, &VerifyOptions::builder().contract_filter("OWNED").build())
        .await;
    assert_eq!((only_owned.total, only_owned.passed), (1, 1));

    let none = verifier
        .verify_all(&config, &VerifyOptions::builder().chain_filter("mainnet").build())
        .await;
    assert_eq!(none.total, 0);
    assert!(none.results.is_empty());
}

#[tokio::test]
async fn test_everything_skipped() {
    let (config, chain, source) = batch();
    let options = VerifyOptions::builder()
        .contract_filter("owned")
        .skip_bytecode(true)
        .skip_abi(true)
        .skip_state(true)
        .build();

    let summary = verifier(source, chain).verify_all(&config, &options).await;
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.results[0].outcome(), ContractOutcome::Skipped);
}
