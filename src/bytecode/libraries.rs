// External library linking
//
// Contracts that call external libraries are compiled with 20-byte
// placeholders where each library address goes. The artifact records those
// positions as link references; the deployer writes the real addresses in.
// Linking the local bytecode with the configured addresses lets the comparator
// see the same bytes as the chain, and reading the addresses back out of the
// remote bytecode shows whether the deployed contract calls the right library.

use std::collections::BTreeMap;

use common::utils::{byte_slice, normalize_hex};
use common::CheckStatus;
use serde::{Deserialize, Serialize};

/// Hex characters in a library address
const ADDRESS_CHARS: usize = 40;

/// Position of one library address in deployed bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReference {
    /// Byte offset
    pub start: usize,
    /// Always 20 for library addresses
    pub length: usize,
}

/// Source path -> library name -> positions, as recorded by the compiler
pub type LinkReferences = BTreeMap<String, BTreeMap<String, Vec<LinkReference>>>;

/// Check of one linked library against the remote bytecode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedLibraryResult {
    /// Fully-qualified name, `sourcePath:LibraryName`
    pub name: String,
    /// Configured address (empty when none was configured)
    pub address: String,
    /// Address read from the remote bytecode (the first disagreeing one on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_address: Option<String>,
    pub positions: Vec<usize>,
    pub status: CheckStatus,
    pub message: String,
}

impl LinkedLibraryResult {
    /// Library name without its source path
    pub fn short_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }
}

/// Iterates `(qualified name, library name, positions)` over link references
fn libraries(references: &LinkReferences) -> impl Iterator<Item = (String, &str, &[LinkReference])> {
    references.iter().flat_map(|(source, libraries)| {
        libraries
            .iter()
            .map(move |(library, positions)| (format!("{}:{}", source, library), library.as_str(), positions.as_slice()))
    })
}

/// Configured address for a library, looked up by qualified name first, then by bare name
fn configured_address<'a>(
    addresses: &'a BTreeMap<String, String>,
    qualified: &str,
    library: &str,
) -> Option<&'a str> {
    addresses
        .get(qualified)
        .or_else(|| addresses.get(library))
        .map(String::as_str)
}

/// Normalized 40-character address hex, or `None` when the text is not an address
fn address_hex(address: &str) -> Option<String> {
    let normalized = normalize_hex(address);
    (normalized.len() == ADDRESS_CHARS && normalized.bytes().all(|b| b.is_ascii_hexdigit())).then_some(normalized)
}

/// Writes the configured library addresses into `bytecode` at their link references.
///
/// Libraries without a configured (valid) address keep their placeholder, and
/// positions outside the bytecode are ignored. The result is normalized hex
/// without a prefix.
pub fn link_libraries(bytecode: &str, references: &LinkReferences, addresses: &BTreeMap<String, String>) -> String {
    let mut linked = normalize_hex(bytecode);

    for (qualified, library, positions) in libraries(references) {
        let Some(address) = configured_address(addresses, &qualified, library).and_then(address_hex) else {
            continue;
        };
        for reference in positions {
            let start = reference.start * 2;
            let end = start + ADDRESS_CHARS;
            if linked.is_char_boundary(start) && linked.is_char_boundary(end) && end <= linked.len() {
                linked.replace_range(start..end, &address);
            }
        }
    }

    linked
}

/// Byte offsets of unresolved `__$<hash>$__` placeholders
pub fn detect_unlinked_libraries(bytecode: &str) -> Vec<usize> {
    let normalized = normalize_hex(bytecode);
    let mut positions = Vec::new();
    let mut search_from = 0;

    while let Some(found) = normalized.get(search_from..).and_then(|rest| rest.find("__$")) {
        let start = search_from + found;
        let closes = normalized.get(start + ADDRESS_CHARS - 3..start + ADDRESS_CHARS) == Some("$__");
        if closes && start % 2 == 0 {
            positions.push(start / 2);
            search_from = start + ADDRESS_CHARS;
        } else {
            search_from = start + 3;
        }
    }

    positions
}

/// Reads every linked library address out of the remote bytecode and compares
/// it with the configured one.
pub fn verify_linked_libraries(
    remote_bytecode: &str,
    references: &LinkReferences,
    addresses: &BTreeMap<String, String>,
) -> Vec<LinkedLibraryResult> {
    let remote = normalize_hex(remote_bytecode);

    libraries(references)
        .map(|(qualified, library, positions)| {
            let position_list: Vec<usize> = positions.iter().map(|reference| reference.start).collect();

            let Some(configured) = configured_address(addresses, &qualified, library) else {
                return unconfigured(qualified, position_list);
            };
            let Some(expected) = address_hex(configured) else {
                return LinkedLibraryResult {
                    message: format!("Library {} has an invalid configured address {}", qualified, configured),
                    name: qualified,
                    address: configured.to_string(),
                    actual_address: None,
                    positions: position_list,
                    status: CheckStatus::Fail,
                };
            };

            let found: Vec<Option<&str>> = positions
                .iter()
                .map(|reference| byte_slice(&remote, reference.start, reference.length))
                .collect();
            let mismatch = found.iter().copied().find(|actual| *actual != Some(expected.as_str()));

            match mismatch {
                None => LinkedLibraryResult {
                    message: format!(
                        "{} linked at 0x{} ({} position(s))",
                        library,
                        expected,
                        position_list.len()
                    ),
                    name: qualified,
                    actual_address: found.first().copied().flatten().map(|actual| format!("0x{}", actual)),
                    address: format!("0x{}", expected),
                    positions: position_list,
                    status: CheckStatus::Pass,
                },
                Some(actual) => {
                    let actual_address = actual.map(|address| format!("0x{}", address));
                    LinkedLibraryResult {
                        message: format!(
                            "{} expected at 0x{} but bytecode references {}",
                            library,
                            expected,
                            actual_address.as_deref().unwrap_or("nothing (position out of range)")
                        ),
                        name: qualified,
                        address: format!("0x{}", expected),
                        actual_address,
                        positions: position_list,
                        status: CheckStatus::Fail,
                    }
                }
            }
        })
        .collect()
}

/// Failed results for every library when none has a configured address
pub fn unconfigured_libraries(references: &LinkReferences) -> Vec<LinkedLibraryResult> {
    libraries(references)
        .map(|(qualified, _, positions)| unconfigured(qualified, positions.iter().map(|r| r.start).collect()))
        .collect()
}

fn unconfigured(qualified: String, positions: Vec<usize>) -> LinkedLibraryResult {
    LinkedLibraryResult {
        message: format!("Library {} requires an address but none provided in linkedLibraries config", qualified),
        name: qualified,
        address: String::new(),
        actual_address: None,
        positions,
        status: CheckStatus::Fail,
    }
}
