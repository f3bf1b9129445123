// Bytecode comparison
//
// Compares local artifact bytecode with deployed bytecode after stripping the
// Solidity metadata blob. Differences are classified as immutables either by
// compiler-recorded reference windows (ground truth) or by a conservative
// heuristic. The definitive check substitutes remote immutables into the local
// bytecode and requires a byte-for-byte match.

use common::utils::{byte_len, is_zero_hex, strip_cbor_metadata, strip_leading_zeros};
use common::{CheckStatus, ImmutableReference};

use super::types::*;
use crate::error::VerifyError;

/// Byte widths Solidity immutables commonly occupy
pub const COMMON_IMMUTABLE_SIZES: [usize; 8] = [1, 2, 4, 8, 12, 16, 20, 32];

/// Maximum number of sample differences carried in a result
pub const MAX_REPORTED_DIFFERENCES: usize = 10;

/// More regions than this can't be explained away as immutables
const MAX_HEURISTIC_REGIONS: usize = 8;

/// More than this many tiny regions looks like code drift, not immutables
const MAX_TINY_REGIONS: usize = 5;

/// Regions this short are only accepted when the local side is a placeholder
const TINY_REGION_BYTES: usize = 2;

/// Longest non-zero tail a placeholder may carry
const PLACEHOLDER_TAIL_CHARS: usize = 16;

const ARTIFACT_VERIFIED_TYPE: &str = "immutable (verified by artifact)";
const UNKNOWN_POSITION_TYPE: &str = "unknown (not at immutable position)";

/// Scans two normalized hex strings byte by byte and returns maximal runs of differing bytes.
///
/// Only the common prefix `min(local, remote)` is scanned; ranges are half-open byte offsets.
pub fn find_difference_regions(local: &str, remote: &str) -> Vec<DifferenceRegion> {
    let local_bytes = local.as_bytes();
    let remote_bytes = remote.as_bytes();
    let scan_len = local_bytes.len().min(remote_bytes.len()) / 2;

    let mut regions = Vec::new();
    let mut region_start: Option<usize> = None;

    for position in 0..scan_len {
        let hex = position * 2..position * 2 + 2;
        let differs = local_bytes[hex.clone()] != remote_bytes[hex];

        match (differs, region_start) {
            (true, None) => region_start = Some(position),
            (false, Some(start)) => {
                regions.push(make_region(local, remote, start, position));
                region_start = None;
            }
            _ => {}
        }
    }

    if let Some(start) = region_start {
        regions.push(make_region(local, remote, start, scan_len));
    }

    regions
}

fn make_region(local: &str, remote: &str, start: usize, end: usize) -> DifferenceRegion {
    DifferenceRegion {
        start,
        end,
        local_value: local.get(start * 2..end * 2).unwrap_or_default().to_string(),
        remote_value: remote.get(start * 2..end * 2).unwrap_or_default().to_string(),
    }
}

/// Compares local and remote bytecode, tolerating differences that are immutable values.
///
/// When `known_immutables` is supplied (and non-empty) the reference windows decide which
/// differences are acceptable; otherwise a heuristic classification is used that resolves
/// every ambiguous case toward `fail`.
pub fn compare_bytecode(
    local_bytecode: &str,
    remote_bytecode: &str,
    known_immutables: Option<&[ImmutableReference]>,
) -> BytecodeComparisonResult {
    let stripped_local = strip_cbor_metadata(local_bytecode);
    let stripped_remote = strip_cbor_metadata(remote_bytecode);

    let local_bytes = byte_len(&stripped_local);
    let remote_bytes = byte_len(&stripped_remote);

    let result = BytecodeComparisonResult {
        status: CheckStatus::Pass,
        message: String::new(),
        local_bytecode_length: local_bytes,
        remote_bytecode_length: remote_bytes,
        match_percentage: 100,
        differences: None,
        immutable_differences: None,
        only_immutables_differ: None,
        confidence: MatchConfidence::Exact,
    };

    if stripped_local == stripped_remote {
        return BytecodeComparisonResult {
            message: "Bytecode matches exactly".to_string(),
            ..result
        };
    }

    // Positional diffing is meaningless once lengths diverge.
    if stripped_local.len() != stripped_remote.len() {
        let mismatch = VerifyError::LengthMismatch {
            local: local_bytes,
            remote: remote_bytes,
        };
        return BytecodeComparisonResult {
            status: CheckStatus::Fail,
            message: mismatch.to_string(),
            match_percentage: 0,
            only_immutables_differ: Some(false),
            confidence: MatchConfidence::None,
            ..result
        };
    }

    let regions = find_difference_regions(&stripped_local, &stripped_remote);
    let match_percentage = match_percentage(local_bytes, &regions);

    match known_immutables {
        Some(references) if !references.is_empty() => {
            classify_with_references(result, &regions, references, match_percentage)
        }
        _ => classify_heuristically(result, &regions, match_percentage),
    }
}

fn match_percentage(total_bytes: usize, regions: &[DifferenceRegion]) -> u8 {
    if total_bytes == 0 {
        return 0;
    }
    let diff_bytes: usize = regions.iter().map(DifferenceRegion::len).sum();
    let matching = total_bytes.saturating_sub(diff_bytes) as f64;
    (matching / total_bytes as f64 * 100.0).round() as u8
}

fn sample_differences<'a>(regions: impl Iterator<Item = &'a DifferenceRegion>) -> Vec<BytecodeDifference> {
    regions
        .take(MAX_REPORTED_DIFFERENCES)
        .map(BytecodeDifference::from)
        .collect()
}

fn classify_with_references(
    result: BytecodeComparisonResult,
    regions: &[DifferenceRegion],
    references: &[ImmutableReference],
    match_percentage: u8,
) -> BytecodeComparisonResult {
    let immutables: Vec<ImmutableDifference> = regions
        .iter()
        .map(|region| {
            let label = if region.is_within(references) {
                ARTIFACT_VERIFIED_TYPE
            } else {
                UNKNOWN_POSITION_TYPE
            };
            ImmutableDifference::from_region(region, Some(label.to_string()))
        })
        .collect();

    let unexplained: Vec<&DifferenceRegion> = regions
        .iter()
        .filter(|region| !region.is_within(references))
        .collect();

    if unexplained.is_empty() {
        return BytecodeComparisonResult {
            message: format!(
                "Bytecode matches ({} immutable value(s) differ at known positions)",
                immutables.len()
            ),
            immutable_differences: Some(immutables),
            only_immutables_differ: Some(true),
            confidence: MatchConfidence::ArtifactReferences,
            ..result
        };
    }

    BytecodeComparisonResult {
        status: CheckStatus::Fail,
        message: format!(
            "Bytecode mismatch: {} unexpected difference(s)",
            unexplained.len()
        ),
        match_percentage,
        differences: Some(sample_differences(unexplained.into_iter())),
        immutable_differences: Some(immutables),
        only_immutables_differ: Some(false),
        confidence: MatchConfidence::None,
        ..result
    }
}

fn classify_heuristically(
    result: BytecodeComparisonResult,
    regions: &[DifferenceRegion],
    match_percentage: u8,
) -> BytecodeComparisonResult {
    let (immutables, only_immutables) = analyze_immutable_differences(regions);

    if only_immutables {
        return BytecodeComparisonResult {
            message: format!(
                "Bytecode matches ({} immutable value(s) differ as expected)",
                immutables.len()
            ),
            immutable_differences: Some(immutables),
            only_immutables_differ: Some(true),
            confidence: MatchConfidence::Heuristic,
            ..result
        };
    }

    BytecodeComparisonResult {
        status: CheckStatus::Fail,
        message: format!(
            "Bytecode mismatch: {}% match, {} difference region(s)",
            match_percentage,
            regions.len()
        ),
        match_percentage,
        differences: Some(sample_differences(regions.iter())),
        immutable_differences: if immutables.is_empty() { None } else { Some(immutables) },
        only_immutables_differ: Some(false),
        confidence: MatchConfidence::None,
        ..result
    }
}

/// Classifies difference regions without ground truth.
///
/// Returns the candidate immutables and whether every region can be explained as one.
pub fn analyze_immutable_differences(regions: &[DifferenceRegion]) -> (Vec<ImmutableDifference>, bool) {
    let mut all_look_like_immutables = true;
    let mut immutables = Vec::with_capacity(regions.len());

    for region in regions {
        let length = region.len();
        let placeholder = is_placeholder(&region.local_value);

        if !placeholder && !COMMON_IMMUTABLE_SIZES.contains(&length) {
            all_look_like_immutables = false;
        }
        if !placeholder && length <= TINY_REGION_BYTES {
            all_look_like_immutables = false;
        }

        immutables.push(ImmutableDifference::from_region(
            region,
            guess_immutable_type(length, &region.remote_value),
        ));
    }

    if regions.len() > MAX_TINY_REGIONS && regions.iter().all(|r| r.len() <= TINY_REGION_BYTES) {
        all_look_like_immutables = false;
    }
    if regions.len() > MAX_HEURISTIC_REGIONS {
        all_look_like_immutables = false;
    }

    (immutables, all_look_like_immutables && !regions.is_empty())
}

/// All zeros, or a run of zeros followed by a short non-zero tail
fn is_placeholder(local_value: &str) -> bool {
    if is_zero_hex(local_value) {
        return true;
    }
    let len = local_value.len();
    let leading_zeros = local_value.len() - local_value.trim_start_matches('0').len();
    let min_zeros = len.saturating_sub(PLACEHOLDER_TAIL_CHARS).max(1);
    leading_zeros >= min_zeros && len >= min_zeros + 1
}

/// Best-guess Solidity type for a differing region
pub fn guess_immutable_type(length: usize, remote_value: &str) -> Option<String> {
    if length == 20 || (length == 32 && remote_value.starts_with(&"0".repeat(24))) {
        Some("address".to_string())
    } else if length <= 8 {
        Some(format!("uint{}", length * 8))
    } else if length == 32 {
        Some("bytes32 or uint256".to_string())
    } else {
        None
    }
}

/// Substitutes remote immutable windows into local bytecode and compares byte for byte.
///
/// References whose window falls outside the stripped bytecode are ignored.
pub fn definitive_compare_bytecode(
    local_bytecode: &str,
    remote_bytecode: &str,
    immutable_references: &[ImmutableReference],
) -> DefinitiveBytecodeResult {
    let stripped_local = strip_cbor_metadata(local_bytecode);
    let stripped_remote = strip_cbor_metadata(remote_bytecode);

    if stripped_local.len() != stripped_remote.len() {
        let mismatch = VerifyError::LengthMismatch {
            local: byte_len(&stripped_local),
            remote: byte_len(&stripped_remote),
        };
        return DefinitiveBytecodeResult {
            exact_match: false,
            status: CheckStatus::Fail,
            message: mismatch.to_string(),
            immutables_substituted: 0,
            differing_bytes: byte_len(&stripped_local).abs_diff(byte_len(&stripped_remote)),
            differing_positions: Vec::new(),
        };
    }

    let remote = stripped_remote.as_bytes();
    let mut substituted = stripped_local.into_bytes();
    let mut substitutions = 0;

    for reference in immutable_references {
        let hex_start = reference.start * 2;
        let hex_end = reference.end() * 2;
        if hex_end > remote.len() {
            continue;
        }
        substituted[hex_start..hex_end].copy_from_slice(&remote[hex_start..hex_end]);
        substitutions += 1;
    }

    if substituted.as_slice() == remote {
        return DefinitiveBytecodeResult {
            exact_match: true,
            status: CheckStatus::Pass,
            message: format!(
                "Bytecode matches exactly after substituting {} immutable(s) - NO alterations detected",
                substitutions
            ),
            immutables_substituted: substitutions,
            differing_bytes: 0,
            differing_positions: Vec::new(),
        };
    }

    let differing: Vec<usize> = substituted
        .chunks(2)
        .zip(remote.chunks(2))
        .enumerate()
        .filter(|(_, (local, remote))| local != remote)
        .map(|(position, _)| position)
        .collect();

    let shown: Vec<usize> = differing.iter().copied().take(MAX_REPORTED_DIFFERENCES).collect();
    let positions = shown.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
    let ellipsis = if differing.len() > MAX_REPORTED_DIFFERENCES { "..." } else { "" };

    DefinitiveBytecodeResult {
        exact_match: false,
        status: CheckStatus::Fail,
        message: format!(
            "{} at positions {}{}",
            VerifyError::DefinitiveMismatch { differing: differing.len() },
            positions,
            ellipsis
        ),
        immutables_substituted: substitutions,
        differing_bytes: differing.len(),
        differing_positions: shown,
    }
}

/// Regroups (possibly fragmented) differences under the reference window they fall in.
///
/// The full value of each window is read straight from the stripped remote bytecode.
/// References without any detected difference are omitted.
pub fn group_immutable_differences(
    differences: &[ImmutableDifference],
    references: &[ImmutableReference],
    remote_bytecode: &str,
) -> Vec<GroupedImmutableDifference> {
    let stripped_remote = strip_cbor_metadata(remote_bytecode);

    let mut sorted = references.to_vec();
    sorted.sort_by_key(|reference| reference.start);

    let mut grouped = Vec::new();
    for reference in sorted {
        let mut fragments: Vec<ImmutableDifference> = differences
            .iter()
            .filter(|difference| reference.contains(difference.position))
            .cloned()
            .collect();

        if fragments.is_empty() {
            continue;
        }
        fragments.sort_by_key(|fragment| fragment.position);

        let full_value = stripped_remote
            .get(reference.start * 2..reference.end() * 2)
            .unwrap_or_default()
            .to_string();

        grouped.push(GroupedImmutableDifference {
            index: grouped.len() + 1,
            ref_start: reference.start,
            ref_length: reference.length,
            full_value,
            is_fragmented: fragments.len() > 1,
            fragments,
        });
    }

    grouped
}

/// Renders grouped immutables as display lines
pub fn format_grouped_immutables(grouped: &[GroupedImmutableDifference]) -> Vec<String> {
    let mut lines = Vec::new();

    for group in grouped {
        let display_value = strip_leading_zeros(&group.full_value);
        let type_hint = if group.ref_length == 32 && display_value.len() <= 40 {
            "address".to_string()
        } else if group.ref_length == 32 {
            "bytes32/uint256".to_string()
        } else {
            format!("{} bytes", group.ref_length)
        };

        if group.is_fragmented {
            lines.push(format!(
                "{}) Fragmented immutable at position {} ({}):",
                group.index, group.ref_start, type_hint
            ));
            lines.push(format!("   Full value: 0x{}", display_value));
            for (i, fragment) in group.fragments.iter().enumerate() {
                lines.push(format!(
                    "   {}.{}) Position {}: {}",
                    group.index,
                    i + 1,
                    fragment.position,
                    fragment.remote_value
                ));
            }
        } else if let Some(fragment) = group.fragments.first() {
            lines.push(format!(
                "{}) Position {}: 0x{} ({})",
                group.index, fragment.position, display_value, type_hint
            ));
        }
    }

    lines
}
