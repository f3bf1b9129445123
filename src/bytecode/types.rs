use common::{CheckStatus, ImmutableReference};
use serde::{Deserialize, Serialize};

/// Maximal run of differing bytes between two bytecodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferenceRegion {
    /// First differing byte
    pub start: usize,
    /// One past the last differing byte
    pub end: usize,
    /// Local bytes in the region (hex)
    pub local_value: String,
    /// Remote bytes in the region (hex)
    pub remote_value: String,
}

impl DifferenceRegion {
    /// Region length in bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the region lies entirely inside one of the given references
    pub fn is_within(&self, references: &[ImmutableReference]) -> bool {
        references
            .iter()
            .any(|reference| reference.contains_range(self.start, self.end))
    }
}

/// First byte of an unexplained difference, kept for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodeDifference {
    /// Byte position
    pub position: usize,
    /// Local byte (hex)
    pub local_byte: String,
    /// Remote byte (hex)
    pub remote_byte: String,
}

impl From<&DifferenceRegion> for BytecodeDifference {
    fn from(region: &DifferenceRegion) -> Self {
        Self {
            position: region.start,
            local_byte: region.local_value.chars().take(2).collect(),
            remote_byte: region.remote_value.chars().take(2).collect(),
        }
    }
}

/// Byte range where local and remote bytecode diverge, with a guessed Solidity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmutableDifference {
    /// Byte position
    pub position: usize,
    /// Length in bytes
    pub length: usize,
    /// Local bytes (hex)
    pub local_value: String,
    /// Remote bytes (hex)
    pub remote_value: String,
    /// Best-guess Solidity type
    pub possible_type: Option<String>,
}

impl ImmutableDifference {
    pub(crate) fn from_region(region: &DifferenceRegion, possible_type: Option<String>) -> Self {
        Self {
            position: region.start,
            length: region.len(),
            local_value: region.local_value.clone(),
            remote_value: region.remote_value.clone(),
            possible_type,
        }
    }
}

/// How much trust a bytecode verdict deserves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    /// No positive verdict was reached
    None,
    /// Bytecode is identical after metadata stripping
    Exact,
    /// Every difference sits inside an immutable window recorded by the compiler
    ArtifactReferences,
    /// Differences look like immutables but nothing proves it
    Heuristic,
    /// Differences were claimed by user-declared immutable values
    NamedValues,
    /// Substituting the remote immutables reproduced the remote bytecode
    Definitive,
}

impl Default for MatchConfidence {
    fn default() -> Self {
        Self::None
    }
}

/// Result of comparing local artifact bytecode with deployed bytecode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytecodeComparisonResult {
    /// Check status
    pub status: CheckStatus,
    /// Human readable summary
    pub message: String,
    /// Local bytecode length in bytes, metadata stripped
    pub local_bytecode_length: usize,
    /// Remote bytecode length in bytes, metadata stripped
    pub remote_bytecode_length: usize,
    /// Share of matching bytes, forced to 100 on pass
    pub match_percentage: u8,
    /// Sampled unexplained differences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub differences: Option<Vec<BytecodeDifference>>,
    /// Differences classified as (possible) immutables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub immutable_differences: Option<Vec<ImmutableDifference>>,
    /// Whether only immutable values differ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_immutables_differ: Option<bool>,
    /// Strength of the verdict
    pub confidence: MatchConfidence,
}

impl BytecodeComparisonResult {
    /// Detected immutable differences, empty when none were recorded
    pub fn immutables(&self) -> &[ImmutableDifference] {
        self.immutable_differences.as_deref().unwrap_or(&[])
    }
}

/// Ground-truth outcome of substituting remote immutables into local bytecode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitiveBytecodeResult {
    /// Substituted local bytecode equals remote bytecode
    pub exact_match: bool,
    /// Check status
    pub status: CheckStatus,
    /// Human readable summary
    pub message: String,
    /// Number of references substituted
    pub immutables_substituted: usize,
    /// Number of bytes still differing after substitution
    pub differing_bytes: usize,
    /// Up to ten byte positions still differing after substitution
    pub differing_positions: Vec<usize>,
}

/// Detected differences regrouped under the immutable reference they belong to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedImmutableDifference {
    /// 1-based display index
    pub index: usize,
    /// Reference start offset
    pub ref_start: usize,
    /// Reference length
    pub ref_length: usize,
    /// Full value read from remote bytecode at the reference window (hex)
    pub full_value: String,
    /// Whether the value was split into several diff regions
    pub is_fragmented: bool,
    /// Raw diff regions inside the window, ordered by position
    pub fragments: Vec<ImmutableDifference>,
}

/// Outcome of matching immutable differences against constructor arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgsValidation {
    /// Every difference matched an argument
    pub valid: bool,
    /// Human readable summary
    pub message: String,
    /// Per-difference lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// How a named immutable was located in the bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImmutableMatchKind {
    Exact,
    Stripped,
    Address,
    Fragment,
}

impl std::fmt::Display for ImmutableMatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Exact => "exact",
            Self::Stripped => "stripped",
            Self::Address => "address",
            Self::Fragment => "fragment",
        };
        f.write_str(label)
    }
}

/// Verification of one named immutable value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmutableValueResult {
    /// Immutable name
    pub name: String,
    /// Expected value as a 32-byte word (0x-prefixed)
    pub expected: String,
    /// Matched remote value (0x-prefixed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Byte position of the matched difference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// How the match was made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_kind: Option<ImmutableMatchKind>,
    /// Check status
    pub status: CheckStatus,
    /// Human readable summary
    pub message: String,
}

/// Verification of all named immutable values of a contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmutableValuesResult {
    /// Check status
    pub status: CheckStatus,
    /// Human readable summary
    pub message: String,
    /// One entry per named value
    pub results: Vec<ImmutableValueResult>,
    /// Positions of differences no named value claimed
    pub unclaimed_positions: Vec<usize>,
}

/// Outcome of comparing ABI selectors with selectors found in bytecode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiComparisonResult {
    /// Check status
    pub status: CheckStatus,
    /// Human readable summary
    pub message: String,
    /// Number of function selectors declared by the ABI
    pub abi_selector_count: usize,
    /// Number of PUSH4 candidates found in the bytecode
    pub bytecode_selector_count: usize,
    /// Signatures declared in the ABI but absent from the bytecode
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub missing: Vec<String>,
}
