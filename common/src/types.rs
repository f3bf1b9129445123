use serde::{Deserialize, Serialize};

/// Authoritative location of a compiler-injected immutable in deployed bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImmutableReference {
    /// Byte offset into the deployed bytecode
    pub start: usize,
    /// Length of the immutable value in bytes
    pub length: usize,
}

impl ImmutableReference {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// Exclusive end offset in bytes
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Whether the half-open byte range `[start, end)` lies entirely inside this reference
    pub fn contains_range(&self, start: usize, end: usize) -> bool {
        start >= self.start && end <= self.end()
    }

    /// Whether a single byte position falls inside this reference
    pub fn contains(&self, position: usize) -> bool {
        position >= self.start && position < self.end()
    }
}

/// Outcome of a single verification check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Check succeeded
    Pass,
    /// Check succeeded with a caveat worth a human look
    Warn,
    /// Check failed
    Fail,
    /// Check was not run
    Skip,
}

impl CheckStatus {
    /// Status for a boolean outcome
    pub fn from_pass(pass: bool) -> Self {
        if pass {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail)
    }

    /// Single-character marker used in text reports
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Pass => "✓",
            Self::Warn => "!",
            Self::Fail => "✗",
            Self::Skip => "-",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Skip => "skip",
        };
        f.write_str(label)
    }
}
