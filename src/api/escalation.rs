// Bytecode status escalation
//
// After the initial comparison, later evidence may move the bytecode verdict.
// Each piece of evidence is an `Escalation`; rules are applied in precedence
// order: constructor arguments, then named immutables, then the definitive
// substitution check. A wrong linked library address overrides them all, since
// its bytes would otherwise pass as an immutable difference.

use common::CheckStatus;
use log::debug;

use crate::bytecode::{BytecodeComparisonResult, MatchConfidence};

/// Evidence that may change a bytecode verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    /// Every immutable difference matched a constructor argument
    ConstructorArgsValidated,

    /// Some immutable difference matched no constructor argument; downgrades a pass to warn
    ConstructorArgsMismatch { message: String },

    /// Every declared immutable value was found. Upgrades a failed
    /// comparison whose match percentage reached `threshold`.
    NamedImmutablesVerified { verified: usize, threshold: u8 },

    /// A declared immutable value was not found; forces warn
    NamedImmutablesFailed { message: String },

    /// Substituting the reference windows reproduced the remote bytecode
    DefinitiveMatch { message: String, named_values_failed: bool },

    /// Bytes outside the reference windows differ; forces fail
    DefinitiveMismatch { message: String },

    /// Some linked library is missing from config or deployed at another address; forces fail
    LinkedLibraryMismatch { libraries: Vec<String> },
}

impl Escalation {
    /// Lower values apply first
    pub fn precedence(&self) -> u8 {
        match self {
            Self::ConstructorArgsValidated | Self::ConstructorArgsMismatch { .. } => 0,
            Self::NamedImmutablesVerified { .. } | Self::NamedImmutablesFailed { .. } => 1,
            Self::DefinitiveMatch { .. } | Self::DefinitiveMismatch { .. } => 2,
            Self::LinkedLibraryMismatch { .. } => 3,
        }
    }

    /// Returns the verdict after this rule
    pub fn apply(&self, mut result: BytecodeComparisonResult) -> BytecodeComparisonResult {
        match self {
            Self::ConstructorArgsValidated => {
                result.message.push_str(" - constructor args validated");
            }
            Self::ConstructorArgsMismatch { message } => {
                if result.status == CheckStatus::Pass {
                    result.status = CheckStatus::Warn;
                }
                result.message = format!("{} - {}", result.message, message);
            }
            Self::NamedImmutablesVerified { verified, threshold } => {
                match result.status {
                    CheckStatus::Fail if result.match_percentage >= *threshold => {
                        result.status = CheckStatus::Pass;
                        result.only_immutables_differ = Some(true);
                        result.confidence = MatchConfidence::NamedValues;
                        result.message = format!(
                            "Bytecode matches ({} named immutable value(s) verified)",
                            verified
                        );
                    }
                    CheckStatus::Pass if result.confidence == MatchConfidence::Heuristic => {
                        result.confidence = MatchConfidence::NamedValues;
                    }
                    _ => {}
                }
                if result.only_immutables_differ == Some(true) {
                    result.match_percentage = 100;
                }
                result.message.push_str(" - immutable values verified");
            }
            Self::NamedImmutablesFailed { message } => {
                result.status = CheckStatus::Warn;
                result.message = format!("{} - {}", result.message, message);
            }
            Self::DefinitiveMatch {
                message,
                named_values_failed,
            } => {
                result.status = if *named_values_failed {
                    CheckStatus::Warn
                } else {
                    CheckStatus::Pass
                };
                result.match_percentage = 100;
                result.only_immutables_differ = Some(true);
                result.confidence = MatchConfidence::Definitive;
                result.message = if *named_values_failed {
                    format!("{} (declared immutable values do not match)", message)
                } else {
                    message.clone()
                };
            }
            Self::DefinitiveMismatch { message } => {
                result.status = CheckStatus::Fail;
                result.only_immutables_differ = Some(false);
                result.confidence = MatchConfidence::None;
                result.message = message.clone();
            }
            Self::LinkedLibraryMismatch { libraries } => {
                result.status = CheckStatus::Fail;
                result.confidence = MatchConfidence::None;
                result.message = format!(
                    "Linked library address mismatch ({}): {} - {}",
                    libraries.len(),
                    libraries.join(", "),
                    result.message
                );
            }
        }
        result
    }
}

/// Applies `rules` in precedence order (stable for equal precedence)
pub fn escalate(result: BytecodeComparisonResult, rules: &[Escalation]) -> BytecodeComparisonResult {
    let mut ordered: Vec<&Escalation> = rules.iter().collect();
    ordered.sort_by_key(|rule| rule.precedence());

    ordered.into_iter().fold(result, |current, rule| {
        let before = current.status;
        let next = rule.apply(current);
        if next.status != before {
            debug!("Bytecode status {} -> {} after {:?}", before, next.status, rule);
        }
        next
    })
}
