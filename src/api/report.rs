// Report Generation for Integrity Verify
//
// Renders a batch summary as JSON or as a human readable text report.

use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::types::{ContractVerificationResult, VerificationSummary};
use crate::bytecode::format_grouped_immutables;

/// Output formats supported by `ReportFormatter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Text,
}

/// Report formatter for Integrity Verify
pub struct ReportFormatter;

impl ReportFormatter {
    /// Format a summary as JSON
    pub fn to_json(summary: &VerificationSummary) -> Result<String> {
        let json = serde_json::to_string_pretty(summary)?;
        Ok(json)
    }

    /// Format a summary as plain text
    pub fn to_text(summary: &VerificationSummary) -> String {
        let mut output = String::new();

        output.push_str("Contract Integrity Verification Report\n");
        output.push_str("======================================\n\n");
        output.push_str(&format!("Timestamp: {}\n\n", summary.timestamp));

        for result in &summary.results {
            Self::format_contract(&mut output, result);
        }

        output.push_str("Summary\n");
        output.push_str("-------\n");
        output.push_str(&format!("Total:    {}\n", summary.total));
        output.push_str(&format!("Passed:   {}\n", summary.passed));
        output.push_str(&format!("Failed:   {}\n", summary.failed));
        output.push_str(&format!("Warnings: {}\n", summary.warnings));
        output.push_str(&format!("Skipped:  {}\n", summary.skipped));

        let failed: Vec<_> = summary.failed_results().collect();
        if !failed.is_empty() {
            output.push_str("\nFailed contracts:\n");
            for result in failed {
                output.push_str(&format!("  - {} ({})\n", result.contract.name, result.contract.chain));
                for (label, message) in result.failures() {
                    output.push_str(&format!("      {}: {}\n", label, message));
                }
            }
        }

        output
    }

    /// Per-contract section
    fn format_contract(output: &mut String, result: &ContractVerificationResult) {
        output.push_str(&format!(
            "{} on {} ({:?})\n",
            result.contract.name, result.contract.chain, result.contract.address
        ));
        if let Some(url) = result.chain.address_url(&format!("{:?}", result.contract.address)) {
            output.push_str(&format!("  Explorer: {}\n", url));
        }
        if let Some(implementation) = result.implementation_address {
            output.push_str(&format!("  Implementation: {:?}\n", implementation));
        }

        if let Some(error) = &result.error {
            output.push_str(&format!("  ✗ Error: {}\n\n", error));
            return;
        }

        if let Some(bytecode) = &result.bytecode_result {
            output.push_str(&format!(
                "  {} Bytecode: {} [confidence: {:?}]\n",
                bytecode.status.icon(),
                bytecode.message,
                bytecode.confidence
            ));
        }
        if let Some(named) = &result.immutable_values_result {
            output.push_str(&format!("  {} Immutable values: {}\n", named.status.icon(), named.message));
            for value in named.results.iter().filter(|v| !v.status.is_pass()) {
                output.push_str(&format!("      {}: {}\n", value.name, value.message));
            }
        }
        if let Some(definitive) = &result.definitive_result {
            output.push_str(&format!("  {} Definitive: {}\n", definitive.status.icon(), definitive.message));
        }
        for library in result.linked_libraries_result.iter().flatten() {
            output.push_str(&format!("  {} Library: {}\n", library.status.icon(), library.message));
        }
        if let Some(grouped) = result.grouped_immutables.as_deref().filter(|g| !g.is_empty()) {
            output.push_str("  Immutables:\n");
            for line in format_grouped_immutables(grouped) {
                output.push_str(&format!("    {}\n", line));
            }
        }
        if let Some(abi) = &result.abi_result {
            output.push_str(&format!("  {} ABI: {}\n", abi.status.icon(), abi.message));
        }
        if let Some(state) = &result.state_result {
            output.push_str(&format!("  {} State: {}\n", state.status.icon(), state.message));
            for call in &state.view_call_results {
                output.push_str(&format!("      {} {}\n", call.status.icon(), call.message));
            }
            for namespace in &state.namespace_results {
                output.push_str(&format!("      {} {}\n", namespace.status.icon(), namespace.message));
                for variable in &namespace.variables {
                    output.push_str(&format!("          {} {}\n", variable.status.icon(), variable.message));
                }
            }
            for slot in &state.slot_results {
                output.push_str(&format!("      {} {}\n", slot.status.icon(), slot.message));
            }
            for path in &state.storage_path_results {
                output.push_str(&format!("      {} {}\n", path.status.icon(), path.message));
            }
        }
        output.push('\n');
    }

    /// Save a summary to a file
    pub fn save_to_file<P: AsRef<Path>>(summary: &VerificationSummary, path: P, format: ReportFormat) -> Result<()> {
        let content = match format {
            ReportFormat::Json => Self::to_json(summary)?,
            ReportFormat::Text => Self::to_text(summary),
        };

        fs::write(path, content)?;
        Ok(())
    }
}
