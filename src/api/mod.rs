// Integrity Verify API Module
//
// The verification orchestrator. For each configured contract it fetches the
// deployed code, runs the bytecode, ABI and state checks, applies the status
// escalation rules and folds everything into a batch summary.

mod config;
mod escalation;
mod report;
mod state;
mod types;

pub use config::*;
pub use escalation::*;
pub use report::*;
pub use state::*;
pub use types::*;

use std::sync::Arc;

use anyhow::{Context, Result};
use ethers::types::Address;
use log::{debug, error, info, warn};

use crate::artifact::{ArtifactSource, NormalizedArtifact};
use crate::bytecode::{
    compare_bytecode, compare_selectors, definitive_compare_bytecode, detect_unlinked_libraries,
    group_immutable_differences, link_libraries, unconfigured_libraries, validate_immutables_against_args,
    verify_immutable_values, verify_linked_libraries,
};
use crate::error::VerifyError;
use crate::ethereum::{resolve_implementation, ChainAdapter, ChainConfig, EthersAdapter};
use crate::storage::StorageSchema;

type Connector = Box<dyn Fn(&ChainConfig) -> Result<Arc<dyn ChainAdapter>> + Send + Sync>;

/// Main API for Integrity Verify
///
/// Verifies deployed contracts against their compiled artifacts. Artifacts and
/// schemas come from an [`ArtifactSource`] (in-memory content or a loader);
/// chain access goes through a [`ChainAdapter`] obtained per chain.
///
/// # Examples
///
/// ```no_run
/// use integrity_verify::api::{ConfigManager, Verifier, VerifyOptions};
/// use integrity_verify::artifact::LoaderSource;
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = ConfigManager::load_from_file("verify.json")?;
/// let verifier = Verifier::new(LoaderSource::filesystem("."));
///
/// let summary = verifier.verify_all(&config, &VerifyOptions::default()).await;
/// println!("{} of {} contracts failed", summary.failed, summary.total);
/// # Ok(())
/// # }
/// ```
pub struct Verifier<S: ArtifactSource> {
    source: S,
    connector: Connector,
}

impl<S: ArtifactSource> Verifier<S> {
    /// Verifier that connects to each chain's RPC URL with ethers
    pub fn new(source: S) -> Self {
        Self::with_connector(source, |chain| {
            let adapter = EthersAdapter::for_chain(chain)?;
            Ok(Arc::new(adapter) as Arc<dyn ChainAdapter>)
        })
    }

    /// Verifier that uses `adapter` for every chain
    pub fn with_adapter(source: S, adapter: Arc<dyn ChainAdapter>) -> Self {
        Self::with_connector(source, move |_| Ok(adapter.clone()))
    }

    /// Verifier that obtains adapters from `connector`
    pub fn with_connector<F>(source: S, connector: F) -> Self
    where
        F: Fn(&ChainConfig) -> Result<Arc<dyn ChainAdapter>> + Send + Sync + 'static,
    {
        Self {
            source,
            connector: Box::new(connector),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Verify every contract selected by `options`, one after another
    pub async fn verify_all(&self, config: &VerifierConfig, options: &VerifyOptions) -> VerificationSummary {
        let selected: Vec<&ContractConfig> = config
            .contracts
            .iter()
            .filter(|contract| options.selects(contract))
            .collect();

        let mut summary = VerificationSummary::new(selected.len());
        if selected.is_empty() {
            warn!("No contracts match the given filters");
            return summary;
        }

        for contract in selected {
            let Some(chain) = config.chain(&contract.chain) else {
                warn!("Unknown chain '{}' for {}, skipping", contract.chain, contract.name);
                summary.skipped += 1;
                continue;
            };

            info!("Verifying {} on {} ({:?})", contract.name, contract.chain, contract.address);
            let result = self.verify_contract(contract, chain, options).await;
            info!("  => {:?}", result.outcome());
            summary.record(result);
        }

        info!(
            "Verified {} contract(s): {} passed, {} failed, {} with warnings, {} skipped",
            summary.total, summary.passed, summary.failed, summary.warnings, summary.skipped
        );
        summary
    }

    /// Verify a single contract.
    ///
    /// Never fails: a fatal problem (missing artifact, unreachable chain, no
    /// code at the address) is recorded in `error` next to whatever checks
    /// completed before it.
    pub async fn verify_contract(
        &self,
        contract: &ContractConfig,
        chain: &ChainConfig,
        options: &VerifyOptions,
    ) -> ContractVerificationResult {
        let mut result = ContractVerificationResult::new(contract.clone(), chain.clone());
        if let Err(e) = self.run_checks(&mut result, options).await {
            error!("  ✗ {}: {:#}", contract.name, e);
            result.error = Some(format!("{:#}", e));
        }
        result
    }

    async fn run_checks(&self, result: &mut ContractVerificationResult, options: &VerifyOptions) -> Result<()> {
        let contract = result.contract.clone();

        let artifact = self.source.artifact(&contract.artifact_file)?;
        debug!(
            "Loaded {:?} artifact {} with {} immutable reference(s)",
            artifact.format,
            contract.artifact_file,
            artifact.references().len()
        );

        let adapter = (self.connector)(&result.chain)
            .with_context(|| format!("Failed to connect to chain {}", contract.chain))?;

        let mut remote_bytecode = fetch_bytecode(&*adapter, contract.address).await?;
        if contract.is_proxy {
            match resolve_implementation(&*adapter, contract.address).await {
                Ok(Some(implementation)) => {
                    info!("  Proxy implementation: {:?}", implementation);
                    remote_bytecode = fetch_bytecode(&*adapter, implementation).await?;
                    result.implementation_address = Some(implementation);
                }
                Ok(None) => warn!(
                    "{} is marked as proxy but no EIP-1967 implementation was found",
                    contract.name
                ),
                Err(e) => warn!("Could not read EIP-1967 slot of {}: {:#}", contract.name, e),
            }
        }

        if !options.skip_bytecode {
            check_bytecode(result, &artifact, &remote_bytecode, options);
        }

        if !options.skip_abi {
            let abi_result = compare_selectors(&artifact.selectors(), &remote_bytecode);
            info!("  {} ABI: {}", abi_result.status.icon(), abi_result.message);
            result.abi_result = Some(abi_result);
        }

        if !options.skip_state {
            if let Some(state) = &contract.state_verification {
                let context = StateContext {
                    adapter: adapter.clone(),
                    address: contract.address,
                    abi: Arc::new(artifact.abi.clone()),
                    schema: self.load_schema(state),
                };
                let state_result = verify_state(context, state).await;
                info!("  {} State: {}", state_result.status.icon(), state_result.message);
                result.state_result = Some(state_result);
            }
        }

        Ok(())
    }

    /// Schema for the storage-path checks, or the reason there is none
    fn load_schema(&self, state: &StateVerificationConfig) -> Result<Arc<StorageSchema>, String> {
        if state.storage_paths.is_empty() {
            return Err("no storage paths configured".to_string());
        }
        match &state.schema_file {
            Some(id) => self
                .source
                .schema(id)
                .map(Arc::new)
                .map_err(|e| format!("{:#}", e)),
            None => Err("storage paths require a schemaFile".to_string()),
        }
    }
}

/// Deployed code at `address` as 0x-prefixed hex
async fn fetch_bytecode(adapter: &dyn ChainAdapter, address: Address) -> Result<String> {
    let code = adapter
        .get_code(address)
        .await
        .with_context(|| format!("Failed to fetch bytecode at {:?}", address))?;

    if code.iter().all(|byte| *byte == 0) {
        return Err(VerifyError::NoBytecodeAtAddress(address).into());
    }
    Ok(format!("0x{}", hex::encode(&code)))
}

/// Local runtime bytecode with configured library addresses written in.
///
/// Records one result per linked library: each configured address is checked
/// against the remote bytecode, and unresolved placeholders without any
/// configured address fail every library.
fn link_local_bytecode(
    result: &mut ContractVerificationResult,
    artifact: &NormalizedArtifact,
    remote_bytecode: &str,
) -> String {
    let Some(link_references) = artifact.link_references() else {
        return artifact.deployed_bytecode.clone();
    };

    match result.contract.linked_libraries.as_ref().filter(|libraries| !libraries.is_empty()) {
        Some(addresses) => {
            let linked = link_libraries(&artifact.deployed_bytecode, link_references, addresses);
            let checks = verify_linked_libraries(remote_bytecode, link_references, addresses);
            for check in &checks {
                info!("  {} Library: {}", check.status.icon(), check.message);
            }
            result.linked_libraries_result = Some(checks);
            linked
        }
        None => {
            let unlinked = detect_unlinked_libraries(&artifact.deployed_bytecode);
            if !unlinked.is_empty() {
                warn!(
                    "  {} unlinked library placeholder(s) detected - provide linkedLibraries in config",
                    unlinked.len()
                );
                result.linked_libraries_result = Some(unconfigured_libraries(link_references));
            }
            artifact.deployed_bytecode.clone()
        }
    }
}

/// Runs the bytecode comparison and the escalation rules that follow it
fn check_bytecode(
    result: &mut ContractVerificationResult,
    artifact: &NormalizedArtifact,
    remote_bytecode: &str,
    options: &VerifyOptions,
) {
    let local_bytecode = link_local_bytecode(result, artifact, remote_bytecode);
    let references = artifact.references();
    let known = (!references.is_empty()).then_some(references);
    let comparison = compare_bytecode(&local_bytecode, remote_bytecode, known);
    let immutables = comparison.immutables().to_vec();
    let mut rules = Vec::new();

    if comparison.only_immutables_differ == Some(true) && !immutables.is_empty() {
        if let Some(args) = result.contract.constructor_args.as_ref().filter(|args| !args.is_empty()) {
            let validation = validate_immutables_against_args(&immutables, args, options.verbose);
            if options.verbose || !validation.valid {
                for line in validation.details.iter().flatten() {
                    info!("    {}", line);
                }
            }
            rules.push(if validation.valid {
                Escalation::ConstructorArgsValidated
            } else {
                Escalation::ConstructorArgsMismatch {
                    message: validation.message.clone(),
                }
            });
            result.args_validation = Some(validation);
        }
    }

    let mut named_values_failed = false;
    if let Some(values) = result.contract.immutable_values.as_ref().filter(|values| !values.is_empty()) {
        if immutables.is_empty() {
            debug!("No immutable differences to match declared immutable values against");
        } else {
            let named = verify_immutable_values(values, &immutables);
            named_values_failed = !named.status.is_pass();
            rules.push(if named_values_failed {
                Escalation::NamedImmutablesFailed {
                    message: named.message.clone(),
                }
            } else {
                Escalation::NamedImmutablesVerified {
                    verified: named.results.len(),
                    threshold: options.pass_threshold,
                }
            });
            info!("  {} Immutable values: {}", named.status.icon(), named.message);
            result.immutable_values_result = Some(named);
        }
    }

    if !references.is_empty() && !immutables.is_empty() {
        let definitive = definitive_compare_bytecode(&local_bytecode, remote_bytecode, references);
        rules.push(if definitive.exact_match {
            Escalation::DefinitiveMatch {
                message: definitive.message.clone(),
                named_values_failed,
            }
        } else {
            Escalation::DefinitiveMismatch {
                message: definitive.message.clone(),
            }
        });
        result.definitive_result = Some(definitive);
        result.grouped_immutables = Some(group_immutable_differences(&immutables, references, remote_bytecode));
    }

    let failed_libraries: Vec<String> = result
        .linked_libraries_result
        .iter()
        .flatten()
        .filter(|library| library.status.is_fail())
        .map(|library| library.short_name().to_string())
        .collect();
    if !failed_libraries.is_empty() {
        rules.push(Escalation::LinkedLibraryMismatch {
            libraries: failed_libraries,
        });
    }

    let bytecode_result = escalate(comparison, &rules);
    info!("  {} Bytecode: {}", bytecode_result.status.icon(), bytecode_result.message);
    result.bytecode_result = Some(bytecode_result);
}
