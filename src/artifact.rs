// Contract artifacts
//
// Normalizes Hardhat and Foundry build artifacts into one shape and supplies
// artifacts and storage schemas to the verifier, either from memory or through
// a loader keyed by path.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use common::ImmutableReference;
use ethers::abi::Abi;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bytecode::{abi_selectors, LinkReferences};
use crate::error::VerifyError;
use crate::storage::schema::resolve_path;
use crate::storage::StorageSchema;

/// Toolchain that produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Hardhat,
    Foundry,
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardhat => f.write_str("hardhat"),
            Self::Foundry => f.write_str("foundry"),
        }
    }
}

/// Toolchain-independent view of a build artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedArtifact {
    pub format: ArtifactFormat,
    pub abi: Abi,
    /// Runtime bytecode (hex)
    pub deployed_bytecode: String,
    /// Compiler-recorded immutable windows, sorted by start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable_references: Option<Vec<ImmutableReference>>,
    /// Signature to selector map recorded by Foundry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_identifiers: Option<BTreeMap<String, String>>,
    /// External library placeholders in the runtime bytecode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_link_references: Option<LinkReferences>,
}

#[derive(Deserialize)]
struct RawReference {
    start: usize,
    length: usize,
}

impl NormalizedArtifact {
    /// Normalizes raw artifact JSON
    pub fn from_value(value: &Value) -> Result<Self, VerifyError> {
        let abi_value = value
            .get("abi")
            .ok_or_else(|| VerifyError::Artifact("missing 'abi'".to_string()))?;
        let abi: Abi = serde_json::from_value(abi_value.clone())
            .map_err(|e| VerifyError::Artifact(format!("invalid ABI: {}", e)))?;

        match value.get("deployedBytecode") {
            Some(Value::String(bytecode)) => Ok(Self {
                format: ArtifactFormat::Hardhat,
                abi,
                deployed_bytecode: bytecode.clone(),
                immutable_references: None,
                method_identifiers: None,
                deployed_link_references: parse_link_references(value.get("deployedLinkReferences"))?,
            }),
            Some(Value::Object(deployed)) => {
                let bytecode = deployed
                    .get("object")
                    .and_then(Value::as_str)
                    .ok_or_else(|| VerifyError::Artifact("missing 'deployedBytecode.object'".to_string()))?;

                let immutable_references = match deployed.get("immutableReferences") {
                    Some(references) => Some(flatten_references(references)?),
                    None => None,
                };

                let method_identifiers = value
                    .get("methodIdentifiers")
                    .map(|ids| serde_json::from_value::<BTreeMap<String, String>>(ids.clone()))
                    .transpose()
                    .map_err(|e| VerifyError::Artifact(format!("invalid methodIdentifiers: {}", e)))?;

                Ok(Self {
                    format: ArtifactFormat::Foundry,
                    abi,
                    deployed_bytecode: bytecode.to_string(),
                    immutable_references,
                    method_identifiers,
                    deployed_link_references: parse_link_references(deployed.get("linkReferences"))?,
                })
            }
            _ => Err(VerifyError::Artifact("missing 'deployedBytecode'".to_string())),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).context("Failed to parse artifact")?;
        Ok(Self::from_value(&value)?)
    }

    /// Reads and normalizes an artifact file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact file {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Failed to parse artifact {}", path.display()))
    }

    /// Ground-truth immutable windows, empty when the toolchain recorded none
    pub fn references(&self) -> &[ImmutableReference] {
        self.immutable_references.as_deref().unwrap_or(&[])
    }

    /// Library link references, `None` when the contract links no libraries
    pub fn link_references(&self) -> Option<&LinkReferences> {
        self.deployed_link_references.as_ref()
    }

    /// `(selector, signature)` pairs, taken from `methodIdentifiers` when present
    pub fn selectors(&self) -> Vec<(String, String)> {
        match &self.method_identifiers {
            Some(ids) if !ids.is_empty() => {
                let mut selectors: Vec<(String, String)> = ids
                    .iter()
                    .map(|(signature, selector)| (selector.to_ascii_lowercase(), signature.clone()))
                    .collect();
                selectors.sort();
                selectors
            }
            _ => abi_selectors(&self.abi),
        }
    }
}

/// Reads `{source: {library: [{start, length}]}}`; an empty map counts as absent
fn parse_link_references(value: Option<&Value>) -> Result<Option<LinkReferences>, VerifyError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let references: LinkReferences = serde_json::from_value(value.clone())
        .map_err(|e| VerifyError::Artifact(format!("invalid link references: {}", e)))?;
    let has_positions = references
        .values()
        .flat_map(|libraries| libraries.values())
        .any(|positions| !positions.is_empty());
    Ok(has_positions.then_some(references))
}

/// Flattens Foundry's `{astId: [{start, length}]}` into a sorted list
fn flatten_references(value: &Value) -> Result<Vec<ImmutableReference>, VerifyError> {
    let by_ast_id: BTreeMap<String, Vec<RawReference>> = serde_json::from_value(value.clone())
        .map_err(|e| VerifyError::Artifact(format!("invalid immutableReferences: {}", e)))?;

    let mut references: Vec<ImmutableReference> = by_ast_id
        .into_values()
        .flatten()
        .map(|raw| ImmutableReference::new(raw.start, raw.length))
        .collect();
    references.sort();
    references.dedup();
    Ok(references)
}

/// Supplies artifacts and schemas by identifier
pub trait ArtifactSource: Send + Sync {
    fn artifact(&self, id: &str) -> Result<NormalizedArtifact>;

    fn schema(&self, id: &str) -> Result<StorageSchema>;
}

/// Content held in memory
#[derive(Debug, Clone, Default)]
pub struct InlineSource {
    artifacts: HashMap<String, NormalizedArtifact>,
    schemas: HashMap<String, StorageSchema>,
}

impl InlineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, id: impl Into<String>, artifact: NormalizedArtifact) -> Self {
        self.artifacts.insert(id.into(), artifact);
        self
    }

    pub fn with_schema(mut self, id: impl Into<String>, schema: StorageSchema) -> Self {
        self.schemas.insert(id.into(), schema);
        self
    }
}

impl ArtifactSource for InlineSource {
    fn artifact(&self, id: &str) -> Result<NormalizedArtifact> {
        self.artifacts
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("No artifact supplied for {}", id))
    }

    fn schema(&self, id: &str) -> Result<StorageSchema> {
        self.schemas
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("No schema supplied for {}", id))
    }
}

type Loader = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Content resolved through a loader callback returning raw JSON text
pub struct LoaderSource {
    loader: Loader,
}

impl LoaderSource {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
        }
    }

    /// Reads files relative to `base_dir` (typically the config file's directory)
    pub fn filesystem(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self::new(move |id| {
            let path = resolve_path(Path::new(id), &base_dir);
            fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
        })
    }
}

impl fmt::Debug for LoaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderSource").finish_non_exhaustive()
    }
}

impl ArtifactSource for LoaderSource {
    fn artifact(&self, id: &str) -> Result<NormalizedArtifact> {
        let content = (self.loader)(id).with_context(|| format!("Failed to read artifact file {}", id))?;
        NormalizedArtifact::from_json(&content).with_context(|| format!("Failed to parse artifact {}", id))
    }

    fn schema(&self, id: &str) -> Result<StorageSchema> {
        let content = (self.loader)(id).with_context(|| format!("Failed to read schema file at {}", id))?;
        Ok(StorageSchema::from_json(&content, id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn abi() -> Value {
        json!([{"type":"function","name":"totalSupply","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}])
    }

    #[test]
    fn test_hardhat_artifact() {
        let artifact = NormalizedArtifact::from_value(&json!({
            "abi": abi(),
            "bytecode": "0x6080",
            "deployedBytecode": "0x6080604052"
        }))
        .unwrap();

        assert_eq!(artifact.format, ArtifactFormat::Hardhat);
        assert_eq!(artifact.deployed_bytecode, "0x6080604052");
        assert!(artifact.references().is_empty());
        assert_eq!(
            artifact.selectors(),
            vec![("18160ddd".to_string(), "totalSupply()".to_string())]
        );
    }

    #[test]
    fn test_foundry_artifact_flattens_references() {
        let artifact = NormalizedArtifact::from_value(&json!({
            "abi": abi(),
            "deployedBytecode": {
                "object": "0x6080604052",
                "immutableReferences": {
                    "7": [{"start": 300, "length": 32}, {"start": 120, "length": 32}],
                    "3": [{"start": 44, "length": 32}]
                }
            },
            "methodIdentifiers": {"totalSupply()": "18160DDD"}
        }))
        .unwrap();

        assert_eq!(artifact.format, ArtifactFormat::Foundry);
        let starts: Vec<usize> = artifact.references().iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![44, 120, 300]);
        assert_eq!(artifact.selectors()[0].0, "18160ddd");
    }

    #[test]
    fn test_link_references_from_either_layout() {
        let references = json!({"src/MathLib.sol": {"MathLib": [{"start": 4, "length": 20}]}});

        let hardhat = NormalizedArtifact::from_value(&json!({
            "abi": abi(),
            "deployedBytecode": "0x6080",
            "deployedLinkReferences": references
        }))
        .unwrap();
        let foundry = NormalizedArtifact::from_value(&json!({
            "abi": abi(),
            "deployedBytecode": {"object": "0x6080", "linkReferences": references}
        }))
        .unwrap();

        for artifact in [&hardhat, &foundry] {
            let links = artifact.link_references().unwrap();
            assert_eq!(links["src/MathLib.sol"]["MathLib"][0].start, 4);
        }

        let empty = NormalizedArtifact::from_value(&json!({
            "abi": abi(),
            "deployedBytecode": {"object": "0x6080", "linkReferences": {}}
        }))
        .unwrap();
        assert!(empty.link_references().is_none());
    }

    #[test]
    fn test_artifact_errors() {
        let err = NormalizedArtifact::from_value(&json!({"abi": []})).unwrap_err();
        assert_eq!(err.to_string(), "Artifact error: missing 'deployedBytecode'");

        let dir = tempfile::tempdir().unwrap();
        let err = NormalizedArtifact::load_from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read artifact file"));
    }

    #[test]
    fn test_loader_and_inline_sources_agree() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let content = json!({"abi": abi(), "deployedBytecode": "0x6080"}).to_string();
        fs::write(dir.path().join("Token.json"), &content)?;

        let loaded = LoaderSource::filesystem(dir.path()).artifact("Token.json")?;
        let inline = InlineSource::new()
            .with_artifact("Token.json", NormalizedArtifact::from_json(&content)?)
            .artifact("Token.json")?;
        assert_eq!(loaded.deployed_bytecode, inline.deployed_bytecode);

        let err = LoaderSource::new(|_| Ok("not json".to_string())).artifact("x").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse artifact x"));
        Ok(())
    }
}
