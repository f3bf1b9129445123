// Integrity Verify
//
// Checks that contracts deployed on EVM chains match their compiled
// artifacts: bytecode (with immutable-aware comparison), ABI selectors and
// on-chain state.

pub mod api;
pub mod artifact;
pub mod bytecode;
pub mod compare;
pub mod error;
pub mod ethereum;
pub mod storage;

pub use api::{
    ConfigManager, ContractConfig, ContractVerificationResult, VerificationSummary, Verifier, VerifierConfig,
    VerifyOptions,
};
pub use artifact::{ArtifactSource, InlineSource, LoaderSource, NormalizedArtifact};
pub use error::{VerifyError, VerifyResult};
pub use ethereum::{ChainAdapter, ChainConfig, ChainOps, CryptoOps, EthersAdapter, EthersCrypto};
