// Chain descriptors
//
// Where a contract lives: chain id, RPC endpoint and an optional explorer.

use serde::{Deserialize, Serialize};

/// Chain configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// Chain ID
    pub chain_id: u64,

    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Block explorer base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

impl ChainConfig {
    /// Create a new chain configuration
    pub fn new(chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id,
            rpc_url: rpc_url.into(),
            explorer_url: None,
        }
    }

    pub fn with_explorer(mut self, explorer_url: impl Into<String>) -> Self {
        self.explorer_url = Some(explorer_url.into());
        self
    }

    /// Explorer link for an address, when an explorer is configured
    pub fn address_url(&self, address: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/address/{}", base.trim_end_matches('/'), address))
    }
}
