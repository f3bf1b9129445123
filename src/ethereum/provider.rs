// Ethers-backed chain adapter
//
// JSON-RPC reads through `Provider<Http>`; hashing and ABI work is delegated
// to `EthersCrypto`.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Bytes, TransactionRequest, H256};
use serde_json::Value;

use super::{ChainConfig, ChainOps, CryptoOps, EthersCrypto};

/// Interface to an EVM JSON-RPC endpoint
#[derive(Debug, Clone)]
pub struct EthersAdapter {
    provider: Arc<Provider<Http>>,
    crypto: EthersCrypto,
}

impl EthersAdapter {
    /// Create a new adapter for `rpc_url`
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;
        Ok(Self {
            provider: Arc::new(provider),
            crypto: EthersCrypto,
        })
    }

    pub fn for_chain(chain: &ChainConfig) -> Result<Self> {
        Self::new(&chain.rpc_url)
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }
}

impl CryptoOps for EthersAdapter {
    fn keccak256(&self, data: &[u8]) -> H256 {
        self.crypto.keccak256(data)
    }

    fn encode_abi_parameters(&self, tokens: &[Token]) -> Vec<u8> {
        self.crypto.encode_abi_parameters(tokens)
    }

    fn checksum_address(&self, address: &Address) -> String {
        self.crypto.checksum_address(address)
    }

    fn encode_function_data(&self, abi: &Abi, function: &str, args: &[Value]) -> Result<Bytes> {
        self.crypto.encode_function_data(abi, function, args)
    }

    fn decode_function_result(&self, abi: &Abi, function: &str, data: &[u8]) -> Result<Vec<Token>> {
        self.crypto.decode_function_result(abi, function, data)
    }
}

#[async_trait]
impl ChainOps for EthersAdapter {
    async fn get_code(&self, address: Address) -> Result<Bytes> {
        self.provider
            .get_code(address, None)
            .await
            .with_context(|| format!("eth_getCode failed for {:?}", address))
    }

    async fn get_storage_at(&self, address: Address, slot: H256) -> Result<H256> {
        self.provider
            .get_storage_at(address, slot, None)
            .await
            .with_context(|| format!("eth_getStorageAt failed for {:?} slot {:?}", address, slot))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::new().to(to).data(data);
        self.provider
            .call(&tx.into(), None)
            .await
            .with_context(|| format!("eth_call failed for {:?}", to))
    }
}
