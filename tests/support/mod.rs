// In-memory chain adapter for integration tests

#![allow(dead_code)]

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes, H256};
use integrity_verify::{ChainOps, CryptoOps, EthersCrypto};
use serde_json::Value;

/// Chain state held in maps. Unknown storage reads as zero, unknown code as
/// empty and unknown calls revert.
#[derive(Debug, Default)]
pub struct MockChain {
    code: HashMap<Address, Bytes>,
    storage: HashMap<(Address, H256), H256>,
    calls: HashMap<(Address, Bytes), Bytes>,
    crypto: EthersCrypto,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(mut self, address: Address, code: impl Into<Bytes>) -> Self {
        self.code.insert(address, code.into());
        self
    }

    pub fn with_storage(mut self, address: Address, slot: H256, value: H256) -> Self {
        self.storage.insert((address, slot), value);
        self
    }

    /// Registers the return data of `function(args)` on `to`
    pub fn with_call(mut self, to: Address, abi: &Abi, function: &str, args: &[Value], output: &[Token]) -> Self {
        let calldata = self
            .crypto
            .encode_function_data(abi, function, args)
            .expect("test calldata must encode");
        self.calls.insert((to, calldata), Bytes::from(ethers::abi::encode(output)));
        self
    }
}

impl CryptoOps for MockChain {
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
impl ChainOps for MockChain {
    async fn get_code(&self, address: Address) -> Result<Bytes> {
        Ok(self.code.get(&address).cloned().unwrap_or_default())
    }

    async fn get_storage_at(&self, address: Address, slot: H256) -> Result<H256> {
        Ok(self.storage.get(&(address, slot)).copied().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.calls
            .get(&(to, data))
            .cloned()
            .ok_or_else(|| anyhow!("execution reverted"))
    }
}

pub fn address(last: u64) -> Address {
    Address::from_low_u64_be(last)
}

/// Storage word holding `address` right-aligned
pub fn address_word(address: Address) -> H256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    H256(word)
}

/// Storage word holding `value` big-endian
pub fn uint_word(value: u64) -> H256 {
    H256::from_low_u64_be(value)
}
