// Chain adapter capability
//
// The verifier never talks to a node or a hashing library directly. It is
// handed an adapter made of a synchronous `CryptoOps` half and an asynchronous
// `ChainOps` half; `EthersAdapter` backs both with ethers, tests use doubles.

pub mod chain;
pub mod provider;
pub mod proxy;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::utils::normalize_hex;
use ethers::abi::{Abi, ParamType, Token};
use ethers::types::{Address, Bytes, H256, I256, U256};
use ethers::utils::{keccak256, to_checksum};
use serde_json::Value;

pub use chain::ChainConfig;
pub use provider::EthersAdapter;
pub use proxy::{implementation_slot, resolve_implementation, EIP1967_IMPLEMENTATION_SLOT};

/// Pure cryptographic and ABI primitives
pub trait CryptoOps: Send + Sync {
    /// Keccak-256 of raw bytes
    fn keccak256(&self, data: &[u8]) -> H256;

    /// Standard (non-packed) ABI encoding of a parameter list
    fn encode_abi_parameters(&self, tokens: &[Token]) -> Vec<u8>;

    /// EIP-55 checksummed form of an address
    fn checksum_address(&self, address: &Address) -> String;

    fn zero_address(&self) -> Address {
        Address::zero()
    }

    /// Calldata for `function(args)`; arguments are given as JSON values
    fn encode_function_data(&self, abi: &Abi, function: &str, args: &[Value]) -> Result<Bytes>;

    /// Decodes return data of `function`
    fn decode_function_result(&self, abi: &Abi, function: &str, data: &[u8]) -> Result<Vec<Token>>;
}

/// Asynchronous chain reads
#[async_trait]
pub trait ChainOps: Send + Sync {
    /// Deployed runtime bytecode at `address` (empty for accounts without code)
    async fn get_code(&self, address: Address) -> Result<Bytes>;

    /// Raw 32-byte storage word
    async fn get_storage_at(&self, address: Address, slot: H256) -> Result<H256>;

    /// `eth_call` against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
}

/// Everything the verifier needs from a chain
pub trait ChainAdapter: CryptoOps + ChainOps {}

impl<T: CryptoOps + ChainOps + ?Sized> ChainAdapter for T {}

/// `CryptoOps` implemented with ethers utilities
#[derive(Debug, Clone, Copy, Default)]
pub struct EthersCrypto;

impl CryptoOps for EthersCrypto {
    fn keccak256(&self, data: &[u8]) -> H256 {
        H256::from(keccak256(data))
    }

    fn encode_abi_parameters(&self, tokens: &[Token]) -> Vec<u8> {
        ethers::abi::encode(tokens)
    }

    fn checksum_address(&self, address: &Address) -> String {
        to_checksum(address, None)
    }

    fn encode_function_data(&self, abi: &Abi, function: &str, args: &[Value]) -> Result<Bytes> {
        let function = abi
            .function(function)
            .map_err(|_| anyhow!("Function '{}' not found in ABI", function))?;

        if function.inputs.len() != args.len() {
            return Err(anyhow!(
                "{} expects {} argument(s), got {}",
                function.name,
                function.inputs.len(),
                args.len()
            ));
        }

        let tokens = function
            .inputs
            .iter()
            .zip(args)
            .map(|(input, arg)| tokenize_json(&input.kind, arg))
            .collect::<Result<Vec<_>>>()?;

        let calldata = function
            .encode_input(&tokens)
            .with_context(|| format!("Failed to encode call to {}", function.name))?;
        Ok(Bytes::from(calldata))
    }

    fn decode_function_result(&self, abi: &Abi, function: &str, data: &[u8]) -> Result<Vec<Token>> {
        let function = abi
            .function(function)
            .map_err(|_| anyhow!("Function '{}' not found in ABI", function))?;
        function
            .decode_output(data)
            .with_context(|| format!("Failed to decode result of {}", function.name))
    }
}

/// Tokenizes a JSON argument for the given ABI parameter type.
///
/// Integers accept JSON numbers, decimal strings and 0x-prefixed hex. Byte
/// types take hex; `bytesN` values shorter than N are right-padded. Arrays and
/// tuples take JSON arrays.
pub fn tokenize_json(kind: &ParamType, value: &Value) -> Result<Token> {
    let invalid = || anyhow!("Cannot encode {} as {}", value, kind);

    match kind {
        ParamType::Address => value
            .as_str()
            .and_then(|text| text.trim().parse::<Address>().ok())
            .map(Token::Address)
            .ok_or_else(invalid),
        ParamType::Uint(_) => json_to_u256(value).map(Token::Uint).ok_or_else(invalid),
        ParamType::Int(_) => json_to_i256(value)
            .map(|signed| Token::Int(signed.into_raw()))
            .ok_or_else(invalid),
        ParamType::Bool => match value {
            Value::Bool(flag) => Ok(Token::Bool(*flag)),
            Value::String(text) => match text.trim() {
                "true" => Ok(Token::Bool(true)),
                "false" => Ok(Token::Bool(false)),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        },
        ParamType::String => Ok(Token::String(match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })),
        ParamType::Bytes => json_to_bytes(value).map(Token::Bytes).ok_or_else(invalid),
        ParamType::FixedBytes(size) => {
            let mut bytes = json_to_bytes(value).ok_or_else(invalid)?;
            if bytes.len() > *size {
                return Err(invalid());
            }
            bytes.resize(*size, 0);
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Array(inner) => {
            let items = value.as_array().ok_or_else(invalid)?;
            items
                .iter()
                .map(|item| tokenize_json(inner, item))
                .collect::<Result<Vec<_>>>()
                .map(Token::Array)
        }
        ParamType::FixedArray(inner, length) => {
            let items = value.as_array().filter(|items| items.len() == *length).ok_or_else(invalid)?;
            items
                .iter()
                .map(|item| tokenize_json(inner, item))
                .collect::<Result<Vec<_>>>()
                .map(Token::FixedArray)
        }
        ParamType::Tuple(kinds) => {
            let items = value.as_array().filter(|items| items.len() == kinds.len()).ok_or_else(invalid)?;
            kinds
                .iter()
                .zip(items)
                .map(|(kind, item)| tokenize_json(kind, item))
                .collect::<Result<Vec<_>>>()
                .map(Token::Tuple)
        }
    }
}

fn json_to_u256(value: &Value) -> Option<U256> {
    match value {
        Value::Number(number) => number.as_u64().map(U256::from),
        Value::String(text) => {
            let text = text.trim();
            match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(digits) => U256::from_str_radix(digits, 16).ok(),
                None => U256::from_dec_str(text).ok(),
            }
        }
        _ => None,
    }
}

fn json_to_i256(value: &Value) -> Option<I256> {
    match value {
        Value::Number(number) => number.as_i64().map(I256::from),
        Value::String(text) => {
            let text = text.trim();
            if text.starts_with("0x") || text.starts_with("0X") {
                json_to_u256(value).map(I256::from_raw)
            } else {
                I256::from_dec_str(text).ok()
            }
        }
        _ => None,
    }
}

fn json_to_bytes(value: &Value) -> Option<Vec<u8>> {
    value.as_str().and_then(|text| hex::decode(normalize_hex(text)).ok())
}

/// Renders a decoded ABI token as a JSON value.
///
/// Integers become decimal strings, addresses are checksummed and byte
/// strings are 0x-prefixed hex.
pub fn token_to_value<C: CryptoOps + ?Sized>(crypto: &C, token: &Token) -> Value {
    match token {
        Token::Address(address) => Value::String(crypto.checksum_address(address)),
        Token::Uint(value) => Value::String(value.to_string()),
        Token::Int(value) => Value::String(I256::from_raw(*value).to_string()),
        Token::Bool(flag) => Value::Bool(*flag),
        Token::String(text) => Value::String(text.clone()),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => {
            Value::String(format!("0x{}", hex::encode(bytes)))
        }
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            Value::Array(items.iter().map(|item| token_to_value(crypto, item)).collect())
        }
    }
}
