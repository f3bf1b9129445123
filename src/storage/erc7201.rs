// ERC-7201 namespaced storage
//
// base = keccak256(abi.encode(uint256(keccak256(id)) - 1)) & ~0xff

use ethers::abi::Token;
use ethers::types::{H256, U256};

use crate::ethereum::CryptoOps;

/// Computes the base slot of an ERC-7201 namespace such as `"example.main"`
pub fn calculate_erc7201_base_slot<C: CryptoOps + ?Sized>(crypto: &C, namespace_id: &str) -> H256 {
    let id_hash = crypto.keccak256(namespace_id.as_bytes());
    let (decremented, _) = U256::from_big_endian(id_hash.as_bytes()).overflowing_sub(U256::one());

    let encoded = crypto.encode_abi_parameters(&[Token::Uint(decremented)]);
    let mut slot = crypto.keccak256(&encoded);
    slot.0[31] = 0;
    slot
}
