// EIP-1967 proxy resolution

use anyhow::Result;
use ethers::types::{Address, H256};

use super::{ChainAdapter, CryptoOps};

/// `keccak256("eip1967.proxy.implementation") - 1`
pub const EIP1967_IMPLEMENTATION_SLOT: H256 = H256([
    0x36, 0x08, 0x94, 0xa1, 0x3b, 0xa1, 0xa3, 0x21, 0x06, 0x67, 0xc8, 0x28, 0x49, 0x2d, 0xb9, 0x8d,
    0xca, 0x3e, 0x20, 0x76, 0xcc, 0x37, 0x35, 0xa9, 0x20, 0xa3, 0xca, 0x50, 0x5d, 0x38, 0x2b, 0xbc,
]);

/// Derives the EIP-1967 implementation slot from its label
pub fn implementation_slot<C: CryptoOps + ?Sized>(crypto: &C) -> H256 {
    let hash = crypto.keccak256(b"eip1967.proxy.implementation");
    let slot = ethers::types::U256::from_big_endian(hash.as_bytes()) - 1;
    let mut word = [0u8; 32];
    slot.to_big_endian(&mut word);
    H256(word)
}

/// Address held in the low 20 bytes of a storage word
pub fn word_to_address(word: &H256) -> Address {
    Address::from_slice(&word.as_bytes()[12..])
}

/// Reads the implementation address behind an EIP-1967 proxy.
///
/// Returns `None` when the slot holds the zero address.
pub async fn resolve_implementation(adapter: &dyn ChainAdapter, proxy: Address) -> Result<Option<Address>> {
    let word = adapter.get_storage_at(proxy, EIP1967_IMPLEMENTATION_SLOT).await?;
    let implementation = word_to_address(&word);
    if implementation == adapter.zero_address() {
        Ok(None)
    } else {
        Ok(Some(implementation))
    }
}
