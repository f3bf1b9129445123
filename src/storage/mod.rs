pub mod decode;
pub mod erc7201;
pub mod path;
pub mod schema;
pub mod verify;

pub use decode::{decode_slot_value, type_bytes};
pub use erc7201::calculate_erc7201_base_slot;
pub use path::{compute_slot, parse_path, ComputedSlot, ParsedPath, PathSegment};
pub use schema::{FieldDef, StorageSchema, StructDef};
pub use verify::*;

use ethers::types::{H256, U256};

/// Big-endian 32-byte word of `value`
pub fn word_from_u256(value: U256) -> H256 {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    H256(word)
}

/// Full 0x-prefixed hex of a slot
pub fn slot_hex(slot: &H256) -> String {
    format!("{:?}", slot)
}
