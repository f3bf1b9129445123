pub mod comparator;
pub mod immutables;
pub mod libraries;
pub mod selectors;
pub mod types;

pub use comparator::*;
pub use immutables::*;
pub use libraries::*;
pub use selectors::*;
pub use types::*;
