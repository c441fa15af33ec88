pub mod conformance;
mod error;
mod filter;
mod memory;
mod traits;

pub use error::StorageError;
pub use filter::AssetFilter;
pub use memory::{MemorySnapshot, MemoryStorage, StoreDump};
pub use traits::AssetStorage;
