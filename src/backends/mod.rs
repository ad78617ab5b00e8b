// Subscription record backends
// Each backend implements the persistence bridge's store trait

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::{RestStore, RestStoreConfig};
