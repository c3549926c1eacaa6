//! Versioned video state store.
//!
//! Every video record carries a version number; all writes are
//! compare-and-swap against the version the writer read. Concurrent workers
//! (chunk completions, rendition bookkeeping, cancellation) therefore
//! serialize through retry loops instead of locks.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{StateError, StateResult};
pub use memory::MemoryStateStore;
pub use redis_store::{RedisStateStore, StateConfig};
pub use store::{update, StateStore, Versioned};
