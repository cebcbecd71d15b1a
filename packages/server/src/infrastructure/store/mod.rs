//! Message store implementations
//!
//! - `inmemory`: bounded in-process history

pub mod inmemory;

pub use inmemory::InMemoryMessageStore;
