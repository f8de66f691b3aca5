//! # Infrastructure Adapters
//!
//! Infrastructure implementations of the data store interface.

pub mod memory_store;
pub mod postgrest_store;

pub use memory_store::InMemoryStore;
pub use postgrest_store::{PostgrestConfig, PostgrestStore};
