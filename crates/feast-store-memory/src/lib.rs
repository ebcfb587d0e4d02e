//! In-memory backend for the Fork & Feast recipe store.
//!
//! Records live in persistent ([`im`]) maps, so readers take an O(1) snapshot
//! and walk the revision graph without holding a lock while writers carry on.

mod store;

pub use store::{MemoryStore, Snapshot};
