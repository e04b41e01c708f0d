//! Keyed in-memory query cache.
//!
//! This module provides the local half of the optimistic update protocol:
//! - Entries addressed by structured keys (`todos`, `todos/2`)
//! - Synchronous read/write owned by a single task
//! - Staleness flags that schedule coalesced background refreshes
//! - Best-effort cancellation of in-flight refreshes

mod key;
mod store;
mod traits;

pub use key::{KeySegment, QueryKey};
pub use store::{EntryStatus, QueryCache, RefreshOutcome};
pub use traits::{CacheValue, Cacheable};
