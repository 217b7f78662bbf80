//! Policy resolution for the decision pipeline.
//!
//! Rules come from an external [`store::PolicyStore`], are indexed by target
//! pattern into an immutable [`index::PolicyIndex`], and served through the
//! TTL-refreshed [`cache::PolicyCache`].

#![warn(missing_docs, clippy::pedantic)]

pub mod cache;
pub mod index;
pub mod store;

mod error;

pub use cache::{CacheConfig, CacheStatus, PolicyCache, RefreshReport};
pub use error::{PolicyError, PolicyResult};
pub use index::{CacheEntry, PolicyIndex};
pub use store::{PolicyRecord, PolicyStore, StaticPolicyStore};
