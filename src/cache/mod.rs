//! Memoization of recent inference results.
//!
//! Entries are keyed by model version and input fingerprint, so a result is
//! never served for a model other than the one that produced it.

pub mod fingerprint;
pub mod result_cache;

pub use fingerprint::{CacheKey, fingerprint};
pub use result_cache::ResultCache;
