//! Subject data caching.
//!
//! One [`SubjectDataCache`] exists per (subject type, tier). It owns the
//! per-identifier entries and the listener registry; both live exactly as
//! long as the cache.

mod data_cache;
mod listener;

pub use data_cache::{SubjectDataCache, Tier};
pub use listener::{DataListener, ListenerId, ListenerMode};
