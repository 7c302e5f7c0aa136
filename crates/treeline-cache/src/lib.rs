//! Treeline Cache
//!
//! Keyed store for computed artifacts (rendered content, layout
//! metrics, search results) with pluggable eviction: strict LRU,
//! priority buckets, or an adaptive policy that shadow-scores both
//! and switches with hysteresis. A secondary index supports one-pass
//! invalidation by category, tag, or dependency, and entries can be
//! mirrored to disk so a memory miss falls back to disk before
//! recomputation.

pub mod adaptive;
pub mod entry;
pub mod index;
pub mod manager;
pub mod persist;
pub mod strategy;

pub use adaptive::AdaptivePolicy;
pub use entry::CacheEntry;
pub use manager::{CacheError, CacheManager, PutOptions};
pub use persist::{DiskCache, EntryMeta};
pub use strategy::{Strategy, StrategyKind};
