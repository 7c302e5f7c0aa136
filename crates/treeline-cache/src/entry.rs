//! Cache Entry
//!
//! Entry record with recency/priority metadata, optional ttl, and the
//! tag/dependency lists the secondary index is built from.

use std::sync::Arc;
use std::time::{Duration, Instant};

use treeline_core::CacheCategory;

/// One cached artifact. The store owns the value; callers get
/// read-only `Arc` views.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Arc<Vec<u8>>,
    pub category: CacheCategory,
    pub size_bytes: usize,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
    /// Eviction priority for the priority strategy (higher survives)
    pub priority: u8,
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
}

impl CacheEntry {
    pub fn new(value: Arc<Vec<u8>>, category: CacheCategory, size_bytes: usize) -> Self {
        let now = Instant::now();
        Self {
            value,
            category,
            size_bytes,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            priority: 0,
            ttl: None,
            tags: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// An expired entry is never returned as a hit
    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.created_at.elapsed() > ttl,
            None => false,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count = self.access_count.saturating_add(1);
    }
}
