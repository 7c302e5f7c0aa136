//! Cache Manager
//!
//! Facade over the active eviction strategy, the secondary index, the
//! optional adaptive policy, and the optional disk mirror. A lookup
//! that misses memory consults disk before reporting a miss; a hit
//! from either tier counts as a hit.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use treeline_core::{CacheCategory, CacheStats, EngineEvent, EventBus};

use crate::adaptive::AdaptivePolicy;
use crate::entry::CacheEntry;
use crate::index::SecondaryIndex;
use crate::persist::DiskCache;
use crate::strategy::{Strategy, StrategyKind};

#[derive(Debug, Error)]
pub enum CacheError {
    /// Callers must supply a measured size; zero would corrupt the
    /// byte accounting.
    #[error("cache entry '{0}' declared zero size")]
    ZeroSize(String),
}

/// Per-put metadata. Size is caller-supplied: the cache never guesses
/// how big a value is.
#[derive(Debug, Clone)]
pub struct PutOptions {
    pub category: CacheCategory,
    pub size_bytes: usize,
    pub priority: u8,
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
    /// Mirror to disk when a disk cache is attached
    pub persist: bool,
}

impl PutOptions {
    pub fn new(category: CacheCategory, size_bytes: usize) -> Self {
        Self {
            category,
            size_bytes,
            priority: 0,
            ttl: None,
            tags: Vec::new(),
            dependencies: Vec::new(),
            persist: false,
        }
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn depends_on(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    pub fn persist(mut self) -> Self {
        self.persist = true;
        self
    }
}

pub struct CacheManager {
    strategy: Strategy,
    adaptive: Option<AdaptivePolicy>,
    index: SecondaryIndex,
    disk: Option<DiskCache>,
    hits: u64,
    misses: u64,
    bus: Arc<EventBus>,
}

impl CacheManager {
    /// A manager pinned to one strategy.
    pub fn new(kind: StrategyKind, max_bytes: usize, bus: Arc<EventBus>) -> Self {
        Self {
            strategy: Strategy::new(kind, max_bytes),
            adaptive: None,
            index: SecondaryIndex::new(),
            disk: None,
            hits: 0,
            misses: 0,
            bus,
        }
    }

    /// A manager that starts on LRU and lets the adaptive policy
    /// switch strategies at window boundaries.
    pub fn adaptive(max_bytes: usize, window: usize, margin: f64, bus: Arc<EventBus>) -> Self {
        // Shadow capacity approximates the entry count at a 4 KiB
        // average artifact.
        let shadow_capacity = (max_bytes / 4096).clamp(64, 8192);
        let mut manager = Self::new(StrategyKind::Lru, max_bytes, bus);
        manager.adaptive = Some(AdaptivePolicy::new(
            StrategyKind::Lru,
            window,
            margin,
            shadow_capacity,
        ));
        manager
    }

    /// Attach a disk mirror. Entries put with `persist` are written
    /// through; memory misses fall back to it.
    pub fn with_disk(mut self, disk: DiskCache) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Look up a key. Expired entries are dropped and reported as
    /// misses; a disk fallback that lands counts as a hit. The
    /// category is the caller's, used when the miss has no entry to
    /// read one from.
    pub fn get(&mut self, key: &str, category: CacheCategory) -> Option<Arc<Vec<u8>>> {
        if let Some(switch) = self.adaptive.as_mut().and_then(|a| a.note_get(key)) {
            self.switch_strategy(switch);
        }

        if let Some(entry) = self.strategy.get(key) {
            if entry.is_expired() {
                self.drop_key(key, true);
                self.misses += 1;
                self.bus
                    .emit(EngineEvent::CacheMiss { key: key.to_string(), category });
                return None;
            }
            let value = Arc::clone(&entry.value);
            let category = entry.category;
            self.hits += 1;
            self.bus
                .emit(EngineEvent::CacheHit { key: key.to_string(), category });
            return Some(value);
        }

        if let Some(entry) = self.disk.as_ref().and_then(|d| d.load(key)) {
            let value = Arc::clone(&entry.value);
            let category = entry.category;
            self.admit(key.to_string(), entry);
            self.hits += 1;
            self.bus
                .emit(EngineEvent::CacheHit { key: key.to_string(), category });
            return Some(value);
        }

        self.misses += 1;
        self.bus
            .emit(EngineEvent::CacheMiss { key: key.to_string(), category });
        None
    }

    /// Non-counting lookup for inspection and tests.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.strategy.peek(key).filter(|e| !e.is_expired())
    }

    /// Store a value. `Ok(false)` means the entry was rejected by the
    /// budget (for example larger than the whole cache).
    pub fn put(
        &mut self,
        key: impl Into<String>,
        value: Arc<Vec<u8>>,
        opts: PutOptions,
    ) -> Result<bool, CacheError> {
        let key = key.into();
        if opts.size_bytes == 0 {
            return Err(CacheError::ZeroSize(key));
        }

        if let Some(switch) = self
            .adaptive
            .as_mut()
            .and_then(|a| a.note_put(&key, opts.priority))
        {
            self.switch_strategy(switch);
        }

        let mut entry = CacheEntry::new(value, opts.category, opts.size_bytes);
        entry.priority = opts.priority;
        entry.ttl = opts.ttl;
        entry.tags = opts.tags;
        entry.dependencies = opts.dependencies;

        if opts.persist {
            if let Some(disk) = &self.disk {
                if let Err(error) = disk.save(&key, &entry) {
                    tracing::warn!(key, %error, "disk cache write failed");
                }
            }
        }

        Ok(self.admit(key, entry))
    }

    /// Insert into the active strategy and keep the index in step
    /// with whatever the insert displaced.
    fn admit(&mut self, key: String, entry: CacheEntry) -> bool {
        let indexed = entry.clone();
        let outcome = self.strategy.insert(key.clone(), entry);
        for (evicted_key, evicted_entry) in &outcome.evicted {
            self.index.remove(evicted_key, evicted_entry);
        }
        if outcome.stored {
            self.index.insert(&key, &indexed);
        }
        outcome.stored
    }

    /// Remove one key from memory and index, optionally from disk.
    fn drop_key(&mut self, key: &str, and_disk: bool) -> Option<CacheEntry> {
        let entry = self.strategy.remove(key)?;
        self.index.remove(key, &entry);
        if and_disk {
            if let Some(disk) = &self.disk {
                disk.remove(key);
            }
        }
        Some(entry)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.drop_key(key, true).is_some()
    }

    pub fn invalidate_category(&mut self, category: CacheCategory) -> usize {
        let keys = self.index.keys_for_category(category);
        self.drop_all(&keys)
    }

    pub fn invalidate_tag(&mut self, tag: &str) -> usize {
        let keys = self.index.keys_for_tag(tag);
        self.drop_all(&keys)
    }

    /// Invalidate every entry that declared a dependency on `dep`,
    /// for example all artifacts derived from one node.
    pub fn invalidate_dependency(&mut self, dep: &str) -> usize {
        let keys = self.index.keys_for_dependency(dep);
        self.drop_all(&keys)
    }

    fn drop_all(&mut self, keys: &[String]) -> usize {
        let mut removed = 0;
        for key in keys {
            if self.drop_key(key, true).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Evict every entry below the given priority. Disk copies are
    /// kept so the entries can come back cheaply. Returns bytes freed.
    pub fn clear_below_priority(&mut self, min_priority: u8) -> usize {
        let mut freed = 0;
        for key in self.strategy.keys() {
            let below = self
                .strategy
                .peek(&key)
                .map(|e| e.priority < min_priority)
                .unwrap_or(false);
            if below {
                if let Some(entry) = self.drop_key(&key, false) {
                    freed += entry.size_bytes;
                }
            }
        }
        freed
    }

    /// Tighten or relax the byte budget. Returns bytes freed.
    pub fn set_max_bytes(&mut self, max_bytes: usize) -> usize {
        let evicted = self.strategy.set_max_bytes(max_bytes);
        let mut freed = 0;
        for (key, entry) in &evicted {
            self.index.remove(key, entry);
            freed += entry.size_bytes;
        }
        freed
    }

    pub fn clear(&mut self) {
        self.strategy.drain();
        self.index.clear();
        if let Some(disk) = &self.disk {
            disk.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.strategy.len(),
            size_bytes: self.strategy.current_bytes(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    pub fn current_bytes(&self) -> usize {
        self.strategy.current_bytes()
    }

    /// Rebuild the store under the recommended strategy. Entries the
    /// new store cannot admit are dropped from the index as well.
    fn switch_strategy(&mut self, kind: StrategyKind) {
        if kind == self.strategy.kind() {
            return;
        }
        tracing::info!(?kind, "cache strategy switch");
        // Reinsert in last-access order: an LRU rebuild starts with
        // real recency stamps, a priority rebuild with sensible
        // within-bucket order.
        let mut entries = self.strategy.drain();
        entries.sort_by_key(|(_, entry)| entry.last_accessed);
        self.strategy = Strategy::new(kind, self.strategy.max_bytes());
        for (key, entry) in entries {
            let indexed = entry.clone();
            let outcome = self.strategy.insert(key.clone(), entry);
            for (evicted_key, evicted_entry) in &outcome.evicted {
                self.index.remove(evicted_key, evicted_entry);
            }
            if !outcome.stored {
                self.index.remove(&key, &indexed);
            }
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("strategy", &self.strategy.kind())
            .field("entries", &self.strategy.len())
            .field("bytes", &self.strategy.current_bytes())
            .finish()
    }
}
