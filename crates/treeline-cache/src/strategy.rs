//! Eviction Strategies
//!
//! Two byte-budgeted stores behind one tagged enum: strict LRU with a
//! recency index, and priority buckets evicting lowest-first with
//! FIFO order inside a bucket. Only one store is ever live; the
//! adaptive policy switches between them by draining and rebuilding.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::entry::CacheEntry;

/// Which eviction policy a store runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Lru,
    Priority,
}

/// Result of an insert attempt
#[derive(Debug, Default)]
pub struct InsertOutcome {
    pub stored: bool,
    /// Entries displaced to make room
    pub evicted: Vec<(String, CacheEntry)>,
}

/// Strict recency-ordered store. The recency index is a BTreeMap
/// keyed by a monotone access stamp, so eviction pops the first key.
#[derive(Debug, Default)]
pub struct LruStore {
    entries: HashMap<String, CacheEntry>,
    recency: BTreeMap<u64, String>,
    stamps: HashMap<String, u64>,
    next_stamp: u64,
    current_bytes: usize,
    max_bytes: usize,
}

impl LruStore {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes, ..Self::default() }
    }

    fn restamp(&mut self, key: &str) {
        if let Some(old) = self.stamps.get(key) {
            self.recency.remove(old);
        }
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.recency.insert(stamp, key.to_string());
        self.stamps.insert(key.to_string(), stamp);
    }

    fn get(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.entries.contains_key(key) {
            self.restamp(key);
            let entry = self.entries.get_mut(key).unwrap();
            entry.touch();
            Some(entry)
        } else {
            None
        }
    }

    fn insert(&mut self, key: String, entry: CacheEntry) -> InsertOutcome {
        let mut outcome = InsertOutcome::default();
        if entry.size_bytes > self.max_bytes {
            return outcome;
        }
        if let Some((k, old)) = self.remove(&key).map(|e| (key.clone(), e)) {
            outcome.evicted.push((k, old));
        }
        while self.current_bytes + entry.size_bytes > self.max_bytes {
            match self.evict_one() {
                Some(evicted) => outcome.evicted.push(evicted),
                None => return outcome,
            }
        }
        self.current_bytes += entry.size_bytes;
        self.entries.insert(key.clone(), entry);
        self.restamp(&key);
        outcome.stored = true;
        outcome
    }

    fn evict_one(&mut self) -> Option<(String, CacheEntry)> {
        let (&stamp, key) = self.recency.iter().next()?;
        let key = key.clone();
        self.recency.remove(&stamp);
        self.stamps.remove(&key);
        let entry = self.entries.remove(&key)?;
        self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
        Some((key, entry))
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        if let Some(stamp) = self.stamps.remove(key) {
            self.recency.remove(&stamp);
        }
        self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// Priority-bucketed store: eviction always takes from the lowest
/// non-empty bucket, oldest insertion first.
#[derive(Debug, Default)]
pub struct PriorityStore {
    entries: HashMap<String, CacheEntry>,
    /// Insertion-ordered keys per priority; stale keys skipped lazily
    buckets: BTreeMap<u8, VecDeque<String>>,
    current_bytes: usize,
    max_bytes: usize,
}

impl PriorityStore {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes, ..Self::default() }
    }

    fn get(&mut self, key: &str) -> Option<&mut CacheEntry> {
        let entry = self.entries.get_mut(key)?;
        entry.touch();
        Some(entry)
    }

    fn insert(&mut self, key: String, entry: CacheEntry) -> InsertOutcome {
        let mut outcome = InsertOutcome::default();
        if entry.size_bytes > self.max_bytes {
            return outcome;
        }
        if let Some(old) = self.remove(&key) {
            outcome.evicted.push((key.clone(), old));
        }
        while self.current_bytes + entry.size_bytes > self.max_bytes {
            match self.evict_one() {
                Some(evicted) => outcome.evicted.push(evicted),
                None => return outcome,
            }
        }
        self.current_bytes += entry.size_bytes;
        self.buckets.entry(entry.priority).or_default().push_back(key.clone());
        self.entries.insert(key, entry);
        outcome.stored = true;
        outcome
    }

    fn evict_one(&mut self) -> Option<(String, CacheEntry)> {
        loop {
            let (&level, _) = self.buckets.iter().find(|(_, keys)| !keys.is_empty())?;
            let bucket = self.buckets.get_mut(&level)?;
            let Some(key) = bucket.pop_front() else {
                self.buckets.remove(&level);
                continue;
            };
            // Stale if removed or re-inserted at a different priority
            match self.entries.get(&key) {
                Some(entry) if entry.priority == level => {
                    let entry = self.entries.remove(&key)?;
                    self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
                    return Some((key, entry));
                }
                _ => continue,
            }
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// The single active store, tagged by policy
#[derive(Debug)]
pub enum Strategy {
    Lru(LruStore),
    Priority(PriorityStore),
}

impl Strategy {
    pub fn new(kind: StrategyKind, max_bytes: usize) -> Self {
        match kind {
            StrategyKind::Lru => Strategy::Lru(LruStore::new(max_bytes)),
            StrategyKind::Priority => Strategy::Priority(PriorityStore::new(max_bytes)),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Lru(_) => StrategyKind::Lru,
            Strategy::Priority(_) => StrategyKind::Priority,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<&mut CacheEntry> {
        match self {
            Strategy::Lru(s) => s.get(key),
            Strategy::Priority(s) => s.get(key),
        }
    }

    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        match self {
            Strategy::Lru(s) => s.entries.get(key),
            Strategy::Priority(s) => s.entries.get(key),
        }
    }

    pub fn insert(&mut self, key: String, entry: CacheEntry) -> InsertOutcome {
        match self {
            Strategy::Lru(s) => s.insert(key, entry),
            Strategy::Priority(s) => s.insert(key, entry),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        match self {
            Strategy::Lru(s) => s.remove(key),
            Strategy::Priority(s) => s.remove(key),
        }
    }

    pub fn evict_one(&mut self) -> Option<(String, CacheEntry)> {
        match self {
            Strategy::Lru(s) => s.evict_one(),
            Strategy::Priority(s) => s.evict_one(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Strategy::Lru(s) => s.entries.len(),
            Strategy::Priority(s) => s.entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_bytes(&self) -> usize {
        match self {
            Strategy::Lru(s) => s.current_bytes,
            Strategy::Priority(s) => s.current_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        match self {
            Strategy::Lru(s) => s.max_bytes,
            Strategy::Priority(s) => s.max_bytes,
        }
    }

    /// Keys of every resident entry (for index rebuilds)
    pub fn keys(&self) -> Vec<String> {
        match self {
            Strategy::Lru(s) => s.entries.keys().cloned().collect(),
            Strategy::Priority(s) => s.entries.keys().cloned().collect(),
        }
    }

    /// Shrink or grow the byte budget, evicting until under the new
    /// budget. Used when memory pressure tightens cache limits.
    pub fn set_max_bytes(&mut self, max_bytes: usize) -> Vec<(String, CacheEntry)> {
        match self {
            Strategy::Lru(s) => s.max_bytes = max_bytes,
            Strategy::Priority(s) => s.max_bytes = max_bytes,
        }
        let mut evicted = Vec::new();
        while self.current_bytes() > self.max_bytes() {
            match self.evict_one() {
                Some(e) => evicted.push(e),
                None => break,
            }
        }
        evicted
    }

    /// Empty the store, returning all entries (for strategy switches)
    pub fn drain(&mut self) -> Vec<(String, CacheEntry)> {
        match self {
            Strategy::Lru(s) => {
                s.recency.clear();
                s.stamps.clear();
                s.current_bytes = 0;
                s.entries.drain().collect()
            }
            Strategy::Priority(s) => {
                s.buckets.clear();
                s.current_bytes = 0;
                s.entries.drain().collect()
            }
        }
    }
}
