//! Memory Pool
//!
//! Keyed byte budget with priority tiers. Admitting a block may evict
//! blocks of strictly lower priority, walking tiers upward from
//! Disposable and oldest-first inside a tier. A block can never evict
//! a peer or a higher tier, and Critical blocks are never evicted.

use std::collections::HashMap;

/// Eviction tier of a pooled block. Ordering ascends from the most
/// evictable to the untouchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolPriority {
    Disposable,
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone)]
struct Block {
    size_bytes: usize,
    priority: PoolPriority,
    /// Monotone access stamp; least recently stamped evicts first
    seq: u64,
}

#[derive(Debug)]
pub struct MemoryPool {
    blocks: HashMap<String, Block>,
    max_bytes: usize,
    current_bytes: usize,
    next_seq: u64,
}

impl MemoryPool {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            max_bytes,
            current_bytes: 0,
            next_seq: 0,
        }
    }

    /// Admit a block, evicting lower tiers if the budget requires it.
    /// Returns false and leaves the pool untouched when the block
    /// cannot fit: zero or oversized blocks, or not enough evictable
    /// bytes below the block's own tier.
    pub fn add(&mut self, key: impl Into<String>, size_bytes: usize, priority: PoolPriority) -> bool {
        let key = key.into();
        if size_bytes == 0 || size_bytes > self.max_bytes {
            return false;
        }

        let replaced = self.blocks.get(&key).map(|b| b.size_bytes).unwrap_or(0);
        let occupied = self.current_bytes - replaced;
        if occupied + size_bytes > self.max_bytes {
            let needed = occupied + size_bytes - self.max_bytes;
            let victims = self.pick_victims(&key, priority, needed);
            match victims {
                Some(victims) => {
                    for victim in victims {
                        if let Some(block) = self.blocks.remove(&victim) {
                            self.current_bytes -= block.size_bytes;
                            tracing::debug!(key = %victim, bytes = block.size_bytes, "pool evicted block");
                        }
                    }
                }
                None => return false,
            }
        }

        if let Some(old) = self.blocks.remove(&key) {
            self.current_bytes -= old.size_bytes;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.current_bytes += size_bytes;
        self.blocks.insert(key, Block { size_bytes, priority, seq });
        true
    }

    /// Victims strictly below `priority`, lowest tier first and least
    /// recently accessed first inside a tier. None when even a full
    /// sweep of lower tiers cannot free enough.
    fn pick_victims(&self, incoming: &str, priority: PoolPriority, needed: usize) -> Option<Vec<String>> {
        let mut candidates: Vec<(&String, &Block)> = self
            .blocks
            .iter()
            .filter(|(key, block)| block.priority < priority && key.as_str() != incoming)
            .collect();
        candidates.sort_by_key(|(_, block)| (block.priority, block.seq));

        let mut victims = Vec::new();
        let mut freed = 0;
        for (key, block) in candidates {
            if freed >= needed {
                break;
            }
            victims.push(key.clone());
            freed += block.size_bytes;
        }
        if freed >= needed {
            Some(victims)
        } else {
            None
        }
    }

    /// Record an access, moving the block behind its tier peers in
    /// eviction order.
    pub fn touch(&mut self, key: &str) {
        let seq = self.next_seq;
        if let Some(block) = self.blocks.get_mut(key) {
            block.seq = seq;
            self.next_seq += 1;
        }
    }

    /// Release a block, returning its size.
    pub fn remove(&mut self, key: &str) -> Option<usize> {
        let block = self.blocks.remove(key)?;
        self.current_bytes -= block.size_bytes;
        Some(block.size_bytes)
    }

    /// Drop every block at or below the given tier. Returns bytes
    /// freed. Used by cleanup passes under pressure.
    pub fn sweep_below(&mut self, ceiling: PoolPriority) -> usize {
        let before = self.current_bytes;
        self.blocks.retain(|_, block| block.priority > ceiling);
        self.current_bytes = self.blocks.values().map(|b| b.size_bytes).sum();
        before - self.current_bytes
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blocks.contains_key(key)
    }

    pub fn priority_of(&self, key: &str) -> Option<PoolPriority> {
        self.blocks.get(key).map(|b| b.priority)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn usage_ratio(&self) -> f64 {
        if self.max_bytes == 0 {
            1.0
        } else {
            self.current_bytes as f64 / self.max_bytes as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_priority_cannot_displace_higher() {
        let mut pool = MemoryPool::new(100);
        assert!(pool.add("k1", 60, PoolPriority::Normal));
        // k2 would need to evict Normal-tier k1, which Low may not do
        assert!(!pool.add("k2", 60, PoolPriority::Low));
        assert_eq!(pool.current_bytes(), 60);
        assert!(pool.contains("k1"));
        assert!(!pool.contains("k2"));
    }

    #[test]
    fn test_higher_priority_evicts_lowest_oldest_first() {
        let mut pool = MemoryPool::new(100);
        pool.add("old-low", 30, PoolPriority::Low);
        pool.add("disposable", 30, PoolPriority::Disposable);
        pool.add("new-low", 30, PoolPriority::Low);

        // Needs 50: Disposable goes first, then the older Low block
        assert!(pool.add("normal", 60, PoolPriority::Normal));
        assert!(!pool.contains("disposable"));
        assert!(!pool.contains("old-low"));
        assert!(pool.contains("new-low"));
        assert_eq!(pool.current_bytes(), 90);
    }

    #[test]
    fn test_touch_defers_eviction() {
        let mut pool = MemoryPool::new(100);
        pool.add("a", 40, PoolPriority::Low);
        pool.add("b", 40, PoolPriority::Low);
        pool.touch("a");

        // Needs 20: "b" is now the least recently accessed Low block
        assert!(pool.add("c", 20, PoolPriority::Normal));
        assert!(pool.contains("a"));
        assert!(!pool.contains("b"));
    }

    #[test]
    fn test_critical_never_evicted() {
        let mut pool = MemoryPool::new(100);
        pool.add("pinned", 80, PoolPriority::Critical);
        assert!(!pool.add("wants-room", 50, PoolPriority::Critical));
        assert!(pool.contains("pinned"));
        assert_eq!(pool.current_bytes(), 80);
    }

    #[test]
    fn test_zero_and_oversized_rejected() {
        let mut pool = MemoryPool::new(100);
        assert!(!pool.add("zero", 0, PoolPriority::Normal));
        assert!(!pool.add("huge", 101, PoolPriority::Critical));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_replacing_key_reuses_its_own_bytes() {
        let mut pool = MemoryPool::new(100);
        assert!(pool.add("k", 90, PoolPriority::Normal));
        // Same key resized: its old 90 bytes count as free
        assert!(pool.add("k", 95, PoolPriority::Normal));
        assert_eq!(pool.current_bytes(), 95);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_sweep_below() {
        let mut pool = MemoryPool::new(100);
        pool.add("a", 10, PoolPriority::Disposable);
        pool.add("b", 20, PoolPriority::Low);
        pool.add("c", 30, PoolPriority::Normal);

        let freed = pool.sweep_below(PoolPriority::Low);
        assert_eq!(freed, 30);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains("c"));
    }

    #[test]
    fn test_failed_admission_leaves_pool_untouched() {
        let mut pool = MemoryPool::new(100);
        pool.add("disposable", 20, PoolPriority::Disposable);
        pool.add("high", 70, PoolPriority::High);

        // Even evicting the disposable block cannot free 60
        assert!(!pool.add("k", 70, PoolPriority::Normal));
        assert!(pool.contains("disposable"));
        assert_eq!(pool.current_bytes(), 90);
    }
}
