//! Adaptive Policy
//!
//! Shadow-scores both eviction policies over a sliding window of
//! operations and recommends a switch only when the challenger beats
//! the active policy by a fixed hit-rate margin at a window boundary.
//! The shadows track keys only, never values, so the inactive policy
//! costs two small collections and a pair of counters.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::strategy::StrategyKind;

/// Key-only LRU simulator
#[derive(Debug, Default)]
struct ShadowLru {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl ShadowLru {
    fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), ..Self::default() }
    }

    fn access(&mut self, key: &str) -> bool {
        if self.set.contains(key) {
            if let Some(pos) = self.order.iter().position(|k| k == key) {
                self.order.remove(pos);
            }
            self.order.push_back(key.to_string());
            true
        } else {
            false
        }
    }

    fn insert(&mut self, key: &str) {
        if self.access(key) {
            return;
        }
        while self.set.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            } else {
                break;
            }
        }
        self.set.insert(key.to_string());
        self.order.push_back(key.to_string());
    }
}

/// Key-only priority-bucket simulator
#[derive(Debug, Default)]
struct ShadowPriority {
    buckets: BTreeMap<u8, VecDeque<String>>,
    set: HashSet<String>,
    capacity: usize,
}

impl ShadowPriority {
    fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), ..Self::default() }
    }

    fn access(&mut self, key: &str) -> bool {
        self.set.contains(key)
    }

    fn insert(&mut self, key: &str, priority: u8) {
        if self.set.contains(key) {
            return;
        }
        while self.set.len() >= self.capacity {
            let Some((&level, _)) = self.buckets.iter().find(|(_, keys)| !keys.is_empty()) else {
                break;
            };
            let bucket = self.buckets.get_mut(&level).unwrap();
            match bucket.pop_front() {
                Some(old) => {
                    if bucket.is_empty() {
                        self.buckets.remove(&level);
                    }
                    self.set.remove(&old);
                }
                None => {
                    self.buckets.remove(&level);
                }
            }
        }
        self.set.insert(key.to_string());
        self.buckets.entry(priority).or_default().push_back(key.to_string());
    }
}

/// Per-window hit counters for one policy
#[derive(Debug, Clone, Copy, Default)]
struct WindowScore {
    hits: u64,
    lookups: u64,
}

impl WindowScore {
    fn rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// Chooses between LRU and priority eviction with hysteresis
#[derive(Debug)]
pub struct AdaptivePolicy {
    lru: ShadowLru,
    priority: ShadowPriority,
    lru_score: WindowScore,
    priority_score: WindowScore,
    active: StrategyKind,
    /// Operations per evaluation window
    window: usize,
    ops_in_window: usize,
    /// Hit-rate lead required to switch
    margin: f64,
    switches: u64,
}

impl AdaptivePolicy {
    pub fn new(active: StrategyKind, window: usize, margin: f64, shadow_capacity: usize) -> Self {
        Self {
            lru: ShadowLru::new(shadow_capacity),
            priority: ShadowPriority::new(shadow_capacity),
            lru_score: WindowScore::default(),
            priority_score: WindowScore::default(),
            active,
            window: window.max(1),
            ops_in_window: 0,
            margin,
            switches: 0,
        }
    }

    pub fn active(&self) -> StrategyKind {
        self.active
    }

    pub fn switches(&self) -> u64 {
        self.switches
    }

    /// Record a lookup against both shadows. Returns a recommended
    /// strategy when a window closes with a decisive lead.
    pub fn note_get(&mut self, key: &str) -> Option<StrategyKind> {
        let lru_hit = self.lru.access(key);
        let priority_hit = self.priority.access(key);
        self.lru_score.lookups += 1;
        self.priority_score.lookups += 1;
        if lru_hit {
            self.lru_score.hits += 1;
        }
        if priority_hit {
            self.priority_score.hits += 1;
        }
        self.advance()
    }

    /// Record an insert against both shadows
    pub fn note_put(&mut self, key: &str, priority: u8) -> Option<StrategyKind> {
        self.lru.insert(key);
        self.priority.insert(key, priority);
        self.advance()
    }

    fn advance(&mut self) -> Option<StrategyKind> {
        self.ops_in_window += 1;
        if self.ops_in_window < self.window {
            return None;
        }
        self.ops_in_window = 0;

        let lru_rate = self.lru_score.rate();
        let priority_rate = self.priority_score.rate();
        self.lru_score = WindowScore::default();
        self.priority_score = WindowScore::default();

        let (challenger, lead) = match self.active {
            StrategyKind::Lru => (StrategyKind::Priority, priority_rate - lru_rate),
            StrategyKind::Priority => (StrategyKind::Lru, lru_rate - priority_rate),
        };
        if lead > self.margin {
            self.active = challenger;
            self.switches += 1;
            tracing::debug!(?challenger, lead, "adaptive cache switched strategy");
            return Some(challenger);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_switch_without_lead() {
        let mut policy = AdaptivePolicy::new(StrategyKind::Lru, 10, 0.05, 64);
        for i in 0..5 {
            policy.note_put(&format!("k{i}"), 1);
        }
        // Identical access pattern: both shadows hit equally
        let mut switched = None;
        for _ in 0..2 {
            for i in 0..5 {
                if let Some(kind) = policy.note_get(&format!("k{i}")) {
                    switched = Some(kind);
                }
            }
        }
        assert!(switched.is_none());
        assert_eq!(policy.active(), StrategyKind::Lru);
    }

    #[test]
    fn test_switch_when_priority_wins() {
        // Tiny shadows: LRU churns while priority pins the hot key
        let mut policy = AdaptivePolicy::new(StrategyKind::Lru, 8, 0.05, 2);
        policy.note_put("hot", 9);

        let mut recommended = None;
        for round in 0..6 {
            // Cold low-priority keys push "hot" out of the LRU shadow
            for op in [
                policy.note_put(&format!("cold-a{round}"), 1),
                policy.note_put(&format!("cold-b{round}"), 1),
                policy.note_get("hot"),
            ] {
                if let Some(kind) = op {
                    recommended = Some(kind);
                }
            }
        }
        assert_eq!(recommended, Some(StrategyKind::Priority));
        assert_eq!(policy.active(), StrategyKind::Priority);
        assert_eq!(policy.switches(), 1);
    }

    #[test]
    fn test_switch_only_at_window_boundary() {
        let mut policy = AdaptivePolicy::new(StrategyKind::Lru, 1000, 0.05, 2);
        policy.note_put("hot", 9);
        for round in 0..50 {
            policy.note_put(&format!("c{round}"), 1);
            assert_eq!(policy.note_get("hot"), None);
        }
        assert_eq!(policy.active(), StrategyKind::Lru);
    }
}
