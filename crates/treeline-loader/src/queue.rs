//! Load Request Queue
//!
//! Bounded priority queue ordered by (priority desc, enqueue order
//! asc). Pending requests are only ever upgraded, never downgraded;
//! at capacity the lowest-priority pending request is evicted first.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use treeline_core::NodeId;

/// A pending subtree load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub node: NodeId,
    /// Higher value dispatched first
    pub priority: i32,
    pub user_initiated: bool,
    /// Monotone enqueue stamp; FIFO tie-break within a priority
    pub seq: u64,
}

impl PartialOrd for LoadRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then earlier seq
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

/// Bounded priority queue with lazy removal
#[derive(Debug)]
pub struct LoadQueue {
    heap: BinaryHeap<LoadRequest>,
    /// Live (priority, seq) per pending node; heap entries that
    /// disagree are stale and skipped on pop
    pending: HashMap<NodeId, (i32, u64)>,
    capacity: usize,
    next_seq: u64,
}

impl LoadQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Enqueue or upgrade a request. Returns the node evicted to make
    /// room, if any. A pending request is never downgraded.
    pub fn push(&mut self, node: NodeId, priority: i32, user_initiated: bool) -> Option<NodeId> {
        if let Some(&(current, seq)) = self.pending.get(&node) {
            if priority > current {
                // Upgrade keeps the original enqueue stamp
                self.pending.insert(node, (priority, seq));
                self.heap.push(LoadRequest { node, priority, user_initiated, seq });
            }
            return None;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(node, (priority, seq));
        self.heap.push(LoadRequest { node, priority, user_initiated, seq });

        if self.pending.len() > self.capacity {
            return self.evict_lowest();
        }
        None
    }

    /// Drop the lowest-priority pending request; among equals, the
    /// youngest goes first so FIFO order among survivors holds.
    fn evict_lowest(&mut self) -> Option<NodeId> {
        let victim = self
            .pending
            .iter()
            .min_by(|a, b| {
                let (pa, sa) = *a.1;
                let (pb, sb) = *b.1;
                pa.cmp(&pb).then(sb.cmp(&sa))
            })
            .map(|(&node, _)| node)?;
        self.pending.remove(&victim);
        tracing::debug!(node = victim, "load queue full, evicted lowest priority");
        Some(victim)
    }

    /// Highest-priority pending request, FIFO within equal priority
    pub fn pop(&mut self) -> Option<LoadRequest> {
        while let Some(request) = self.heap.pop() {
            match self.pending.get(&request.node) {
                Some(&(priority, seq)) if priority == request.priority && seq == request.seq => {
                    self.pending.remove(&request.node);
                    return Some(request);
                }
                // Stale entry (upgraded, cancelled, or evicted)
                _ => continue,
            }
        }
        None
    }

    /// Cancel a still-pending request. No-op when absent.
    pub fn remove(&mut self, node: NodeId) -> bool {
        self.pending.remove(&node).is_some()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.pending.contains_key(&node)
    }

    /// Effective priority of a pending request
    pub fn priority_of(&self, node: NodeId) -> Option<i32> {
        self.pending.get(&node).map(|&(p, _)| p)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }
}
