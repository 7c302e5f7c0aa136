//! Node Memory Tracker
//!
//! Per-node byte and reference accounting. A node is referenced while
//! any live view component holds it (visible rows, expanded ancestors,
//! pinned selections); cleanup passes reclaim whatever has dropped to
//! zero references.

use std::collections::HashMap;

use treeline_core::NodeId;

#[derive(Debug, Clone, Copy, Default)]
struct NodeUsage {
    size_bytes: usize,
    refs: u32,
}

#[derive(Debug, Default)]
pub struct NodeMemoryTracker {
    nodes: HashMap<NodeId, NodeUsage>,
    total_bytes: usize,
}

impl NodeMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a node at the given size. Re-registering resizes.
    pub fn register(&mut self, node: NodeId, size_bytes: usize) {
        let usage = self.nodes.entry(node).or_default();
        self.total_bytes = self.total_bytes - usage.size_bytes + size_bytes;
        usage.size_bytes = size_bytes;
    }

    pub fn set_size(&mut self, node: NodeId, size_bytes: usize) {
        self.register(node, size_bytes);
    }

    /// Add a reference. Untracked nodes are registered at zero size so
    /// a retain before the fetch completes is not lost.
    pub fn retain(&mut self, node: NodeId) {
        self.nodes.entry(node).or_default().refs += 1;
    }

    pub fn release(&mut self, node: NodeId) {
        if let Some(usage) = self.nodes.get_mut(&node) {
            usage.refs = usage.refs.saturating_sub(1);
        }
    }

    pub fn ref_count(&self, node: NodeId) -> u32 {
        self.nodes.get(&node).map(|u| u.refs).unwrap_or(0)
    }

    pub fn size_of(&self, node: NodeId) -> usize {
        self.nodes.get(&node).map(|u| u.size_bytes).unwrap_or(0)
    }

    /// Nodes with zero references, the reclaim candidates.
    pub fn unreferenced(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, usage)| usage.refs == 0)
            .map(|(&node, _)| node)
            .collect()
    }

    /// Stop tracking a node, returning its size.
    pub fn remove(&mut self, node: NodeId) -> Option<usize> {
        let usage = self.nodes.remove(&node)?;
        self.total_bytes -= usage.size_bytes;
        Some(usage.size_bytes)
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
