//! Loading State Machine
//!
//! Per-node load state with retry accounting. Transitions:
//! Unloaded → Loading → {Loaded, Error}; Error → Loading only while
//! retries remain; Loaded is terminal until explicitly invalidated.

use std::collections::HashMap;

use treeline_core::NodeId;

/// Load state of one node's subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Error,
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeLoadState {
    state: LoadingState,
    error_count: u32,
}

/// Counts per state, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub loading: usize,
    pub loaded: usize,
    pub errors: usize,
}

/// Tracks loading state for every node seen so far
#[derive(Debug)]
pub struct NodeStates {
    nodes: HashMap<NodeId, NodeLoadState>,
    max_retries: u32,
}

impl NodeStates {
    pub fn new(max_retries: u32) -> Self {
        Self { nodes: HashMap::new(), max_retries }
    }

    pub fn state(&self, node: NodeId) -> LoadingState {
        self.nodes.get(&node).map(|n| n.state).unwrap_or_default()
    }

    pub fn error_count(&self, node: NodeId) -> u32 {
        self.nodes.get(&node).map(|n| n.error_count).unwrap_or(0)
    }

    /// Whether an automatic retry is still permitted
    pub fn should_retry(&self, node: NodeId) -> bool {
        match self.nodes.get(&node) {
            Some(n) => n.state == LoadingState::Error && n.error_count < self.max_retries,
            None => false,
        }
    }

    /// Unloaded → Loading, or Error → Loading. Returns false for an
    /// illegal transition.
    pub fn mark_loading(&mut self, node: NodeId) -> bool {
        let entry = self.nodes.entry(node).or_default();
        match entry.state {
            LoadingState::Unloaded | LoadingState::Error => {
                entry.state = LoadingState::Loading;
                true
            }
            LoadingState::Loading | LoadingState::Loaded => false,
        }
    }

    /// Loading → Loaded; clears error history
    pub fn mark_loaded(&mut self, node: NodeId) {
        let entry = self.nodes.entry(node).or_default();
        entry.state = LoadingState::Loaded;
        entry.error_count = 0;
    }

    /// Loading → Error. Returns the new error count.
    pub fn mark_failed(&mut self, node: NodeId) -> u32 {
        let entry = self.nodes.entry(node).or_default();
        entry.state = LoadingState::Error;
        entry.error_count = entry.error_count.saturating_add(1);
        entry.error_count
    }

    /// User-initiated fresh request on an exhausted node: back to
    /// Unloaded with a clean retry budget.
    pub fn reset(&mut self, node: NodeId) {
        self.nodes.insert(node, NodeLoadState::default());
    }

    /// Loaded → Unloaded (explicit invalidation)
    pub fn invalidate(&mut self, node: NodeId) {
        if let Some(entry) = self.nodes.get_mut(&node) {
            if entry.state == LoadingState::Loaded {
                entry.state = LoadingState::Unloaded;
            }
        }
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for n in self.nodes.values() {
            match n.state {
                LoadingState::Loading => counts.loading += 1,
                LoadingState::Loaded => counts.loaded += 1,
                LoadingState::Error => counts.errors += 1,
                LoadingState::Unloaded => {}
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut states = NodeStates::new(3);
        assert_eq!(states.state(1), LoadingState::Unloaded);

        assert!(states.mark_loading(1));
        assert_eq!(states.state(1), LoadingState::Loading);
        // Double-loading rejected
        assert!(!states.mark_loading(1));

        states.mark_loaded(1);
        assert_eq!(states.state(1), LoadingState::Loaded);
        // Loaded is terminal until invalidated
        assert!(!states.mark_loading(1));

        states.invalidate(1);
        assert_eq!(states.state(1), LoadingState::Unloaded);
        assert!(states.mark_loading(1));
    }

    #[test]
    fn test_retry_budget() {
        let mut states = NodeStates::new(3);

        for expected in 1..=3u32 {
            assert!(states.mark_loading(9));
            assert_eq!(states.mark_failed(9), expected);
        }
        // Third failure exhausts the budget
        assert!(!states.should_retry(9));

        // A fresh user request resets eligibility
        states.reset(9);
        assert_eq!(states.error_count(9), 0);
        assert!(states.mark_loading(9));
    }

    #[test]
    fn test_should_retry_below_limit() {
        let mut states = NodeStates::new(3);
        states.mark_loading(5);
        states.mark_failed(5);
        assert!(states.should_retry(5));
    }

    #[test]
    fn test_loaded_clears_errors() {
        let mut states = NodeStates::new(3);
        states.mark_loading(2);
        states.mark_failed(2);
        states.mark_loading(2);
        states.mark_loaded(2);
        assert_eq!(states.error_count(2), 0);
    }
}
