//! Lazy Loading Manager
//!
//! Admits load requests, dispatches them in priority batches to the
//! fetch pool, and applies completions. While a subtree is in flight
//! the manager tracks a placeholder for it; the tree-model layer
//! renders that placeholder until real children arrive.

use std::collections::HashMap;
use std::sync::Arc;

use treeline_core::{EngineEvent, EventBus, NodeId};

use crate::provider::{ChildNode, FetchError, TreeDataProvider};
use crate::queue::LoadQueue;
use crate::state::{LoadingState, NodeStates, StateCounts};
use crate::worker::{FetchPool, FetchTask};

/// Synthetic node kind shown while the real children are absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Loading,
    Failed,
}

/// A finished fetch, handed to the host to apply to its tree
#[derive(Debug)]
pub struct LoadCompletion {
    pub node: NodeId,
    pub result: Result<Vec<ChildNode>, FetchError>,
}

/// Loader diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderStats {
    pub pending: usize,
    pub loading: usize,
    pub loaded: usize,
    pub errors: usize,
}

/// Priority scheduling and lifecycle for subtree loads
pub struct LazyLoadManager {
    states: NodeStates,
    queue: LoadQueue,
    pool: FetchPool,
    placeholders: HashMap<NodeId, PlaceholderKind>,
    batch_size: usize,
    /// Cleared by cancel_all; restored by a user-initiated request
    accepting: bool,
    bus: Arc<EventBus>,
}

impl LazyLoadManager {
    pub fn new(
        provider: Arc<dyn TreeDataProvider>,
        bus: Arc<EventBus>,
        batch_size: usize,
        queue_capacity: usize,
        max_retries: u32,
        fetch_workers: usize,
    ) -> Self {
        Self {
            states: NodeStates::new(max_retries),
            queue: LoadQueue::new(queue_capacity),
            pool: FetchPool::new(fetch_workers, provider),
            placeholders: HashMap::new(),
            batch_size: batch_size.max(1),
            accepting: true,
            bus,
        }
    }

    /// Request a subtree load. False only when the node is already
    /// Loading or Loaded (or Error with retries exhausted, unless the
    /// request is user-initiated, which resets eligibility).
    pub fn request_load(&mut self, node: NodeId, priority: i32, user_initiated: bool) -> bool {
        match self.states.state(node) {
            LoadingState::Loading | LoadingState::Loaded => return false,
            LoadingState::Error => {
                if user_initiated {
                    self.states.reset(node);
                } else if !self.states.should_retry(node) {
                    return false;
                }
            }
            LoadingState::Unloaded => {}
        }

        if user_initiated && !self.accepting {
            self.accepting = true;
            self.pool.resume();
        }

        self.queue.push(node, priority, user_initiated);
        true
    }

    /// Cancel a still-pending request; no-op once dispatched
    pub fn cancel(&mut self, node: NodeId) -> bool {
        self.queue.remove(node)
    }

    /// Drop all pending requests and stop workers from accepting
    /// further batches. In-progress fetches run to completion;
    /// dispatched tasks no worker picked up yet are unwound to
    /// Unloaded so they stay requestable.
    pub fn cancel_all(&mut self) {
        self.queue.clear();
        self.accepting = false;
        for task in self.pool.stop_accepting() {
            self.states.reset(task.node);
            self.placeholders.remove(&task.node);
        }
    }

    /// Dequeue up to `batch_size` highest-priority requests and hand
    /// them to the fetch pool. Returns the number dispatched.
    pub fn dispatch_batch(&mut self) -> usize {
        if !self.accepting {
            return 0;
        }
        let mut dispatched = 0;
        while dispatched < self.batch_size {
            let Some(request) = self.queue.pop() else { break };
            if !self.states.mark_loading(request.node) {
                // Raced with a completed load; drop silently
                continue;
            }
            self.placeholders.insert(request.node, PlaceholderKind::Loading);
            self.bus.emit(EngineEvent::LoadStarted { node: request.node });
            self.pool.submit(FetchTask {
                node: request.node,
                priority: request.priority,
                user_initiated: request.user_initiated,
            });
            dispatched += 1;
        }
        dispatched
    }

    /// Apply completions from the fetch pool. Failures below the
    /// retry limit are re-enqueued automatically; exhausted nodes
    /// keep their error placeholder until a fresh user request.
    pub fn drain_completions(&mut self) -> Vec<LoadCompletion> {
        let outcomes = self.pool.drain_results();
        let mut completions = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let node = outcome.task.node;
            match &outcome.result {
                Ok(children) => {
                    self.states.mark_loaded(node);
                    self.placeholders.remove(&node);
                    self.bus.emit(EngineEvent::LoadCompleted { node, children: children.len() });
                }
                Err(error) => {
                    let failures = self.states.mark_failed(node);
                    self.placeholders.insert(node, PlaceholderKind::Failed);
                    tracing::warn!(node, failures, %error, "subtree fetch failed");
                    self.bus.emit(EngineEvent::LoadFailed { node, error: error.to_string() });
                    if self.states.should_retry(node) {
                        self.queue.push(node, outcome.task.priority, outcome.task.user_initiated);
                    }
                }
            }
            completions.push(LoadCompletion { node, result: outcome.result });
        }
        completions
    }

    /// Placeholder currently standing in for a node's children
    pub fn placeholder(&self, node: NodeId) -> Option<PlaceholderKind> {
        self.placeholders.get(&node).copied()
    }

    pub fn loading_state(&self, node: NodeId) -> LoadingState {
        self.states.state(node)
    }

    pub fn should_retry(&self, node: NodeId) -> bool {
        self.states.should_retry(node)
    }

    /// Loaded → Unloaded, so a later request refetches
    pub fn invalidate(&mut self, node: NodeId) {
        self.states.invalidate(node);
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> LoaderStats {
        let StateCounts { loading, loaded, errors } = self.states.counts();
        LoaderStats { pending: self.queue.len(), loading, loaded, errors }
    }
}

impl std::fmt::Debug for LazyLoadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyLoadManager")
            .field("pending", &self.queue.len())
            .field("accepting", &self.accepting)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    fn provider_ok() -> Arc<dyn TreeDataProvider> {
        Arc::new(|node: NodeId| {
            Ok(vec![
                ChildNode { id: node * 10, label: "a".into(), has_children: false, size_bytes: 32 },
                ChildNode { id: node * 10 + 1, label: "b".into(), has_children: true, size_bytes: 32 },
            ])
        })
    }

    fn provider_failing() -> Arc<dyn TreeDataProvider> {
        Arc::new(|_node: NodeId| Err(FetchError::Failed("io".into())))
    }

    fn manager_with(provider: Arc<dyn TreeDataProvider>, batch_size: usize) -> LazyLoadManager {
        LazyLoadManager::new(provider, Arc::new(EventBus::new()), batch_size, 64, 3, 1)
    }

    fn settle(manager: &mut LazyLoadManager) -> Vec<LoadCompletion> {
        let mut completions = Vec::new();
        for _ in 0..200 {
            completions.extend(manager.drain_completions());
            if !completions.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        completions
    }

    #[test]
    fn test_request_accepted_once() {
        let mut m = manager_with(provider_ok(), 4);
        assert!(m.request_load(1, 5, true));
        // Still pending, not yet Loading: re-request is a priority merge
        assert!(m.request_load(1, 3, false));
        assert_eq!(m.pending_len(), 1);

        m.dispatch_batch();
        // Now Loading: rejected
        assert!(!m.request_load(1, 9, true));
    }

    #[test]
    fn test_batch_dispatch_order() {
        let mut m = manager_with(provider_ok(), 2);
        m.request_load(1, 1, false); // A
        m.request_load(2, 5, false); // B
        m.request_load(3, 5, false); // C after B

        assert_eq!(m.dispatch_batch(), 2);
        // A remains queued
        assert_eq!(m.pending_len(), 1);
        assert_eq!(m.loading_state(2), LoadingState::Loading);
        assert_eq!(m.loading_state(3), LoadingState::Loading);
        assert_eq!(m.loading_state(1), LoadingState::Unloaded);
    }

    #[test]
    fn test_completion_applies_state() {
        let mut m = manager_with(provider_ok(), 4);
        m.request_load(7, 5, true);
        m.dispatch_batch();
        assert_eq!(m.placeholder(7), Some(PlaceholderKind::Loading));

        let completions = settle(&mut m);
        assert_eq!(completions.len(), 1);
        assert_eq!(m.loading_state(7), LoadingState::Loaded);
        assert_eq!(m.placeholder(7), None);
        // Loaded is terminal for request_load
        assert!(!m.request_load(7, 9, true));
    }

    #[test]
    fn test_retry_then_exhaustion() {
        let mut m = manager_with(provider_failing(), 4);
        m.request_load(9, 5, true);

        // Each dispatch fails and auto-requeues until retries run out
        for _ in 0..3 {
            assert!(m.dispatch_batch() > 0 || m.pending_len() > 0);
            m.dispatch_batch();
            let completions = settle(&mut m);
            assert!(completions.iter().all(|c| c.result.is_err()));
        }

        assert!(!m.should_retry(9));
        assert_eq!(m.placeholder(9), Some(PlaceholderKind::Failed));
        // Speculative re-request is refused, user-initiated resets
        assert!(!m.request_load(9, 5, false));
        assert!(m.request_load(9, 5, true));
        assert_eq!(m.loading_state(9), LoadingState::Unloaded);
    }

    #[test]
    fn test_cancel_all_stops_dispatch() {
        let mut m = manager_with(provider_ok(), 4);
        m.request_load(1, 5, false);
        m.request_load(2, 5, false);
        m.cancel_all();

        assert_eq!(m.pending_len(), 0);
        assert_eq!(m.dispatch_batch(), 0);

        // A user-initiated request restores the pipeline
        assert!(m.request_load(3, 5, true));
        assert_eq!(m.dispatch_batch(), 1);
    }

    #[test]
    fn test_cancel_all_unwinds_dispatched_tasks() {
        let provider: Arc<dyn TreeDataProvider> = Arc::new(|node: NodeId| {
            thread::sleep(Duration::from_millis(150));
            Ok(vec![ChildNode { id: node * 10, label: "a".into(), has_children: false, size_bytes: 32 }])
        });
        let mut m = manager_with(provider, 3);
        m.request_load(1, 5, false);
        m.request_load(2, 5, false);
        m.request_load(3, 5, false);
        assert_eq!(m.dispatch_batch(), 3);

        // Let the single worker pick up the first task, then cancel
        thread::sleep(Duration::from_millis(50));
        m.cancel_all();

        // Tasks no worker reached must not stay Loading forever
        assert_eq!(m.loading_state(2), LoadingState::Unloaded);
        assert_eq!(m.loading_state(3), LoadingState::Unloaded);
        assert_eq!(m.placeholder(2), None);
        assert_eq!(m.placeholder(3), None);

        // The in-flight fetch still runs to completion
        let completions = settle(&mut m);
        assert!(completions.iter().any(|c| c.node == 1 && c.result.is_ok()));
        assert_eq!(m.loading_state(1), LoadingState::Loaded);

        // Unwound nodes accept a fresh user request
        assert!(m.request_load(2, 9, true));
        assert_eq!(m.dispatch_batch(), 1);
    }

    #[test]
    fn test_events_emitted() {
        let bus = Arc::new(EventBus::new());
        let started = Arc::new(AtomicU32::new(0));
        let completed = Arc::new(AtomicU32::new(0));
        {
            let started = Arc::clone(&started);
            let completed = Arc::clone(&completed);
            bus.subscribe(move |event| match event {
                EngineEvent::LoadStarted { .. } => {
                    started.fetch_add(1, Ordering::SeqCst);
                }
                EngineEvent::LoadCompleted { .. } => {
                    completed.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            });
        }

        let mut m = LazyLoadManager::new(provider_ok(), bus, 4, 64, 3, 1);
        m.request_load(4, 5, true);
        m.dispatch_batch();
        settle(&mut m);

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
}
