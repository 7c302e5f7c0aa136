//! Tree Data Provider
//!
//! The injected fetch path. Called only from fetch-pool worker
//! threads; implementations must be safe to call concurrently for
//! distinct node ids.

use treeline_core::NodeId;

/// Error surfaced by a subtree fetch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Failed(String),
    #[error("data source unavailable")]
    Unavailable,
}

/// One fetched child row
#[derive(Debug, Clone, PartialEq)]
pub struct ChildNode {
    pub id: NodeId,
    pub label: String,
    pub has_children: bool,
    /// Caller-estimated resident size of the node's data
    pub size_bytes: usize,
}

/// Supplies children for a node. Timeouts are the provider's
/// responsibility; the loader only tracks failure.
pub trait TreeDataProvider: Send + Sync {
    fn fetch_children(&self, node: NodeId) -> Result<Vec<ChildNode>, FetchError>;
}

impl<F> TreeDataProvider for F
where
    F: Fn(NodeId) -> Result<Vec<ChildNode>, FetchError> + Send + Sync,
{
    fn fetch_children(&self, node: NodeId) -> Result<Vec<ChildNode>, FetchError> {
        self(node)
    }
}
