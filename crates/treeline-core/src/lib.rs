//! Treeline Core
//!
//! Shared vocabulary for the Treeline performance core: node ids,
//! geometry, configuration, cache categories, statistics, and the
//! notification surface toward the hosting widget.

pub mod config;
pub mod events;
pub mod geometry;
pub mod stats;

/// Stable node identifier. Parents are referenced by id, never by an
/// owning edge, so the tree model can live in an external arena.
pub type NodeId = u64;

pub use config::Config;
pub use events::{EngineEvent, EventBus, EventLog};
pub use geometry::Rect;
pub use stats::CacheStats;

/// Category of a cached artifact. Used for budget accounting and
/// one-pass invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CacheCategory {
    /// Rendered row content
    Render,
    /// Layout metrics (row heights, position index segments)
    Layout,
    /// Search / filter result sets
    Search,
    /// Fetched node data
    Data,
}
