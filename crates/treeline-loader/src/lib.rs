//! Treeline Loader
//!
//! On-demand subtree loading: a bounded priority queue of load
//! requests, a per-node loading state machine with retry accounting,
//! and a background fetch pool. Fetches never run on the interactive
//! thread; completions come back over a channel and are applied by
//! whoever owns the manager.

pub mod manager;
pub mod provider;
pub mod queue;
pub mod state;
pub mod worker;

pub use manager::{LazyLoadManager, LoadCompletion, LoaderStats, PlaceholderKind};
pub use provider::{ChildNode, FetchError, TreeDataProvider};
pub use queue::{LoadQueue, LoadRequest};
pub use state::{LoadingState, NodeStates};
pub use worker::{FetchOutcome, FetchPool, FetchTask};
