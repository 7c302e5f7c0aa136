//! Treeline Memory
//!
//! Byte-budgeted accounting for everything the performance core keeps
//! alive: a priority-tiered pool that evicts strictly lower tiers to
//! admit new blocks, a per-node tracker that finds unreferenced
//! subtrees for cleanup, and a pressure monitor that classifies
//! aggregate usage against configured thresholds.

pub mod monitor;
pub mod pool;
pub mod tracker;

pub use monitor::{MemoryMonitor, PressureLevel};
pub use pool::{MemoryPool, PoolPriority};
pub use tracker::NodeMemoryTracker;
