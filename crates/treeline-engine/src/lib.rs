//! Treeline Engine
//!
//! The facade the hosting widget talks to. One `TreeEngine` owns the
//! viewport manager, the item renderer, the lazy loader, the artifact
//! cache, and the memory accounting, and wires their interactions: a
//! viewport update requests loads for unloaded rows, a completed load
//! registers its memory, a pressure crossing triggers cleanup. The
//! host drives it with `update_viewport` on scroll and `tick` on its
//! frame or timer loop.

pub mod engine;
pub mod scheduler;

pub use engine::{EngineStats, Frame, RenderedRow, TreeEngine};
pub use scheduler::{Scheduler, TickPlan};
