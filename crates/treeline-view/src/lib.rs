//! Treeline View
//!
//! Viewport-driven virtualization: computes which logical rows of the
//! linearized tree are visible (plus a buffer), predicts scroll
//! direction for prefetch, and renders visible items through a keyed
//! render cache.

pub mod prediction;
pub mod renderer;
pub mod viewport;

pub use prediction::{ScrollDirection, ScrollPredictor, ScrollSample};
pub use renderer::{
    ItemPaint, ItemRenderer, RenderKey, RenderStyle, RenderedOutput,
};
pub use viewport::{
    RowMeta, RowSource, ViewportManager, ViewportRange, VisibleItem,
};
