//! Viewport Manager
//!
//! Maps a scroll offset and viewport size onto the visible index range
//! of the linearized tree, expanded by a buffer on both ends. Uniform
//! row heights resolve in O(1); per-row height overrides go through a
//! prefix-delta index with binary search.

use std::time::Instant;

use treeline_core::{NodeId, Rect};

use crate::prediction::{ScrollPredictor, ScrollSample};

/// Half-open index range over the logical row list
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportRange {
    /// First materialized row
    pub start_index: usize,
    /// One past the last materialized row
    pub end_index: usize,
    /// Pixel offset of `start_index`
    pub start_offset: f32,
    /// Pixel offset of `end_index`
    pub end_offset: f32,
    /// Rows in the range
    pub item_count: usize,
}

impl ViewportRange {
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index < self.end_index
    }
}

/// Row metadata supplied by the tree-model layer
#[derive(Debug, Clone, Copy)]
pub struct RowMeta {
    pub node: NodeId,
    pub depth: u16,
    pub expanded: bool,
    /// Whether the node's data is resident (placeholder otherwise)
    pub loaded: bool,
    /// Hash of the row's logical content, for render-cache keying
    pub content_hash: u64,
}

/// Read-only view of the linearized tree, owned by the host
pub trait RowSource {
    fn total_rows(&self) -> usize;
    fn row(&self, index: usize) -> Option<RowMeta>;
}

/// A row materialized for rendering. Ephemeral; rebuilt on every
/// viewport change, never persisted.
#[derive(Debug, Clone)]
pub struct VisibleItem {
    pub index: usize,
    pub node: NodeId,
    pub depth: u16,
    pub expanded: bool,
    pub loaded: bool,
    pub content_hash: u64,
    pub screen_rect: Rect,
}

/// Row-height index: a uniform default plus sparse overrides
#[derive(Debug, Clone)]
struct HeightIndex {
    default_height: f32,
    /// (row index, height), sorted by row index
    overrides: Vec<(usize, f32)>,
    /// delta_prefix[i] = sum of (height - default) over overrides[..i]
    delta_prefix: Vec<f32>,
}

impl HeightIndex {
    fn new(default_height: f32) -> Self {
        Self { default_height, overrides: Vec::new(), delta_prefix: vec![0.0] }
    }

    fn set_height(&mut self, index: usize, height: f32) {
        match self.overrides.binary_search_by_key(&index, |&(i, _)| i) {
            Ok(pos) => self.overrides[pos].1 = height,
            Err(pos) => self.overrides.insert(pos, (index, height)),
        }
        self.rebuild();
    }

    fn clear_heights(&mut self) {
        self.overrides.clear();
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.delta_prefix.clear();
        self.delta_prefix.push(0.0);
        let mut acc = 0.0;
        for &(_, h) in &self.overrides {
            acc += h - self.default_height;
            self.delta_prefix.push(acc);
        }
    }

    fn height_of(&self, index: usize) -> f32 {
        match self.overrides.binary_search_by_key(&index, |&(i, _)| i) {
            Ok(pos) => self.overrides[pos].1,
            Err(_) => self.default_height,
        }
    }

    /// Pixel offset of the top of `index`
    fn offset_of(&self, index: usize) -> f32 {
        let pos = self.overrides.partition_point(|&(i, _)| i < index);
        index as f32 * self.default_height + self.delta_prefix[pos]
    }

    /// Greatest row whose top offset is <= `offset`, clamped to
    /// [0, total). O(1) without overrides, O(log n) with.
    fn index_at(&self, offset: f32, total: usize) -> usize {
        if total == 0 {
            return 0;
        }
        if self.overrides.is_empty() {
            let index = (offset / self.default_height).floor() as usize;
            return index.min(total - 1);
        }
        // Binary search on the monotone offset_of
        let mut lo = 0usize;
        let mut hi = total; // exclusive
        while lo + 1 < hi {
            let mid = lo + (hi - lo) / 2;
            if self.offset_of(mid) <= offset {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }
}

/// Computes visible + buffered ranges from scroll state
#[derive(Debug)]
pub struct ViewportManager {
    buffer_items: usize,
    change_threshold: usize,
    heights: HeightIndex,
    predictor: ScrollPredictor,
    last_notified: Option<ViewportRange>,
    last_scroll: f32,
}

impl ViewportManager {
    pub fn new(default_item_height: f32, buffer_items: usize, change_threshold: usize) -> Self {
        Self {
            buffer_items,
            change_threshold,
            heights: HeightIndex::new(default_item_height),
            predictor: ScrollPredictor::new(),
            last_notified: None,
            last_scroll: 0.0,
        }
    }

    /// Record a measured row height that differs from the default
    pub fn set_item_height(&mut self, index: usize, height: f32) {
        self.heights.set_height(index, height);
    }

    /// Drop all height overrides (e.g. after a style change)
    pub fn reset_item_heights(&mut self) {
        self.heights.clear_heights();
    }

    /// Total scrollable height for `total_items` rows
    pub fn total_height(&self, total_items: usize) -> f32 {
        self.heights.offset_of(total_items)
    }

    /// Recompute the visible + buffered range. The returned bool is
    /// true when the range moved past the change threshold and a
    /// range-changed notification should fire.
    pub fn update(
        &mut self,
        scroll_offset: f32,
        viewport_height: f32,
        total_items: usize,
    ) -> (ViewportRange, bool) {
        let scroll = scroll_offset.max(0.0);
        self.predictor.record(ScrollSample {
            delta: scroll - self.last_scroll,
            at: Instant::now(),
        });
        self.last_scroll = scroll;

        if total_items == 0 {
            let range = ViewportRange::default();
            let changed = self.last_notified.map(|r| !r.is_empty()).unwrap_or(true);
            if changed {
                self.last_notified = Some(range);
            }
            return (range, changed);
        }

        let first = self.heights.index_at(scroll, total_items);
        let last = self.heights.index_at(scroll + viewport_height.max(0.0), total_items);

        let start_index = first.saturating_sub(self.buffer_items);
        let end_index = (last + 1 + self.buffer_items).min(total_items);

        let range = ViewportRange {
            start_index,
            end_index,
            start_offset: self.heights.offset_of(start_index),
            end_offset: self.heights.offset_of(end_index),
            item_count: end_index - start_index,
        };

        let changed = match self.last_notified {
            None => true,
            Some(prev) => {
                let ds = prev.start_index.abs_diff(range.start_index);
                let de = prev.end_index.abs_diff(range.end_index);
                ds.max(de) > self.change_threshold
            }
        };
        if changed {
            tracing::debug!(
                start = range.start_index,
                end = range.end_index,
                "visible range moved"
            );
            self.last_notified = Some(range);
        }
        (range, changed)
    }

    /// Materialize the rows of `range` with their screen rectangles.
    /// Rectangles are positioned in content space; the host subtracts
    /// the scroll offset when painting.
    pub fn visible_items(
        &self,
        range: &ViewportRange,
        viewport_width: f32,
        source: &dyn RowSource,
    ) -> Vec<VisibleItem> {
        let mut items = Vec::with_capacity(range.item_count);
        for index in range.start_index..range.end_index {
            let Some(meta) = source.row(index) else { continue };
            items.push(VisibleItem {
                index,
                node: meta.node,
                depth: meta.depth,
                expanded: meta.expanded,
                loaded: meta.loaded,
                content_hash: meta.content_hash,
                screen_rect: Rect::new(
                    0.0,
                    self.heights.offset_of(index),
                    viewport_width,
                    self.heights.height_of(index),
                ),
            });
        }
        items
    }

    /// Index range worth prefetching beyond the current range, based
    /// on recent scroll direction. None when the direction is unclear.
    pub fn prefetch_range(
        &self,
        range: &ViewportRange,
        total_items: usize,
        lookahead_items: usize,
    ) -> Option<std::ops::Range<usize>> {
        self.predictor
            .prefetch_indices(range.start_index, range.end_index, total_items, lookahead_items)
    }

    /// Direction the user is scrolling, from recent samples
    pub fn scroll_direction(&self) -> crate::prediction::ScrollDirection {
        self.predictor.direction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatRows(usize);

    impl RowSource for FlatRows {
        fn total_rows(&self) -> usize {
            self.0
        }
        fn row(&self, index: usize) -> Option<RowMeta> {
            (index < self.0).then(|| RowMeta {
                node: index as NodeId,
                depth: 0,
                expanded: false,
                loaded: true,
                content_hash: index as u64,
            })
        }
    }

    fn manager() -> ViewportManager {
        ViewportManager::new(20.0, 10, 2)
    }

    #[test]
    fn test_range_bounds_invariant() {
        let mut vm = manager();
        for scroll in [0.0f32, 35.0, 1000.0, 1e7, 2e7] {
            let (range, _) = vm.update(scroll, 600.0, 1_000_000);
            assert!(range.start_index <= range.end_index);
            assert!(range.end_index <= 1_000_000);
            // visible rows (600/20 = 30) + 2 * buffer + partial row
            assert!(range.item_count <= 30 + 2 * 10 + 2);
        }
    }

    #[test]
    fn test_uniform_heights() {
        let mut vm = manager();
        let (range, changed) = vm.update(200.0, 600.0, 1000);
        assert!(changed);
        // row 10 is the first visible; buffer reaches back to 0
        assert_eq!(range.start_index, 0);
        // last visible is row 40, plus buffer
        assert_eq!(range.end_index, 51);
        assert_eq!(range.item_count, 51);
        assert_eq!(range.start_offset, 0.0);
    }

    #[test]
    fn test_empty_list() {
        let mut vm = manager();
        let (range, _) = vm.update(500.0, 600.0, 0);
        assert!(range.is_empty());
        assert_eq!(range.end_index, 0);
    }

    #[test]
    fn test_change_threshold_suppresses_notification() {
        let mut vm = manager();
        let (_, changed) = vm.update(0.0, 600.0, 1000);
        assert!(changed);
        // Sub-row scroll delta: same indices, no notification
        let (_, changed) = vm.update(5.0, 600.0, 1000);
        assert!(!changed);
        // Two rows of drift is still within the threshold
        let (_, changed) = vm.update(40.0, 600.0, 1000);
        assert!(!changed);
        // Past the threshold it fires and rebases
        let (range, changed) = vm.update(100.0, 600.0, 1000);
        assert!(changed);
        assert_eq!(range.end_index, 46);
    }

    #[test]
    fn test_height_overrides() {
        let mut vm = manager();
        // Row 0 is a tall header
        vm.set_item_height(0, 200.0);
        let (range, _) = vm.update(0.0, 600.0, 100);
        assert_eq!(range.start_index, 0);
        // row 21 starts exactly at the fold (offset 600)
        assert_eq!(range.end_index, (21 + 1 + 10).min(100));

        assert_eq!(vm.total_height(100), 200.0 + 99.0 * 20.0);
    }

    #[test]
    fn test_visible_items_rects() {
        let mut vm = manager();
        vm.set_item_height(1, 50.0);
        let (range, _) = vm.update(0.0, 100.0, 10);
        let items = vm.visible_items(&range, 400.0, &FlatRows(10));
        assert_eq!(items.len(), range.item_count);
        assert_eq!(items[0].screen_rect.y, 0.0);
        assert_eq!(items[1].screen_rect.height, 50.0);
        assert_eq!(items[2].screen_rect.y, 70.0);
        assert_eq!(items[2].screen_rect.width, 400.0);
    }

    #[test]
    fn test_scroll_clamped_to_end() {
        let mut vm = manager();
        let (range, _) = vm.update(1e9, 600.0, 50);
        assert_eq!(range.end_index, 50);
        assert!(range.start_index < 50);
    }
}
