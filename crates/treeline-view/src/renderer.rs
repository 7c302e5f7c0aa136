//! Item Renderer
//!
//! Turns a visible row into drawable output through a keyed render
//! cache. The expensive paint step is injected; this layer only
//! decides when a stored result can be reused. Unloaded rows get a
//! synthetic placeholder and never touch the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use treeline_core::CacheStats;

use crate::viewport::VisibleItem;

/// Style inputs that affect rendered output
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    pub font_size: f32,
    pub indent_width: f32,
    pub show_guides: bool,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self { font_size: 13.0, indent_width: 16.0, show_guides: true }
    }
}

impl RenderStyle {
    /// Stable hash of the style fields for cache keying
    pub fn style_hash(&self) -> u64 {
        let mut h = 0xcbf2_9ce4_8422_2325u64; // FNV-1a
        for bits in [
            self.font_size.to_bits() as u64,
            self.indent_width.to_bits() as u64,
            self.show_guides as u64,
        ] {
            h ^= bits;
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        h
    }
}

/// Drawable output for one row. The payload is opaque to this layer;
/// the host blits it onto its own surface.
#[derive(Debug, Clone)]
pub struct RenderedOutput {
    pub width: f32,
    pub height: f32,
    pub payload: Arc<Vec<u8>>,
    /// True for synthetic loading placeholders
    pub placeholder: bool,
}

impl RenderedOutput {
    fn placeholder_for(item: &VisibleItem) -> Self {
        Self {
            width: item.screen_rect.width,
            height: item.screen_rect.height,
            payload: Arc::new(Vec::new()),
            placeholder: true,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}

/// The expensive paint step, injected by the host
pub trait ItemPaint: Send {
    fn paint(&self, item: &VisibleItem, style: &RenderStyle) -> RenderedOutput;
}

impl<F> ItemPaint for F
where
    F: Fn(&VisibleItem, &RenderStyle) -> RenderedOutput + Send,
{
    fn paint(&self, item: &VisibleItem, style: &RenderStyle) -> RenderedOutput {
        self(item, style)
    }
}

/// Render cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub content_hash: u64,
    pub depth: u16,
    pub expanded: bool,
    pub style_hash: u64,
}

impl RenderKey {
    fn for_item(item: &VisibleItem, style: &RenderStyle) -> Self {
        Self {
            content_hash: item.content_hash,
            depth: item.depth,
            expanded: item.expanded,
            style_hash: style.style_hash(),
        }
    }
}

#[derive(Debug)]
struct CachedRender {
    output: RenderedOutput,
    created: Instant,
    last_used: Instant,
}

/// Renders visible items, reusing cached output where possible
pub struct ItemRenderer {
    paint: Box<dyn ItemPaint>,
    cache: HashMap<RenderKey, CachedRender>,
    max_entries: usize,
    max_age: Duration,
    hits: u64,
    misses: u64,
}

impl ItemRenderer {
    pub fn new(paint: Box<dyn ItemPaint>, max_entries: usize, max_age: Duration) -> Self {
        Self {
            paint,
            cache: HashMap::new(),
            max_entries: max_entries.max(1),
            max_age,
            hits: 0,
            misses: 0,
        }
    }

    /// Render one row. Never blocks: an unloaded row yields a
    /// placeholder without consulting the cache.
    pub fn render(&mut self, item: &VisibleItem, style: &RenderStyle) -> RenderedOutput {
        if !item.loaded {
            return RenderedOutput::placeholder_for(item);
        }

        let key = RenderKey::for_item(item, style);
        let now = Instant::now();

        if let Some(cached) = self.cache.get_mut(&key) {
            if now.duration_since(cached.created) <= self.max_age {
                cached.last_used = now;
                self.hits += 1;
                return cached.output.clone();
            }
            self.cache.remove(&key);
        }

        self.misses += 1;
        let output = self.paint.paint(item, style);
        while self.cache.len() >= self.max_entries {
            if !self.evict_oldest() {
                break;
            }
        }
        self.cache.insert(key, CachedRender { output: output.clone(), created: now, last_used: now });
        output
    }

    /// Evict the least recently used entry
    fn evict_oldest(&mut self) -> bool {
        let oldest = self
            .cache
            .iter()
            .min_by_key(|(_, c)| c.last_used)
            .map(|(k, _)| *k);
        match oldest {
            Some(key) => self.cache.remove(&key).is_some(),
            None => false,
        }
    }

    /// Drop entries past the age cap
    pub fn purge_expired(&mut self) {
        let max_age = self.max_age;
        let now = Instant::now();
        self.cache.retain(|_, c| now.duration_since(c.created) <= max_age);
    }

    /// Shrink the entry cap (memory pressure response). Evicts down
    /// to the new cap immediately.
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        while self.cache.len() > self.max_entries {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            size_bytes: self.cache.values().map(|c| c.output.size_bytes()).sum(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

impl std::fmt::Debug for ItemRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemRenderer")
            .field("entries", &self.cache.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
