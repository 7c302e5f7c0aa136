//! Tree Engine
//!
//! Owns the four engines and the interactions between them. The host
//! keeps the tree model; the engine keeps everything derived from it:
//! the materialized range, rendered rows, in-flight loads, cached
//! artifacts, and the byte accounting that decides when to let go.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use treeline_cache::{CacheManager, StrategyKind};
use treeline_core::{CacheStats, Config, EngineEvent, EventBus, NodeId};
use treeline_loader::{LazyLoadManager, LoadCompletion, LoaderStats, TreeDataProvider};
use treeline_memory::{MemoryMonitor, MemoryPool, NodeMemoryTracker, PoolPriority, PressureLevel};
use treeline_view::{
    ItemPaint, ItemRenderer, RenderStyle, RenderedOutput, RowSource, ViewportManager,
    ViewportRange, VisibleItem,
};

use crate::scheduler::Scheduler;

/// Priority for loads the user is looking at right now
const VISIBLE_LOAD_PRIORITY: i32 = 100;
/// Priority for speculative loads ahead of the scroll direction
const PREFETCH_PRIORITY: i32 = 10;

fn node_key(node: NodeId) -> String {
    format!("node:{node}")
}

/// One row of a materialized frame
#[derive(Debug, Clone)]
pub struct RenderedRow {
    pub item: VisibleItem,
    pub output: RenderedOutput,
}

/// Result of a viewport update, ready to paint
#[derive(Debug, Clone)]
pub struct Frame {
    pub range: ViewportRange,
    pub rows: Vec<RenderedRow>,
}

/// Aggregate diagnostics across the engines
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub loader: LoaderStats,
    pub cache: CacheStats,
    pub render: CacheStats,
    pub used_bytes: usize,
    pub usage_percent: f64,
    pub pressure: PressureLevel,
}

pub struct TreeEngine {
    config: Config,
    bus: Arc<EventBus>,
    viewport: ViewportManager,
    renderer: ItemRenderer,
    style: RenderStyle,
    loader: LazyLoadManager,
    cache: CacheManager,
    pool: MemoryPool,
    tracker: NodeMemoryTracker,
    monitor: MemoryMonitor,
    scheduler: Scheduler,
    /// Nodes currently holding a visibility reference
    visible_nodes: HashSet<NodeId>,
}

impl TreeEngine {
    pub fn new(
        config: Config,
        paint: Box<dyn ItemPaint>,
        provider: Arc<dyn TreeDataProvider>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        Self {
            viewport: ViewportManager::new(
                config.default_item_height,
                config.buffer_items,
                config.range_change_threshold,
            ),
            renderer: ItemRenderer::new(
                paint,
                config.render_cache_entries,
                config.render_cache_max_age,
            ),
            style: RenderStyle::default(),
            loader: LazyLoadManager::new(
                Arc::clone(&provider),
                Arc::clone(&bus),
                config.batch_size,
                config.queue_capacity,
                config.max_retries,
                config.fetch_workers,
            ),
            cache: CacheManager::adaptive(
                config.cache_max_bytes,
                config.adaptive_window,
                config.adaptive_margin,
                Arc::clone(&bus),
            ),
            pool: MemoryPool::new(config.memory_budget),
            tracker: NodeMemoryTracker::new(),
            monitor: MemoryMonitor::new(
                config.memory_budget,
                config.pressure_threshold,
                config.critical_threshold,
            ),
            scheduler: Scheduler::new(
                config.dispatch_interval,
                config.cleanup_interval,
                config.stats_interval,
            ),
            visible_nodes: HashSet::new(),
            bus,
            config,
        }
    }

    /// The notification bus. Subscribe before driving the engine.
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn set_style(&mut self, style: RenderStyle) {
        // Cache keys carry the style hash, so stale output simply
        // stops being hit
        self.style = style;
    }

    pub fn set_item_height(&mut self, index: usize, height: f32) {
        self.viewport.set_item_height(index, height);
    }

    pub fn total_height(&self, total_items: usize) -> f32 {
        self.viewport.total_height(total_items)
    }

    /// Recompute the visible range and materialize its rows. Unloaded
    /// rows come back as placeholders and are queued for loading;
    /// rows ahead of the scroll direction are queued speculatively.
    pub fn update_viewport(
        &mut self,
        scroll_offset: f32,
        viewport_width: f32,
        viewport_height: f32,
        source: &dyn RowSource,
    ) -> Frame {
        let total = source.total_rows();
        let (range, changed) = self.viewport.update(scroll_offset, viewport_height, total);
        if changed {
            self.bus.emit(EngineEvent::RangeChanged {
                start: range.start_index,
                end: range.end_index,
            });
        }

        let items = self.viewport.visible_items(&range, viewport_width, source);
        self.swap_visibility_refs(&items);

        for item in &items {
            if !item.loaded {
                self.loader
                    .request_load(item.node, VISIBLE_LOAD_PRIORITY, false);
            }
        }
        if let Some(ahead) = self
            .viewport
            .prefetch_range(&range, total, self.config.buffer_items * 2)
        {
            for index in ahead {
                if let Some(meta) = source.row(index) {
                    if !meta.loaded {
                        self.loader.request_load(meta.node, PREFETCH_PRIORITY, false);
                    }
                }
            }
        }

        let rows = items
            .into_iter()
            .map(|item| {
                let output = self.renderer.render(&item, &self.style);
                RenderedRow { item, output }
            })
            .collect();
        Frame { range, rows }
    }

    /// Move visibility references from the previous frame's nodes to
    /// this frame's.
    fn swap_visibility_refs(&mut self, items: &[VisibleItem]) {
        let current: HashSet<NodeId> = items.iter().map(|i| i.node).collect();
        for &node in self.visible_nodes.difference(&current) {
            self.tracker.release(node);
        }
        for &node in current.difference(&self.visible_nodes) {
            self.tracker.retain(node);
        }
        self.visible_nodes = current;
    }

    /// Explicit expand by the user. Retries are reset if the node had
    /// exhausted them.
    pub fn expand(&mut self, node: NodeId) -> bool {
        self.loader.request_load(node, VISIBLE_LOAD_PRIORITY, true)
    }

    /// Collapse cancels a pending load for the node; an in-flight
    /// fetch still completes and stays cached.
    pub fn collapse(&mut self, node: NodeId) {
        self.loader.cancel(node);
    }

    /// Drop all pending loads, e.g. when the view is torn down or the
    /// model is about to be replaced.
    pub fn cancel_loads(&mut self) {
        self.loader.cancel_all();
    }

    /// Forget a node's fetched children and every cached artifact
    /// derived from it.
    pub fn invalidate(&mut self, node: NodeId) {
        self.loader.invalidate(node);
        self.cache.invalidate_dependency(&node_key(node));
        self.pool.remove(&node_key(node));
        if let Some(size) = self.tracker.remove(node) {
            tracing::debug!(node, size, "node invalidated");
        }
    }

    /// Artifact cache, for the host to store search results, layout
    /// segments, and other derived data.
    pub fn cache(&mut self) -> &mut CacheManager {
        &mut self.cache
    }

    pub fn cache_strategy(&self) -> StrategyKind {
        self.cache.strategy_kind()
    }

    /// Drive the periodic duties. Returns completions the host must
    /// apply to its tree model.
    pub fn tick(&mut self, now: Instant) -> Vec<LoadCompletion> {
        let plan = self.scheduler.plan(now);
        let mut completions = Vec::new();
        if plan.dispatch {
            self.loader.dispatch_batch();
            completions = self.apply_completions();
        }
        if plan.cleanup {
            self.run_cleanup();
        }
        if plan.stats {
            let stats = self.stats();
            tracing::debug!(
                used = stats.used_bytes,
                usage_percent = stats.usage_percent,
                cache_hit_rate = stats.cache.hit_rate(),
                render_hit_rate = stats.render.hit_rate(),
                "engine stats"
            );
        }
        completions
    }

    /// Drain fetch completions, registering the memory of each loaded
    /// subtree before handing the batch to the host.
    fn apply_completions(&mut self) -> Vec<LoadCompletion> {
        let completions = self.loader.drain_completions();
        for completion in &completions {
            if let Ok(children) = &completion.result {
                let size: usize = children.iter().map(|c| c.size_bytes).sum();
                self.tracker.register(completion.node, size);
                let priority = if self.visible_nodes.contains(&completion.node) {
                    PoolPriority::High
                } else {
                    PoolPriority::Normal
                };
                if size > 0 && !self.pool.add(node_key(completion.node), size, priority) {
                    tracing::debug!(node = completion.node, size, "pool refused subtree block");
                }
            }
        }
        completions
    }

    fn used_bytes(&self) -> usize {
        self.tracker.total_bytes() + self.cache.current_bytes() + self.renderer.stats().size_bytes
    }

    fn run_cleanup(&mut self) {
        let level = self.monitor.sample(self.used_bytes(), &self.bus);
        let freed = match level {
            PressureLevel::Normal => {
                self.renderer.purge_expired();
                0
            }
            PressureLevel::Pressure => {
                self.reclaim_unreferenced() + self.pool.sweep_below(PoolPriority::Disposable)
            }
            PressureLevel::Critical => {
                let mut freed = self.reclaim_unreferenced();
                freed += self.pool.sweep_below(PoolPriority::Low);
                freed += self.cache.clear_below_priority(u8::MAX);
                self.renderer
                    .set_max_entries(self.config.render_cache_entries / 4);
                freed
            }
        };
        if freed > 0 {
            let usage_percent = self.monitor.usage_percent(self.used_bytes());
            tracing::info!(freed, usage_percent, "cleanup pass finished");
            self.bus.emit(EngineEvent::CleanupCompleted { freed_bytes: freed, usage_percent });
        }
    }

    /// Reclaim every node no longer referenced by the view. Their
    /// loading state reverts so a later visit refetches.
    fn reclaim_unreferenced(&mut self) -> usize {
        let mut freed = 0;
        for node in self.tracker.unreferenced() {
            if let Some(size) = self.tracker.remove(node) {
                freed += size;
            }
            self.pool.remove(&node_key(node));
            self.cache.invalidate_dependency(&node_key(node));
            self.loader.invalidate(node);
        }
        freed
    }

    pub fn stats(&self) -> EngineStats {
        let used_bytes = self.used_bytes();
        EngineStats {
            loader: self.loader.stats(),
            cache: self.cache.stats(),
            render: self.renderer.stats(),
            used_bytes,
            usage_percent: self.monitor.usage_percent(used_bytes),
            pressure: self.monitor.level(),
        }
    }
}

impl std::fmt::Debug for TreeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeEngine")
            .field("visible_nodes", &self.visible_nodes.len())
            .field("used_bytes", &self.used_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;
    use treeline_core::EventLog;
    use treeline_loader::ChildNode;
    use treeline_view::RowMeta;

    /// Flat list where loadedness is shared with the provider side
    struct SharedRows {
        total: usize,
        loaded: Arc<Mutex<HashSet<NodeId>>>,
    }

    impl RowSource for SharedRows {
        fn total_rows(&self) -> usize {
            self.total
        }
        fn row(&self, index: usize) -> Option<RowMeta> {
            (index < self.total).then(|| RowMeta {
                node: index as NodeId,
                depth: 0,
                expanded: false,
                loaded: self.loaded.lock().unwrap().contains(&(index as NodeId)),
                content_hash: index as u64,
            })
        }
    }

    fn paint() -> Box<dyn ItemPaint> {
        Box::new(|item: &VisibleItem, _style: &RenderStyle| RenderedOutput {
            width: item.screen_rect.width,
            height: item.screen_rect.height,
            payload: Arc::new(vec![0u8; 16]),
            placeholder: false,
        })
    }

    fn provider(child_size: usize) -> Arc<dyn TreeDataProvider> {
        Arc::new(move |node: NodeId| {
            Ok(vec![ChildNode {
                id: node * 1000 + 1,
                label: format!("child of {node}"),
                has_children: false,
                size_bytes: child_size,
            }])
        })
    }

    fn test_config() -> Config {
        Config {
            dispatch_interval: Duration::ZERO,
            cleanup_interval: Duration::ZERO,
            stats_interval: Duration::ZERO,
            fetch_workers: 1,
            ..Config::default()
        }
    }

    fn settle(engine: &mut TreeEngine, want: usize) -> Vec<LoadCompletion> {
        let mut completions = Vec::new();
        for _ in 0..400 {
            completions.extend(engine.tick(Instant::now()));
            if completions.len() >= want {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        completions
    }

    #[test]
    fn test_viewport_update_loads_visible_rows() {
        let loaded = Arc::new(Mutex::new(HashSet::new()));
        let rows = SharedRows { total: 10_000, loaded: Arc::clone(&loaded) };
        let mut engine = TreeEngine::new(test_config(), paint(), provider(64));
        let log = EventLog::new();
        log.attach(&engine.bus());

        let frame = engine.update_viewport(0.0, 800.0, 480.0, &rows);
        assert!(!frame.rows.is_empty());
        assert!(frame.rows.iter().all(|r| r.output.placeholder));

        let completions = settle(&mut engine, frame.rows.len());
        assert!(!completions.is_empty());
        for completion in &completions {
            assert!(completion.result.is_ok());
            loaded.lock().unwrap().insert(completion.node);
        }

        // Next frame renders real content for the applied nodes
        let frame = engine.update_viewport(0.0, 800.0, 480.0, &rows);
        assert!(frame.rows.iter().any(|r| !r.output.placeholder));

        let events = log.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::RangeChanged { start: 0, .. })));
        assert!(events.iter().any(|e| matches!(e, EngineEvent::LoadStarted { .. })));
        assert!(events.iter().any(|e| matches!(e, EngineEvent::LoadCompleted { .. })));
    }

    #[test]
    fn test_loaded_subtrees_are_tracked() {
        let loaded = Arc::new(Mutex::new(HashSet::new()));
        let rows = SharedRows { total: 100, loaded };
        let mut engine = TreeEngine::new(test_config(), paint(), provider(128));

        engine.update_viewport(0.0, 800.0, 100.0, &rows);
        let completions = settle(&mut engine, 1);
        assert!(!completions.is_empty());
        assert!(engine.stats().used_bytes >= 128);
    }

    #[test]
    fn test_pressure_reclaims_offscreen_nodes() {
        let loaded = Arc::new(Mutex::new(HashSet::new()));
        let rows = SharedRows { total: 100_000, loaded: Arc::clone(&loaded) };
        // Tiny budget: a handful of loaded subtrees crosses critical
        let config = Config {
            memory_budget: 4096,
            cache_max_bytes: 1024,
            ..test_config()
        };
        let mut engine = TreeEngine::new(config, paint(), provider(512));

        engine.update_viewport(0.0, 800.0, 480.0, &rows);
        let completions = settle(&mut engine, 10);
        for completion in &completions {
            loaded.lock().unwrap().insert(completion.node);
        }
        assert!(engine.stats().used_bytes >= 4096);

        // Scroll far away: old nodes lose their references, and the
        // next cleanup tick reclaims them
        engine.update_viewport(1_000_000.0, 800.0, 480.0, &rows);
        engine.cancel_loads();
        let before = engine.stats().used_bytes;
        engine.tick(Instant::now());
        assert!(engine.stats().used_bytes < before);

        // Reclaimed nodes reverted to Unloaded, so a later visit
        // refetches them
        assert_eq!(engine.stats().loader.loaded, 0);
    }

    #[test]
    fn test_expand_resets_exhausted_retries() {
        let failing: Arc<dyn TreeDataProvider> = Arc::new(|_node: NodeId| {
            Err(treeline_loader::FetchError::Failed("backend down".into()))
        });
        let mut engine = TreeEngine::new(test_config(), paint(), failing);

        assert!(engine.expand(5));
        for _ in 0..40 {
            engine.tick(Instant::now());
            thread::sleep(Duration::from_millis(2));
            if engine.stats().loader.errors > 0 && engine.stats().loader.pending == 0 {
                break;
            }
        }
        // Explicit expand is always allowed to try again
        assert!(engine.expand(5));
    }

    #[test]
    fn test_invalidate_clears_derived_state() {
        let loaded = Arc::new(Mutex::new(HashSet::new()));
        let rows = SharedRows { total: 100, loaded: Arc::clone(&loaded) };
        let mut engine = TreeEngine::new(test_config(), paint(), provider(64));

        engine.update_viewport(0.0, 800.0, 100.0, &rows);
        let completions = settle(&mut engine, 1);
        let node = completions[0].node;

        engine.invalidate(node);
        assert_eq!(
            engine.stats().loader.loaded,
            completions.len().saturating_sub(1)
        );
    }
}
