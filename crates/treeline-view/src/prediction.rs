//! Scroll Prediction
//!
//! Tracks recent scroll deltas and derives a direction so the engine
//! can prefetch subtrees ahead of the scroll instead of behind it.

use std::collections::VecDeque;
use std::time::Instant;

/// Direction of recent scrolling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    None,
}

/// One observed scroll step
#[derive(Debug, Clone, Copy)]
pub struct ScrollSample {
    /// Offset delta in pixels (positive = down)
    pub delta: f32,
    pub at: Instant,
}

/// Velocity estimator over a short scroll history
#[derive(Debug)]
pub struct ScrollPredictor {
    history: VecDeque<ScrollSample>,
    max_history: usize,
    velocity: f32,
}

impl Default for ScrollPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollPredictor {
    pub fn new() -> Self {
        Self {
            history: VecDeque::new(),
            max_history: 10,
            velocity: 0.0,
        }
    }

    /// Record a scroll step
    pub fn record(&mut self, sample: ScrollSample) {
        self.history.push_back(sample);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        self.update_velocity();
    }

    /// Weighted average delta, recent samples weighted heavier
    fn update_velocity(&mut self) {
        if self.history.len() < 2 {
            self.velocity = 0.0;
            return;
        }
        let n = self.history.len();
        let mut total = 0.0f32;
        let mut weight_sum = 0.0f32;
        for (i, sample) in self.history.iter().enumerate() {
            let weight = (i + 1) as f32 / n as f32;
            total += sample.delta * weight;
            weight_sum += weight;
        }
        self.velocity = if weight_sum > 0.0 { total / weight_sum } else { 0.0 };
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn direction(&self) -> ScrollDirection {
        if self.velocity > 0.5 {
            ScrollDirection::Down
        } else if self.velocity < -0.5 {
            ScrollDirection::Up
        } else {
            ScrollDirection::None
        }
    }

    /// Index range worth prefetching beyond [start, end), in the
    /// direction of travel. None when there is no clear direction.
    pub fn prefetch_indices(
        &self,
        start: usize,
        end: usize,
        total: usize,
        lookahead: usize,
    ) -> Option<std::ops::Range<usize>> {
        match self.direction() {
            ScrollDirection::Down => {
                let from = end.min(total);
                let to = (end + lookahead).min(total);
                (from < to).then(|| from..to)
            }
            ScrollDirection::Up => {
                let from = start.saturating_sub(lookahead);
                (from < start).then(|| from..start)
            }
            ScrollDirection::None => None,
        }
    }
}
