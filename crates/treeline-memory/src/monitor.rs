//! Pressure Monitor
//!
//! Classifies aggregate usage against the configured budget and
//! reports threshold crossings so the engine only reacts (and only
//! notifies) when the level actually changes.

use treeline_core::{EngineEvent, EventBus};

/// Memory pressure level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    Normal,
    Pressure,
    Critical,
}

#[derive(Debug)]
pub struct MemoryMonitor {
    budget_bytes: usize,
    pressure_threshold: f64,
    critical_threshold: f64,
    level: PressureLevel,
}

impl MemoryMonitor {
    pub fn new(budget_bytes: usize, pressure_threshold: f64, critical_threshold: f64) -> Self {
        Self {
            budget_bytes,
            pressure_threshold,
            critical_threshold,
            level: PressureLevel::Normal,
        }
    }

    pub fn level(&self) -> PressureLevel {
        self.level
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    pub fn usage_percent(&self, used_bytes: usize) -> f64 {
        if self.budget_bytes == 0 {
            100.0
        } else {
            used_bytes as f64 / self.budget_bytes as f64 * 100.0
        }
    }

    fn classify(&self, used_bytes: usize) -> PressureLevel {
        let ratio = if self.budget_bytes == 0 {
            1.0
        } else {
            used_bytes as f64 / self.budget_bytes as f64
        };
        if ratio >= self.critical_threshold {
            PressureLevel::Critical
        } else if ratio >= self.pressure_threshold {
            PressureLevel::Pressure
        } else {
            PressureLevel::Normal
        }
    }

    /// Record a usage sample. Emits `MemoryPressure` on the bus when
    /// the level rises, and returns the level either way.
    pub fn sample(&mut self, used_bytes: usize, bus: &EventBus) -> PressureLevel {
        let level = self.classify(used_bytes);
        if level > self.level {
            let usage_percent = self.usage_percent(used_bytes);
            tracing::warn!(?level, usage_percent, "memory pressure rising");
            bus.emit(EngineEvent::MemoryPressure { usage_percent });
        }
        self.level = level;
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeline_core::EventLog;

    #[test]
    fn test_levels_and_thresholds() {
        let bus = EventBus::new();
        let mut monitor = MemoryMonitor::new(1000, 0.8, 0.95);

        assert_eq!(monitor.sample(500, &bus), PressureLevel::Normal);
        assert_eq!(monitor.sample(800, &bus), PressureLevel::Pressure);
        assert_eq!(monitor.sample(950, &bus), PressureLevel::Critical);
        assert_eq!(monitor.sample(100, &bus), PressureLevel::Normal);
    }

    #[test]
    fn test_emits_only_on_rise() {
        let bus = EventBus::new();
        let log = EventLog::new();
        log.attach(&bus);
        let mut monitor = MemoryMonitor::new(1000, 0.8, 0.95);

        monitor.sample(850, &bus);
        monitor.sample(860, &bus);
        monitor.sample(400, &bus);
        monitor.sample(990, &bus);

        let pressure_events: Vec<_> = log
            .events()
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::MemoryPressure { .. }))
            .collect();
        // Rise to Pressure, then rise from Normal to Critical
        assert_eq!(pressure_events.len(), 2);
    }

    #[test]
    fn test_zero_budget_is_always_critical() {
        let bus = EventBus::new();
        let mut monitor = MemoryMonitor::new(0, 0.8, 0.95);
        assert_eq!(monitor.sample(1, &bus), PressureLevel::Critical);
    }
}
