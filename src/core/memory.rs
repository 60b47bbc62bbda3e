//! System memory probe used to raise memory-pressure events.
//!
//! Hosts with their own low-memory notification call
//! [`Player::on_memory_pressure`](super::player::Player::on_memory_pressure)
//! directly; the CLI polls a [`MemoryWatch`] instead.

use log::{debug, info};
use sysinfo::System;

/// Edge-triggered threshold: fires once when usage rises above it, re-arms
/// when usage falls back below.
#[derive(Debug, Clone)]
pub struct PressureTrigger {
    threshold_percent: f64,
    active: bool,
}

impl PressureTrigger {
    pub fn new(threshold_percent: f64) -> Self {
        Self {
            threshold_percent: threshold_percent.clamp(1.0, 100.0),
            active: false,
        }
    }

    /// Feed a usage sample; true when pressure has just begun
    pub fn update(&mut self, used_percent: f64) -> bool {
        let above = used_percent >= self.threshold_percent;
        let fired = above && !self.active;
        self.active = above;
        fired
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }
}

/// Polls system memory via sysinfo
pub struct MemoryWatch {
    sys: System,
    trigger: PressureTrigger,
}

impl MemoryWatch {
    pub fn new(threshold_percent: f64) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let trigger = PressureTrigger::new(threshold_percent);
        info!(
            "MemoryWatch init: total={} MB, available={} MB, threshold={}%",
            sys.total_memory() / 1024 / 1024,
            sys.available_memory() / 1024 / 1024,
            trigger.threshold_percent()
        );
        Self { sys, trigger }
    }

    /// Used memory in percent of total (0 when unknown)
    pub fn used_percent(&mut self) -> f64 {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return 0.0;
        }
        let used = total.saturating_sub(self.sys.available_memory());
        used as f64 / total as f64 * 100.0
    }

    /// Sample memory; true when the pressure threshold has just been crossed
    pub fn poll(&mut self) -> bool {
        let used = self.used_percent();
        let fired = self.trigger.update(used);
        if fired {
            debug!("Memory pressure: {:.1}% used", used);
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_fires_once_per_crossing() {
        let mut trigger = PressureTrigger::new(80.0);
        assert!(!trigger.update(50.0));
        assert!(trigger.update(85.0));
        assert!(!trigger.update(90.0));
        assert!(trigger.is_active());
        assert!(!trigger.update(60.0));
        assert!(trigger.update(80.0));
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(PressureTrigger::new(0.0).threshold_percent(), 1.0);
        assert_eq!(PressureTrigger::new(250.0).threshold_percent(), 100.0);
    }

    #[test]
    fn test_used_percent_in_range() {
        let mut watch = MemoryWatch::new(90.0);
        let used = watch.used_percent();
        assert!((0.0..=100.0).contains(&used));
    }
}
