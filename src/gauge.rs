//! Memory usage gauges
//!
//! A gauge answers a single question: how much of the memory capacity is
//! currently used, as a fraction in `[0, 1]` (it may exceed 1 when the
//! process is over budget). The indexer and the merger flush when the
//! usage reaches their threshold, and retrieval refuses to load a bucket
//! whose estimated footprint would push the usage over it.

use std::sync::Mutex;

use log::warn;
use sysinfo::{MemoryRefreshKind, Pid, System};

pub trait ResourceGauge: Send + Sync {
    /// Fraction of the capacity in use
    fn usage(&self) -> f64;

    /// Capacity in bytes
    fn capacity(&self) -> u64;

    /// Estimated usage once `additional` more bytes are held
    fn usage_with(&self, additional: u64) -> f64 {
        let capacity = self.capacity();
        if capacity == 0 {
            return f64::INFINITY;
        }
        self.usage() + (additional as f64) / (capacity as f64)
    }
}

/// Reports a constant usage
///
/// Useful to force a flush after every unit of work (`FixedGauge::full()`)
/// or to never flush before the end of a stage (`FixedGauge::empty()`).
#[derive(Clone, Copy, Debug)]
pub struct FixedGauge {
    usage: f64,
    capacity: u64,
}

impl FixedGauge {
    pub fn new(usage: f64, capacity: u64) -> Self {
        Self { usage, capacity }
    }

    pub fn full() -> Self {
        Self::new(1., u64::MAX)
    }

    pub fn empty() -> Self {
        Self::new(0., u64::MAX)
    }
}

impl ResourceGauge for FixedGauge {
    fn usage(&self) -> f64 {
        self.usage
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

/// Resident memory of the current process relative to a capacity
/// (the total system memory unless given)
pub struct ProcessMemoryGauge {
    system: Mutex<System>,
    pid: Option<Pid>,
    capacity: u64,
}

impl ProcessMemoryGauge {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory_specifics(MemoryRefreshKind::new().with_ram());
        let capacity = system.total_memory();
        Self::build(system, capacity)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self::build(System::new(), capacity)
    }

    fn build(system: System, capacity: u64) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Cannot get the current process ID ({}), usage will be 0", e);
                None
            }
        };

        Self {
            system: Mutex::new(system),
            pid,
            capacity,
        }
    }

    /// Resident memory of the process in bytes
    pub fn used(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = match self.system.lock() {
            Ok(system) => system,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !system.refresh_process(pid) {
            return 0;
        }
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

impl Default for ProcessMemoryGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceGauge for ProcessMemoryGauge {
    fn usage(&self) -> f64 {
        if self.capacity == 0 {
            return f64::INFINITY;
        }
        self.used() as f64 / self.capacity as f64
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_gauge_estimates() {
        let gauge = FixedGauge::new(0.5, 1000);
        assert_eq!(gauge.usage(), 0.5);
        assert!((gauge.usage_with(250) - 0.75).abs() < 1e-9);
        assert!(FixedGauge::full().usage() >= 0.7);
        assert!(FixedGauge::empty().usage_with(1 << 20) < 0.7);
    }

    #[test]
    fn zero_capacity_is_always_over_budget() {
        let gauge = FixedGauge::new(0., 0);
        assert!(gauge.usage_with(1).is_infinite());
        assert!(ProcessMemoryGauge::with_capacity(0).usage().is_infinite());
    }

    #[test]
    fn process_gauge_reports_some_memory() {
        let gauge = ProcessMemoryGauge::with_capacity(u64::MAX);
        let usage = gauge.usage();
        assert!(usage >= 0. && usage < 1.);
    }
}
