//! CPU utilization from cumulative CPU time, delta'd against the previous scrape of the same pid.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct CpuSample {
    start_time: u64,
    cpu_time: Duration,
    at: Instant,
}

/// Last CPU sample per pid, shared by all collection passes of one collector.
#[derive(Debug, Default)]
pub struct CpuTracker {
    samples: Mutex<HashMap<u32, CpuSample>>,
}

impl CpuTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample and return utilization in percent of one core since the previous one.
    ///
    /// Returns 0.0 when there is no usable baseline: first sighting, reused pid,
    /// CPU time going backwards, or a sample older than the stored one.
    pub fn observe(&self, pid: u32, start_time: u64, cpu_time: Duration, at: Instant) -> f64 {
        let mut samples = match self.samples.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        let current = CpuSample {
            start_time,
            cpu_time,
            at,
        };
        let Some(prev) = samples.get(&pid).copied() else {
            samples.insert(pid, current);
            return 0.0;
        };
        if prev.start_time != start_time {
            samples.insert(pid, current);
            return 0.0;
        }
        if at <= prev.at {
            return 0.0;
        }
        samples.insert(pid, current);
        let Some(used) = cpu_time.checked_sub(prev.cpu_time) else {
            return 0.0;
        };
        used.as_secs_f64() / (at - prev.at).as_secs_f64() * 100.0
    }

    /// Drop samples of pids not observed by a pass started at `since`.
    /// Samples taken at or after `since` belong to an overlapping pass and are kept.
    pub fn retain(&self, seen: &HashSet<u32>, since: Instant) {
        let mut samples = match self.samples.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        samples.retain(|pid, sample| seen.contains(pid) || sample.at >= since);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
