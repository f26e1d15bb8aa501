//! Round-trip latency accounting for the dispatch loop.
//!
//! Owned and mutated only by the dispatch thread; read once at teardown after
//! the loop has stopped. Plain fields, no atomics or locks.

use std::time::Duration;

use average::{Estimate, Variance};
use log::{info, warn};

/// Running min/max/mean (and spread) of request/reply round trips, in microseconds.
#[derive(Debug, Clone)]
pub struct LatencyProfiler {
    sum_us: f64,
    count: u64,
    min_us: u64,
    max_us: u64,
    spread: Variance,
}

/// Snapshot of the profiler for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub std_dev_us: f64,
}

impl Default for LatencyProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyProfiler {
    pub fn new() -> Self {
        Self {
            sum_us: 0.0,
            count: 0,
            min_us: u64::MAX,
            max_us: 0,
            spread: Variance::new(),
        }
    }

    /// Records one completed round trip.
    #[inline]
    pub fn record(&mut self, round_trip: Duration) {
        let us = round_trip.as_micros() as u64;
        self.count += 1;
        self.sum_us += us as f64;
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
        self.spread.add(us as f64);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `None` until at least one round trip completed.
    pub fn summary(&self) -> Option<LatencySummary> {
        if self.count == 0 {
            return None;
        }
        Some(LatencySummary {
            count: self.count,
            min_us: self.min_us,
            max_us: self.max_us,
            mean_us: self.sum_us / self.count as f64,
            std_dev_us: if self.count > 1 {
                self.spread.population_variance().sqrt()
            } else {
                0.0
            },
        })
    }

    /// Prints the session summary to stdout, mirrored to the log.
    pub fn report(&self) {
        match self.summary() {
            Some(s) => {
                println!("------------------------------");
                println!("round trips  = {:6}", s.count);
                println!("min. latency = {:6} usec", s.min_us);
                println!("max. latency = {:6} usec", s.max_us);
                println!("avg. latency = {:6.1} usec", s.mean_us);
                println!("std. latency = {:6.1} usec", s.std_dev_us);
                println!("------------------------------");
                info!(
                    "[LatencyProfiler] n={} min={}us max={}us mean={:.1}us std={:.1}us",
                    s.count, s.min_us, s.max_us, s.mean_us, s.std_dev_us
                );
            }
            None => {
                println!("***seems to have had no event output for the actuator peer.");
                warn!("[LatencyProfiler] no round trips completed during this session");
            }
        }
    }
}
