//! Rolling round-trip latency window.
//!
//! The remote sends an application-level `ping` every few seconds; each `pong`
//! yields one round-trip sample.  The displayed latency is the mean of the
//! most recent samples so a single slow packet does not make the indicator
//! jump.

use std::collections::VecDeque;

/// Default number of samples kept.
pub const DEFAULT_LATENCY_SAMPLES: usize = 10;

/// Bounded window of the most recent latency samples, in milliseconds.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
    capacity: usize,
}

impl LatencyWindow {
    /// Creates an empty window keeping at most `capacity` samples.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a sample, evicting the oldest when the window is full.
    pub fn record(&mut self, rtt_ms: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt_ms);
    }

    /// Mean of the samples in the window, rounded to whole milliseconds.
    ///
    /// Returns `None` before the first sample.
    pub fn average(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some((sum as f64 / self.samples.len() as f64).round() as u64)
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<u64> {
        self.samples.back().copied()
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` before the first sample.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drops every sample (used when the connection is re-established).
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_SAMPLES)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
