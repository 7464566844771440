//! Queue delay compensation
//!
//! Render callbacks fire later than requested by a load-dependent amount.
//! The estimator keeps a sliding window of observed lateness and the
//! controller subtracts its average from each frame's duration when it
//! schedules the next callback, so scheduling overhead does not accumulate
//! into playback drift.

use crate::utils::config::DelayConfig;
use std::collections::VecDeque;
use std::time::Duration;

/// Seed sample for a fresh window, in milliseconds
pub const INITIAL_DELAY_MS: u32 = 11;

/// Upper clamp for samples and for the estimate, in milliseconds
pub const MAX_DELAY_MS: u32 = 21;

/// Samples kept in the window
pub const DELAY_WINDOW: usize = 20;

/// Sliding-window average of observed scheduling latency
#[derive(Debug, Clone)]
pub struct QueueDelayEstimator {
    window: VecDeque<u32>,
    sum: u64,
    capacity: usize,
    max_ms: u32,
}

impl Default for QueueDelayEstimator {
    fn default() -> Self {
        Self::new(DelayConfig::default())
    }
}

impl QueueDelayEstimator {
    pub fn new(config: DelayConfig) -> Self {
        let capacity = config.window.max(1);
        let seed = config.initial_ms.min(config.max_ms);

        let mut window = VecDeque::with_capacity(capacity + 1);
        window.push_back(seed);

        Self {
            window,
            sum: u64::from(seed),
            capacity,
            max_ms: config.max_ms,
        }
    }

    /// Record how late a callback fired, in milliseconds
    pub fn observe(&mut self, delay_ms: u64) {
        let sample = delay_ms.min(u64::from(self.max_ms)) as u32;
        self.window.push_back(sample);
        self.sum += u64::from(sample);

        while self.window.len() > self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= u64::from(oldest);
            }
        }
    }

    /// Current average lateness in milliseconds, at most the max delay
    pub fn current_estimate(&self) -> u32 {
        let len = self.window.len().max(1) as u64;
        (self.sum / len).min(u64::from(self.max_ms)) as u32
    }

    /// Samples currently in the window
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Delay until the next callback: the frame's duration minus the expected
/// lateness, never negative
pub fn next_frame_delay(duration_ms: u32, estimate_ms: u32) -> Duration {
    Duration::from_millis(u64::from(duration_ms.saturating_sub(estimate_ms)))
}
