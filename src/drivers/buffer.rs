// src/drivers/buffer.rs
use std::collections::VecDeque;

use serde::Serialize;

use crate::types::Sample;

pub const DEFAULT_WINDOW_SECONDS: f64 = 60.0;

/// Flattened view of the display window, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WindowSnapshot {
    pub times: Vec<f64>,
    pub flows: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl WindowSnapshot {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        match (self.times.first(), self.times.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

/// Rolling store of the trailing `window_seconds` of a session, for live display.
///
/// Time, flow and volume live in parallel queues that are always the same
/// length and are evicted together from the front.
pub struct SlidingWindowBuffer {
    times: VecDeque<f64>,
    flows: VecDeque<f64>,
    volumes: VecDeque<f64>,
    window_seconds: f64,
}

impl Default for SlidingWindowBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECONDS)
    }
}

impl SlidingWindowBuffer {
    pub fn new(window_seconds: f64) -> Self {
        Self {
            times: VecDeque::new(),
            flows: VecDeque::new(),
            volumes: VecDeque::new(),
            window_seconds: window_seconds.max(0.0),
        }
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    pub fn push(&mut self, sample: Sample) {
        self.times.push_back(sample.elapsed_seconds);
        self.flows.push_back(sample.flow);
        self.volumes.push_back(sample.volume);
        self.prune(sample.elapsed_seconds);
    }

    /// Empties the window. The time origin lives with the session recorder and
    /// is reset there alongside this call.
    pub fn clear(&mut self) {
        self.times.clear();
        self.flows.clear();
        self.volumes.clear();
    }

    /// Rebuilds the window from a loaded session; only the tail survives.
    pub fn refill<'a>(&mut self, samples: impl IntoIterator<Item = &'a Sample>) {
        self.clear();
        for sample in samples {
            self.push(*sample);
        }
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            times: self.times.iter().copied().collect(),
            flows: self.flows.iter().copied().collect(),
            volumes: self.volumes.iter().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn latest(&self) -> Option<Sample> {
        Some(Sample::new(
            *self.times.back()?,
            *self.flows.back()?,
            *self.volumes.back()?,
        ))
    }

    /// X-axis extent a chart should show: the last window, never narrower than it.
    pub fn display_range(&self) -> (f64, f64) {
        match self.times.back() {
            Some(&last) => (
                (last - self.window_seconds).max(0.0),
                last.max(self.window_seconds),
            ),
            None => (0.0, self.window_seconds),
        }
    }

    fn prune(&mut self, newest: f64) {
        while let Some(&front) = self.times.front() {
            if newest - front > self.window_seconds {
                self.times.pop_front();
                self.flows.pop_front();
                self.volumes.pop_front();
            } else {
                break;
            }
        }
    }
}
