// src/recorder.rs
use std::time::Instant;

use crate::types::Sample;

/// Full, untrimmed sample history of the active session.
///
/// Also owns the session clock: `stamp` turns an arrival instant into elapsed
/// seconds, starting at zero for the first reading after a clear.
#[derive(Default)]
pub struct SessionRecorder {
    samples: Vec<Sample>,
    origin: Option<Instant>,
    // 载入会话后接着已有的最后时间继续计时
    offset: f64,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the session origin, fixing the origin on first use.
    pub fn stamp(&mut self, now: Instant) -> f64 {
        let origin = *self.origin.get_or_insert(now);
        self.offset + now.saturating_duration_since(origin).as_secs_f64()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.origin = None;
        self.offset = 0.0;
    }

    /// Replaces the contents wholesale with a stored session. Stamps after
    /// this continue from the loaded tail.
    pub fn load(&mut self, samples: Vec<Sample>, now: Instant) {
        match samples.last() {
            Some(last) => {
                self.origin = Some(now);
                self.offset = last.elapsed_seconds.max(0.0);
            }
            None => {
                self.origin = None;
                self.offset = 0.0;
            }
        }
        self.samples = samples;
    }

    pub fn export(&self) -> Vec<Sample> {
        self.samples.clone()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn is_recording(&self) -> bool {
        self.origin.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn keeps_everything_and_stamps_from_first_reading() {
        let mut rec = SessionRecorder::new();
        let t0 = Instant::now();
        for i in 0..500 {
            let now = t0 + Duration::from_secs(i);
            let elapsed = rec.stamp(now);
            rec.push(Sample::new(elapsed, 1.0, i as f64));
        }
        assert_eq!(rec.len(), 500);
        assert_eq!(rec.samples()[0].elapsed_seconds, 0.0);
        assert_eq!(rec.latest().unwrap().elapsed_seconds, 499.0);
    }

    #[test]
    fn clear_resets_origin() {
        let mut rec = SessionRecorder::new();
        let t0 = Instant::now();
        rec.stamp(t0);
        rec.push(Sample::new(0.0, 1.0, 1.0));
        rec.clear();
        assert!(rec.is_empty());
        assert!(!rec.is_recording());
        assert_eq!(rec.stamp(t0 + Duration::from_secs(5)), 0.0);
    }

    #[test]
    fn load_replaces_and_continues_time() {
        let mut rec = SessionRecorder::new();
        let t0 = Instant::now() + Duration::from_secs(1000);
        rec.push(Sample::new(0.0, 99.0, 99.0));
        rec.push(Sample::new(1.0, 99.0, 99.0));

        let stored = vec![Sample::new(0.0, 1.0, 10.0), Sample::new(12.5, 2.0, 20.0)];
        rec.load(stored.clone(), t0);
        assert_eq!(rec.export(), stored);

        let resumed = rec.stamp(t0 + Duration::from_millis(500));
        assert!((resumed - 13.0).abs() < 1e-6);
    }

    #[test]
    fn load_with_huge_tail_still_continues_forward() {
        let mut rec = SessionRecorder::new();
        let t0 = Instant::now();
        let tail = 1.0e12;
        rec.load(vec![Sample::new(0.0, 1.0, 1.0), Sample::new(tail, 1.0, 2.0)], t0);
        let resumed = rec.stamp(t0 + Duration::from_secs(2));
        assert!(resumed >= tail);
        assert_eq!(resumed, tail + 2.0);
    }
}
