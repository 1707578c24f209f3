// src/engine.rs
//
// 测量的消费端: 由宿主定时器每个 tick 排空一次通道
// 显示窗口和会话记录只在这里改动，读取线程碰不到

use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};

use crate::drivers::{
    AcquisitionLoop, LinkBackend, LinkError, LoopState, SlidingWindowBuffer, StoreError,
    WindowSnapshot,
};
use crate::persistence::{DurableKey, SessionStore};
use crate::recorder::SessionRecorder;
use crate::report::{summarize, ReportSummary};
use crate::types::{ChannelMessage, LinkSettings, PatientIdentity, Reading, Sample};

/// What one tick did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub accepted: usize,
    pub latest: Option<Reading>,
    /// Set once, on the tick that observed the link failure.
    pub error: Option<String>,
}

pub struct Engine {
    link: AcquisitionLoop,
    window: SlidingWindowBuffer,
    recorder: SessionRecorder,
    store: SessionStore,
    latest: Option<Reading>,
}

impl Engine {
    pub fn new(
        backend: Arc<dyn LinkBackend>,
        settings: LinkSettings,
        capacity: usize,
        window_seconds: f64,
        store: SessionStore,
    ) -> Self {
        Self {
            link: AcquisitionLoop::new(backend, settings, capacity),
            window: SlidingWindowBuffer::new(window_seconds),
            recorder: SessionRecorder::new(),
            store,
            latest: None,
        }
    }

    /// Starts a fresh session. The current one is kept if the port is busy.
    pub fn start(&mut self) -> Result<(), LinkError> {
        self.stop();
        self.link.start()?;
        self.clear();
        info!("acquisition started on {}", self.link.settings().port);
        Ok(())
    }

    /// Stops the reader and ingests whatever it had already queued.
    pub fn stop(&mut self) -> TickReport {
        let was_running = self.link.is_running();
        self.link.stop();
        let report = self.tick();
        if was_running {
            info!(
                "acquisition stopped with {} samples recorded",
                self.recorder.len()
            );
        }
        report
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.recorder.clear();
        self.latest = None;
    }

    pub fn state(&self) -> LoopState {
        self.link.state()
    }

    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now())
    }

    /// Drains the channel without blocking and feeds window and recorder in lock-step.
    pub fn tick_at(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        for msg in self.link.poll() {
            match msg {
                ChannelMessage::Data { flow, volume } => {
                    self.ingest(flow, volume, now);
                    report.accepted += 1;
                }
                ChannelMessage::Error(reason) => {
                    warn!("acquisition failed: {reason}");
                    report.error = Some(reason);
                }
            }
        }
        report.latest = self.latest;
        report
    }

    pub fn ingest(&mut self, flow: f64, volume: f64, now: Instant) {
        let sample = Sample::new(self.recorder.stamp(now), flow, volume);
        self.window.push(sample);
        self.recorder.push(sample);
        self.latest = Some(sample.reading());
    }

    pub fn latest(&self) -> Option<Reading> {
        self.latest
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        self.window.snapshot()
    }

    pub fn window(&self) -> &SlidingWindowBuffer {
        &self.window
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Persists the full session under the patient's identity.
    pub fn save(&self, identity: &PatientIdentity) -> Result<DurableKey, StoreError> {
        self.store.encode(identity, self.recorder.samples())
    }

    /// Replaces the current session with the one stored for `patient_id`.
    pub fn open(&mut self, patient_id: &str) -> Result<(), StoreError> {
        let samples = self.store.decode(patient_id)?;
        self.replace_session(samples, Instant::now());
        Ok(())
    }

    pub fn open_key(&mut self, key: &DurableKey) -> Result<(), StoreError> {
        let samples = self.store.decode_key(key)?;
        self.replace_session(samples, Instant::now());
        Ok(())
    }

    /// Like [`Engine::open`], but a missing or unreadable file leaves an empty
    /// session instead of an error. Returns whether a session was loaded.
    pub fn open_or_clear(&mut self, patient_id: &str) -> Result<bool, StoreError> {
        match self.open(patient_id) {
            Ok(()) => Ok(true),
            Err(e) if e.is_recoverable_view() => {
                warn!("{e}; showing an empty session");
                self.clear();
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn replace_session(&mut self, samples: Vec<Sample>, now: Instant) {
        self.window.refill(&samples);
        self.latest = samples.last().map(Sample::reading);
        self.recorder.load(samples, now);
    }

    pub fn summary(&self) -> ReportSummary {
        summarize(self.recorder.samples())
    }

    /// Summary of the stored session for `patient_id`.
    pub fn report(&self, patient_id: &str) -> Result<ReportSummary, StoreError> {
        Ok(summarize(&self.store.decode(patient_id)?))
    }
}
