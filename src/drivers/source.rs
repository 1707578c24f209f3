// src/drivers/source.rs
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::drivers::LinkError;
use crate::types::LinkSettings;

/// An open, exclusively owned connection to the device.
pub trait DeviceLink: Send {
    /// Reads one line. `Ok(None)` means the read timed out with no complete line.
    fn read_line(&mut self) -> Result<Option<String>, LinkError>;
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Something that can open device links: the serial port, a simulator, or a test script.
pub trait LinkBackend: Send + Sync {
    fn open(&self, settings: &LinkSettings) -> Result<Box<dyn DeviceLink>, LinkError>;
}

/// One scripted event on a [`ManualBackend`] link.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Line(String),
    Fail(String),
}

/// In-memory backend useful for tests and deterministic playback.
///
/// Every link opened from it replays the same script, then idles (times out)
/// until stopped. Written bytes are captured and can be inspected.
#[derive(Clone, Default)]
pub struct ManualBackend {
    script: Vec<ScriptStep>,
    open_failure: Option<String>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ManualBackend {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            script: lines
                .into_iter()
                .map(|l| ScriptStep::Line(l.into()))
                .collect(),
            ..Default::default()
        }
    }

    /// A backend whose links fail with `LinkIo` after the scripted lines.
    pub fn failing_after(
        lines: impl IntoIterator<Item = impl Into<String>>,
        reason: impl Into<String>,
    ) -> Self {
        let mut backend = Self::new(lines);
        backend.script.push(ScriptStep::Fail(reason.into()));
        backend
    }

    /// A backend that cannot open the port at all.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            open_failure: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Byte payloads written through any link opened from this backend.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

impl LinkBackend for ManualBackend {
    fn open(&self, settings: &LinkSettings) -> Result<Box<dyn DeviceLink>, LinkError> {
        if let Some(reason) = &self.open_failure {
            return Err(LinkError::unavailable(&settings.port, reason));
        }
        Ok(Box::new(ManualLink {
            port: settings.port.clone(),
            queue: self.script.iter().cloned().collect(),
            idle: settings.read_timeout,
            written: Arc::clone(&self.written),
        }))
    }
}

struct ManualLink {
    port: String,
    queue: VecDeque<ScriptStep>,
    idle: std::time::Duration,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl DeviceLink for ManualLink {
    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        match self.queue.pop_front() {
            Some(ScriptStep::Line(line)) => Ok(Some(line)),
            Some(ScriptStep::Fail(reason)) => Err(LinkError::io(&self.port, reason)),
            None => {
                // 模拟安静的设备: 等一个读超时
                thread::sleep(self.idle);
                Ok(None)
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.written
            .lock()
            .map_err(|_| LinkError::io(&self.port, "capture buffer poisoned"))?
            .push(bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings() -> LinkSettings {
        LinkSettings::new("TEST0", 9600).with_read_timeout(Duration::from_millis(5))
    }

    #[test]
    fn manual_link_replays_script_then_idles() {
        let backend = ManualBackend::failing_after(["1,2"], "unplugged");
        let mut link = backend.open(&settings()).unwrap();
        assert_eq!(link.read_line().unwrap(), Some("1,2".to_string()));
        assert!(matches!(link.read_line(), Err(LinkError::LinkIo { .. })));
        assert_eq!(link.read_line().unwrap(), None);
    }

    #[test]
    fn unavailable_backend_refuses_to_open() {
        let backend = ManualBackend::unavailable("no such port");
        let err = backend.open(&settings()).err().unwrap();
        assert!(matches!(err, LinkError::LinkUnavailable { .. }));
    }

    #[test]
    fn written_bytes_are_captured() {
        let backend = ManualBackend::default();
        let mut link = backend.open(&settings()).unwrap();
        link.write_bytes(b"T").unwrap();
        assert_eq!(backend.written(), vec![b"T".to_vec()]);
    }
}
