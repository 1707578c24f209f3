// src/calibration.rs
// 校准页: 独立的采集循环 + 一次性设备命令
// 与测量循环共用端口租约，先占先得，另一方得到 PortBusy

use std::fmt;
use std::sync::Arc;

use log::info;

use crate::drivers::{
    AcquisitionLoop, CommandError, LinkBackend, LinkError, LoopState, PortLease,
};
use crate::types::{ChannelMessage, LinkSettings, Reading};

pub const DEFAULT_CALIBRATION_VALUE: i64 = 195;

/// Commands the flowmeter firmware understands. Sent without a line terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    /// `C<value>`, e.g. `C195`.
    Calibrate(i64),
    /// `T`: zero the volume integrator.
    Tare,
}

impl DeviceCommand {
    /// Validates operator input for a calibration value. Blank input means the default.
    pub fn calibration_from_input(input: &str) -> Result<Self, CommandError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(DeviceCommand::Calibrate(DEFAULT_CALIBRATION_VALUE));
        }
        input
            .parse()
            .map(DeviceCommand::Calibrate)
            .map_err(|_| CommandError::InvalidCalibrationValue(input.to_string()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Calibrate(value) => write!(f, "C{value}"),
            DeviceCommand::Tare => f.write_str("T"),
        }
    }
}

/// Independent acquisition loop used on the calibration screen.
pub struct CalibrationChannel {
    backend: Arc<dyn LinkBackend>,
    link: AcquisitionLoop,
    latest: Option<Reading>,
}

/// Outcome of one calibration poll.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationPoll {
    pub latest: Option<Reading>,
    pub error: Option<String>,
}

impl CalibrationChannel {
    pub fn new(backend: Arc<dyn LinkBackend>, settings: LinkSettings, capacity: usize) -> Self {
        Self {
            link: AcquisitionLoop::new(Arc::clone(&backend), settings, capacity),
            backend,
            latest: None,
        }
    }

    pub fn start(&mut self) -> Result<(), LinkError> {
        self.latest = None;
        self.link.start()
    }

    pub fn stop(&mut self) {
        self.link.stop();
    }

    pub fn state(&self) -> LoopState {
        self.link.state()
    }

    pub fn latest(&self) -> Option<Reading> {
        self.latest
    }

    /// Drains the loop and keeps only the newest reading for display.
    pub fn poll(&mut self) -> CalibrationPoll {
        let mut error = None;
        for msg in self.link.poll() {
            match msg {
                ChannelMessage::Data { flow, volume } => {
                    self.latest = Some(Reading { flow, volume })
                }
                ChannelMessage::Error(reason) => error = Some(reason),
            }
        }
        CalibrationPoll {
            latest: self.latest,
            error,
        }
    }

    /// Opens the port, writes `bytes`, closes it. Fails with `PortBusy` while
    /// any loop (this one included) holds the port.
    pub fn send_command(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let settings = self.link.settings();
        let _lease = PortLease::acquire(&settings.port)?;
        let mut link = self.backend.open(settings)?;
        link.write_bytes(bytes)?;
        info!(
            "sent {:?} to {}",
            String::from_utf8_lossy(bytes),
            settings.port
        );
        Ok(())
    }

    pub fn send(&self, command: DeviceCommand) -> Result<(), LinkError> {
        self.send_command(&command.to_bytes())
    }
}
