// src/lib.rs
// 尿流率计: 串口采集、60 秒显示窗口、完整会话记录、CSV 存档与报告

pub mod calibration;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod persistence;
pub mod recorder;
pub mod report;
pub mod types;

pub use calibration::{CalibrationChannel, DeviceCommand};
pub use engine::{Engine, TickReport};
pub use persistence::{DurableKey, SessionStore};
pub use recorder::SessionRecorder;
pub use report::{summarize, ReportSummary};
pub use types::{ChannelMessage, ConnectionMode, LinkSettings, PatientIdentity, Reading, Sample};
