// src/types.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

// 连接模式
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    Simulation,
    #[default]
    Hardware,
}

/// One reading from the flowmeter, stamped with seconds since the session origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub elapsed_seconds: f64,
    pub flow: f64,
    pub volume: f64,
}

impl Sample {
    pub fn new(elapsed_seconds: f64, flow: f64, volume: f64) -> Self {
        Self {
            elapsed_seconds,
            flow,
            volume,
        }
    }

    pub fn reading(&self) -> Reading {
        Reading {
            flow: self.flow,
            volume: self.volume,
        }
    }
}

/// The two latest scalar values shown next to the chart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Reading {
    pub flow: f64,
    pub volume: f64,
}

// 采集线程发给消费者的消息
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelMessage {
    Data { flow: f64, volume: f64 },
    // 每个链路实例最多一条，之后不再有 Data
    Error(String),
}

/// Patient identity supplied by the record-management layer before a save.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientIdentity {
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl PatientIdentity {
    pub fn new(
        patient_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// Where and how to open the device link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSettings {
    pub port: String,
    pub baud: u32,
    pub read_timeout: Duration,
}

impl LinkSettings {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            read_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}
