// src/drivers/error.rs
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("link unavailable on {port}: {reason}")]
    LinkUnavailable { port: String, reason: String },
    #[error("I/O failure on {port}: {reason}")]
    LinkIo { port: String, reason: String },
    #[error("port {port} is already held by another acquisition loop")]
    PortBusy { port: String },
}

impl LinkError {
    pub fn unavailable(port: &str, reason: impl ToString) -> Self {
        LinkError::LinkUnavailable {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn io(port: &str, reason: impl ToString) -> Self {
        LinkError::LinkIo {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored session for patient {patient_id}")]
    NotFound { patient_id: String },
    #[error("session file {key} is malformed at row {row}: {reason}")]
    MalformedRecord {
        key: String,
        row: usize,
        reason: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl StoreError {
    /// True for the two outcomes a viewer falls back to an empty session on.
    pub fn is_recoverable_view(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::MalformedRecord { .. }
        )
    }
}

impl From<tempfile::PersistError> for StoreError {
    fn from(value: tempfile::PersistError) -> Self {
        StoreError::Io(value.error)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("calibration value must be an integer, got {0:?}")]
    InvalidCalibrationValue(String),
}
