// src/drivers/frame.rs
// 设备协议: 每行一条读数 `flow,volume\n`

use std::fmt;

pub const FIELD_DELIMITER: char = ',';

/// A parsed device line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawFrame {
    pub flow: f64,
    pub volume: f64,
}

/// Why a line was dropped. Never leaves the reader thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    FieldCount(usize),
    NotNumeric(String),
    NotFinite(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::FieldCount(n) => write!(f, "expected 2 fields, got {n}"),
            FrameError::NotNumeric(field) => write!(f, "field {field:?} is not a number"),
            FrameError::NotFinite(field) => write!(f, "field {field:?} is not finite"),
        }
    }
}

impl RawFrame {
    pub fn parse(line: &str) -> Result<Self, FrameError> {
        let fields: Vec<&str> = line.trim().split(FIELD_DELIMITER).collect();
        if fields.len() != 2 {
            return Err(FrameError::FieldCount(fields.len()));
        }
        Ok(Self {
            flow: parse_field(fields[0])?,
            volume: parse_field(fields[1])?,
        })
    }
}

fn parse_field(field: &str) -> Result<f64, FrameError> {
    let field = field.trim();
    let value: f64 = field
        .parse()
        .map_err(|_| FrameError::NotNumeric(field.to_string()))?;
    if !value.is_finite() {
        return Err(FrameError::NotFinite(field.to_string()));
    }
    Ok(value)
}
