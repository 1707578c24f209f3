// src/drivers/serial.rs
use std::io::{BufRead, BufReader, ErrorKind, Write};

use log::debug;
use serialport::SerialPort;

use crate::drivers::source::{DeviceLink, LinkBackend};
use crate::drivers::LinkError;
use crate::types::LinkSettings;

// 防止设备不发换行时缓冲无限增长
const MAX_LINE_BYTES: usize = 4096;

/// Opens real serial ports through the `serialport` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialBackend;

impl LinkBackend for SerialBackend {
    fn open(&self, settings: &LinkSettings) -> Result<Box<dyn DeviceLink>, LinkError> {
        let port = serialport::new(&settings.port, settings.baud)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| LinkError::unavailable(&settings.port, e))?;
        debug!("opened {} at {} baud", settings.port, settings.baud);
        Ok(Box::new(SerialLink {
            name: settings.port.clone(),
            reader: BufReader::new(port),
            pending: Vec::with_capacity(64),
        }))
    }
}

struct SerialLink {
    name: String,
    reader: BufReader<Box<dyn SerialPort>>,
    // 跨越读超时的半行数据
    pending: Vec<u8>,
}

impl SerialLink {
    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

impl DeviceLink for SerialLink {
    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => Ok(None),
            Ok(_) if self.pending.last() == Some(&b'\n') => Ok(Some(self.take_line())),
            Ok(_) => Ok(None),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                if self.pending.len() > MAX_LINE_BYTES {
                    debug!("{}: discarding {} unterminated bytes", self.name, self.pending.len());
                    self.pending.clear();
                }
                Ok(None)
            }
            Err(e) => Err(LinkError::io(&self.name, e)),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.reader.get_mut();
        port.write_all(bytes)
            .and_then(|_| port.flush())
            .map_err(|e| LinkError::io(&self.name, e))
    }
}

/// Serial ports the OS currently reports, by name.
pub fn available_ports() -> Result<Vec<String>, LinkError> {
    let ports =
        serialport::available_ports().map_err(|e| LinkError::unavailable("<enumerate>", e))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
