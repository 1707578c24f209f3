// src/drivers/simulated.rs
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::drivers::source::{DeviceLink, LinkBackend};
use crate::drivers::LinkError;
use crate::types::LinkSettings;

/// Synthesises a voiding curve so the pipeline can run without hardware.
///
/// Flow follows a half-sine over `void_seconds` with small jitter, then drops
/// to zero; volume integrates flow. Lines are emitted every `sample_period`.
#[derive(Clone, Debug)]
pub struct SimulatedBackend {
    pub peak_flow: f64,
    pub void_seconds: f64,
    pub sample_period: Duration,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self {
            peak_flow: 25.0,
            void_seconds: 30.0,
            sample_period: Duration::from_millis(100),
        }
    }
}

impl LinkBackend for SimulatedBackend {
    fn open(&self, _settings: &LinkSettings) -> Result<Box<dyn DeviceLink>, LinkError> {
        Ok(Box::new(SimulatedLink {
            profile: self.clone(),
            t: 0.0,
            volume: 0.0,
        }))
    }
}

struct SimulatedLink {
    profile: SimulatedBackend,
    t: f64,
    volume: f64,
}

impl SimulatedLink {
    fn next_flow(&mut self) -> f64 {
        let ideal = if self.t < self.profile.void_seconds {
            self.profile.peak_flow * (PI * self.t / self.profile.void_seconds).sin()
        } else {
            0.0
        };
        let jitter = rand::thread_rng().gen_range(-0.3..0.3);
        (ideal + jitter).max(0.0)
    }
}

impl DeviceLink for SimulatedLink {
    fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        thread::sleep(self.profile.sample_period);
        let dt = self.profile.sample_period.as_secs_f64();
        let flow = self.next_flow();
        self.volume += flow * dt;
        self.t += dt;
        Ok(Some(format!("{:.2},{:.2}\n", flow, self.volume)))
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        // T 清零体积，其他命令忽略
        if bytes == b"T" {
            self.volume = 0.0;
        }
        Ok(())
    }
}
