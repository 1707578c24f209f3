// src/config.rs
// TOML 配置，所有键都可省略:
//
// [link]
// port = "COM3"
// baud = 9600
// read_timeout_ms = 1000
// mode = "hardware"
//
// [acquisition]
// poll_interval_ms = 100
// window_seconds = 60.0
// channel_capacity = 1024
//
// [storage]
// data_dir = "."

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::drivers::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_WINDOW_SECONDS};
use crate::types::{ConnectionMode, LinkSettings};

pub const DEFAULT_PORT: &str = "COM3";
pub const DEFAULT_BAUD: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct LinkConfig {
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub read_timeout_ms: Option<u64>,
    pub mode: Option<ConnectionMode>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AcquisitionConfig {
    pub poll_interval_ms: Option<u64>,
    pub window_seconds: Option<f64>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings::new(
            self.link.port.as_deref().unwrap_or(DEFAULT_PORT),
            self.link.baud.unwrap_or(DEFAULT_BAUD),
        )
        .with_read_timeout(Duration::from_millis(
            self.link.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
        ))
    }

    pub fn mode(&self) -> ConnectionMode {
        self.link.mode.unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.acquisition
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        )
    }

    pub fn window_seconds(&self) -> f64 {
        self.acquisition
            .window_seconds
            .unwrap_or(DEFAULT_WINDOW_SECONDS)
    }

    pub fn channel_capacity(&self) -> usize {
        self.acquisition
            .channel_capacity
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
