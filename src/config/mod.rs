#[cfg(feature = "cli")]
pub mod cli;
pub mod timeouts;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Commands};

use crate::core::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_baud_rate, validate_port_name, validate_range, validate_required_field, Validate,
};
use timeouts::ProtocolTimeouts;
use toml_config::{TomlConfig, MAX_WORKER_THREADS};

/// Effective configuration after merging every source.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: Option<String>,
    pub baud_rate: u32,
    pub worker_threads: usize,
    pub timeouts: ProtocolTimeouts,
}

impl Settings {
    pub fn from_toml(config: TomlConfig) -> Self {
        let worker_threads = config.worker_threads();
        Self {
            port: config.device.port,
            baud_rate: config.device.baud_rate,
            worker_threads,
            timeouts: config.timeouts,
        }
    }

    /// `Some` values replace what the file said.
    pub fn with_overrides(
        mut self,
        port: Option<String>,
        baud_rate: Option<u32>,
        worker_threads: Option<usize>,
    ) -> Self {
        if port.is_some() {
            self.port = port;
        }
        if let Some(baud_rate) = baud_rate {
            self.baud_rate = baud_rate;
        }
        if let Some(workers) = worker_threads {
            self.worker_threads = workers;
        }
        self
    }

    pub fn require_port(&self) -> Result<&str> {
        validate_required_field("port", &self.port).map(|p| p.as_str())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default())
    }
}

impl ConfigProvider for Settings {
    fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    fn timeouts(&self) -> &ProtocolTimeouts {
        &self.timeouts
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        if let Some(port) = &self.port {
            validate_port_name("port", port)?;
        }
        validate_baud_rate("baud_rate", self.baud_rate)?;
        validate_range("worker_threads", self.worker_threads, 1, MAX_WORKER_THREADS)?;
        self.timeouts.validate()
    }
}
