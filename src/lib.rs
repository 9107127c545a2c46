pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::{CliConfig, Commands};

pub use crate::config::{timeouts::ProtocolTimeouts, Settings};
pub use crate::core::operation::{CancelToken, OperationHandle};
pub use crate::core::service::FingerprintService;
pub use crate::core::session::{DeviceSession, SessionState};
pub use crate::utils::error::{Result, SensorError};
