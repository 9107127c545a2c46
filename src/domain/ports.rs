use crate::config::timeouts::ProtocolTimeouts;
use crate::domain::model::{PortInfo, SlotId, Stage, UserRecord};
use crate::utils::error::{Result, SensorError};

/// Raw byte link to one open serial port. No protocol knowledge.
pub trait SerialLink: Send {
    fn port_name(&self) -> &str;

    /// Drop whatever the OS has buffered but we have not read yet.
    fn clear_input(&mut self) -> Result<()>;

    /// Fails with `WriteError` when the port accepts fewer bytes than submitted.
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Append whatever is readable right now to `buf`; returns the count, 0 if idle.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize>;

    /// Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Enumerates and opens serial ports.
pub trait PortOpener: Send + Sync {
    fn list_ports(&self) -> Result<Vec<PortInfo>>;

    fn open(&self, port: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>>;
}

/// Receives enrollment progress. Called on the worker thread running the operation;
/// exactly one of `on_success`/`on_error` fires per attempt.
pub trait EnrollmentListener: Send {
    fn on_progress(&mut self, stage: &Stage, message: &str);
    fn on_success(&mut self, slot: SlotId);
    fn on_error(&mut self, error: &SensorError);
}

/// Receives verification progress. Exactly one of `on_success`, `on_not_found`
/// or `on_error` fires per attempt.
pub trait VerificationListener: Send {
    fn on_progress(&mut self, stage: &Stage, message: &str);
    fn on_success(&mut self, slot: SlotId, confidence: u16);
    fn on_not_found(&mut self);
    fn on_error(&mut self, error: &SensorError);
}

/// Listener that ignores everything; used by the blocking verify form.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentListener;

impl EnrollmentListener for SilentListener {
    fn on_progress(&mut self, _stage: &Stage, _message: &str) {}
    fn on_success(&mut self, _slot: SlotId) {}
    fn on_error(&mut self, _error: &SensorError) {}
}

impl VerificationListener for SilentListener {
    fn on_progress(&mut self, _stage: &Stage, _message: &str) {}
    fn on_success(&mut self, _slot: SlotId, _confidence: u16) {}
    fn on_not_found(&mut self) {}
    fn on_error(&mut self, _error: &SensorError) {}
}

/// User-management collaborator: maps slot ids to people.
pub trait UserDirectory: Send + Sync {
    fn find_by_slot(&self, slot: SlotId) -> Result<Option<UserRecord>>;
    fn assign_slot(&self, user_id: i64, slot: SlotId) -> Result<()>;
}

/// Where a session and its runtime read their settings from.
pub trait ConfigProvider: Send + Sync {
    fn port(&self) -> Option<&str>;
    fn baud_rate(&self) -> u32;
    fn worker_threads(&self) -> usize;
    fn timeouts(&self) -> &ProtocolTimeouts;
}
