use crate::config::timeouts::{ProtocolTimeouts, DEFAULT_BAUD_RATE};
use crate::core::enrollment::run_enrollment;
use crate::core::exchange::{exchange, Reply, FAILURE_MARKERS};
use crate::core::framing::FramedLink;
use crate::core::message::{AckKind, DeviceMessage};
use crate::core::operation::CancelToken;
use crate::core::transport::SystemPorts;
use crate::core::verification::run_verification;
use crate::domain::model::{Command, EnrollmentOutcome, PortInfo, SlotId, VerificationOutcome};
use crate::domain::ports::{
    ConfigProvider, EnrollmentListener, PortOpener, SilentListener, VerificationListener,
};
use crate::utils::error::{Result, SensorError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Verifying,
    Connected,
}

/// One connection to the sensor: owns at most one open link.
///
/// All methods block; run them off any UI thread.
pub struct DeviceSession {
    opener: Arc<dyn PortOpener>,
    link: Option<FramedLink>,
    state: SessionState,
    connected: Arc<AtomicBool>,
    baud_rate: u32,
    timeouts: ProtocolTimeouts,
}

impl DeviceSession {
    pub fn new(opener: Arc<dyn PortOpener>, baud_rate: u32, timeouts: ProtocolTimeouts) -> Self {
        Self {
            opener,
            link: None,
            state: SessionState::Disconnected,
            connected: Arc::new(AtomicBool::new(false)),
            baud_rate,
            timeouts,
        }
    }

    /// Session using the baud rate and timeouts from `config`.
    pub fn from_config(opener: Arc<dyn PortOpener>, config: &dyn ConfigProvider) -> Self {
        Self::new(opener, config.baud_rate(), config.timeouts().clone())
    }

    /// Session over the OS serial ports at the default baud rate.
    pub fn system(timeouts: ProtocolTimeouts) -> Self {
        let opener = Arc::new(SystemPorts::new(timeouts.open_settle()));
        Self::new(opener, DEFAULT_BAUD_RATE, timeouts)
    }

    pub fn list_ports(&self) -> Result<Vec<PortInfo>> {
        self.opener.list_ports()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn timeouts(&self) -> &ProtocolTimeouts {
        &self.timeouts
    }

    pub fn port_name(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.port_name())
    }

    /// Flag readable without holding the session; mirrors `is_connected`.
    pub fn connection_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.link.as_ref().is_some_and(|l| l.is_open())
    }

    /// Open `port`, wait for the board to boot and check it answers `PING`.
    ///
    /// `Ok(false)` for the expected failures (missing port, port busy, wrong or
    /// silent firmware). `Err` only for unexpected I/O faults. The link is
    /// released on every failure path.
    pub fn connect(&mut self, port: &str) -> Result<bool> {
        if self.link.is_some() {
            self.disconnect();
        }

        tracing::info!("Connecting to sensor on {} @ {} baud", port, self.baud_rate);
        self.state = SessionState::Connecting;

        let link = match self.opener.open(port, self.baud_rate) {
            Ok(link) => link,
            Err(e) => return self.abort_connect(e),
        };
        self.link = Some(FramedLink::new(link));

        if !self.timeouts.stabilization().is_zero() {
            std::thread::sleep(self.timeouts.stabilization());
        }

        self.state = SessionState::Verifying;
        match self.ping_link() {
            Ok(true) => {
                self.state = SessionState::Connected;
                self.connected.store(true, Ordering::SeqCst);
                tracing::info!("✅ Sensor answered on {}", port);
                Ok(true)
            }
            Ok(false) => self.abort_connect(SensorError::NoAcknowledgment {
                command: Command::Ping.to_string(),
            }),
            Err(e) => self.abort_connect(e),
        }
    }

    fn abort_connect(&mut self, error: SensorError) -> Result<bool> {
        self.disconnect();
        if is_expected_connect_failure(&error) {
            tracing::error!("❌ Connection failed: {}", error);
            tracing::error!("💡 {}", error.recovery_suggestion());
            Ok(false)
        } else {
            Err(error)
        }
    }

    /// Always leaves the session `Disconnected`; safe to repeat.
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
            tracing::info!("Disconnected from {}", link.port_name());
        }
        self.state = SessionState::Disconnected;
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Liveness check on an established connection.
    pub fn ping(&mut self) -> bool {
        if !self.is_connected() {
            tracing::warn!("PING skipped: no active connection");
            return false;
        }
        match self.ping_link() {
            Ok(alive) => alive,
            Err(e) => {
                self.handle_io_fault(&e);
                false
            }
        }
    }

    fn ping_link(&mut self) -> Result<bool> {
        let timeout = self.timeouts.ping();
        let settle = self.timeouts.settle();
        let link = self.link.as_mut().ok_or(SensorError::NotConnected)?;
        let reply = exchange(link, &Command::Ping, &["READY", "FAIL", "ERROR"], timeout, settle)?;
        Ok(reply.is_some_and(|r| DeviceMessage::parse(&r.line) == DeviceMessage::Ready))
    }

    /// Number of templates stored on the sensor; 0 when unknown.
    pub fn query_template_count(&mut self) -> u32 {
        let timeout = self.timeouts.count();
        let reply = self.request(&Command::Count, &["COUNT:", "FAIL", "ERROR"], timeout);
        match reply.map(|r| DeviceMessage::parse(&r.line)) {
            Some(DeviceMessage::Count(n)) => n,
            Some(other) => {
                tracing::warn!("Unexpected reply to COUNT: {:?}", other);
                0
            }
            None => 0,
        }
    }

    pub fn delete_template(&mut self, slot: i64) -> bool {
        let slot = match SlotId::new(slot) {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!("DELETE rejected: {}", e);
                return false;
            }
        };
        let timeout = self.timeouts.delete();
        self.acknowledged(&Command::Delete(slot), "DELETE:OK:", AckKind::Delete, timeout)
    }

    /// Erase every template on the sensor.
    pub fn clear_all_templates(&mut self) -> bool {
        let timeout = self.timeouts.clear();
        self.acknowledged(&Command::Clear, "CLEAR:OK", AckKind::Clear, timeout)
    }

    pub fn self_test(&mut self) -> bool {
        let timeout = self.timeouts.test();
        self.acknowledged(&Command::Test, "TEST:OK", AckKind::Test, timeout)
    }

    fn acknowledged(
        &mut self,
        command: &Command,
        marker: &'static str,
        kind: AckKind,
        timeout: Duration,
    ) -> bool {
        let markers = [marker, FAILURE_MARKERS[0], FAILURE_MARKERS[1]];
        match self.request(command, &markers, timeout) {
            Some(reply) if !reply.is_failure() => {
                DeviceMessage::parse(&reply.line) == DeviceMessage::Ack(kind)
            }
            Some(reply) => {
                tracing::warn!("{} refused by sensor: {}", command, reply.line);
                false
            }
            None => false,
        }
    }

    /// Synchronous exchange gated on the connected state. Failures are logged
    /// and collapse to `None`.
    fn request(
        &mut self,
        command: &Command,
        markers: &[&'static str],
        timeout: Duration,
    ) -> Option<Reply> {
        if !self.is_connected() {
            tracing::warn!("{} skipped: no active connection", command);
            return None;
        }
        let settle = self.timeouts.settle();
        let link = self.link.as_mut()?;
        match exchange(link, command, markers, timeout, settle) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("❌ {} failed: {}", command, e);
                self.handle_io_fault(&e);
                None
            }
        }
    }

    /// A port that errors on I/O is gone (unplugged); drop it.
    fn handle_io_fault(&mut self, error: &SensorError) {
        if matches!(error, SensorError::IoError(_) | SensorError::SerialError(_)) {
            tracing::warn!("Dropping connection after I/O fault");
            self.disconnect();
        }
    }

    /// Run an enrollment into `slot`. Exactly one terminal callback fires,
    /// including for an invalid slot or a missing connection.
    pub fn enroll(
        &mut self,
        slot: i64,
        listener: &mut dyn EnrollmentListener,
        cancel: &CancelToken,
    ) -> EnrollmentOutcome {
        let slot = match SlotId::new(slot) {
            Ok(slot) => slot,
            Err(e) => {
                listener.on_error(&e);
                return EnrollmentOutcome::failed(e.user_friendly_message());
            }
        };
        let timeouts = self.timeouts.clone();
        let link = match self.ready_link() {
            Ok(link) => link,
            Err(e) => {
                listener.on_error(&e);
                return EnrollmentOutcome::failed(e.user_friendly_message());
            }
        };
        run_enrollment(link, slot, listener, &timeouts, cancel)
    }

    /// Callback-driven verification.
    pub fn verify(
        &mut self,
        listener: &mut dyn VerificationListener,
        cancel: &CancelToken,
    ) -> VerificationOutcome {
        let timeouts = self.timeouts.clone();
        let link = match self.ready_link() {
            Ok(link) => link,
            Err(e) => {
                listener.on_error(&e);
                return VerificationOutcome::failed(e.user_friendly_message());
            }
        };
        run_verification(link, listener, &timeouts, cancel)
    }

    /// Same classification as [`verify`](Self::verify), result only.
    pub fn verify_blocking(&mut self) -> VerificationOutcome {
        self.verify(&mut SilentListener, &CancelToken::new())
    }

    fn ready_link(&mut self) -> Result<&mut FramedLink> {
        if !self.is_connected() {
            return Err(SensorError::NotConnected);
        }
        self.link.as_mut().ok_or(SensorError::NotConnected)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn is_expected_connect_failure(error: &SensorError) -> bool {
    matches!(
        error,
        SensorError::PortNotFound { .. }
            | SensorError::PortBusy { .. }
            | SensorError::PortOpenError { .. }
            | SensorError::WriteError { .. }
            | SensorError::NoAcknowledgment { .. }
            | SensorError::NotConnected
    )
}
