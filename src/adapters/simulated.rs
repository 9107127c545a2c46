//! In-process stand-in for the sensor firmware.
//!
//! Replies are queued the moment a full command line is written, so tests
//! run without real delays. Use it wherever a `PortOpener` is expected.

use crate::domain::model::PortInfo;
use crate::domain::ports::{PortOpener, SerialLink};
use crate::utils::error::{Result, SensorError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct DeviceState {
    ports: Vec<PortInfo>,
    busy_ports: HashSet<String>,
    banner: Vec<String>,
    replies: HashMap<String, Vec<String>>,
    one_shot: HashMap<String, VecDeque<Vec<String>>>,
    output: Vec<u8>,
    received: Vec<String>,
    write_limit: Option<usize>,
    open_links: usize,
    opened_total: usize,
}

impl DeviceState {
    fn handle_command(&mut self, command: &str) {
        self.received.push(command.to_string());

        let lines = match self.one_shot.get_mut(command).and_then(|q| q.pop_front()) {
            Some(lines) => lines,
            None => self.replies.get(command).cloned().unwrap_or_default(),
        };
        for line in lines {
            self.output.extend_from_slice(line.as_bytes());
            self.output.extend_from_slice(b"\r\n");
        }
    }
}

/// Scriptable fake sensor. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    /// A device on `port` that answers `PING` with `READY`.
    pub fn new(port: &str) -> Self {
        let device = Self::default();
        device.add_port(port);
        device.respond("PING", &["READY"]);
        device
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_port(&self, port: &str) {
        self.state().ports.push(PortInfo::named(port));
    }

    /// Refuse exclusive access to `port`, like a port held by another program.
    pub fn mark_busy(&self, port: &str) {
        self.state().busy_ports.insert(port.to_string());
    }

    /// Lines printed right after the port opens (board reset chatter).
    pub fn set_banner(&self, lines: &[&str]) {
        self.state().banner = lines.iter().map(|l| l.to_string()).collect();
    }

    /// Reply with `lines` every time `command` arrives.
    pub fn respond(&self, command: &str, lines: &[&str]) {
        self.state().replies.insert(
            command.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    /// Reply with `lines` to the next `command` only; takes priority over `respond`.
    pub fn respond_once(&self, command: &str, lines: &[&str]) {
        self.state()
            .one_shot
            .entry(command.to_string())
            .or_default()
            .push_back(lines.iter().map(|l| l.to_string()).collect());
    }

    /// Stop answering `command`.
    pub fn silence(&self, command: &str) {
        let mut state = self.state();
        state.replies.remove(command);
        state.one_shot.remove(command);
    }

    /// Put bytes in the host-bound buffer as if left over from an earlier operation.
    pub fn inject(&self, raw: &str) {
        self.state().output.extend_from_slice(raw.as_bytes());
    }

    /// Accept at most `limit` bytes per write from now on.
    pub fn limit_writes(&self, limit: usize) {
        self.state().write_limit = Some(limit);
    }

    /// Commands received so far, without terminators.
    pub fn received(&self) -> Vec<String> {
        self.state().received.clone()
    }

    pub fn open_links(&self) -> usize {
        self.state().open_links
    }

    pub fn opened_total(&self) -> usize {
        self.state().opened_total
    }
}

impl PortOpener for SimulatedDevice {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        Ok(self.state().ports.clone())
    }

    fn open(&self, port: &str, _baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        let mut state = self.state();
        if !state.ports.iter().any(|p| p.name == port) {
            return Err(SensorError::PortNotFound {
                port: port.to_string(),
            });
        }
        if state.busy_ports.contains(port) || state.open_links > 0 {
            return Err(SensorError::PortBusy {
                port: port.to_string(),
            });
        }

        state.open_links += 1;
        state.opened_total += 1;
        let banner = state.banner.clone();
        for line in banner {
            state.output.extend_from_slice(line.as_bytes());
            state.output.extend_from_slice(b"\r\n");
        }

        Ok(Box::new(SimulatedLink {
            state: self.state.clone(),
            name: port.to_string(),
            open: true,
            incoming: Vec::new(),
        }))
    }
}

struct SimulatedLink {
    state: Arc<Mutex<DeviceState>>,
    name: String,
    open: bool,
    incoming: Vec<u8>,
}

impl SimulatedLink {
    fn device(&self) -> Result<MutexGuard<'_, DeviceState>> {
        if !self.open {
            return Err(SensorError::NotConnected);
        }
        Ok(self.state.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

impl SerialLink for SimulatedLink {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn clear_input(&mut self) -> Result<()> {
        self.device()?.output.clear();
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.device()?.write_limit;
        if let Some(limit) = limit.filter(|l| *l < data.len()) {
            return Err(SensorError::WriteError {
                written: limit,
                expected: data.len(),
            });
        }

        self.incoming.extend_from_slice(data);
        let mut commands = Vec::new();
        while let Some(end) = self.incoming.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.incoming.drain(..=end).collect();
            commands.push(String::from_utf8_lossy(&raw[..end]).trim().to_string());
        }

        let mut device = self.device()?;
        for command in commands {
            device.handle_command(&command);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let mut device = self.device()?;
        let n = device.output.len();
        buf.append(&mut device.output);
        Ok(n)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.open_links = state.open_links.saturating_sub(1);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for SimulatedLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_follow_written_commands() {
        let device = SimulatedDevice::new("COM-TEST");
        device.respond("COUNT", &["COUNT:3"]);

        let mut link = device.open("COM-TEST", 57600).unwrap();
        link.write_bytes(b"COUNT\n").unwrap();

        let mut buf = Vec::new();
        link.read_available(&mut buf).unwrap();
        assert_eq!(buf, b"COUNT:3\r\n");
        assert_eq!(device.received(), vec!["COUNT".to_string()]);
    }

    #[test]
    fn test_one_shot_reply_takes_priority_once() {
        let device = SimulatedDevice::new("COM-TEST");
        device.respond_once("PING", &["BOOTING"]);

        let mut link = device.open("COM-TEST", 57600).unwrap();
        let mut buf = Vec::new();
        link.write_bytes(b"PING\n").unwrap();
        link.read_available(&mut buf).unwrap();
        link.write_bytes(b"PING\n").unwrap();
        link.read_available(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "BOOTING\r\nREADY\r\n");
    }

    #[test]
    fn test_second_open_is_refused_until_close() {
        let device = SimulatedDevice::new("COM-TEST");
        let mut first = device.open("COM-TEST", 57600).unwrap();
        assert!(matches!(
            device.open("COM-TEST", 57600),
            Err(SensorError::PortBusy { .. })
        ));
        first.close();
        first.close();
        assert_eq!(device.open_links(), 0);
        assert!(device.open("COM-TEST", 57600).is_ok());
    }

    #[test]
    fn test_limited_write_reports_short_count() {
        let device = SimulatedDevice::new("COM-TEST");
        device.limit_writes(3);
        let mut link = device.open("COM-TEST", 57600).unwrap();
        assert!(matches!(
            link.write_bytes(b"PING\n"),
            Err(SensorError::WriteError {
                written: 3,
                expected: 5
            })
        ));
    }
}
