use crate::domain::model::PortInfo;
use crate::domain::ports::{PortOpener, SerialLink};
use crate::utils::error::{Result, SensorError};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Short semi-blocking read timeout; framing polls on top of it.
const READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Opens real OS serial ports through the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SystemPorts {
    open_settle: Duration,
}

impl SystemPorts {
    pub fn new(open_settle: Duration) -> Self {
        Self { open_settle }
    }
}

impl Default for SystemPorts {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl PortOpener for SystemPorts {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports()?;
        let infos: Vec<PortInfo> = ports.into_iter().map(to_port_info).collect();
        tracing::debug!(
            "Available serial ports: {:?}",
            infos.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
        );
        Ok(infos)
    }

    fn open(&self, port: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        let known = self.list_ports()?;
        if !known.iter().any(|p| p.name == port) {
            return Err(SensorError::PortNotFound {
                port: port.to_string(),
            });
        }

        let handle = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| map_open_error(port, e))?;

        tracing::debug!("Opened {} @ {} baud (8-N-1)", port, baud_rate);
        std::thread::sleep(self.open_settle);

        Ok(Box::new(SystemLink {
            name: port.to_string(),
            port: Some(handle),
        }))
    }
}

fn map_open_error(port: &str, error: serialport::Error) -> SensorError {
    match error.kind() {
        serialport::ErrorKind::NoDevice => SensorError::PortNotFound {
            port: port.to_string(),
        },
        serialport::ErrorKind::Io(ErrorKind::PermissionDenied)
        | serialport::ErrorKind::Io(ErrorKind::AddrInUse)
        | serialport::ErrorKind::Io(ErrorKind::WouldBlock) => SensorError::PortBusy {
            port: port.to_string(),
        },
        _ => SensorError::PortOpenError {
            port: port.to_string(),
            message: error.to_string(),
        },
    }
}

fn to_port_info(info: serialport::SerialPortInfo) -> PortInfo {
    let mut port = PortInfo::named(info.port_name);
    match info.port_type {
        SerialPortType::UsbPort(usb) => {
            port.port_type = "USB".to_string();
            port.manufacturer = usb.manufacturer;
            port.product = usb.product;
            port.serial_number = usb.serial_number;
            port.vid = Some(usb.vid);
            port.pid = Some(usb.pid);
        }
        SerialPortType::PciPort => port.port_type = "PCI".to_string(),
        SerialPortType::BluetoothPort => port.port_type = "Bluetooth".to_string(),
        SerialPortType::Unknown => {}
    }
    port
}

/// An open OS serial port.
pub struct SystemLink {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SystemLink {
    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(SensorError::NotConnected)
    }
}

impl SerialLink for SystemLink {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        let mut written = 0;
        while written < data.len() {
            match port.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        if written < data.len() {
            return Err(SensorError::WriteError {
                written,
                expected: data.len(),
            });
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.port_mut()?.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let port = self.port_mut()?;
        let pending = port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(0);
        }

        let mut chunk = vec![0u8; pending];
        match port.read(&mut chunk) {
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        // Dropping the handle releases the OS lock on the device
        if self.port.take().is_some() {
            tracing::debug!("Closed serial port {}", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SystemLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_unknown_port_is_not_found() {
        let ports = SystemPorts::new(Duration::ZERO);
        let result = ports.open("/dev/definitely-not-a-sensor", 57600);
        assert!(matches!(
            result,
            Err(SensorError::PortNotFound { .. }) | Err(SensorError::SerialError(_))
        ));
    }

    #[test]
    fn test_usb_port_info_conversion() {
        let info = serialport::SerialPortInfo {
            port_name: "/dev/ttyACM0".to_string(),
            port_type: SerialPortType::UsbPort(serialport::UsbPortInfo {
                vid: 0x2341,
                pid: 0x0043,
                serial_number: Some("857313".to_string()),
                manufacturer: Some("Arduino".to_string()),
                product: Some("Uno".to_string()),
            }),
        };
        let port = to_port_info(info);
        assert_eq!(port.name, "/dev/ttyACM0");
        assert_eq!(port.port_type, "USB");
        assert_eq!(port.vid, Some(0x2341));
        assert_eq!(port.manufacturer.as_deref(), Some("Arduino"));
    }
}
