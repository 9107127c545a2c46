use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Serial port not found: {port}")]
    PortNotFound { port: String },

    #[error("Serial port busy: {port}")]
    PortBusy { port: String },

    #[error("Failed to open serial port {port}: {message}")]
    PortOpenError { port: String, message: String },

    #[error("Write failed: {written} of {expected} bytes accepted")]
    WriteError { written: usize, expected: usize },

    #[error("Device did not acknowledge {command}")]
    NoAcknowledgment { command: String },

    #[error("Timed out after {elapsed_ms} ms waiting for {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Sensor gave up waiting for a finger")]
    FingerTimeout,

    #[error("Device reported failure: {reason}")]
    DeviceReportedFailure { reason: String },

    #[error("Fingerprint not found")]
    NotFound,

    #[error("Malformed device message '{line}': {reason}")]
    ProtocolParseError { line: String, reason: String },

    #[error("No active connection with the sensor")]
    NotConnected,

    #[error("Slot id {value} outside 1-255")]
    InvalidSlot { value: i64 },

    #[error("Another operation is already in progress")]
    Busy,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("User {user_id} not found")]
    UserNotFound { user_id: i64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serial error: {0}")]
    SerialError(#[from] serialport::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Worker task failed: {message}")]
    WorkerError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connection,
    Protocol,
    Device,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SensorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SensorError::PortNotFound { .. }
            | SensorError::PortBusy { .. }
            | SensorError::PortOpenError { .. }
            | SensorError::WriteError { .. }
            | SensorError::NoAcknowledgment { .. }
            | SensorError::NotConnected
            | SensorError::SerialError(_)
            | SensorError::IoError(_) => ErrorCategory::Connection,
            SensorError::Timeout { .. }
            | SensorError::ProtocolParseError { .. }
            | SensorError::Busy
            | SensorError::Cancelled => ErrorCategory::Protocol,
            SensorError::DeviceReportedFailure { .. }
            | SensorError::FingerTimeout
            | SensorError::NotFound
            | SensorError::InvalidSlot { .. }
            | SensorError::UserNotFound { .. } => ErrorCategory::Device,
            SensorError::ConfigError { .. }
            | SensorError::InvalidConfigValueError { .. }
            | SensorError::MissingConfigError { .. }
            | SensorError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            SensorError::WorkerError { .. } => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 比對不到是正常業務結果
            SensorError::NotFound | SensorError::Cancelled => ErrorSeverity::Low,
            SensorError::Timeout { .. }
            | SensorError::Busy
            | SensorError::FingerTimeout
            | SensorError::DeviceReportedFailure { .. }
            | SensorError::NoAcknowledgment { .. } => ErrorSeverity::Medium,
            SensorError::IoError(_)
            | SensorError::SerialError(_)
            | SensorError::WorkerError { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            SensorError::PortNotFound { port } => {
                format!("Serial port {} is not available", port)
            }
            SensorError::PortBusy { port } => {
                format!("Serial port {} is in use by another program", port)
            }
            SensorError::NoAcknowledgment { .. } | SensorError::PortOpenError { .. } => {
                "Could not connect to the fingerprint sensor".to_string()
            }
            SensorError::NotConnected => "The fingerprint sensor is not connected".to_string(),
            SensorError::Timeout { .. } => "The sensor took too long to respond".to_string(),
            SensorError::FingerTimeout => {
                "No finger was placed on the sensor in time".to_string()
            }
            SensorError::DeviceReportedFailure { reason } => {
                format!("The sensor reported an error: {}", reason)
            }
            SensorError::NotFound => "Fingerprint not registered".to_string(),
            SensorError::InvalidSlot { .. } => {
                "Fingerprint id must be between 1 and 255".to_string()
            }
            SensorError::Busy => "The sensor is busy with another operation".to_string(),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Connection => {
                "Check the USB cable, make sure the sensor firmware is loaded and the baud rate matches"
            }
            ErrorCategory::Protocol => "Wait for the current operation to finish and try again",
            ErrorCategory::Device => "Place the finger again or pick a different slot id",
            ErrorCategory::Configuration => "Review the configuration file and command line flags",
            ErrorCategory::Internal => "Restart the application; report the issue if it persists",
        }
    }
}

pub type Result<T> = std::result::Result<T, SensorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_share_suggestion() {
        let not_found = SensorError::PortNotFound {
            port: "COM9".to_string(),
        };
        let no_ack = SensorError::NoAcknowledgment {
            command: "PING".to_string(),
        };

        assert_eq!(not_found.category(), ErrorCategory::Connection);
        assert_eq!(no_ack.category(), ErrorCategory::Connection);
        assert_eq!(not_found.recovery_suggestion(), no_ack.recovery_suggestion());
        assert!(not_found.recovery_suggestion().contains("baud rate"));
    }

    #[test]
    fn test_finger_timeout_is_a_device_failure() {
        let err = SensorError::FingerTimeout;
        assert_eq!(err.category(), ErrorCategory::Device);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(!err.to_string().contains("0 ms"));
    }

    #[test]
    fn test_not_found_is_low_severity() {
        assert_eq!(SensorError::NotFound.severity(), ErrorSeverity::Low);
        assert_eq!(SensorError::NotFound.category(), ErrorCategory::Device);
    }
}
