use crate::utils::error::{Result, SensorError};

/// Baud rates the sensor firmware can be flashed with.
pub const SUPPORTED_BAUD_RATES: [u32; 6] = [9600, 19200, 38400, 57600, 115200, 230400];

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_port_name(field_name: &str, port: &str) -> Result<()> {
    if port.trim().is_empty() {
        return Err(SensorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: port.to_string(),
            reason: "Port name cannot be empty".to_string(),
        });
    }

    if port.contains('\0') {
        return Err(SensorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: port.to_string(),
            reason: "Port name contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_baud_rate(field_name: &str, baud_rate: u32) -> Result<()> {
    if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
        let allowed: Vec<String> = SUPPORTED_BAUD_RATES.iter().map(|b| b.to_string()).collect();
        return Err(SensorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: baud_rate.to_string(),
            reason: format!("Unsupported baud rate. Allowed: {}", allowed.join(", ")),
        });
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(SensorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| SensorError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(SensorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port_name() {
        assert!(validate_port_name("device.port", "/dev/ttyUSB0").is_ok());
        assert!(validate_port_name("device.port", "COM3").is_ok());
        assert!(validate_port_name("device.port", "").is_err());
        assert!(validate_port_name("device.port", "   ").is_err());
    }

    #[test]
    fn test_validate_baud_rate() {
        assert!(validate_baud_rate("device.baud_rate", 57600).is_ok());
        assert!(validate_baud_rate("device.baud_rate", 115200).is_ok());
        assert!(validate_baud_rate("device.baud_rate", 12345).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("slot", 1, 1, 255).is_ok());
        assert!(validate_range("slot", 255, 1, 255).is_ok());
        assert!(validate_range("slot", 0, 1, 255).is_err());
        assert!(validate_range("slot", 256, 1, 255).is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some(3u32);
        let missing: Option<u32> = None;
        assert_eq!(*validate_required_field("runtime.worker_threads", &present).unwrap(), 3);
        assert!(matches!(
            validate_required_field("runtime.worker_threads", &missing),
            Err(SensorError::MissingConfigError { .. })
        ));
    }
}
