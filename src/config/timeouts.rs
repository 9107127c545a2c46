use crate::utils::error::Result;
use crate::utils::validation::{validate_positive_number, Validate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Baud rate the sensor firmware listens on (8-N-1).
pub const DEFAULT_BAUD_RATE: u32 = 57600;

/// Every delay and budget the protocol uses, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTimeouts {
    /// Wait after opening the port; the board resets when DTR toggles.
    pub stabilization_ms: u64,
    /// Gap between clear/write/read in a synchronous exchange.
    pub settle_ms: u64,
    /// Transport-level pause right after the OS hands us the port.
    pub open_settle_ms: u64,
    pub ping_ms: u64,
    pub count_ms: u64,
    pub delete_ms: u64,
    pub clear_ms: u64,
    pub test_ms: u64,
    pub enroll_ms: u64,
    pub verify_ms: u64,
    /// Per-read budget inside the enrollment/verification receive loops.
    pub poll_read_ms: u64,
}

impl Default for ProtocolTimeouts {
    fn default() -> Self {
        Self {
            stabilization_ms: 2000,
            settle_ms: 50,
            open_settle_ms: 100,
            ping_ms: 2000,
            count_ms: 2000,
            delete_ms: 3000,
            clear_ms: 10000,
            test_ms: 5000,
            enroll_ms: 30000,
            verify_ms: 15000,
            poll_read_ms: 100,
        }
    }
}

impl ProtocolTimeouts {
    pub fn stabilization(&self) -> Duration {
        Duration::from_millis(self.stabilization_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn ping(&self) -> Duration {
        Duration::from_millis(self.ping_ms)
    }

    pub fn count(&self) -> Duration {
        Duration::from_millis(self.count_ms)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_millis(self.delete_ms)
    }

    pub fn clear(&self) -> Duration {
        Duration::from_millis(self.clear_ms)
    }

    pub fn test(&self) -> Duration {
        Duration::from_millis(self.test_ms)
    }

    pub fn enroll(&self) -> Duration {
        Duration::from_millis(self.enroll_ms)
    }

    pub fn verify(&self) -> Duration {
        Duration::from_millis(self.verify_ms)
    }

    pub fn poll_read(&self) -> Duration {
        Duration::from_millis(self.poll_read_ms)
    }
}

impl Validate for ProtocolTimeouts {
    fn validate(&self) -> Result<()> {
        // settle/stabilization may be zero (simulated devices); budgets may not
        let budgets = [
            ("timeouts.ping_ms", self.ping_ms),
            ("timeouts.count_ms", self.count_ms),
            ("timeouts.delete_ms", self.delete_ms),
            ("timeouts.clear_ms", self.clear_ms),
            ("timeouts.test_ms", self.test_ms),
            ("timeouts.enroll_ms", self.enroll_ms),
            ("timeouts.verify_ms", self.verify_ms),
            ("timeouts.poll_read_ms", self.poll_read_ms),
        ];
        for (field, value) in budgets {
            validate_positive_number(field, value, 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let timeouts = ProtocolTimeouts::default();
        assert!(timeouts.validate().is_ok());
        assert!(timeouts.clear() > timeouts.ping());
        assert!(timeouts.enroll() > timeouts.verify());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let timeouts = ProtocolTimeouts {
            verify_ms: 0,
            ..Default::default()
        };
        assert!(timeouts.validate().is_err());
    }
}
