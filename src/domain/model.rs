use crate::utils::error::{Result, SensorError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index under which the sensor stores one fingerprint template (1-255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct SlotId(u8);

impl SlotId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 255;

    pub fn new(value: i64) -> Result<Self> {
        if value < Self::MIN as i64 || value > Self::MAX as i64 {
            return Err(SensorError::InvalidSlot { value });
        }
        Ok(Self(value as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for SlotId {
    type Error = SensorError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SlotId> for u8 {
    fn from(slot: SlotId) -> u8 {
        slot.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound command. Rendered without the line terminator; framing appends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Count,
    Enroll(SlotId),
    Verify,
    Delete(SlotId),
    Clear,
    Test,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ping => write!(f, "PING"),
            Command::Count => write!(f, "COUNT"),
            Command::Enroll(slot) => write!(f, "ENROLL:{}", slot),
            Command::Verify => write!(f, "VERIFY"),
            Command::Delete(slot) => write!(f, "DELETE:{}", slot),
            Command::Clear => write!(f, "CLEAR"),
            Command::Test => write!(f, "TEST"),
        }
    }
}

/// An available serial interface. `name` is the descriptor passed to `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port_type: "Unknown".to_string(),
            manufacturer: None,
            product: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }
}

/// Progress stages the firmware reports while an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Stage {
    EnrollStart(String),
    PlaceFinger,
    Captured,
    RemoveFinger,
    PlaceAgain,
    CreatingModel,
    Saving,
    Stored,
    Found(String),
}

impl Stage {
    pub fn description(&self) -> String {
        match self {
            Stage::EnrollStart(detail) if detail.is_empty() => "Starting enrollment".to_string(),
            Stage::EnrollStart(detail) => format!("Starting enrollment ({})", detail),
            Stage::PlaceFinger => "Place your finger on the sensor".to_string(),
            Stage::Captured => "Image captured".to_string(),
            Stage::RemoveFinger => "Remove your finger".to_string(),
            Stage::PlaceAgain => "Place the same finger again".to_string(),
            Stage::CreatingModel => "Creating fingerprint model".to_string(),
            Stage::Saving => "Saving template".to_string(),
            Stage::Stored => "Template stored".to_string(),
            Stage::Found(detail) => format!("Candidate found ({})", detail),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentOutcome {
    pub success: bool,
    pub message: String,
    pub slot_id: Option<SlotId>,
    pub completed_at: DateTime<Utc>,
}

impl EnrollmentOutcome {
    pub fn enrolled(slot: SlotId) -> Self {
        Self {
            success: true,
            message: format!("Fingerprint enrolled in slot {}", slot),
            slot_id: Some(slot),
            completed_at: Utc::now(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            slot_id: None,
            completed_at: Utc::now(),
        }
    }
}

/// Which terminal message ended a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Matched,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub success: bool,
    pub status: VerifyStatus,
    pub slot_id: Option<SlotId>,
    pub confidence: Option<u16>,
    pub message: String,
    pub completed_at: DateTime<Utc>,
}

impl VerificationOutcome {
    pub fn matched(slot: SlotId, confidence: u16) -> Self {
        Self {
            success: true,
            status: VerifyStatus::Matched,
            slot_id: Some(slot),
            confidence: Some(confidence),
            message: format!("Matched slot {} with confidence {}", slot, confidence),
            completed_at: Utc::now(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            success: false,
            status: VerifyStatus::NotFound,
            slot_id: None,
            confidence: None,
            message: "Fingerprint not registered".to_string(),
            completed_at: Utc::now(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: VerifyStatus::Failed,
            slot_id: None,
            confidence: None,
            message: message.into(),
            completed_at: Utc::now(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == VerifyStatus::NotFound
    }
}

/// The slice of a user record the sensor layer needs to resolve identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub document_id: String,
    pub full_name: String,
    pub slot_id: Option<SlotId>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Identification {
    pub outcome: VerificationOutcome,
    pub user: Option<UserRecord>,
}
