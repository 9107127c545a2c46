//! Classifies one line from the firmware into a typed message.
//!
//! Structured prefixes (`ENROLL:`, `VERIFY:`, ...) are resolved first, and
//! bare tokens are compared against the head field only. A failure reason
//! such as `ENROLL:FAIL:NOT_MATCH` therefore stays an `EnrollFail`. Acks,
//! counts and `READY` are also found inside longer lines (`FP:READY`).

use crate::domain::model::{SlotId, Stage};
use crate::utils::error::SensorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    Ready,
    Count(u32),
    Progress(Stage),
    EnrollOk { stored: u32, slot: SlotId },
    EnrollFail(String),
    VerifyOk { matches: u32, slot: SlotId, confidence: u16 },
    VerifyNotFound,
    VerifyFail(String),
    /// `DELETE:OK:`, `CLEAR:OK`, `TEST:OK`
    Ack(AckKind),
    DeviceError(String),
    Timeout,
    NotMatch,
    Malformed { line: String, reason: String },
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Delete,
    Clear,
    Test,
}

impl DeviceMessage {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut fields = line.split(':');
        let head = fields.next().unwrap_or_default();
        let rest: Vec<&str> = fields.collect();

        match head {
            "ENROLL" => parse_enroll(line, &rest),
            "VERIFY" => parse_verify(line, &rest),
            "COUNT" => parse_count(line, &rest),
            "DELETE" if rest.first() == Some(&"OK") => DeviceMessage::Ack(AckKind::Delete),
            "CLEAR" if rest.first() == Some(&"OK") => DeviceMessage::Ack(AckKind::Clear),
            "TEST" if rest.first() == Some(&"OK") => DeviceMessage::Ack(AckKind::Test),
            "DELETE" | "CLEAR" | "TEST" if rest.first() == Some(&"FAIL") => {
                DeviceMessage::DeviceError(reason_from(&rest[1..]))
            }
            "FOUND" => DeviceMessage::Progress(Stage::Found(rest.join(":"))),
            "PLACE_FINGER" => DeviceMessage::Progress(Stage::PlaceFinger),
            "CAPTURED" => DeviceMessage::Progress(Stage::Captured),
            "REMOVE_FINGER" => DeviceMessage::Progress(Stage::RemoveFinger),
            "PLACE_AGAIN" => DeviceMessage::Progress(Stage::PlaceAgain),
            "CREATING_MODEL" => DeviceMessage::Progress(Stage::CreatingModel),
            "SAVING" => DeviceMessage::Progress(Stage::Saving),
            "SUCCESS" => DeviceMessage::Progress(Stage::Stored),
            "TIMEOUT" => DeviceMessage::Timeout,
            "NOT_MATCH" => DeviceMessage::NotMatch,
            h if h.starts_with("ERROR") => DeviceMessage::DeviceError(reason_from(&rest)),
            _ => parse_embedded(line).unwrap_or_else(|| DeviceMessage::Unknown(line.to_string())),
        }
    }

    /// Error for a failure message; `None` for anything else.
    pub fn to_error(&self) -> Option<SensorError> {
        match self {
            DeviceMessage::EnrollFail(reason)
            | DeviceMessage::VerifyFail(reason)
            | DeviceMessage::DeviceError(reason) => Some(SensorError::DeviceReportedFailure {
                reason: reason.clone(),
            }),
            DeviceMessage::NotMatch => Some(SensorError::DeviceReportedFailure {
                reason: "Fingerprints did not match".to_string(),
            }),
            DeviceMessage::Timeout => Some(SensorError::FingerTimeout),
            DeviceMessage::VerifyNotFound => Some(SensorError::NotFound),
            DeviceMessage::Malformed { line, reason } => Some(SensorError::ProtocolParseError {
                line: line.clone(),
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

/// Tags that may sit anywhere in a line, e.g. `FP:READY` or `STATUS COUNT:5`.
fn parse_embedded(line: &str) -> Option<DeviceMessage> {
    if line.contains("FAIL") {
        return None;
    }
    if line.contains("DELETE:OK:") {
        return Some(DeviceMessage::Ack(AckKind::Delete));
    }
    if line.contains("CLEAR:OK") {
        return Some(DeviceMessage::Ack(AckKind::Clear));
    }
    if line.contains("TEST:OK") {
        return Some(DeviceMessage::Ack(AckKind::Test));
    }
    if let Some(at) = line.find("COUNT:") {
        return Some(parse_count(line, &[&line[at + "COUNT:".len()..]]));
    }
    if line.contains("READY") {
        return Some(DeviceMessage::Ready);
    }
    None
}

fn reason_from(fields: &[&str]) -> String {
    let reason = fields.join(":");
    if reason.trim().is_empty() {
        "UNKNOWN".to_string()
    } else {
        reason.trim().to_string()
    }
}

fn parse_enroll(line: &str, rest: &[&str]) -> DeviceMessage {
    match rest.first().copied() {
        Some("START") => DeviceMessage::Progress(Stage::EnrollStart(rest[1..].join(":"))),
        // ENROLL:OK:<n>:<id>
        Some("OK") => {
            let stored = match parse_number::<u32>(line, rest.get(1), "template count") {
                Ok(v) => v,
                Err(m) => return m,
            };
            let slot = match parse_slot(line, rest.get(2)) {
                Ok(v) => v,
                Err(m) => return m,
            };
            DeviceMessage::EnrollOk { stored, slot }
        }
        Some("FAIL") => DeviceMessage::EnrollFail(reason_from(&rest[1..])),
        _ => DeviceMessage::Unknown(line.to_string()),
    }
}

fn parse_verify(line: &str, rest: &[&str]) -> DeviceMessage {
    match rest.first().copied() {
        // VERIFY:OK:<n>:<id>:<confidence>
        Some("OK") => {
            let matches = match parse_number::<u32>(line, rest.get(1), "match count") {
                Ok(v) => v,
                Err(m) => return m,
            };
            let slot = match parse_slot(line, rest.get(2)) {
                Ok(v) => v,
                Err(m) => return m,
            };
            let confidence = match parse_number::<u16>(line, rest.get(3), "confidence") {
                Ok(v) => v,
                Err(m) => return m,
            };
            DeviceMessage::VerifyOk {
                matches,
                slot,
                confidence,
            }
        }
        Some("FAIL") if rest.get(1).map(|r| r.trim()) == Some("NOT_FOUND") => {
            DeviceMessage::VerifyNotFound
        }
        Some("FAIL") => DeviceMessage::VerifyFail(reason_from(&rest[1..])),
        _ => DeviceMessage::Unknown(line.to_string()),
    }
}

/// `COUNT:<n>`; trailing text after the digits is ignored.
fn parse_count(line: &str, rest: &[&str]) -> DeviceMessage {
    let field = rest.first().copied().unwrap_or_default().trim_start();
    let digits: String = field.chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u32>() {
        Ok(n) => DeviceMessage::Count(n),
        Err(_) => DeviceMessage::Malformed {
            line: line.to_string(),
            reason: "template count is not a number".to_string(),
        },
    }
}

fn parse_number<T: std::str::FromStr>(
    line: &str,
    field: Option<&&str>,
    what: &str,
) -> Result<T, DeviceMessage> {
    field
        .and_then(|f| f.trim().parse::<T>().ok())
        .ok_or_else(|| DeviceMessage::Malformed {
            line: line.to_string(),
            reason: format!("invalid {}", what),
        })
}

fn parse_slot(line: &str, field: Option<&&str>) -> Result<SlotId, DeviceMessage> {
    let raw = parse_number::<i64>(line, field, "slot id")?;
    SlotId::new(raw).map_err(|_| DeviceMessage::Malformed {
        line: line.to_string(),
        reason: format!("slot id {} out of range", raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: i64) -> SlotId {
        SlotId::new(n).unwrap()
    }

    #[test]
    fn test_progress_tokens() {
        assert_eq!(
            DeviceMessage::parse("PLACE_FINGER"),
            DeviceMessage::Progress(Stage::PlaceFinger)
        );
        assert_eq!(
            DeviceMessage::parse("CREATING_MODEL\r"),
            DeviceMessage::Progress(Stage::CreatingModel)
        );
        assert_eq!(
            DeviceMessage::parse("ENROLL:START:42"),
            DeviceMessage::Progress(Stage::EnrollStart("42".to_string()))
        );
        assert_eq!(
            DeviceMessage::parse("FOUND:17"),
            DeviceMessage::Progress(Stage::Found("17".to_string()))
        );
    }

    #[test]
    fn test_enroll_terminals() {
        assert_eq!(
            DeviceMessage::parse("ENROLL:OK:1:42"),
            DeviceMessage::EnrollOk {
                stored: 1,
                slot: slot(42)
            }
        );
        assert_eq!(
            DeviceMessage::parse("ENROLL:FAIL:IMAGE_MESSY"),
            DeviceMessage::EnrollFail("IMAGE_MESSY".to_string())
        );
        assert_eq!(DeviceMessage::parse("ENROLL:FAIL"), DeviceMessage::EnrollFail("UNKNOWN".to_string()));
    }

    #[test]
    fn test_fail_reason_is_not_reread_as_bare_token() {
        assert_eq!(
            DeviceMessage::parse("ENROLL:FAIL:NOT_MATCH"),
            DeviceMessage::EnrollFail("NOT_MATCH".to_string())
        );
        assert_eq!(
            DeviceMessage::parse("VERIFY:FAIL:TIMEOUT"),
            DeviceMessage::VerifyFail("TIMEOUT".to_string())
        );
        assert_eq!(DeviceMessage::parse("NOT_MATCH"), DeviceMessage::NotMatch);
    }

    #[test]
    fn test_verify_terminals() {
        assert_eq!(
            DeviceMessage::parse("VERIFY:OK:3:12:187"),
            DeviceMessage::VerifyOk {
                matches: 3,
                slot: slot(12),
                confidence: 187
            }
        );
        assert_eq!(
            DeviceMessage::parse("VERIFY:FAIL:NOT_FOUND"),
            DeviceMessage::VerifyNotFound
        );
        assert_eq!(
            DeviceMessage::parse("VERIFY:FAIL:SENSOR"),
            DeviceMessage::VerifyFail("SENSOR".to_string())
        );
        assert_eq!(
            DeviceMessage::parse("ERROR:NO_SENSOR"),
            DeviceMessage::DeviceError("NO_SENSOR".to_string())
        );
    }

    #[test]
    fn test_malformed_numeric_fields() {
        assert!(matches!(
            DeviceMessage::parse("VERIFY:OK:1:abc:90"),
            DeviceMessage::Malformed { .. }
        ));
        assert!(matches!(
            DeviceMessage::parse("ENROLL:OK:1:0"),
            DeviceMessage::Malformed { .. }
        ));
        assert!(matches!(
            DeviceMessage::parse("ENROLL:OK:1:300"),
            DeviceMessage::Malformed { .. }
        ));
        let err = DeviceMessage::parse("VERIFY:OK:1:5").to_error();
        assert!(matches!(err, Some(SensorError::ProtocolParseError { .. })));
    }

    #[test]
    fn test_count_tolerates_trailing_text() {
        assert_eq!(DeviceMessage::parse("COUNT:7 extra"), DeviceMessage::Count(7));
        assert_eq!(DeviceMessage::parse("COUNT:0"), DeviceMessage::Count(0));
        assert!(matches!(
            DeviceMessage::parse("COUNT:many"),
            DeviceMessage::Malformed { .. }
        ));
    }

    #[test]
    fn test_acks_and_liveness() {
        assert_eq!(DeviceMessage::parse("READY"), DeviceMessage::Ready);
        assert_eq!(DeviceMessage::parse("SENSOR READY v4.2"), DeviceMessage::Ready);
        assert_eq!(DeviceMessage::parse("DELETE:OK:5"), DeviceMessage::Ack(AckKind::Delete));
        assert_eq!(DeviceMessage::parse("CLEAR:OK"), DeviceMessage::Ack(AckKind::Clear));
        assert_eq!(DeviceMessage::parse("TEST:OK"), DeviceMessage::Ack(AckKind::Test));
        assert_eq!(
            DeviceMessage::parse("hello"),
            DeviceMessage::Unknown("hello".to_string())
        );
    }

    #[test]
    fn test_embedded_tags() {
        assert_eq!(DeviceMessage::parse("FP:READY"), DeviceMessage::Ready);
        assert_eq!(DeviceMessage::parse("STATUS COUNT:5"), DeviceMessage::Count(5));
        assert_eq!(
            DeviceMessage::parse("RESULT DELETE:OK:5"),
            DeviceMessage::Ack(AckKind::Delete)
        );
        assert_eq!(DeviceMessage::parse("SELF TEST:OK"), DeviceMessage::Ack(AckKind::Test));
        assert_eq!(DeviceMessage::parse("DONE CLEAR:OK"), DeviceMessage::Ack(AckKind::Clear));
        assert!(matches!(
            DeviceMessage::parse("STATUS COUNT:x"),
            DeviceMessage::Malformed { .. }
        ));
    }

    #[test]
    fn test_embedded_tags_never_override_failures() {
        assert_eq!(
            DeviceMessage::parse("ENROLL:FAIL:NOT_READY"),
            DeviceMessage::EnrollFail("NOT_READY".to_string())
        );
        assert_eq!(
            DeviceMessage::parse("ERROR:SENSOR_NOT_READY"),
            DeviceMessage::DeviceError("SENSOR_NOT_READY".to_string())
        );
        assert_eq!(
            DeviceMessage::parse("SELF TEST:FAIL"),
            DeviceMessage::Unknown("SELF TEST:FAIL".to_string())
        );
    }
}
