use crate::config::timeouts::ProtocolTimeouts;
use crate::core::framing::FramedLink;
use crate::core::message::DeviceMessage;
use crate::core::operation::CancelToken;
use crate::domain::model::{Command, EnrollmentOutcome, SlotId};
use crate::domain::ports::EnrollmentListener;
use crate::utils::error::SensorError;
use std::time::Instant;

/// Send `ENROLL:<slot>` and follow the device until a terminal message, the
/// overall budget runs out, or the caller cancels.
///
/// Fires exactly one of `on_success`/`on_error` on `listener`.
pub fn run_enrollment(
    link: &mut FramedLink,
    slot: SlotId,
    listener: &mut dyn EnrollmentListener,
    timeouts: &ProtocolTimeouts,
    cancel: &CancelToken,
) -> EnrollmentOutcome {
    tracing::info!("Starting enrollment for slot {}", slot);

    let sent = link
        .clear_input()
        .and_then(|_| link.send_line(&Command::Enroll(slot).to_string()));
    if let Err(e) = sent {
        tracing::error!("❌ Could not send enroll command: {}", e);
        return fail(listener, e);
    }

    let budget = timeouts.enroll();
    let started = Instant::now();

    loop {
        if cancel.is_cancelled() {
            tracing::info!("Enrollment for slot {} cancelled by caller", slot);
            return fail(listener, SensorError::Cancelled);
        }

        let elapsed = started.elapsed();
        if elapsed >= budget {
            break;
        }

        let line = match link.read_line(timeouts.poll_read().min(budget - elapsed)) {
            Ok(Some(line)) => line,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!("❌ Serial read failed during enrollment: {}", e);
                return fail(listener, e);
            }
        };

        match DeviceMessage::parse(&line) {
            DeviceMessage::Progress(stage) => {
                listener.on_progress(&stage, &stage.description());
            }
            DeviceMessage::EnrollOk { stored, slot: confirmed } => {
                if confirmed != slot {
                    tracing::warn!(
                        "Device stored template in slot {} (requested {})",
                        confirmed,
                        slot
                    );
                }
                tracing::info!(
                    "✅ Enrolled slot {} ({} templates on device)",
                    confirmed,
                    stored
                );
                listener.on_success(confirmed);
                return EnrollmentOutcome::enrolled(confirmed);
            }
            msg @ (DeviceMessage::EnrollFail(_)
            | DeviceMessage::DeviceError(_)
            | DeviceMessage::Timeout
            | DeviceMessage::NotMatch) => {
                if let Some(error) = msg.to_error() {
                    tracing::warn!("Enrollment for slot {} failed: {}", slot, error);
                    return fail(listener, error);
                }
            }
            msg @ DeviceMessage::Malformed { .. } if line.starts_with("ENROLL:") => {
                if let Some(error) = msg.to_error() {
                    tracing::warn!("{}", error);
                    return fail(listener, error);
                }
            }
            other => tracing::debug!("Ignoring during enrollment: {:?}", other),
        }
    }

    let error = SensorError::Timeout {
        operation: "enrollment".to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    tracing::warn!("⏱️ {}", error);
    fail(listener, error)
}

fn fail(listener: &mut dyn EnrollmentListener, error: SensorError) -> EnrollmentOutcome {
    listener.on_error(&error);
    EnrollmentOutcome::failed(failure_message(&error))
}

/// Device reason text when there is one, else a generic sentence.
pub(crate) fn failure_message(error: &SensorError) -> String {
    match error {
        SensorError::DeviceReportedFailure { reason } if reason != "UNKNOWN" => reason.clone(),
        other => other.user_friendly_message(),
    }
}
