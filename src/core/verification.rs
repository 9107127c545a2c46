use crate::config::timeouts::ProtocolTimeouts;
use crate::core::enrollment::failure_message;
use crate::core::framing::FramedLink;
use crate::core::message::DeviceMessage;
use crate::core::operation::CancelToken;
use crate::domain::model::{Command, VerificationOutcome};
use crate::domain::ports::VerificationListener;
use crate::utils::error::SensorError;
use std::time::Instant;

/// Send `VERIFY` and follow a single capture to its result.
///
/// `VERIFY:FAIL:NOT_FOUND` goes to `on_not_found`, never to `on_error`.
pub fn run_verification(
    link: &mut FramedLink,
    listener: &mut dyn VerificationListener,
    timeouts: &ProtocolTimeouts,
    cancel: &CancelToken,
) -> VerificationOutcome {
    tracing::info!("Starting fingerprint verification");

    let sent = link
        .clear_input()
        .and_then(|_| link.send_line(&Command::Verify.to_string()));
    if let Err(e) = sent {
        tracing::error!("❌ Could not send verify command: {}", e);
        return fail(listener, e);
    }

    let budget = timeouts.verify();
    let started = Instant::now();

    while started.elapsed() < budget {
        if cancel.is_cancelled() {
            tracing::info!("Verification cancelled by caller");
            return fail(listener, SensorError::Cancelled);
        }

        let remaining = budget.saturating_sub(started.elapsed());
        let line = match link.read_line(timeouts.poll_read().min(remaining)) {
            Ok(Some(line)) => line,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!("❌ Serial read failed during verification: {}", e);
                return fail(listener, e);
            }
        };

        match DeviceMessage::parse(&line) {
            DeviceMessage::Progress(stage) => {
                listener.on_progress(&stage, &stage.description());
            }
            DeviceMessage::VerifyOk {
                slot, confidence, ..
            } => {
                tracing::info!("✅ Match: slot {} confidence {}", slot, confidence);
                listener.on_success(slot, confidence);
                return VerificationOutcome::matched(slot, confidence);
            }
            DeviceMessage::VerifyNotFound => {
                tracing::info!("Fingerprint not registered on device");
                listener.on_not_found();
                return VerificationOutcome::not_found();
            }
            msg @ (DeviceMessage::VerifyFail(_)
            | DeviceMessage::DeviceError(_)
            | DeviceMessage::Timeout) => {
                if let Some(error) = msg.to_error() {
                    tracing::warn!("Verification failed: {}", error);
                    return fail(listener, error);
                }
            }
            msg @ DeviceMessage::Malformed { .. } if line.starts_with("VERIFY:") => {
                if let Some(error) = msg.to_error() {
                    tracing::warn!("{}", error);
                    return fail(listener, error);
                }
            }
            other => tracing::debug!("Ignoring during verification: {:?}", other),
        }
    }

    let error = SensorError::Timeout {
        operation: "verification".to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    tracing::warn!("⏱️ {}", error);
    fail(listener, error)
}

fn fail(listener: &mut dyn VerificationListener, error: SensorError) -> VerificationOutcome {
    listener.on_error(&error);
    VerificationOutcome::failed(failure_message(&error))
}
