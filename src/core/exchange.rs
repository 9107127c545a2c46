use crate::core::framing::{FramedLink, MarkerRead};
use crate::domain::model::Command;
use crate::utils::error::Result;
use std::time::Duration;

/// Failure markers every synchronous reply may end with.
pub const FAILURE_MARKERS: [&str; 2] = ["FAIL", "ERROR"];

/// Reply to a synchronous command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub line: String,
    pub marker: &'static str,
}

impl Reply {
    pub fn is_failure(&self) -> bool {
        FAILURE_MARKERS.contains(&self.marker)
    }
}

/// One request/response round trip: clear, settle, write, settle, read until
/// a marker. `Ok(None)` when no marker shows up in time.
///
/// List success markers before failure markers; the first match on a line wins.
pub fn exchange(
    link: &mut FramedLink,
    command: &Command,
    markers: &[&'static str],
    timeout: Duration,
    settle: Duration,
) -> Result<Option<Reply>> {
    link.clear_input()?;
    pause(settle);

    let wire = command.to_string();
    link.send_line(&wire)?;
    pause(settle);

    match link.read_until_marker(timeout, markers)? {
        MarkerRead::Matched { line, marker } => Ok(Some(Reply { line, marker })),
        MarkerRead::TimedOut { partial } => {
            if partial.is_empty() {
                tracing::warn!("No reply to {} within {:?}", wire, timeout);
            } else {
                tracing::warn!(
                    "Unrecognised reply to {} within {:?}: {:?}",
                    wire,
                    timeout,
                    partial
                );
            }
            Ok(None)
        }
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
