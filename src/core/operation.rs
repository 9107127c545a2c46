use crate::utils::error::{Result, SensorError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Caller-side cancellation for long-running operations.
///
/// The firmware has no abort command: cancelling only ends our receive loop.
/// Whatever the device still sends is dropped by the next buffer clear.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Holds the session's busy flag for the lifetime of one operation.
#[derive(Debug)]
pub(crate) struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SensorError::Busy)?;
        Ok(Self { flag: flag.clone() })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A running enrollment or verification.
pub struct OperationHandle<T> {
    handle: JoinHandle<T>,
    cancel: CancelToken,
}

impl<T> OperationHandle<T> {
    pub(crate) fn new(handle: JoinHandle<T>, cancel: CancelToken) -> Self {
        Self { handle, cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<T> {
        self.handle.await.map_err(|e| SensorError::WorkerError {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_guard_is_exclusive_and_released_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = BusyGuard::acquire(&flag).unwrap();
        assert!(matches!(BusyGuard::acquire(&flag), Err(SensorError::Busy)));
        drop(guard);
        assert!(BusyGuard::acquire(&flag).is_ok());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
