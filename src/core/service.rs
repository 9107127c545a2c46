use crate::core::operation::{BusyGuard, CancelToken, OperationHandle};
use crate::core::session::DeviceSession;
use crate::domain::model::{EnrollmentOutcome, Identification, PortInfo, VerificationOutcome};
use crate::domain::ports::{EnrollmentListener, UserDirectory, VerificationListener};
use crate::utils::error::{Result, SensorError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Async facade over one [`DeviceSession`].
///
/// Every blocking call runs on tokio's blocking pool. Only one operation may
/// be in flight; a second one fails with `SensorError::Busy`. Listener
/// callbacks fire on the worker thread; hand them to the UI thread yourself.
///
/// Methods that spawn work must be called from inside a tokio runtime.
#[derive(Clone)]
pub struct FingerprintService {
    session: Arc<Mutex<DeviceSession>>,
    busy: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

impl FingerprintService {
    pub fn new(session: DeviceSession) -> Self {
        let connected = session.connection_flag();
        Self {
            session: Arc::new(Mutex::new(session)),
            busy: Arc::new(AtomicBool::new(false)),
            connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub async fn list_ports(&self) -> Result<Vec<PortInfo>> {
        self.run_exclusive(|session| session.list_ports()).await?
    }

    pub async fn connect(&self, port: &str) -> Result<bool> {
        let port = port.to_string();
        self.run_exclusive(move |session| session.connect(&port)).await?
    }

    /// Waits for any running operation to release the session first.
    pub async fn disconnect(&self) -> Result<()> {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = lock_session(&session);
            session.disconnect();
        })
        .await
        .map_err(worker_error)
    }

    pub async fn ping(&self) -> Result<bool> {
        self.run_exclusive(|session| session.ping()).await
    }

    pub async fn template_count(&self) -> Result<u32> {
        self.run_exclusive(|session| session.query_template_count()).await
    }

    pub async fn delete_template(&self, slot: i64) -> Result<bool> {
        self.run_exclusive(move |session| session.delete_template(slot)).await
    }

    pub async fn clear_all_templates(&self) -> Result<bool> {
        self.run_exclusive(|session| session.clear_all_templates()).await
    }

    pub async fn self_test(&self) -> Result<bool> {
        self.run_exclusive(|session| session.self_test()).await
    }

    /// Start an enrollment. Rejections (busy, bad slot, not connected) are
    /// reported through `listener.on_error` like any other failure.
    pub fn start_enrollment<L>(&self, slot: i64, listener: L) -> OperationHandle<EnrollmentOutcome>
    where
        L: EnrollmentListener + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let guard = BusyGuard::acquire(&self.busy);
        let session = self.session.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let mut listener = listener;
            let _guard = match guard {
                Ok(guard) => guard,
                Err(e) => {
                    listener.on_error(&e);
                    return EnrollmentOutcome::failed(e.user_friendly_message());
                }
            };
            let mut session = lock_session(&session);
            session.enroll(slot, &mut listener, &token)
        });
        OperationHandle::new(handle, cancel)
    }

    pub fn start_verification<L>(&self, listener: L) -> OperationHandle<VerificationOutcome>
    where
        L: VerificationListener + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let guard = BusyGuard::acquire(&self.busy);
        let session = self.session.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let mut listener = listener;
            let _guard = match guard {
                Ok(guard) => guard,
                Err(e) => {
                    listener.on_error(&e);
                    return VerificationOutcome::failed(e.user_friendly_message());
                }
            };
            let mut session = lock_session(&session);
            session.verify(&mut listener, &token)
        });
        OperationHandle::new(handle, cancel)
    }

    /// Verification without callbacks.
    pub async fn verify(&self) -> Result<VerificationOutcome> {
        self.run_exclusive(|session| session.verify_blocking()).await
    }

    /// Verify and resolve the matched slot to a user.
    pub async fn identify(&self, directory: Arc<dyn UserDirectory>) -> Result<Identification> {
        let outcome = self.verify().await?;
        let user = match outcome.slot_id {
            Some(slot) if outcome.success => {
                let user = directory.find_by_slot(slot)?;
                if user.is_none() {
                    tracing::warn!("Slot {} matched on the sensor but no user owns it", slot);
                }
                user
            }
            _ => None,
        };
        Ok(Identification { outcome, user })
    }

    /// Enroll and record the confirmed slot against `user_id`.
    pub async fn enroll_user<L>(
        &self,
        user_id: i64,
        slot: i64,
        listener: L,
        directory: Arc<dyn UserDirectory>,
    ) -> Result<EnrollmentOutcome>
    where
        L: EnrollmentListener + 'static,
    {
        let outcome = self.start_enrollment(slot, listener).wait().await?;
        if let Some(confirmed) = outcome.slot_id.filter(|_| outcome.success) {
            directory.assign_slot(user_id, confirmed)?;
            tracing::info!("Slot {} assigned to user {}", confirmed, user_id);
        }
        Ok(outcome)
    }

    async fn run_exclusive<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut DeviceSession) -> T + Send + 'static,
        T: Send + 'static,
    {
        let guard = BusyGuard::acquire(&self.busy)?;
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let mut session = lock_session(&session);
            op(&mut *session)
        })
        .await
        .map_err(worker_error)
    }
}

// A panic inside a listener poisons the mutex; the session itself is still consistent.
fn lock_session(session: &Mutex<DeviceSession>) -> MutexGuard<'_, DeviceSession> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn worker_error(error: tokio::task::JoinError) -> SensorError {
    SensorError::WorkerError {
        message: error.to_string(),
    }
}
