//! Local service directory session
//!
//! Publishing a record needs an open session with the daemon's service directory.
//! The session is opened by the first registration and closed when the last one is
//! withdrawn. The session handle and the registration count change together under
//! one lock.

use super::{ServiceRecord, ServiceRecordHandle};
use crate::bus::{AdapterPath, Bus, SessionHandle};
use crate::{BluetoothError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct DirectoryState {
    session: Option<SessionHandle>,
    registrations: usize,
}

/// Reference-counted session with the local service directory
pub struct ServiceDirectorySession {
    bus: Arc<dyn Bus>,
    adapter: AdapterPath,
    state: Mutex<DirectoryState>,
}

impl core::fmt::Debug for ServiceDirectorySession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceDirectorySession")
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl ServiceDirectorySession {
    /// Create a closed session for `adapter`
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>, adapter: AdapterPath) -> Self {
        Self {
            bus,
            adapter,
            state: Mutex::new(DirectoryState::default()),
        }
    }

    /// Publish `record`, opening the session if no other record is registered
    ///
    /// On success the daemon's handle is stored in the record and stamped into its
    /// handle attribute. A failed registration leaves the count unchanged.
    ///
    /// # Errors
    /// - `BluetoothError::RegistrationUnavailable` if the session cannot be opened
    /// - `BluetoothError::ServiceRegistration` if the daemon rejects the record
    /// - `BluetoothError::Sdp` if the record cannot be encoded
    pub fn register(&self, record: &mut ServiceRecord) -> Result<ServiceRecordHandle> {
        let bytes = record.to_bytes()?;
        let mut state = self.state.lock();

        let session = match state.session {
            Some(session) => session,
            None => {
                let session = self
                    .bus
                    .open_service_session(&self.adapter)
                    .map_err(BluetoothError::RegistrationUnavailable)?;
                info!("[DIRECTORY] Opened session {}", session);
                state.session = Some(session);
                session
            }
        };

        match self.bus.register_service(session, &bytes) {
            Ok(handle) => {
                record.assign_handle(handle);
                state.registrations += 1;
                debug!(
                    "[DIRECTORY] Registered record {:#010x} ({} active)",
                    handle, state.registrations
                );
                Ok(handle)
            }
            Err(err) => {
                warn!("[DIRECTORY] Registration rejected: {}", err);
                if state.registrations == 0 {
                    state.session = None;
                    self.close_session(session);
                }
                Err(BluetoothError::ServiceRegistration(err))
            }
        }
    }

    /// Republish a registered record under its existing handle
    ///
    /// # Errors
    /// - `BluetoothError::NotRegistered` if the record holds no handle or no session is open
    /// - `BluetoothError::ServiceRegistration` if the daemon rejects the update
    pub fn update(&self, record: &ServiceRecord) -> Result<()> {
        let handle = record.handle().ok_or(BluetoothError::NotRegistered)?;
        let bytes = record.to_bytes()?;
        let state = self.state.lock();

        let session = state
            .session
            .filter(|_| state.registrations > 0)
            .ok_or(BluetoothError::NotRegistered)?;
        self.bus
            .update_service(session, handle, &bytes)
            .map_err(BluetoothError::ServiceRegistration)?;
        debug!("[DIRECTORY] Updated record {:#010x}", handle);
        Ok(())
    }

    /// Withdraw `record` and close the session if it was the last one
    ///
    /// The count is decremented and the record's handle cleared even when the daemon
    /// fails the request.
    ///
    /// # Errors
    /// - `BluetoothError::NotRegistered` if the record holds no handle
    /// - `BluetoothError::ServiceRegistration` if the daemon fails the request
    /// - `BluetoothError::Bus` if closing the session fails
    pub fn unregister(&self, record: &mut ServiceRecord) -> Result<()> {
        let handle = record.handle().ok_or(BluetoothError::NotRegistered)?;
        let mut state = self.state.lock();

        let Some(session) = state.session else {
            record.clear_handle();
            return Err(BluetoothError::NotRegistered);
        };

        let withdrawn = self.bus.unregister_service(session, handle);
        state.registrations = state.registrations.saturating_sub(1);
        record.clear_handle();

        let closed = if state.registrations == 0 {
            state.session = None;
            info!("[DIRECTORY] Closing session {}", session);
            self.bus.close_service_session(session)
        } else {
            Ok(())
        };

        withdrawn.map_err(BluetoothError::ServiceRegistration)?;
        closed?;
        debug!("[DIRECTORY] Unregistered record {:#010x}", handle);
        Ok(())
    }

    /// Number of records currently registered
    #[must_use]
    pub fn registrations(&self) -> usize {
        self.state.lock().registrations
    }

    /// Whether a daemon session is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// Close the session regardless of outstanding registrations, logging failures
    pub fn close_quietly(&self) {
        let mut state = self.state.lock();
        state.registrations = 0;
        if let Some(session) = state.session.take() {
            self.close_session(session);
        }
    }

    fn close_session(&self, session: SessionHandle) {
        if let Err(err) = self.bus.close_service_session(session) {
            warn!("[DIRECTORY] Failed to close session {}: {}", session, err);
        }
    }
}
