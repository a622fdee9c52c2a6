//! Daemon bus boundary
//!
//! The Bluetooth daemon is reached through a request/reply bus that also delivers
//! asynchronous signals. This module describes that boundary as the [`Bus`] trait so
//! the engines in this crate can drive any transport: a D-Bus connection in
//! production, an in-memory fake in tests.
//!
//! Signals are delivered on a thread owned by the transport. Handlers must therefore
//! be `Send + Sync` and must not block.

use crate::constants::ADAPTER_ID_PREFIX;
use crate::sdp::ServiceRecordHandle;
use std::sync::Arc;

/// Object path of one adapter on the daemon bus (e.g. `/org/bluez/hci0`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdapterPath(String);

impl AdapterPath {
    /// Wrap a daemon object path
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the raw path
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Adapter id, the path suffix starting at `hci`
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.0.rfind(ADAPTER_ID_PREFIX).map(|start| &self.0[start..])
    }

    /// Last path segment, used when listing adapters to callers
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl core::fmt::Display for AdapterPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of an open local service directory session
pub type SessionHandle = u32;

/// Identifies one registered signal handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

/// Classes of adapter signals a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Inquiry started
    DiscoveryStarted,
    /// Inquiry finished, either on its own or after a cancel request
    DiscoveryCompleted,
    /// A device answered the inquiry
    RemoteDeviceFound,
    /// A device's friendly name became known
    RemoteNameUpdated,
}

/// A signal emitted by an adapter
///
/// Addresses are carried in the daemon's wire form and parsed by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterSignal {
    /// Inquiry started
    DiscoveryStarted,
    /// Inquiry finished
    DiscoveryCompleted,
    /// A device answered the inquiry
    RemoteDeviceFound {
        /// Device address in wire form
        address: String,
        /// Raw 24-bit class of device
        class: u32,
        /// Received signal strength
        rssi: i16,
    },
    /// A device's friendly name became known
    RemoteNameUpdated {
        /// Device address in wire form
        address: String,
        /// Friendly name
        name: String,
    },
}

impl AdapterSignal {
    /// Class this signal belongs to
    #[must_use]
    pub const fn kind(&self) -> SignalKind {
        match self {
            Self::DiscoveryStarted => SignalKind::DiscoveryStarted,
            Self::DiscoveryCompleted => SignalKind::DiscoveryCompleted,
            Self::RemoteDeviceFound { .. } => SignalKind::RemoteDeviceFound,
            Self::RemoteNameUpdated { .. } => SignalKind::RemoteNameUpdated,
        }
    }
}

/// Callback invoked on the transport's dispatch thread
pub type SignalHandler = Arc<dyn Fn(&AdapterSignal) + Send + Sync>;

/// Transport-level failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus connection is gone or was never established
    #[error("daemon bus disconnected: {0}")]
    Disconnected(String),
    /// The daemon has no adapter matching the request
    #[error("no such adapter: {0}")]
    NoSuchAdapter(String),
    /// The adapter is not ready to serve the request
    #[error("adapter not ready")]
    NotReady,
    /// The remote device could not be reached
    #[error("host unreachable: {0}")]
    HostUnreachable(String),
    /// The daemon answered with an error
    #[error("daemon request failed: {0}")]
    Failed(String),
}

/// Request/reply and signal interface of the Bluetooth daemon
///
/// Every method blocks until the daemon answers. Addresses are passed in wire form.
pub trait Bus: Send + Sync {
    /// Resolve an adapter by id (`hci0`) or device address
    ///
    /// # Errors
    /// `BusError::NoSuchAdapter` if nothing matches.
    fn find_adapter(&self, pattern: &str) -> Result<AdapterPath, BusError>;

    /// Enumerate every adapter, in daemon order
    ///
    /// # Errors
    /// Transport failures.
    fn list_adapters(&self) -> Result<Vec<AdapterPath>, BusError>;

    /// The adapter the daemon considers default
    ///
    /// # Errors
    /// `BusError::NoSuchAdapter` if the daemon has none.
    fn default_adapter(&self) -> Result<AdapterPath, BusError>;

    /// Local adapter address in wire form
    ///
    /// # Errors
    /// Transport failures.
    fn address(&self, adapter: &AdapterPath) -> Result<String, BusError>;

    /// Local adapter friendly name
    ///
    /// # Errors
    /// Transport failures, or `BusError::NotReady` while the adapter is down.
    fn name(&self, adapter: &AdapterPath) -> Result<String, BusError>;

    /// Major class name (`computer`, `phone`, ...)
    ///
    /// # Errors
    /// Transport failures.
    fn major_class(&self, adapter: &AdapterPath) -> Result<String, BusError>;

    /// Minor class name, interpreted under the major class
    ///
    /// # Errors
    /// Transport failures.
    fn minor_class(&self, adapter: &AdapterPath) -> Result<String, BusError>;

    /// Service class names
    ///
    /// # Errors
    /// Transport failures.
    fn service_classes(&self, adapter: &AdapterPath) -> Result<Vec<String>, BusError>;

    /// Current mode string (`off`, `connectable`, `discoverable`, `limited`)
    ///
    /// # Errors
    /// Transport failures.
    fn mode(&self, adapter: &AdapterPath) -> Result<String, BusError>;

    /// Change the mode string
    ///
    /// # Errors
    /// The daemon rejected the mode.
    fn set_mode(&self, adapter: &AdapterPath, mode: &str) -> Result<(), BusError>;

    /// Whether the adapter is currently discoverable
    ///
    /// # Errors
    /// Transport failures.
    fn is_discoverable(&self, adapter: &AdapterPath) -> Result<bool, BusError>;

    /// Discoverable timeout in seconds, 0 meaning unlimited
    ///
    /// # Errors
    /// Transport failures.
    fn discoverable_timeout(&self, adapter: &AdapterPath) -> Result<u32, BusError>;

    /// Radio version string
    ///
    /// # Errors
    /// Transport failures.
    fn version(&self, adapter: &AdapterPath) -> Result<String, BusError>;

    /// HCI revision string
    ///
    /// # Errors
    /// Transport failures.
    fn revision(&self, adapter: &AdapterPath) -> Result<String, BusError>;

    /// Radio manufacturer
    ///
    /// # Errors
    /// Transport failures.
    fn manufacturer(&self, adapter: &AdapterPath) -> Result<String, BusError>;

    /// Pair with a remote device; blocks for as long as the daemon does
    ///
    /// # Errors
    /// Pairing rejected or failed.
    fn create_bonding(&self, adapter: &AdapterPath, address: &str) -> Result<(), BusError>;

    /// Remove the pairing with a remote device
    ///
    /// # Errors
    /// No bonding or transport failure.
    fn remove_bonding(&self, adapter: &AdapterPath, address: &str) -> Result<(), BusError>;

    /// Whether a bonding with the device exists
    ///
    /// # Errors
    /// Transport failures.
    fn has_bonding(&self, adapter: &AdapterPath, address: &str) -> Result<bool, BusError>;

    /// Whether a baseband connection to the device is up
    ///
    /// # Errors
    /// Transport failures.
    fn is_connected(&self, adapter: &AdapterPath, address: &str) -> Result<bool, BusError>;

    /// Addresses of bonded devices
    ///
    /// # Errors
    /// Transport failures.
    fn list_bondings(&self, adapter: &AdapterPath) -> Result<Vec<String>, BusError>;

    /// Addresses of trusted devices
    ///
    /// # Errors
    /// Transport failures.
    fn list_trusts(&self, adapter: &AdapterPath) -> Result<Vec<String>, BusError>;

    /// Start an inquiry; completion is reported by `DiscoveryCompleted`
    ///
    /// # Errors
    /// The inquiry could not be started.
    fn discover_devices(&self, adapter: &AdapterPath) -> Result<(), BusError>;

    /// Ask the daemon to stop the running inquiry
    ///
    /// The daemon still emits [`AdapterSignal::DiscoveryCompleted`] for the stopped
    /// inquiry, possibly after this call returns.
    ///
    /// # Errors
    /// Transport failures.
    fn cancel_discovery(&self, adapter: &AdapterPath) -> Result<(), BusError>;

    /// Service record handles published by a remote device matching `pattern`
    ///
    /// # Errors
    /// `BusError::HostUnreachable` if the device cannot be reached.
    fn remote_service_handles(
        &self,
        adapter: &AdapterPath,
        address: &str,
        pattern: &str,
    ) -> Result<Vec<ServiceRecordHandle>, BusError>;

    /// Binary form of one remote service record
    ///
    /// # Errors
    /// Transport failures or unknown handle.
    fn remote_service_record(
        &self,
        adapter: &AdapterPath,
        address: &str,
        handle: ServiceRecordHandle,
    ) -> Result<Vec<u8>, BusError>;

    /// Open a local service directory session
    ///
    /// # Errors
    /// The daemon refused the session.
    fn open_service_session(&self, adapter: &AdapterPath) -> Result<SessionHandle, BusError>;

    /// Close a local service directory session
    ///
    /// # Errors
    /// Transport failures.
    fn close_service_session(&self, session: SessionHandle) -> Result<(), BusError>;

    /// Publish a binary service record, returning the daemon-assigned handle
    ///
    /// # Errors
    /// The record was rejected.
    fn register_service(
        &self,
        session: SessionHandle,
        record: &[u8],
    ) -> Result<ServiceRecordHandle, BusError>;

    /// Replace a published record
    ///
    /// # Errors
    /// Unknown handle or rejected record.
    fn update_service(
        &self,
        session: SessionHandle,
        handle: ServiceRecordHandle,
        record: &[u8],
    ) -> Result<(), BusError>;

    /// Withdraw a published record
    ///
    /// # Errors
    /// Unknown handle or transport failure.
    fn unregister_service(
        &self,
        session: SessionHandle,
        handle: ServiceRecordHandle,
    ) -> Result<(), BusError>;

    /// Install a signal handler for one signal class of one adapter
    ///
    /// # Errors
    /// The match rule could not be installed.
    fn add_signal_handler(
        &self,
        adapter: &AdapterPath,
        kind: SignalKind,
        handler: SignalHandler,
    ) -> Result<HandlerId, BusError>;

    /// Remove a handler installed by [`Bus::add_signal_handler`]
    ///
    /// # Errors
    /// Unknown handler or transport failure.
    fn remove_signal_handler(&self, id: HandlerId) -> Result<(), BusError>;

    /// Drop the bus connection
    fn disconnect(&self);
}
