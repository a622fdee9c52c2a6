#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod address;
pub mod adapter;
pub mod bus;
mod class_of_device;
pub mod constants;
pub mod discovery;
pub mod remote_name;
pub mod sdp;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testing;

use crate::bus::BusError;
use crate::constants::{ENV_DEVICE_ADDRESS, ENV_DEVICE_ID, GIAC};
use crate::sdp::SdpError;

pub use adapter::{AdapterIdentity, AdapterSelector, AdapterSession, DiscoverableMode};
pub use address::{DeviceAddress, MAX_DEVICE_ADDRESS};
pub use class_of_device::{
    ClassOfDevice, DeviceClassBuilder, DeviceClassReport, MajorDeviceClass, MajorServiceClasses,
    service_bits,
};
pub use discovery::{DiscoveryEngine, DiscoveryListener, InquiryOutcome};
pub use remote_name::NameResolver;

/// A remote device as reported to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDevice {
    /// Bluetooth device address (`BD_ADDR`)
    pub addr: DeviceAddress,
    /// Friendly name, if one was resolved
    pub name: Option<String>,
    /// Class of Device (`CoD`) indicating device type and capabilities
    pub class_of_device: Option<ClassOfDevice>,
    /// Whether the local adapter holds a bonding with the device
    pub paired: bool,
}

impl RemoteDevice {
    /// Create a new remote device with no name, class, or bonding
    #[must_use]
    pub fn new(addr: DeviceAddress) -> Self {
        Self {
            addr,
            name: None,
            class_of_device: None,
            paired: false,
        }
    }

    /// Update device with a friendly name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Update device with class of device information
    #[must_use]
    pub fn with_class_of_device(mut self, class_of_device: ClassOfDevice) -> Self {
        self.class_of_device = Some(class_of_device);
        self
    }

    /// Update device with its bonding state
    #[must_use]
    pub fn with_paired(mut self, paired: bool) -> Self {
        self.paired = paired;
        self
    }
}

/// Bluetooth-related errors with detailed error information
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BluetoothError {
    /// The daemon bus cannot be reached
    #[error("Bluetooth daemon unavailable: {0}")]
    TransportUnavailable(String),
    /// No adapter matched the selector
    #[error("Bluetooth adapter not found: {0}")]
    AdapterNotFound(String),
    /// An inquiry is already in flight on this adapter
    #[error("Another inquiry is already running on this adapter")]
    AlreadyRunning,
    /// The adapter rejected a mode change
    #[error("Adapter state change failed: {0}")]
    StateChangeFailed(String),
    /// A device address string could not be parsed
    #[error("Malformed Bluetooth address: {0:?}")]
    MalformedAddress(String),
    /// Inquiry completed without the target reporting a name
    #[error("Remote device name not available")]
    NameNotAvailable,
    /// The blocking wait was interrupted
    #[error("Operation interrupted")]
    Interrupted,
    /// The inquiry could not be started
    #[error("Device inquiry failed: {0}")]
    DiscoveryFailed(#[source] BusError),
    /// The local service directory session could not be opened
    #[error("Service registration unavailable: {0}")]
    RegistrationUnavailable(#[source] BusError),
    /// The daemon rejected a service record
    #[error("Service registration failed: {0}")]
    ServiceRegistration(#[source] BusError),
    /// The record has no handle from a previous registration
    #[error("Service record is not registered")]
    NotRegistered,
    /// A bonding request failed
    #[error("Bonding request failed: {0}")]
    Io(#[source] BusError),
    /// Operation not supported by the daemon
    #[error("Operation not supported")]
    NotSupported,
    /// Any other daemon failure
    #[error(transparent)]
    Bus(#[from] BusError),
    /// A service record could not be encoded or decoded
    #[error(transparent)]
    Sdp(#[from] SdpError),
}

/// Crate-wide result type
pub type Result<T> = core::result::Result<T, BluetoothError>;

/// Options for opening an [`AdapterSession`]
///
/// # Examples
///
/// ```rust
/// use bondybus::{AdapterSelector, HostOptions};
///
/// // Default adapter, general inquiry
/// let defaults = HostOptions::default();
///
/// // Second adapter the daemon enumerates
/// let second = HostOptions {
///     selector: AdapterSelector::by_id("1"),
///     ..HostOptions::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOptions {
    /// Which local adapter to use
    pub selector: AdapterSelector,
    /// Inquiry access code used when a caller does not pass one
    ///
    /// - `GIAC` (`0x9E8B33`): General Inquiry
    /// - `LIAC` (`0x9E8B00`): Limited Inquiry
    pub inquiry_access_code: u32,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            selector: AdapterSelector::default(),
            inquiry_access_code: GIAC,
        }
    }
}

impl HostOptions {
    /// Build options from the process environment
    ///
    /// Reads `BONDYBUS_DEVICE_ID` and `BONDYBUS_DEVICE_ADDRESS`; both are optional.
    ///
    /// # Errors
    /// Returns `BluetoothError::MalformedAddress` if the address variable is set but
    /// cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let device_address = std::env::var(ENV_DEVICE_ADDRESS)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| DeviceAddress::from_hex(value.trim()))
            .transpose()?;
        let device_id = std::env::var(ENV_DEVICE_ID)
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        Ok(Self {
            selector: AdapterSelector {
                device_id,
                device_address,
            },
            ..Self::default()
        })
    }
}
