//! Local adapter session
//!
//! An [`AdapterSession`] is opened once at startup. It resolves which adapter the
//! daemon should drive, caches its identity, and answers adapter-level queries and
//! control requests. Every engine in the crate works through a shared session.

use crate::bus::{AdapterPath, Bus, BusError};
use crate::class_of_device::{ClassOfDevice, DeviceClassBuilder, DeviceClassReport};
use crate::constants::{GIAC, LIAC, SD_TRANS_MAX, mode, property};
use crate::discovery::InquirySlot;
use crate::sdp::ServiceDirectorySession;
use crate::{BluetoothError, DeviceAddress, HostOptions, RemoteDevice, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which local adapter to open
///
/// An explicit id wins over an explicit address, which wins over the daemon's default
/// adapter. A numeric id is a position in the daemon's adapter list rather than a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterSelector {
    /// Adapter id (`hci0`) or list index (`0`)
    pub device_id: Option<String>,
    /// Device address of the adapter
    pub device_address: Option<DeviceAddress>,
}

impl AdapterSelector {
    /// Select by id or list index
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            device_id: Some(id.into()),
            device_address: None,
        }
    }

    /// Select by device address
    #[must_use]
    pub fn by_address(address: DeviceAddress) -> Self {
        Self {
            device_id: None,
            device_address: Some(address),
        }
    }

    fn resolve(&self, bus: &dyn Bus) -> Result<AdapterPath> {
        if let Some(id) = &self.device_id {
            if let Ok(index) = id.parse::<usize>() {
                let adapters = bus.list_adapters().map_err(|err| lookup_error(id, err))?;
                return adapters
                    .into_iter()
                    .nth(index)
                    .ok_or_else(|| BluetoothError::AdapterNotFound(id.clone()));
            }
            return bus.find_adapter(id).map_err(|err| lookup_error(id, err));
        }

        if let Some(address) = self.device_address {
            let wire = address.format_hex();
            return bus.find_adapter(&wire).map_err(|err| lookup_error(&wire, err));
        }

        bus.default_adapter()
            .map_err(|err| lookup_error("default adapter", err))
    }
}

fn lookup_error(selector: &str, err: BusError) -> BluetoothError {
    match err {
        BusError::NoSuchAdapter(_) => BluetoothError::AdapterNotFound(selector.to_owned()),
        other => BluetoothError::TransportUnavailable(other.to_string()),
    }
}

/// Identity of the resolved adapter, fixed for the life of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterIdentity {
    path: AdapterPath,
    address: DeviceAddress,
    device_id: String,
    sd_trans_max: usize,
}

impl AdapterIdentity {
    /// Daemon object path
    #[must_use]
    pub fn path(&self) -> &AdapterPath {
        &self.path
    }

    /// Local device address
    #[must_use]
    pub const fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Adapter id (`hci0`)
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Concurrent service-search transaction limit
    #[must_use]
    pub const fn sd_trans_max(&self) -> usize {
        self.sd_trans_max
    }
}

/// Discoverability of the local adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverableMode {
    /// Connectable only
    NotDiscoverable,
    /// Answers general inquiries (GIAC)
    General,
    /// Answers limited inquiries (LIAC)
    Limited,
}

impl DiscoverableMode {
    /// Mode for an inquiry access code, 0 meaning not discoverable
    #[must_use]
    pub const fn from_access_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::NotDiscoverable),
            GIAC => Some(Self::General),
            LIAC => Some(Self::Limited),
            _ => None,
        }
    }

    /// Inquiry access code the adapter answers, 0 when not discoverable
    #[must_use]
    pub const fn access_code(self) -> u32 {
        match self {
            Self::NotDiscoverable => 0,
            Self::General => GIAC,
            Self::Limited => LIAC,
        }
    }

    /// Daemon mode string
    #[must_use]
    pub const fn daemon_mode(self) -> &'static str {
        match self {
            Self::NotDiscoverable => mode::CONNECTABLE,
            Self::General => mode::DISCOVERABLE,
            Self::Limited => mode::LIMITED,
        }
    }
}

/// Capabilities the daemon backend offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterFeatures {
    /// Service record attributes can be read
    pub service_attributes: bool,
    /// L2CAP channels are available
    pub l2cap: bool,
}

/// Session with one local adapter
pub struct AdapterSession {
    bus: Arc<dyn Bus>,
    identity: AdapterIdentity,
    options: HostOptions,
    inquiry: InquirySlot,
    directory: ServiceDirectorySession,
}

impl core::fmt::Debug for AdapterSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdapterSession")
            .field("identity", &self.identity)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl AdapterSession {
    /// Resolve the adapter chosen by `options.selector` and open a session on it
    ///
    /// The bus is disconnected if the session cannot be opened.
    ///
    /// # Errors
    /// - `BluetoothError::AdapterNotFound` if no adapter matches the selector
    /// - `BluetoothError::TransportUnavailable` if the daemon cannot be reached
    /// - `BluetoothError::MalformedAddress` if the daemon reports an unparsable address
    pub fn open(bus: Arc<dyn Bus>, options: HostOptions) -> Result<Self> {
        match Self::resolve(&bus, &options) {
            Ok(identity) => {
                info!(
                    "[ADAPTER] Using {} ({})",
                    identity.device_id, identity.address
                );
                Ok(Self {
                    directory: ServiceDirectorySession::new(
                        Arc::clone(&bus),
                        identity.path.clone(),
                    ),
                    inquiry: InquirySlot::new(),
                    bus,
                    identity,
                    options,
                })
            }
            Err(err) => {
                warn!("[ADAPTER] Initialization failed: {}", err);
                bus.disconnect();
                Err(err)
            }
        }
    }

    fn resolve(bus: &Arc<dyn Bus>, options: &HostOptions) -> Result<AdapterIdentity> {
        let path = options.selector.resolve(bus.as_ref())?;
        debug!("[ADAPTER] Selector {:?} resolved to {}", options.selector, path);

        let wire = bus
            .address(&path)
            .map_err(|err| lookup_error(path.as_str(), err))?;
        let address = DeviceAddress::from_hex(&wire)?;
        let device_id = path.device_id().unwrap_or(path.short_name()).to_owned();

        Ok(AdapterIdentity {
            path,
            address,
            device_id,
            sd_trans_max: SD_TRANS_MAX,
        })
    }

    /// Identity of the adapter
    #[must_use]
    pub fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    /// Options the session was opened with
    #[must_use]
    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// Local device address
    #[must_use]
    pub fn local_address(&self) -> DeviceAddress {
        self.identity.address
    }

    /// The local service directory session of this adapter
    #[must_use]
    pub fn service_directory(&self) -> &ServiceDirectorySession {
        &self.directory
    }

    pub(crate) fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    pub(crate) fn path(&self) -> &AdapterPath {
        &self.identity.path
    }

    pub(crate) fn inquiry(&self) -> &InquirySlot {
        &self.inquiry
    }

    /// Local friendly name, `None` while the adapter is not ready
    ///
    /// # Errors
    /// Transport failures other than "not ready".
    pub fn local_name(&self) -> Result<Option<String>> {
        match self.bus.name(self.path()) {
            Ok(name) => Ok(Some(name)),
            Err(BusError::NotReady) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Class of the local device
    ///
    /// Unrecognized daemon strings contribute no bits and do not fail the call.
    ///
    /// # Errors
    /// Transport failures.
    pub fn device_class(&self) -> Result<ClassOfDevice> {
        self.device_class_report().map(|report| report.class)
    }

    /// Class of the local device along with the daemon strings that were not understood
    ///
    /// # Errors
    /// Transport failures.
    pub fn device_class_report(&self) -> Result<DeviceClassReport> {
        let path = self.path();
        let mut builder = DeviceClassBuilder::new()
            .major(&self.bus.major_class(path)?)
            .minor(&self.bus.minor_class(path)?)
            .limited_discoverable(self.bus.mode(path)? == mode::LIMITED);
        for service in self.bus.service_classes(path)? {
            builder = builder.service(&service);
        }
        Ok(builder.build())
    }

    /// Whether the radio is on
    ///
    /// # Errors
    /// Transport failures.
    pub fn is_powered_on(&self) -> Result<bool> {
        Ok(self.bus.mode(self.path())? != mode::OFF)
    }

    /// Current discoverability
    ///
    /// A discoverable adapter with no timeout answers general inquiries, one with a
    /// timeout answers limited inquiries.
    ///
    /// # Errors
    /// Transport failures.
    pub fn discoverable_mode(&self) -> Result<DiscoverableMode> {
        let path = self.path();
        if !self.bus.is_discoverable(path)? {
            return Ok(DiscoverableMode::NotDiscoverable);
        }
        if self.bus.discoverable_timeout(path)? == 0 {
            Ok(DiscoverableMode::General)
        } else {
            Ok(DiscoverableMode::Limited)
        }
    }

    /// Change discoverability; returns at once if the mode already holds
    ///
    /// # Errors
    /// `BluetoothError::StateChangeFailed` if the daemon rejects the mode.
    pub fn set_discoverable(&self, requested: DiscoverableMode) -> Result<()> {
        if self.discoverable_mode()? == requested {
            return Ok(());
        }
        self.bus
            .set_mode(self.path(), requested.daemon_mode())
            .map_err(|err| BluetoothError::StateChangeFailed(err.to_string()))?;
        info!("[ADAPTER] Mode set to {}", requested.daemon_mode());
        Ok(())
    }

    /// Changing the advertised service classes directly is not offered by the daemon
    ///
    /// # Errors
    /// Always `BluetoothError::NotSupported`.
    pub fn set_local_service_classes(&self, _service_bits: u32) -> Result<()> {
        Err(BluetoothError::NotSupported)
    }

    /// Pair with a remote device
    ///
    /// Passkey pairing is not available through the daemon; with a passkey this
    /// returns `Ok(false)` without contacting it.
    ///
    /// # Errors
    /// `BluetoothError::Io` if the daemon fails the bonding.
    pub fn create_bonding(&self, address: DeviceAddress, passkey: Option<&str>) -> Result<bool> {
        if passkey.is_some() {
            debug!("[ADAPTER] Passkey bonding with {} not supported", address);
            return Ok(false);
        }
        self.bus
            .create_bonding(self.path(), &address.format_hex())
            .map_err(BluetoothError::Io)?;
        Ok(true)
    }

    /// Remove the pairing with a remote device
    ///
    /// # Errors
    /// `BluetoothError::Io` if the daemon fails the request.
    pub fn remove_bonding(&self, address: DeviceAddress) -> Result<()> {
        self.bus
            .remove_bonding(self.path(), &address.format_hex())
            .map_err(BluetoothError::Io)
    }

    /// Whether a bonding with the device exists
    ///
    /// # Errors
    /// Transport failures.
    pub fn is_trusted(&self, address: DeviceAddress) -> Result<bool> {
        Ok(self.bus.has_bonding(self.path(), &address.format_hex())?)
    }

    /// Whether the device is both connected and bonded
    ///
    /// # Errors
    /// Transport failures.
    pub fn is_authenticated(&self, address: DeviceAddress) -> Result<bool> {
        let wire = address.format_hex();
        Ok(self.bus.is_connected(self.path(), &wire)?
            && self.bus.has_bonding(self.path(), &wire)?)
    }

    /// Devices the adapter already knows: bonded devices first, then trusted ones
    ///
    /// Unparsable addresses from the daemon are logged and skipped.
    ///
    /// # Errors
    /// Transport failures.
    pub fn preknown_devices(&self) -> Result<Vec<RemoteDevice>> {
        let path = self.path();
        let mut devices: Vec<RemoteDevice> = Vec::new();

        let bonded = self.bus.list_bondings(path)?;
        let trusted = self.bus.list_trusts(path)?;
        let listed = bonded
            .iter()
            .map(|wire| (wire, true))
            .chain(trusted.iter().map(|wire| (wire, false)));

        for (wire, paired) in listed {
            match DeviceAddress::from_hex(wire) {
                Ok(addr) if devices.iter().all(|known| known.addr != addr) => {
                    devices.push(RemoteDevice::new(addr).with_paired(paired));
                }
                Ok(_) => {}
                Err(err) => warn!("[ADAPTER] Skipping known device: {}", err),
            }
        }
        Ok(devices)
    }

    /// Named local property
    ///
    /// Known names are listed in [`crate::constants::property`]; others return `None`.
    ///
    /// # Errors
    /// Transport failures.
    pub fn local_property(&self, name: &str) -> Result<Option<String>> {
        let path = self.path();
        let value = match name {
            property::LOCAL_DEVICES_IDS => self
                .bus
                .list_adapters()?
                .iter()
                .map(AdapterPath::short_name)
                .collect::<Vec<_>>()
                .join(","),
            property::RADIO_VERSION => format!(
                "{}; HCI {}",
                self.bus.version(path)?,
                self.bus.revision(path)?
            ),
            property::RADIO_MANUFACTURER => self.bus.manufacturer(path)?,
            property::DEVICE_ID => self.identity.device_id.clone(),
            property::SD_TRANS_MAX => self.identity.sd_trans_max.to_string(),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Capabilities of the daemon backend
    #[must_use]
    pub const fn features(&self) -> AdapterFeatures {
        AdapterFeatures {
            service_attributes: true,
            l2cap: true,
        }
    }

    /// Close the service directory session, if open, and drop the bus connection
    pub fn shutdown(&self) {
        self.directory.close_quietly();
        self.bus.disconnect();
        info!("[ADAPTER] {} shut down", self.identity.device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBus, HCI0_ADDRESS};

    fn fake_with_two_adapters() -> FakeBus {
        let fake = FakeBus::new();
        fake.state().adapters.push((
            AdapterPath::new("/org/bluez/hci1"),
            "AA:BB:CC:DD:EE:FF".to_owned(),
        ));
        fake
    }

    fn open(fake: &FakeBus) -> AdapterSession {
        AdapterSession::open(fake.clone().into_bus(), HostOptions::default()).unwrap()
    }

    #[test]
    fn test_open_default_adapter() {
        let fake = FakeBus::new();
        let session = open(&fake);

        let identity = session.identity();
        assert_eq!(identity.path().as_str(), "/org/bluez/hci0");
        assert_eq!(identity.device_id(), "hci0");
        assert_eq!(identity.address(), DeviceAddress::from_hex(HCI0_ADDRESS).unwrap());
        assert_eq!(identity.sd_trans_max(), 1);
    }

    #[test]
    fn test_open_by_name_index_and_address() {
        let fake = fake_with_two_adapters();
        let bus = fake.clone().into_bus();

        let by_name = HostOptions {
            selector: AdapterSelector::by_id("hci1"),
            ..HostOptions::default()
        };
        let session = AdapterSession::open(Arc::clone(&bus), by_name).unwrap();
        assert_eq!(session.identity().device_id(), "hci1");

        let by_index = HostOptions {
            selector: AdapterSelector::by_id("1"),
            ..HostOptions::default()
        };
        let session = AdapterSession::open(Arc::clone(&bus), by_index).unwrap();
        assert_eq!(session.identity().device_id(), "hci1");

        let by_address = HostOptions {
            selector: AdapterSelector::by_address(DeviceAddress::new(0xAABB_CCDD_EEFF)),
            ..HostOptions::default()
        };
        let session = AdapterSession::open(bus, by_address).unwrap();
        assert_eq!(session.identity().device_id(), "hci1");
    }

    #[test]
    fn test_id_wins_over_address() {
        let fake = fake_with_two_adapters();
        let options = HostOptions {
            selector: AdapterSelector {
                device_id: Some("hci0".into()),
                device_address: Some(DeviceAddress::new(0xAABB_CCDD_EEFF)),
            },
            ..HostOptions::default()
        };
        let session = AdapterSession::open(fake.into_bus(), options).unwrap();
        assert_eq!(session.identity().device_id(), "hci0");
    }

    #[test]
    fn test_open_unknown_adapter_disconnects() {
        let fake = FakeBus::new();
        let options = HostOptions {
            selector: AdapterSelector::by_id("hci9"),
            ..HostOptions::default()
        };
        let err = AdapterSession::open(fake.clone().into_bus(), options).unwrap_err();
        assert_eq!(err, BluetoothError::AdapterNotFound("hci9".into()));
        assert_eq!(fake.state().disconnect_calls, 1);

        let fake = FakeBus::new();
        let out_of_range = HostOptions {
            selector: AdapterSelector::by_id("3"),
            ..HostOptions::default()
        };
        assert!(matches!(
            AdapterSession::open(fake.into_bus(), out_of_range),
            Err(BluetoothError::AdapterNotFound(_))
        ));
    }

    #[test]
    fn test_open_without_default_adapter() {
        let fake = FakeBus::new();
        fake.state().default_adapter = None;
        assert!(matches!(
            AdapterSession::open(fake.into_bus(), HostOptions::default()),
            Err(BluetoothError::AdapterNotFound(_))
        ));
    }

    #[test]
    fn test_open_transport_unavailable() {
        let fake = FakeBus::new();
        fake.state().disconnected = true;
        assert!(matches!(
            AdapterSession::open(fake.into_bus(), HostOptions::default()),
            Err(BluetoothError::TransportUnavailable(_))
        ));
    }

    #[test]
    fn test_local_name() {
        let fake = FakeBus::new();
        let session = open(&fake);
        assert_eq!(session.local_name().unwrap().as_deref(), Some("bondybus"));

        fake.state().name = Err(BusError::NotReady);
        assert_eq!(session.local_name().unwrap(), None);

        fake.state().name = Err(BusError::Failed("gone".into()));
        assert!(session.local_name().is_err());
    }

    #[test]
    fn test_device_class_from_daemon_strings() {
        let fake = FakeBus::new();
        {
            let mut state = fake.state();
            state.major_class = "computer".into();
            state.minor_class = "server".into();
            state.mode = "limited".into();
            state.service_classes = vec!["networking".into(), "quantum".into()];
        }
        let session = open(&fake);

        let report = session.device_class_report().unwrap();
        assert_eq!(report.class.raw(), 0x02_2108);
        assert_eq!(report.unrecognized, vec!["quantum"]);
        assert_eq!(session.device_class().unwrap(), report.class);
    }

    #[test]
    fn test_is_powered_on() {
        let fake = FakeBus::new();
        let session = open(&fake);
        assert!(session.is_powered_on().unwrap());

        fake.state().mode = "off".into();
        assert!(!session.is_powered_on().unwrap());
    }

    #[test]
    fn test_discoverable_mode() {
        let fake = FakeBus::new();
        let session = open(&fake);
        assert_eq!(
            session.discoverable_mode().unwrap(),
            DiscoverableMode::NotDiscoverable
        );

        fake.state().discoverable = true;
        assert_eq!(session.discoverable_mode().unwrap(), DiscoverableMode::General);

        fake.state().discoverable_timeout = 180;
        assert_eq!(session.discoverable_mode().unwrap(), DiscoverableMode::Limited);
    }

    #[test]
    fn test_set_discoverable() {
        let fake = FakeBus::new();
        let session = open(&fake);

        // Already not discoverable: no daemon request
        session
            .set_discoverable(DiscoverableMode::NotDiscoverable)
            .unwrap();
        assert!(fake.state().mode_changes.is_empty());

        session.set_discoverable(DiscoverableMode::Limited).unwrap();
        assert_eq!(fake.state().mode_changes, vec!["limited"]);

        fake.state().reject_mode = true;
        assert!(matches!(
            session.set_discoverable(DiscoverableMode::General),
            Err(BluetoothError::StateChangeFailed(_))
        ));
    }

    #[test]
    fn test_discoverable_mode_access_codes() {
        for mode in [
            DiscoverableMode::NotDiscoverable,
            DiscoverableMode::General,
            DiscoverableMode::Limited,
        ] {
            assert_eq!(DiscoverableMode::from_access_code(mode.access_code()), Some(mode));
        }
        assert_eq!(DiscoverableMode::from_access_code(0x9E_8B01), None);
        assert_eq!(DiscoverableMode::NotDiscoverable.daemon_mode(), "connectable");
        assert_eq!(DiscoverableMode::General.daemon_mode(), "discoverable");
    }

    #[test]
    fn test_bonding() {
        let fake = FakeBus::new();
        let session = open(&fake);
        let peer = DeviceAddress::new(0x0102_0304_0506);

        assert!(!session.is_trusted(peer).unwrap());
        assert!(session.create_bonding(peer, None).unwrap());
        assert!(session.is_trusted(peer).unwrap());
        assert!(!session.is_authenticated(peer).unwrap());

        fake.state().connected.push(peer.format_hex().to_string());
        assert!(session.is_authenticated(peer).unwrap());

        session.remove_bonding(peer).unwrap();
        assert!(!session.is_trusted(peer).unwrap());
        assert!(matches!(
            session.remove_bonding(peer),
            Err(BluetoothError::Io(_))
        ));
    }

    #[test]
    fn test_bonding_failures_and_passkey() {
        let fake = FakeBus::new();
        let session = open(&fake);
        let peer = DeviceAddress::new(0x0102_0304_0506);

        assert!(!session.create_bonding(peer, Some("0000")).unwrap());
        assert!(fake.state().bonding_requests.is_empty());

        fake.state().fail_bonding = true;
        assert!(matches!(
            session.create_bonding(peer, None),
            Err(BluetoothError::Io(_))
        ));
    }

    #[test]
    fn test_preknown_devices() {
        let fake = FakeBus::new();
        {
            let mut state = fake.state();
            state.bondings = vec!["00:00:00:00:00:01".into()];
            state.trusts = vec![
                "00:00:00:00:00:01".into(),
                "00:00:00:00:00:02".into(),
                "garbage".into(),
            ];
        }
        let session = open(&fake);

        let devices = session.preknown_devices().unwrap();
        assert_eq!(
            devices,
            vec![
                RemoteDevice::new(DeviceAddress::new(1)).with_paired(true),
                RemoteDevice::new(DeviceAddress::new(2)),
            ]
        );
    }

    #[test]
    fn test_local_property() {
        let fake = fake_with_two_adapters();
        let session = open(&fake);

        assert_eq!(
            session.local_property(property::LOCAL_DEVICES_IDS).unwrap().as_deref(),
            Some("hci0,hci1")
        );
        assert_eq!(
            session.local_property(property::RADIO_VERSION).unwrap().as_deref(),
            Some("Bluetooth 2.0; HCI HCI 0x1f")
        );
        assert_eq!(
            session.local_property(property::DEVICE_ID).unwrap().as_deref(),
            Some("hci0")
        );
        assert_eq!(
            session.local_property(property::SD_TRANS_MAX).unwrap().as_deref(),
            Some("1")
        );
        assert_eq!(session.local_property("bogus").unwrap(), None);
    }

    #[test]
    fn test_unsupported_and_shutdown() {
        let fake = FakeBus::new();
        let session = open(&fake);

        assert_eq!(
            session.set_local_service_classes(0x20_0000),
            Err(BluetoothError::NotSupported)
        );
        assert!(session.features().l2cap);

        session.shutdown();
        assert_eq!(fake.state().disconnect_calls, 1);
    }
}
