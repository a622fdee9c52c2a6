//! `Bondybus` Constants
//!
//! This module contains the constants used throughout the `Bondybus` library:
//! daemon mode strings, inquiry access codes, limits, and local property names.

/// `BD_ADDR` length in bytes
pub const BD_ADDR_LENGTH: usize = 6;

/// Length of a device address in wire form (`XX:XX:XX:XX:XX:XX`)
pub const WIRE_ADDRESS_LENGTH: usize = 17;

/// General Inquiry Access Code (GIAC)
pub const GIAC: u32 = 0x9E_8B33;

/// Limited Inquiry Access Code (LIAC)
pub const LIAC: u32 = 0x9E_8B00;

/// Prefix of adapter ids and the trailing segment of adapter paths (`/org/bluez/hci0`)
pub const ADAPTER_ID_PREFIX: &str = "hci";

/// Number of concurrent service-search transactions the adapter supports
pub const SD_TRANS_MAX: usize = 1;

/// Environment variable selecting the adapter by id (`hci0`) or index (`0`)
pub const ENV_DEVICE_ID: &str = "BONDYBUS_DEVICE_ID";

/// Environment variable selecting the adapter by its device address
pub const ENV_DEVICE_ADDRESS: &str = "BONDYBUS_DEVICE_ADDRESS";

/// Daemon mode strings
pub mod mode {
    /// Radio is off
    pub const OFF: &str = "off";
    /// Connectable, not discoverable
    pub const CONNECTABLE: &str = "connectable";
    /// General discoverable
    pub const DISCOVERABLE: &str = "discoverable";
    /// Limited discoverable
    pub const LIMITED: &str = "limited";
}

/// Names accepted by `AdapterSession::local_property`
pub mod property {
    /// Comma separated ids of every adapter the daemon knows
    pub const LOCAL_DEVICES_IDS: &str = "local_devices_ids";
    /// Radio version and HCI revision
    pub const RADIO_VERSION: &str = "radio_version";
    /// Radio manufacturer
    pub const RADIO_MANUFACTURER: &str = "radio_manufacturer";
    /// Id of the selected adapter
    pub const DEVICE_ID: &str = "device_id";
    /// Concurrent service-search transaction limit
    pub const SD_TRANS_MAX: &str = "sd_trans_max";
}
