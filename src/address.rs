use crate::BluetoothError;
use crate::constants::{BD_ADDR_LENGTH, WIRE_ADDRESS_LENGTH};
use core::fmt;
use core::str::FromStr;

/// Largest value a 48-bit device address can hold
pub const MAX_DEVICE_ADDRESS: u64 = 0xFFFF_FFFF_FFFF;

/// A Bluetooth Device Address (`BD_ADDR`) held as a 48-bit integer
///
/// Identity always compares on the integer form, so two wire strings that differ
/// only in letter case or separators name the same device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(u64);

impl DeviceAddress {
    /// Create a device address from its integer form, keeping the low 48 bits
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw & MAX_DEVICE_ADDRESS)
    }

    /// Get the integer form
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Get the address bytes, most significant first
    #[must_use]
    pub fn to_bytes(&self) -> [u8; BD_ADDR_LENGTH] {
        let mut bytes = [0u8; BD_ADDR_LENGTH];
        bytes.copy_from_slice(&self.0.to_be_bytes()[2..]);
        bytes
    }

    /// Format the address in the daemon's wire form
    ///
    /// Six uppercase hex pairs separated by colons, zero padded to 12 digits.
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<WIRE_ADDRESS_LENGTH> {
        const HEX_CHARS: [char; 16] = [
            '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
        ];

        let mut result = heapless::String::new();
        for (i, byte) in self.to_bytes().iter().enumerate() {
            if i > 0 {
                result.push(':').ok();
            }
            result.push(HEX_CHARS[(byte >> 4) as usize]).ok();
            result.push(HEX_CHARS[(byte & 0x0F) as usize]).ok();
        }
        result
    }

    /// Parse a device address from the daemon's wire form
    ///
    /// Colons are stripped and the remainder is read as base-16. Letter case does not
    /// matter.
    ///
    /// # Errors
    /// Returns `BluetoothError::MalformedAddress` if the input is empty, holds non-hex
    /// content, or does not fit in 48 bits.
    pub fn from_hex(hex: &str) -> Result<Self, BluetoothError> {
        let malformed = || BluetoothError::MalformedAddress(hex.into());

        let mut digits = heapless::String::<12>::new();
        for c in hex.chars().filter(|&c| c != ':') {
            if !c.is_ascii_hexdigit() {
                return Err(malformed());
            }
            digits.push(c).map_err(|()| malformed())?;
        }
        if digits.is_empty() {
            return Err(malformed());
        }

        u64::from_str_radix(&digits, 16)
            .map(Self)
            .map_err(|_| malformed())
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_hex())
    }
}

impl FromStr for DeviceAddress {
    type Err = BluetoothError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; BD_ADDR_LENGTH]> for DeviceAddress {
    fn from(addr: [u8; BD_ADDR_LENGTH]) -> Self {
        let mut wide = [0u8; 8];
        wide[2..].copy_from_slice(&addr);
        Self(u64::from_be_bytes(wide))
    }
}

impl From<DeviceAddress> for [u8; BD_ADDR_LENGTH] {
    fn from(addr: DeviceAddress) -> Self {
        addr.to_bytes()
    }
}

impl From<DeviceAddress> for u64 {
    fn from(addr: DeviceAddress) -> Self {
        addr.0
    }
}

impl From<DeviceAddress> for heapless::String<WIRE_ADDRESS_LENGTH> {
    fn from(addr: DeviceAddress) -> Self {
        addr.format_hex()
    }
}

impl TryFrom<u64> for DeviceAddress {
    type Error = BluetoothError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        if raw > MAX_DEVICE_ADDRESS {
            return Err(BluetoothError::MalformedAddress(format!("{raw:#x}")));
        }
        Ok(Self(raw))
    }
}

impl TryFrom<&str> for DeviceAddress {
    type Error = BluetoothError;

    fn try_from(hex: &str) -> Result<Self, Self::Error> {
        Self::from_hex(hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_address_format_hex() {
        let addr = DeviceAddress::new(0x1234_5678_9ABC);
        assert_eq!(addr.format_hex().as_str(), "12:34:56:78:9A:BC");
    }

    #[test]
    fn test_device_address_format_hex_pads_to_twelve_digits() {
        assert_eq!(DeviceAddress::new(0).format_hex().as_str(), "00:00:00:00:00:00");
        assert_eq!(DeviceAddress::new(0xA).format_hex().as_str(), "00:00:00:00:00:0A");
        assert_eq!(
            DeviceAddress::new(MAX_DEVICE_ADDRESS).format_hex().as_str(),
            "FF:FF:FF:FF:FF:FF"
        );
        assert_eq!(
            DeviceAddress::new(0x0AB1_2CD3_4EF5).format_hex().as_str(),
            "0A:B1:2C:D3:4E:F5"
        );
    }

    #[test]
    fn test_device_address_from_hex() {
        let addr = DeviceAddress::from_hex("12:34:56:78:9A:BC").unwrap();
        assert_eq!(addr.as_u64(), 0x1234_5678_9ABC);

        // Case and separators do not affect identity
        let lower = DeviceAddress::from_hex("12:34:56:78:9a:bc").unwrap();
        let bare = DeviceAddress::from_hex("123456789ABC").unwrap();
        assert_eq!(addr, lower);
        assert_eq!(addr, bare);
    }

    #[test]
    fn test_device_address_from_hex_malformed() {
        for bad in ["", ":", "12:34:56:78:9A:BG", "hello", "12:34:56:78:9A:BC:DE", "-1"] {
            assert!(
                matches!(
                    DeviceAddress::from_hex(bad),
                    Err(BluetoothError::MalformedAddress(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_device_address_round_trip() {
        let samples = [
            0,
            1,
            0xFF,
            0x0001_0000_0000,
            0x00A0_C9_14_C8_29,
            0x7FFF_FFFF_FFFF,
            MAX_DEVICE_ADDRESS,
        ];
        for raw in samples {
            let addr = DeviceAddress::new(raw);
            assert_eq!(DeviceAddress::from_hex(&addr.format_hex()).unwrap(), addr);
        }

        // Walk a bit across every position of the 48-bit range
        for shift in 0..48 {
            let addr = DeviceAddress::new(1 << shift);
            assert_eq!(DeviceAddress::from_hex(&addr.format_hex()).unwrap(), addr);
        }
    }

    #[test]
    fn test_device_address_conversions() {
        let bytes = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];

        let addr: DeviceAddress = bytes.into();
        assert_eq!(addr.as_u64(), 0x1234_5678_9ABC);

        let converted: [u8; 6] = addr.into();
        assert_eq!(converted, bytes);

        let parsed: DeviceAddress = "12:34:56:78:9A:BC".parse().unwrap();
        assert_eq!(parsed, addr);

        let wire: heapless::String<17> = addr.into();
        assert_eq!(wire.as_str(), "12:34:56:78:9A:BC");

        assert!(DeviceAddress::try_from(0x1_0000_0000_0000_u64).is_err());
        assert_eq!(
            DeviceAddress::try_from(0x1234_u64).unwrap().to_string(),
            "00:00:00:00:12:34"
        );
    }
}
