//! Class of Device (`CoD`) for local and remote Bluetooth devices
//!
//! Remote devices report their class as a raw 24-bit value in device-found signals.
//! The local adapter's class is only available from the daemon as separate strings
//! (major class, minor class, service classes), so this module can also compose a
//! class from those strings.
//!
//! ## Structure
//!
//! - Major Service Classes (bits 23-13): 11 bits indicating supported services
//! - Major Device Class (bits 12-8): 5 bits identifying device category
//! - Minor Device Class (bits 7-2): 6 bits for device subcategory
//! - Format Type (bits 1-0): always 0b00
//!
//! ## Usage
//!
//! ```rust
//! use bondybus::{ClassOfDevice, DeviceClassBuilder, MajorDeviceClass};
//!
//! let cod = ClassOfDevice::from_raw(0x00_0404);
//! assert_eq!(cod.major_device_class(), MajorDeviceClass::AudioVideo);
//!
//! let local = DeviceClassBuilder::new()
//!     .major("computer")
//!     .minor("laptop")
//!     .service("networking")
//!     .build();
//! assert_eq!(local.class.raw(), 0x02_010C);
//! ```

use core::fmt;
use heapless::Vec;
use tracing::debug;

/// Bit masks of the Major Service Classes in a raw 24-bit class value
pub mod service_bits {
    /// Limited Discoverable Mode
    pub const LIMITED_DISCOVERABLE: u32 = 0x00_2000;
    /// Positioning (location identification)
    pub const POSITIONING: u32 = 0x01_0000;
    /// Networking (LAN, ad hoc)
    pub const NETWORKING: u32 = 0x02_0000;
    /// Rendering (printing, speakers)
    pub const RENDERING: u32 = 0x04_0000;
    /// Capturing (scanner, microphone)
    pub const CAPTURING: u32 = 0x08_0000;
    /// Object Transfer (v-inbox, v-folder)
    pub const OBJECT_TRANSFER: u32 = 0x10_0000;
    /// Audio (speaker, microphone, headset service)
    pub const AUDIO: u32 = 0x20_0000;
    /// Telephony (cordless telephony, modem, headset service)
    pub const TELEPHONY: u32 = 0x40_0000;
    /// Information (web server, WAP server)
    pub const INFORMATION: u32 = 0x80_0000;
}

/// Class of Device (`CoD`) indicating device type and capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClassOfDevice {
    raw: u32,
}

impl ClassOfDevice {
    /// Create a `ClassOfDevice` from raw 24-bit value
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw: raw & 0xFF_FFFF,
        }
    }

    /// Get the raw 24-bit value
    #[must_use]
    pub const fn raw(&self) -> u32 {
        self.raw
    }

    /// Get the Major Device Class (bits 12-8)
    #[must_use]
    pub fn major_device_class(&self) -> MajorDeviceClass {
        MajorDeviceClass::from_raw(((self.raw >> 8) & 0x1F) as u8)
    }

    /// Get the Minor Device Class (bits 7-2)
    #[must_use]
    pub const fn minor_device_class(&self) -> u8 {
        ((self.raw >> 2) & 0x3F) as u8
    }

    /// Get the Major Service Classes (bits 23-13)
    #[must_use]
    pub const fn major_service_classes(&self) -> MajorServiceClasses {
        MajorServiceClasses::from_raw(((self.raw >> 13) & 0x7FF) as u16)
    }

    /// Check a service bit from [`service_bits`]
    #[must_use]
    pub const fn has_service(&self, bit: u32) -> bool {
        self.raw & bit != 0
    }
}

impl fmt::Display for ClassOfDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = self.major_device_class();
        f.write_str(major.description())?;
        if let Some(minor) = major.minor_class_description(self.minor_device_class()) {
            write!(f, " ({minor})")?;
        }
        let services = self.major_service_classes().descriptions();
        if !services.is_empty() {
            f.write_str(" - Services: ")?;
            for (i, service) in services.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(service)?;
            }
        }
        Ok(())
    }
}

/// Major Device Class enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorDeviceClass {
    /// Miscellaneous devices
    Miscellaneous,
    /// Computer devices (desktop, server, laptop, etc.)
    Computer,
    /// Phone devices (cellular, cordless, smartphone, etc.)
    Phone,
    /// LAN/Network Access Point devices
    LanNetworkAccessPoint,
    /// Audio/Video devices
    AudioVideo,
    /// Peripheral devices (keyboard, mouse, etc.)
    Peripheral,
    /// Imaging devices (display, camera, scanner, printer)
    Imaging,
    /// Wearable devices
    Wearable,
    /// Toy devices
    Toy,
    /// Health devices
    Health,
    /// Uncategorized devices
    Uncategorized,
    /// Reserved or unknown device class
    Reserved(u8),
}

// Daemon major class names, paired with their 5-bit codes.
const MAJOR_NAMES: [(&str, MajorDeviceClass); 11] = [
    ("miscellaneous", MajorDeviceClass::Miscellaneous),
    ("computer", MajorDeviceClass::Computer),
    ("phone", MajorDeviceClass::Phone),
    ("access point", MajorDeviceClass::LanNetworkAccessPoint),
    ("audio/video", MajorDeviceClass::AudioVideo),
    ("peripheral", MajorDeviceClass::Peripheral),
    ("imaging", MajorDeviceClass::Imaging),
    ("wearable", MajorDeviceClass::Wearable),
    ("toy", MajorDeviceClass::Toy),
    ("health", MajorDeviceClass::Health),
    ("uncategorized", MajorDeviceClass::Uncategorized),
];

const COMPUTER_MINORS: [&str; 8] = [
    "uncategorized",
    "desktop",
    "server",
    "laptop",
    "handheld",
    "palm",
    "wearable",
    "tablet",
];

const PHONE_MINORS: [&str; 6] = [
    "uncategorized",
    "cellular",
    "cordless",
    "smart phone",
    "modem",
    "isdn",
];

const SERVICE_NAMES: [(&str, u32); 8] = [
    ("positioning", service_bits::POSITIONING),
    ("networking", service_bits::NETWORKING),
    ("rendering", service_bits::RENDERING),
    ("capturing", service_bits::CAPTURING),
    ("object transfer", service_bits::OBJECT_TRANSFER),
    ("audio", service_bits::AUDIO),
    ("telephony", service_bits::TELEPHONY),
    ("information", service_bits::INFORMATION),
];

impl MajorDeviceClass {
    /// Create `MajorDeviceClass` from raw 5-bit value
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::Miscellaneous,
            0x01 => Self::Computer,
            0x02 => Self::Phone,
            0x03 => Self::LanNetworkAccessPoint,
            0x04 => Self::AudioVideo,
            0x05 => Self::Peripheral,
            0x06 => Self::Imaging,
            0x07 => Self::Wearable,
            0x08 => Self::Toy,
            0x09 => Self::Health,
            0x1F => Self::Uncategorized,
            other => Self::Reserved(other),
        }
    }

    /// Get the 5-bit code
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Miscellaneous => 0x00,
            Self::Computer => 0x01,
            Self::Phone => 0x02,
            Self::LanNetworkAccessPoint => 0x03,
            Self::AudioVideo => 0x04,
            Self::Peripheral => 0x05,
            Self::Imaging => 0x06,
            Self::Wearable => 0x07,
            Self::Toy => 0x08,
            Self::Health => 0x09,
            Self::Uncategorized => 0x1F,
            Self::Reserved(raw) => raw & 0x1F,
        }
    }

    /// Look up a major class by the name the daemon reports
    #[must_use]
    pub fn from_daemon_name(name: &str) -> Option<Self> {
        MAJOR_NAMES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|&(_, class)| class)
    }

    /// Get human-readable description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Miscellaneous => "Miscellaneous",
            Self::Computer => "Computer",
            Self::Phone => "Phone",
            Self::LanNetworkAccessPoint => "LAN/Network Access Point",
            Self::AudioVideo => "Audio/Video",
            Self::Peripheral => "Peripheral",
            Self::Imaging => "Imaging",
            Self::Wearable => "Wearable",
            Self::Toy => "Toy",
            Self::Health => "Health",
            Self::Uncategorized => "Uncategorized",
            Self::Reserved(_) => "Reserved",
        }
    }

    /// Get minor device class description for this major class
    #[must_use]
    pub const fn minor_class_description(&self, minor: u8) -> Option<&'static str> {
        match (self, minor) {
            (Self::Computer | Self::Phone | Self::AudioVideo, 0x00) => Some("Uncategorized"),
            (Self::Computer, 0x01) => Some("Desktop workstation"),
            (Self::Computer, 0x02) => Some("Server-class computer"),
            (Self::Computer, 0x03) => Some("Laptop"),
            (Self::Computer, 0x04) => Some("Handheld PC/PDA"),
            (Self::Computer, 0x05) => Some("Palm-sized PC/PDA"),
            (Self::Computer, 0x06) => Some("Wearable computer"),
            (Self::Computer, 0x07) => Some("Tablet"),
            (Self::Phone, 0x01) => Some("Cellular"),
            (Self::Phone, 0x02) => Some("Cordless"),
            (Self::Phone, 0x03) => Some("Smartphone"),
            (Self::Phone, 0x04) => Some("Wired modem or voice gateway"),
            (Self::Phone, 0x05) => Some("Common ISDN access"),
            (Self::AudioVideo, 0x01) => Some("Wearable headset device"),
            (Self::AudioVideo, 0x02) => Some("Hands-free device"),
            (Self::AudioVideo, 0x04) => Some("Microphone"),
            (Self::AudioVideo, 0x05) => Some("Loudspeaker"),
            (Self::AudioVideo, 0x06) => Some("Headphones"),
            (Self::AudioVideo, 0x07) => Some("Portable audio"),
            (Self::AudioVideo, 0x08) => Some("Car audio"),
            (Self::AudioVideo, 0x0A) => Some("HiFi audio device"),
            _ => None,
        }
    }

    fn minor_from_daemon_name(self, name: &str) -> Option<u8> {
        let table: &[&str] = match self {
            Self::Computer => &COMPUTER_MINORS[..],
            Self::Phone => &PHONE_MINORS[..],
            _ => &COMPUTER_MINORS[..1],
        };
        table
            .iter()
            .position(|known| known.eq_ignore_ascii_case(name))
            .and_then(|index| u8::try_from(index).ok())
    }
}

/// Major Service Classes bit field (bits 23-13 shifted down)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MajorServiceClasses {
    raw: u16,
}

impl MajorServiceClasses {
    /// Create from raw 11-bit value
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self { raw: raw & 0x7FF }
    }

    /// Get raw value
    #[must_use]
    pub const fn raw(&self) -> u16 {
        self.raw
    }

    /// Check if Limited Discoverable Mode is set
    #[must_use]
    pub const fn limited_discoverable_mode(&self) -> bool {
        self.raw & 0x001 != 0
    }

    /// Get descriptions of all active services
    #[must_use]
    pub fn descriptions(&self) -> Vec<&'static str, 9> {
        const LABELS: [(u16, &str); 9] = [
            (0x001, "Limited Discoverable"),
            (0x008, "Positioning"),
            (0x010, "Networking"),
            (0x020, "Rendering"),
            (0x040, "Capturing"),
            (0x080, "Object Transfer"),
            (0x100, "Audio"),
            (0x200, "Telephony"),
            (0x400, "Information"),
        ];

        let mut services = Vec::new();
        for (bit, label) in LABELS {
            if self.raw & bit != 0 {
                let _ = services.push(label);
            }
        }
        services
    }
}

/// Class of the local adapter together with the daemon strings that were not understood
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceClassReport {
    /// Composed class value
    pub class: ClassOfDevice,
    /// Daemon strings that contributed no bits
    pub unrecognized: std::vec::Vec<String>,
}

/// Composes a [`ClassOfDevice`] from the strings the daemon reports for the local adapter
///
/// Unknown strings never fail the composition. They add no bits, are logged, and are
/// collected in [`DeviceClassReport::unrecognized`].
#[derive(Debug, Clone, Default)]
pub struct DeviceClassBuilder {
    major: Option<MajorDeviceClass>,
    raw: u32,
    unrecognized: std::vec::Vec<String>,
}

impl DeviceClassBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the major class name
    #[must_use]
    pub fn major(mut self, name: &str) -> Self {
        match MajorDeviceClass::from_daemon_name(name) {
            Some(major) => {
                self.major = Some(major);
                self.raw |= u32::from(major.to_raw()) << 8;
            }
            None => self.reject("major", name),
        }
        self
    }

    /// Apply the minor class name, interpreted under the major class set before it
    ///
    /// An unknown minor name leaves the minor bits at "uncategorized".
    #[must_use]
    pub fn minor(mut self, name: &str) -> Self {
        let major = self.major.unwrap_or(MajorDeviceClass::Uncategorized);
        match major.minor_from_daemon_name(name) {
            Some(minor) => self.raw |= u32::from(minor) << 2,
            None => self.reject("minor", name),
        }
        self
    }

    /// Set the limited discoverable service bit
    #[must_use]
    pub fn limited_discoverable(mut self, limited: bool) -> Self {
        if limited {
            self.raw |= service_bits::LIMITED_DISCOVERABLE;
        }
        self
    }

    /// Apply one service class name
    #[must_use]
    pub fn service(mut self, name: &str) -> Self {
        match SERVICE_NAMES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
        {
            Some(&(_, bit)) => self.raw |= bit,
            None => self.reject("service", name),
        }
        self
    }

    /// Finish composition
    #[must_use]
    pub fn build(self) -> DeviceClassReport {
        DeviceClassReport {
            class: ClassOfDevice::from_raw(self.raw),
            unrecognized: self.unrecognized,
        }
    }

    fn reject(&mut self, kind: &str, name: &str) {
        debug!("[CLASS] Unrecognized {} class {:?}", kind, name);
        self.unrecognized.push(name.to_owned());
    }
}
