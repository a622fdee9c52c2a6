//! SDP Attribute Processing
//!
//! A service record travels as one data element sequence of alternating attribute
//! ids (16-bit unsigned integers) and attribute values.

use super::SdpError;
use super::element::{DataElement, ElementReader};
use super::record::AttributeId;
use std::collections::BTreeMap;

/// Universal SDP Attribute IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum UniversalAttributeId {
    /// Service Record Handle
    ServiceRecordHandle = 0x0000,
    /// Service Class ID List
    ServiceClassIdList = 0x0001,
    /// Service Record State
    ServiceRecordState = 0x0002,
    /// Service ID
    ServiceId = 0x0003,
    /// Protocol Descriptor List
    ProtocolDescriptorList = 0x0004,
    /// Browse Group List
    BrowseGroupList = 0x0005,
    /// Language Based Attribute ID List
    LanguageBaseAttributeIdList = 0x0006,
    /// Service Info Time To Live
    ServiceInfoTimeToLive = 0x0007,
    /// Service Availability
    ServiceAvailability = 0x0008,
    /// Bluetooth Profile Descriptor List
    BluetoothProfileDescriptorList = 0x0009,
    /// Documentation URL
    DocumentationUrl = 0x000A,
    /// Client Executable URL
    ClientExecutableUrl = 0x000B,
    /// Icon URL
    IconUrl = 0x000C,
    /// Additional Protocol Descriptor Lists
    AdditionalProtocolDescriptorLists = 0x000D,
}

impl UniversalAttributeId {
    /// Convert to u16 value
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Standard Language Base ID for the primary language
pub const PRIMARY_LANGUAGE_BASE_ID: u16 = 0x0100;

/// Service Name, offset from the language base
pub const SERVICE_NAME_OFFSET: u16 = 0x0000;

/// Service Description, offset from the language base
pub const SERVICE_DESCRIPTION_OFFSET: u16 = 0x0001;

/// Provider Name, offset from the language base
pub const PROVIDER_NAME_OFFSET: u16 = 0x0002;

/// Attribute List Parser
///
/// Decodes the binary attribute list the daemon returns for a remote record.
#[derive(Debug)]
pub struct AttributeListParser<'a> {
    reader: ElementReader<'a>,
}

impl<'a> AttributeListParser<'a> {
    /// Create new parser for attribute data
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            reader: ElementReader::new(data),
        }
    }

    /// Parse the whole attribute list
    ///
    /// A repeated attribute id keeps the last value.
    ///
    /// # Errors
    /// Returns an error if the data is not a single sequence of id/value pairs.
    pub fn parse(mut self) -> Result<BTreeMap<AttributeId, DataElement>, SdpError> {
        let DataElement::Sequence(elements) = self.reader.read_element()? else {
            return Err(SdpError::InvalidAttributeList("record is not a sequence"));
        };
        if !self.reader.is_empty() {
            return Err(SdpError::InvalidAttributeList("trailing bytes after record"));
        }
        if elements.len() % 2 != 0 {
            return Err(SdpError::InvalidAttributeList("attribute id without value"));
        }

        let mut attributes = BTreeMap::new();
        let mut pairs = elements.into_iter();
        while let (Some(id), Some(value)) = (pairs.next(), pairs.next()) {
            let DataElement::UnsignedInt16(id) = id else {
                return Err(SdpError::InvalidAttributeList("attribute id is not a u16"));
            };
            attributes.insert(id, value);
        }
        Ok(attributes)
    }
}

/// Encode attributes as one sequence of id/value pairs in ascending id order
///
/// # Errors
/// Returns `SdpError::TooLarge` if the record exceeds the 32-bit length field.
pub fn encode_attribute_list(
    attributes: &BTreeMap<AttributeId, DataElement>,
) -> Result<Vec<u8>, SdpError> {
    let mut pairs = Vec::with_capacity(attributes.len() * 2);
    for (&id, value) in attributes {
        pairs.push(DataElement::UnsignedInt16(id));
        pairs.push(value.clone());
    }
    DataElement::Sequence(pairs).to_bytes()
}
