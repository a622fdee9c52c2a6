//! SDP Service Record Management
//!
//! Service records, the UUIDs they are matched by, and helpers that fill in the
//! attributes a local RFCOMM or L2CAP server publishes.

use super::attribute::{
    AttributeListParser, PRIMARY_LANGUAGE_BASE_ID, SERVICE_NAME_OFFSET, UniversalAttributeId,
    encode_attribute_list,
};
use super::element::DataElement;
use super::{SdpError, ServiceRecordHandle};
use std::collections::BTreeMap;

/// Service UUID type (128-bit)
pub type ServiceUuid = u128;

/// Attribute ID type
pub type AttributeId = u16;

/// Bluetooth Base UUID `00000000-0000-1000-8000-00805F9B34FB`
pub const BASE_UUID: ServiceUuid = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Widen a 16- or 32-bit UUID over the Bluetooth base UUID
#[must_use]
pub const fn short_uuid(value: u32) -> ServiceUuid {
    BASE_UUID | ((value as u128) << 96)
}

/// Protocol UUIDs used in protocol descriptor lists
pub mod protocol {
    /// SDP
    pub const SDP: u16 = 0x0001;
    /// RFCOMM
    pub const RFCOMM: u16 = 0x0003;
    /// OBEX
    pub const OBEX: u16 = 0x0008;
    /// L2CAP
    pub const L2CAP: u16 = 0x0100;
}

/// Public browse group root
pub const PUBLIC_BROWSE_GROUP: u16 = 0x1002;

/// Standard Bluetooth Service Classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ServiceClassId {
    /// SDP Server Service
    ServiceDiscoveryServer = 0x1000,
    /// Browse Group Descriptor
    BrowseGroupDescriptor = 0x1001,
    /// Serial Port Profile
    SerialPort = 0x1101,
    /// Dialup Networking
    DialupNetworking = 0x1103,
    /// OBEX Object Push
    ObexObjectPush = 0x1105,
    /// OBEX File Transfer
    ObexFileTransfer = 0x1106,
    /// Headset Profile
    Headset = 0x1108,
    /// Audio Source
    AudioSource = 0x110A,
    /// Audio Sink
    AudioSink = 0x110B,
    /// Advanced Audio Distribution Profile
    AdvancedAudioDistribution = 0x110D,
    /// Hands-Free Profile
    HandsFree = 0x111E,
    /// Human Interface Device
    HumanInterfaceDevice = 0x1124,
}

impl ServiceClassId {
    /// Convert to 128-bit UUID
    #[must_use]
    pub const fn to_uuid(self) -> ServiceUuid {
        short_uuid(self as u32)
    }
}

/// Service Record
///
/// A record carries the handle it is known by (assigned by the daemon when a local
/// record is registered, or reported by the remote device) and its attributes in
/// ascending id order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceRecord {
    handle: Option<ServiceRecordHandle>,
    attributes: BTreeMap<AttributeId, DataElement>,
}

impl ServiceRecord {
    /// Create an empty, unregistered record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a record fetched from a remote device
    ///
    /// # Errors
    /// Returns an error if `bytes` is not a valid attribute list.
    pub fn from_bytes(handle: ServiceRecordHandle, bytes: &[u8]) -> Result<Self, SdpError> {
        Ok(Self {
            handle: Some(handle),
            attributes: AttributeListParser::new(bytes).parse()?,
        })
    }

    /// Encode the record for the daemon
    ///
    /// # Errors
    /// Returns `SdpError::TooLarge` if the record cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SdpError> {
        encode_attribute_list(&self.attributes)
    }

    /// Handle assigned to this record, if any
    #[must_use]
    pub const fn handle(&self) -> Option<ServiceRecordHandle> {
        self.handle
    }

    /// Record the handle and stamp the `ServiceRecordHandle` attribute with it
    pub fn assign_handle(&mut self, handle: ServiceRecordHandle) {
        self.handle = Some(handle);
        self.attributes.insert(
            UniversalAttributeId::ServiceRecordHandle.to_u16(),
            DataElement::UnsignedInt32(handle),
        );
    }

    /// Forget the handle after the record was withdrawn
    pub fn clear_handle(&mut self) {
        self.handle = None;
        self.attributes
            .remove(&UniversalAttributeId::ServiceRecordHandle.to_u16());
    }

    /// Set an attribute, replacing any previous value
    pub fn set_attribute(&mut self, id: AttributeId, value: DataElement) {
        self.attributes.insert(id, value);
    }

    /// Get attribute value
    #[must_use]
    pub fn get_attribute(&self, id: AttributeId) -> Option<&DataElement> {
        self.attributes.get(&id)
    }

    /// Remove an attribute, returning its value
    pub fn remove_attribute(&mut self, id: AttributeId) -> Option<DataElement> {
        self.attributes.remove(&id)
    }

    /// Attribute ids present, ascending
    pub fn attribute_ids(&self) -> impl Iterator<Item = AttributeId> + '_ {
        self.attributes.keys().copied()
    }

    /// Service name in the primary language
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.get_attribute(PRIMARY_LANGUAGE_BASE_ID + SERVICE_NAME_OFFSET)
            .and_then(DataElement::as_str)
    }

    /// Set service name in the primary language
    pub fn set_service_name(&mut self, name: &str) {
        self.set_attribute(
            PRIMARY_LANGUAGE_BASE_ID + SERVICE_NAME_OFFSET,
            DataElement::text_string(name),
        );
    }

    /// UUIDs of the Service Class ID List, widened to 128 bits
    #[must_use]
    pub fn service_class_uuids(&self) -> Vec<ServiceUuid> {
        self.get_attribute(UniversalAttributeId::ServiceClassIdList.to_u16())
            .and_then(DataElement::as_elements)
            .map(|classes| classes.iter().filter_map(DataElement::as_uuid).collect())
            .unwrap_or_default()
    }

    /// Protocol UUIDs of the Protocol Descriptor List, widened to 128 bits
    ///
    /// Each descriptor is a sequence led by its protocol UUID. A list given as an
    /// alternative of stacks contributes the protocols of every stack.
    #[must_use]
    pub fn protocol_uuids(&self) -> Vec<ServiceUuid> {
        let mut uuids = Vec::new();
        if let Some(list) =
            self.get_attribute(UniversalAttributeId::ProtocolDescriptorList.to_u16())
        {
            collect_protocol_uuids(list, &mut uuids);
        }
        uuids
    }

    /// Check if the record names `uuid` as a service class
    #[must_use]
    pub fn has_service_class_uuid(&self, uuid: ServiceUuid) -> bool {
        self.service_class_uuids().contains(&uuid)
    }

    /// Check if the record names `uuid` as a protocol
    #[must_use]
    pub fn has_protocol_uuid(&self, uuid: ServiceUuid) -> bool {
        self.protocol_uuids().contains(&uuid)
    }

    /// Check if every UUID in `required` appears as a service class or a protocol
    #[must_use]
    pub fn matches_all(&self, required: &[ServiceUuid]) -> bool {
        let classes = self.service_class_uuids();
        let protocols = self.protocol_uuids();
        required
            .iter()
            .all(|uuid| classes.contains(uuid) || protocols.contains(uuid))
    }

    /// Fill in the attributes of an RFCOMM server on `channel`
    ///
    /// Non-OBEX services are also listed as Serial Port, OBEX services get an OBEX
    /// descriptor on top of RFCOMM.
    pub fn populate_rfcomm_attributes(
        &mut self,
        channel: u8,
        uuid: ServiceUuid,
        name: Option<&str>,
        obex: bool,
    ) {
        let mut classes = vec![DataElement::Uuid128(uuid)];
        if !obex {
            classes.push(DataElement::Uuid16(ServiceClassId::SerialPort as u16));
        }
        self.set_attribute(
            UniversalAttributeId::ServiceClassIdList.to_u16(),
            DataElement::Sequence(classes),
        );

        let mut protocols = vec![
            DataElement::Sequence(vec![DataElement::Uuid16(protocol::L2CAP)]),
            DataElement::Sequence(vec![
                DataElement::Uuid16(protocol::RFCOMM),
                DataElement::UnsignedInt8(channel),
            ]),
        ];
        if obex {
            protocols.push(DataElement::Sequence(vec![DataElement::Uuid16(
                protocol::OBEX,
            )]));
        }
        self.set_attribute(
            UniversalAttributeId::ProtocolDescriptorList.to_u16(),
            DataElement::Sequence(protocols),
        );

        self.populate_common(name);
    }

    /// Fill in the attributes of an L2CAP server on `psm`
    pub fn populate_l2cap_attributes(&mut self, psm: u16, uuid: ServiceUuid, name: Option<&str>) {
        self.set_attribute(
            UniversalAttributeId::ServiceClassIdList.to_u16(),
            DataElement::Sequence(vec![DataElement::Uuid128(uuid)]),
        );
        self.set_attribute(
            UniversalAttributeId::ProtocolDescriptorList.to_u16(),
            DataElement::Sequence(vec![DataElement::Sequence(vec![
                DataElement::Uuid16(protocol::L2CAP),
                DataElement::UnsignedInt16(psm),
            ])]),
        );

        self.populate_common(name);
    }

    fn populate_common(&mut self, name: Option<&str>) {
        self.set_attribute(
            UniversalAttributeId::BrowseGroupList.to_u16(),
            DataElement::Sequence(vec![DataElement::Uuid16(PUBLIC_BROWSE_GROUP)]),
        );
        if let Some(name) = name {
            self.set_service_name(name);
        }
    }
}

fn collect_protocol_uuids(list: &DataElement, uuids: &mut Vec<ServiceUuid>) {
    match list {
        DataElement::Alternative(stacks) => {
            for stack in stacks {
                collect_protocol_uuids(stack, uuids);
            }
        }
        DataElement::Sequence(descriptors) => {
            for descriptor in descriptors {
                if let Some(uuid) = descriptor
                    .as_elements()
                    .and_then(<[DataElement]>::first)
                    .and_then(DataElement::as_uuid)
                {
                    uuids.push(uuid);
                }
            }
        }
        _ => {}
    }
}
