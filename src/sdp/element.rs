//! SDP data elements
//!
//! A data element is a one-byte type/size descriptor followed by its payload. Text,
//! URL, sequence and alternative payloads carry an extra 1, 2 or 4 byte length.

use super::SdpError;
use super::record::{ServiceUuid, short_uuid};

/// Deepest nesting of sequences and alternatives the decoder accepts
pub const MAX_NESTING_DEPTH: usize = 16;

/// Data element type identifier (upper five bits of the descriptor)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataElementType {
    /// Nil (null value)
    Nil = 0,
    /// Unsigned integer
    UnsignedInt = 1,
    /// Signed integer
    SignedInt = 2,
    /// UUID
    Uuid = 3,
    /// Text string
    TextString = 4,
    /// Boolean
    Boolean = 5,
    /// Data element sequence
    Sequence = 6,
    /// Data element alternative
    Alternative = 7,
    /// URL
    Url = 8,
}

/// SDP Data Element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataElement {
    /// Nil (null value)
    Nil,
    /// Unsigned 8-bit integer
    UnsignedInt8(u8),
    /// Unsigned 16-bit integer
    UnsignedInt16(u16),
    /// Unsigned 32-bit integer
    UnsignedInt32(u32),
    /// Unsigned 64-bit integer
    UnsignedInt64(u64),
    /// Unsigned 128-bit integer
    UnsignedInt128(u128),
    /// Signed 8-bit integer
    SignedInt8(i8),
    /// Signed 16-bit integer
    SignedInt16(i16),
    /// Signed 32-bit integer
    SignedInt32(i32),
    /// Signed 64-bit integer
    SignedInt64(i64),
    /// Signed 128-bit integer
    SignedInt128(i128),
    /// 16-bit UUID
    Uuid16(u16),
    /// 32-bit UUID
    Uuid32(u32),
    /// 128-bit UUID
    Uuid128(u128),
    /// Text string, usually UTF-8 but not guaranteed
    TextString(Vec<u8>),
    /// Boolean value
    Boolean(bool),
    /// Data element sequence
    Sequence(Vec<DataElement>),
    /// Data element alternative
    Alternative(Vec<DataElement>),
    /// URL string
    Url(Vec<u8>),
}

impl DataElement {
    /// Create a text string data element
    #[must_use]
    pub fn text_string(text: &str) -> Self {
        Self::TextString(text.as_bytes().to_vec())
    }

    /// Get the data element type
    #[must_use]
    pub const fn data_type(&self) -> DataElementType {
        match self {
            Self::Nil => DataElementType::Nil,
            Self::UnsignedInt8(_)
            | Self::UnsignedInt16(_)
            | Self::UnsignedInt32(_)
            | Self::UnsignedInt64(_)
            | Self::UnsignedInt128(_) => DataElementType::UnsignedInt,
            Self::SignedInt8(_)
            | Self::SignedInt16(_)
            | Self::SignedInt32(_)
            | Self::SignedInt64(_)
            | Self::SignedInt128(_) => DataElementType::SignedInt,
            Self::Uuid16(_) | Self::Uuid32(_) | Self::Uuid128(_) => DataElementType::Uuid,
            Self::TextString(_) => DataElementType::TextString,
            Self::Boolean(_) => DataElementType::Boolean,
            Self::Sequence(_) => DataElementType::Sequence,
            Self::Alternative(_) => DataElementType::Alternative,
            Self::Url(_) => DataElementType::Url,
        }
    }

    /// Any UUID widened to 128 bits over the Bluetooth base UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Option<ServiceUuid> {
        match *self {
            Self::Uuid16(uuid) => Some(short_uuid(uuid as u32)),
            Self::Uuid32(uuid) => Some(short_uuid(uuid)),
            Self::Uuid128(uuid) => Some(uuid),
            _ => None,
        }
    }

    /// Unsigned integers up to 32 bits
    #[must_use]
    pub const fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::UnsignedInt8(value) => Some(value as u32),
            Self::UnsignedInt16(value) => Some(value as u32),
            Self::UnsignedInt32(value) => Some(value),
            _ => None,
        }
    }

    /// Text or URL payload as UTF-8, if valid
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::TextString(bytes) | Self::Url(bytes) => core::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Children of a sequence or alternative
    #[must_use]
    pub fn as_elements(&self) -> Option<&[DataElement]> {
        match self {
            Self::Sequence(elements) | Self::Alternative(elements) => Some(elements.as_slice()),
            _ => None,
        }
    }

    /// Get the encoded size of this data element, descriptor included
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        let payload = self.payload_size();
        1 + payload
            + match self {
                Self::TextString(_) | Self::Url(_) | Self::Sequence(_) | Self::Alternative(_) => {
                    length_prefix_size(payload)
                }
                _ => 0,
            }
    }

    fn payload_size(&self) -> usize {
        match self {
            Self::Nil => 0,
            Self::UnsignedInt8(_) | Self::SignedInt8(_) | Self::Boolean(_) => 1,
            Self::UnsignedInt16(_) | Self::SignedInt16(_) | Self::Uuid16(_) => 2,
            Self::UnsignedInt32(_) | Self::SignedInt32(_) | Self::Uuid32(_) => 4,
            Self::UnsignedInt64(_) | Self::SignedInt64(_) => 8,
            Self::UnsignedInt128(_) | Self::SignedInt128(_) | Self::Uuid128(_) => 16,
            Self::TextString(bytes) | Self::Url(bytes) => bytes.len(),
            Self::Sequence(elements) | Self::Alternative(elements) => {
                elements.iter().map(Self::encoded_size).sum()
            }
        }
    }

    /// Append the binary form of this element to `out`
    ///
    /// # Errors
    /// Returns `SdpError::TooLarge` if a payload exceeds the 32-bit length field.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), SdpError> {
        let type_bits = (self.data_type() as u8) << 3;
        match self {
            Self::Nil => out.push(type_bits),
            Self::UnsignedInt8(v) => put_fixed(out, type_bits, 0, &v.to_be_bytes()),
            Self::UnsignedInt16(v) => put_fixed(out, type_bits, 1, &v.to_be_bytes()),
            Self::UnsignedInt32(v) => put_fixed(out, type_bits, 2, &v.to_be_bytes()),
            Self::UnsignedInt64(v) => put_fixed(out, type_bits, 3, &v.to_be_bytes()),
            Self::UnsignedInt128(v) => put_fixed(out, type_bits, 4, &v.to_be_bytes()),
            Self::SignedInt8(v) => put_fixed(out, type_bits, 0, &v.to_be_bytes()),
            Self::SignedInt16(v) => put_fixed(out, type_bits, 1, &v.to_be_bytes()),
            Self::SignedInt32(v) => put_fixed(out, type_bits, 2, &v.to_be_bytes()),
            Self::SignedInt64(v) => put_fixed(out, type_bits, 3, &v.to_be_bytes()),
            Self::SignedInt128(v) => put_fixed(out, type_bits, 4, &v.to_be_bytes()),
            Self::Uuid16(v) => put_fixed(out, type_bits, 1, &v.to_be_bytes()),
            Self::Uuid32(v) => put_fixed(out, type_bits, 2, &v.to_be_bytes()),
            Self::Uuid128(v) => put_fixed(out, type_bits, 4, &v.to_be_bytes()),
            Self::Boolean(v) => put_fixed(out, type_bits, 0, &[u8::from(*v)]),
            Self::TextString(bytes) | Self::Url(bytes) => {
                put_length(out, type_bits, bytes.len())?;
                out.extend_from_slice(bytes);
            }
            Self::Sequence(elements) | Self::Alternative(elements) => {
                put_length(out, type_bits, self.payload_size())?;
                for element in elements {
                    element.encode(out)?;
                }
            }
        }
        Ok(())
    }

    /// Binary form of this element
    ///
    /// # Errors
    /// Returns `SdpError::TooLarge` if a payload exceeds the 32-bit length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SdpError> {
        let mut out = Vec::with_capacity(self.encoded_size());
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Decode exactly one element spanning all of `data`
    ///
    /// # Errors
    /// Returns an error on malformed or trailing input.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SdpError> {
        let mut reader = ElementReader::new(data);
        let element = reader.read_element()?;
        if !reader.is_empty() {
            return Err(SdpError::InvalidAttributeList("trailing bytes after element"));
        }
        Ok(element)
    }
}

fn length_prefix_size(len: usize) -> usize {
    if len <= usize::from(u8::MAX) {
        1
    } else if len <= usize::from(u16::MAX) {
        2
    } else {
        4
    }
}

fn put_fixed(out: &mut Vec<u8>, type_bits: u8, size_index: u8, payload: &[u8]) {
    out.push(type_bits | size_index);
    out.extend_from_slice(payload);
}

fn put_length(out: &mut Vec<u8>, type_bits: u8, len: usize) -> Result<(), SdpError> {
    if let Ok(len) = u8::try_from(len) {
        out.push(type_bits | 5);
        out.push(len);
    } else if let Ok(len) = u16::try_from(len) {
        out.push(type_bits | 6);
        out.extend_from_slice(&len.to_be_bytes());
    } else {
        let len = u32::try_from(len).map_err(|_| SdpError::TooLarge)?;
        out.push(type_bits | 7);
        out.extend_from_slice(&len.to_be_bytes());
    }
    Ok(())
}

/// Cursor over binary data elements
#[derive(Debug)]
pub struct ElementReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ElementReader<'a> {
    /// Create a reader at the start of `data`
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Get current position
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Check if every byte has been consumed
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Read the next element
    ///
    /// # Errors
    /// Returns an error on truncated input, invalid descriptors, or excessive nesting.
    pub fn read_element(&mut self) -> Result<DataElement, SdpError> {
        self.read_nested(0)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SdpError> {
        let end = self.position.checked_add(len).ok_or(SdpError::Truncated)?;
        let bytes = self.data.get(self.position..end).ok_or(SdpError::Truncated)?;
        self.position = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], SdpError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn read_length(&mut self, descriptor: u8) -> Result<usize, SdpError> {
        let len = match descriptor & 0x07 {
            5 => u32::from(self.take_array::<1>()?[0]),
            6 => u32::from(u16::from_be_bytes(self.take_array()?)),
            7 => u32::from_be_bytes(self.take_array()?),
            _ => return Err(SdpError::InvalidDescriptor(descriptor)),
        };
        usize::try_from(len).map_err(|_| SdpError::TooLarge)
    }

    fn read_nested(&mut self, depth: usize) -> Result<DataElement, SdpError> {
        let descriptor = self.take_array::<1>()?[0];
        let invalid = SdpError::InvalidDescriptor(descriptor);

        let element = match (descriptor >> 3, descriptor & 0x07) {
            (0, 0) => DataElement::Nil,
            (1, 0) => DataElement::UnsignedInt8(u8::from_be_bytes(self.take_array()?)),
            (1, 1) => DataElement::UnsignedInt16(u16::from_be_bytes(self.take_array()?)),
            (1, 2) => DataElement::UnsignedInt32(u32::from_be_bytes(self.take_array()?)),
            (1, 3) => DataElement::UnsignedInt64(u64::from_be_bytes(self.take_array()?)),
            (1, 4) => DataElement::UnsignedInt128(u128::from_be_bytes(self.take_array()?)),
            (2, 0) => DataElement::SignedInt8(i8::from_be_bytes(self.take_array()?)),
            (2, 1) => DataElement::SignedInt16(i16::from_be_bytes(self.take_array()?)),
            (2, 2) => DataElement::SignedInt32(i32::from_be_bytes(self.take_array()?)),
            (2, 3) => DataElement::SignedInt64(i64::from_be_bytes(self.take_array()?)),
            (2, 4) => DataElement::SignedInt128(i128::from_be_bytes(self.take_array()?)),
            (3, 1) => DataElement::Uuid16(u16::from_be_bytes(self.take_array()?)),
            (3, 2) => DataElement::Uuid32(u32::from_be_bytes(self.take_array()?)),
            (3, 4) => DataElement::Uuid128(u128::from_be_bytes(self.take_array()?)),
            (4, 5..=7) => {
                let len = self.read_length(descriptor)?;
                DataElement::TextString(self.take(len)?.to_vec())
            }
            (5, 0) => DataElement::Boolean(self.take_array::<1>()?[0] != 0),
            (6 | 7, 5..=7) => {
                if depth >= MAX_NESTING_DEPTH {
                    return Err(SdpError::NestingTooDeep);
                }
                let len = self.read_length(descriptor)?;
                let mut inner = ElementReader::new(self.take(len)?);
                let mut elements = Vec::new();
                while !inner.is_empty() {
                    elements.push(inner.read_nested(depth + 1)?);
                }
                if descriptor >> 3 == 6 {
                    DataElement::Sequence(elements)
                } else {
                    DataElement::Alternative(elements)
                }
            }
            (8, 5..=7) => {
                let len = self.read_length(descriptor)?;
                DataElement::Url(self.take(len)?.to_vec())
            }
            _ => return Err(invalid),
        };
        Ok(element)
    }
}
