//! Service Discovery Protocol (SDP) support
//!
//! The daemon performs the SDP transactions; this module models the records it
//! exchanges with us. Remote records arrive as binary attribute lists and are decoded
//! into [`ServiceRecord`]s, local records are encoded before being published.
//!
//! - [`element`]: data elements and their binary encoding
//! - [`attribute`]: attribute ids and attribute-list parsing
//! - [`record`]: service records, UUID helpers, server record population
//! - [`client`]: remote service search
//! - [`server`]: the local service directory session

/// Service record handle type
pub type ServiceRecordHandle = u32;

/// Transaction ID of a service search
pub type TransactionId = u16;

pub mod attribute;
pub mod client;
pub mod element;
pub mod record;
pub mod server;

pub use attribute::{AttributeListParser, UniversalAttributeId};
pub use client::{SearchOutcome, SearchTransaction, ServiceSearchEngine, ServiceSearchResult};
pub use element::{DataElement, DataElementType};
pub use record::{AttributeId, ServiceClassId, ServiceRecord, ServiceUuid, short_uuid};
pub use server::ServiceDirectorySession;

/// SDP encoding and decoding errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SdpError {
    /// Input ended in the middle of a data element
    #[error("SDP data truncated")]
    Truncated,
    /// Type/size descriptor byte is not a valid combination
    #[error("invalid SDP data element descriptor {0:#04x}")]
    InvalidDescriptor(u8),
    /// Data elements nest deeper than the decoder accepts
    #[error("SDP data elements nested too deeply")]
    NestingTooDeep,
    /// A length does not fit the 32-bit size field
    #[error("SDP data element too large")]
    TooLarge,
    /// The bytes decode, but not into an attribute list
    #[error("invalid SDP attribute list: {0}")]
    InvalidAttributeList(&'static str),
}
