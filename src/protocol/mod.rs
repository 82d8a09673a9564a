//! # Protocol Layer
//!
//! CLIXML serialization and the PSRP message envelope.
//!
//! This module converts between object graphs and CLIXML element trees,
//! and packs serialized payloads into routed message envelopes ready for
//! fragmentation.

pub mod deserializer;
pub mod message;
pub mod serializer;


use crate::core::value::PsValue;
use crate::core::xml::Element;
use crate::error::Result;

pub use deserializer::{deserialize, deserialize_with, Deserializer};
pub use serializer::{serialize, serialize_with, Serializer};

/// Serialize a value straight to CLIXML text.
pub fn to_clixml(value: &PsValue) -> Result<String> {
    Ok(serialize(value)?.to_xml())
}

/// Parse CLIXML text and deserialize its root element.
pub fn from_clixml(text: &str) -> Result<PsValue> {
    deserialize(&Element::parse(text)?)
}
