//! # psrp-protocol
//!
//! Wire-level object model, CLIXML codec, and message fragmentation for
//! the PowerShell Remoting Protocol (MS-PSRP).
//!
//! This crate covers the two layers every PSRP peer needs below its
//! session state machine:
//!
//! 1. **Typed object model + CLIXML codec** — a property system (note,
//!    alias, and computed properties), a process-wide type registry with
//!    rehydration, and a serializer/deserializer that turns object graphs
//!    into the CLIXML element trees exchanged on the wire, preserving
//!    shared identity and cycles through RefId references.
//! 2. **Message framing** — the 40-byte message envelope (direction,
//!    message type, pool and pipeline GUIDs) and the 21-byte-header
//!    fragmentation layer that bounds messages to transport size limits
//!    and reassembles them in strict order.
//!
//! The codec is synchronous and performs no I/O; transports drive it by
//! feeding bytes through [`core::codec::FragmentCodec`] (a `tokio_util`
//! codec) or by calling the pack/fragment functions directly. RunspacePool
//! and Pipeline session logic lives above this crate and consumes
//! [`protocol::serialize`], [`protocol::deserialize`],
//! [`protocol::message::Message`], [`core::fragment::Fragmenter`], and
//! [`core::fragment::Defragmenter`].
//!
//! ## Example
//! ```rust
//! use psrp_protocol::core::object::PsObject;
//! use psrp_protocol::core::property::PsProperty;
//! use psrp_protocol::core::value::PsValue;
//! use psrp_protocol::protocol::{from_clixml, to_clixml};
//!
//! # fn main() -> psrp_protocol::error::Result<()> {
//! let obj = PsObject::custom();
//! obj.add_member(PsProperty::note("Name", "runspace1"), false)?;
//!
//! let xml = to_clixml(&PsValue::Object(obj))?;
//! let value = from_clixml(&xml)?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod utils;

pub use crate::core::codec::FragmentCodec;
pub use crate::core::fragment::{Defragmenter, Fragment, Fragmenter};
pub use crate::core::object::{ObjectBody, PsObject};
pub use crate::core::primitive::{PsDateTime, PsDecimal, PsDuration, PsSecureString, PsVersion};
pub use crate::core::property::{PropertyKind, PsProperty};
pub use crate::core::registry::{register_type, TypeDescriptor, TypeKind, TypeRegistry};
pub use crate::core::value::{PsType, PsValue};
pub use crate::core::xml::Element;
pub use crate::error::{PsrpError, Result};
pub use crate::protocol::message::{Destination, Message, MessageType};
pub use crate::protocol::{deserialize, from_clixml, serialize, to_clixml};
pub use crate::utils::crypto::CryptoProvider;
