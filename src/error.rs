//! # Error Types
//!
//! Comprehensive error handling for the PSRP wire codec.
//!
//! This module defines all error variants that can occur while converting
//! object graphs to and from CLIXML and while framing messages for
//! transport, from property conversion failures to fragment sequencing
//! violations.
//!
//! ## Error Categories
//! - **Object model errors**: conversion, member collisions, constructor
//!   argument validation
//! - **Document errors**: unknown elements, malformed dictionaries,
//!   unresolved references, unparseable literals
//! - **Framing errors**: short buffers, oversized fragments, out-of-order
//!   fragment ids
//! - **Crypto errors**: SecureString encryption/decryption failures
//!
//! All of these are local, synchronous failures. The codec never retries
//! or silently coerces; every variant carries enough context (offending
//! tag, expected vs. actual fragment id, offending literal) to diagnose a
//! protocol mismatch between peers.

use std::io;
use thiserror::Error;

/// PsrpError is the primary error type for all codec operations
#[derive(Error, Debug)]
pub enum PsrpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot convert value '{value}' to {target}")]
    Conversion { value: String, target: &'static str },

    #[error("expected at most {expected} positional arguments, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument '{0}' supplied both positionally and by name")]
    DuplicateArgument(String),

    #[error("missing mandatory properties: {}", .0.join(", "))]
    MissingMandatory(Vec<String>),

    #[error("no property named '{0}' is declared on this type")]
    UnknownArgument(String),

    #[error("a member named '{0}' already exists")]
    AlreadyExists(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("unknown element '{0}' in CLIXML document")]
    UnknownElement(String),

    #[error("dictionary entry is missing a '{0}' child")]
    MalformedDictionary(&'static str),

    #[error("reference to unknown RefId {0}")]
    UnresolvedReference(u64),

    #[error("reference to unknown type name list RefId {0}")]
    UnresolvedTypeNames(u64),

    #[error("malformed XML: {0}")]
    MalformedXml(String),

    #[error("cannot parse '{literal}' as {kind}")]
    Parse { kind: &'static str, literal: String },

    #[error("object {object_id}: expected fragment id {expected}, got {actual}")]
    FragmentSequence {
        object_id: u64,
        expected: u64,
        actual: u64,
    },

    #[error("buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("fragment payload of {0} bytes exceeds the maximum")]
    OversizedFragment(usize),

    #[error("unknown message type code 0x{0:08X}")]
    UnknownMessageType(u32),

    #[error("unknown destination code 0x{0:08X}")]
    UnknownDestination(u32),

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PsrpError {
    /// Shorthand for a [`PsrpError::Parse`] with an owned literal.
    pub(crate) fn parse(kind: &'static str, literal: impl Into<String>) -> Self {
        PsrpError::Parse {
            kind,
            literal: literal.into(),
        }
    }

    /// Shorthand for a [`PsrpError::Conversion`] with an owned value.
    pub(crate) fn conversion(value: impl Into<String>, target: &'static str) -> Self {
        PsrpError::Conversion {
            value: value.into(),
            target,
        }
    }
}

/// Type alias for Results using PsrpError
pub type Result<T> = std::result::Result<T, PsrpError>;
