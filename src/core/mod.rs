//! # Core Object Model and Framing
//!
//! The typed object model, the CLIXML element tree, and the binary
//! fragment framing.
//!
//! ## Components
//! - **Value/Primitive**: the closed value universe and its precision rules
//! - **Property/Object**: Note/Alias/Script properties on shared-identity
//!   objects
//! - **Registry**: process-wide type table driving tag dispatch and
//!   rehydration
//! - **Xml**: CLIXML element tree, writer, and subset parser
//! - **Fragment/Codec**: 21-byte-header framing with tokio codec support
//!
//! ## Wire Format
//! ```text
//! [ObjectId(8)] [FragmentId(8)] [Flags(1)] [Length(4)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Maximum reassembled payload: 16MB (prevents memory exhaustion)
//! - Length validation before allocation
//! - SecureString payloads never serialize without a cipher

pub mod codec;
pub mod fragment;
pub mod object;
pub mod primitive;
pub mod property;
pub mod registry;
pub mod value;
pub mod xml;
