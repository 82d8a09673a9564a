//! # Utility Modules
//!
//! Supporting utilities for the CLIXML codec.
//!
//! ## Components
//! - **Escape**: `_xHHHH_` string escaping mandated by the CLIXML format
//! - **Crypto**: the pluggable cipher seam used for SecureString payloads
//!   (a ChaCha20-Poly1305 implementation ships behind the `crypto` feature)

pub mod crypto;
pub mod escape;

// Re-export public types for advanced users
pub use crypto::CryptoProvider;
