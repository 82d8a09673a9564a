//! # Configuration Management
//!
//! Protocol constants and codec configuration.
//!
//! The constants here are fixed by MS-PSRP and must not be tuned; the
//! [`CodecConfig`] struct covers the knobs a transport layer is allowed to
//! negotiate (fragment sizing, payload ceilings).
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - TOML strings via `from_toml()`
//! - Direct instantiation with defaults

use crate::error::{PsrpError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Size of the fixed message envelope header:
/// destination (4) + message type (4) + pool GUID (16) + pipeline GUID (16)
pub const MESSAGE_HEADER_SIZE: usize = 40;

/// Size of the fixed fragment header:
/// object id (8) + fragment id (8) + flags (1) + length (4)
pub const FRAGMENT_HEADER_SIZE: usize = 21;

/// Default maximum size of one fragment including its header.
///
/// Matches the WSMan default envelope budget; transports with larger
/// negotiated limits may raise this per [`CodecConfig`].
pub const DEFAULT_MAX_FRAGMENT_SIZE: usize = 32_768;

/// Max allowed reassembled payload size (e.g. 16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// UTF-8 byte order mark, stripped from message payloads when present.
pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Codec configuration covering the transport-negotiable limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodecConfig {
    /// Maximum size of one outgoing fragment, header included
    #[serde(default = "default_max_fragment_size")]
    pub max_fragment_size: usize,

    /// Maximum size a reassembled message payload may reach
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
}

fn default_max_fragment_size() -> usize {
    DEFAULT_MAX_FRAGMENT_SIZE
}

fn default_max_payload_size() -> usize {
    MAX_PAYLOAD_SIZE
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl CodecConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| PsrpError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| PsrpError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PsrpError::Config(format!("Failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration against the fixed protocol limits
    pub fn validate(&self) -> Result<()> {
        if self.max_fragment_size <= FRAGMENT_HEADER_SIZE {
            return Err(PsrpError::Config(format!(
                "max_fragment_size ({}) must exceed the {FRAGMENT_HEADER_SIZE}-byte fragment header",
                self.max_fragment_size
            )));
        }

        if self.max_payload_size == 0 {
            return Err(PsrpError::Config(
                "max_payload_size must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CodecConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_fragment_size, DEFAULT_MAX_FRAGMENT_SIZE);
    }

    #[test]
    fn test_from_toml() {
        let config = CodecConfig::from_toml("max_fragment_size = 1024").unwrap();
        assert_eq!(config.max_fragment_size, 1024);
        assert_eq!(config.max_payload_size, MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_fragment_size_must_exceed_header() {
        let result = CodecConfig::from_toml("max_fragment_size = 21");
        assert!(matches!(result, Err(PsrpError::Config(_))));
    }
}
