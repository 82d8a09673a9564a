//! The typed value universe crossing the wire.
//!
//! [`PsValue`] is the closed set of shapes the CLIXML codec understands:
//! the primitive tags of MS-PSRP §2.2.5 plus [`PsObject`] for everything
//! complex (property bags, containers, enums, extended primitives).

use crate::core::object::PsObject;
use crate::core::primitive::{PsDateTime, PsDecimal, PsDuration, PsSecureString, PsVersion};
use crate::error::{PsrpError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::str::FromStr;
use uuid::Uuid;

/// A value as seen by the serializer and deserializer.
#[derive(Debug, Clone, PartialEq)]
pub enum PsValue {
    Null,
    Bool(bool),
    UInt8(u8),
    Int8(i8),
    UInt16(u16),
    Int16(i16),
    UInt32(u32),
    Int32(i32),
    UInt64(u64),
    Int64(i64),
    Single(f32),
    Double(f64),
    Decimal(PsDecimal),
    /// A UTF-16 code unit, serialized as its decimal value
    Char(u16),
    String(String),
    Uri(String),
    XmlDocument(String),
    ScriptBlock(String),
    Version(PsVersion),
    Guid(Uuid),
    DateTime(PsDateTime),
    Duration(PsDuration),
    SecureString(PsSecureString),
    Bytes(Vec<u8>),
    Object(PsObject),
}

impl PsValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PsValue::Null)
    }

    /// The primitive wire type of this value, if it has one.
    pub fn primitive_type(&self) -> Option<PsType> {
        Some(match self {
            PsValue::Null | PsValue::Object(_) => return None,
            PsValue::Bool(_) => PsType::Bool,
            PsValue::UInt8(_) => PsType::UInt8,
            PsValue::Int8(_) => PsType::Int8,
            PsValue::UInt16(_) => PsType::UInt16,
            PsValue::Int16(_) => PsType::Int16,
            PsValue::UInt32(_) => PsType::UInt32,
            PsValue::Int32(_) => PsType::Int32,
            PsValue::UInt64(_) => PsType::UInt64,
            PsValue::Int64(_) => PsType::Int64,
            PsValue::Single(_) => PsType::Single,
            PsValue::Double(_) => PsType::Double,
            PsValue::Decimal(_) => PsType::Decimal,
            PsValue::Char(_) => PsType::Char,
            PsValue::String(_) => PsType::String,
            PsValue::Uri(_) => PsType::Uri,
            PsValue::XmlDocument(_) => PsType::XmlDocument,
            PsValue::ScriptBlock(_) => PsType::ScriptBlock,
            PsValue::Version(_) => PsType::Version,
            PsValue::Guid(_) => PsType::Guid,
            PsValue::DateTime(_) => PsType::DateTime,
            PsValue::Duration(_) => PsType::Duration,
            PsValue::SecureString(_) => PsType::SecureString,
            PsValue::Bytes(_) => PsType::Bytes,
        })
    }

    /// Short description used in conversion diagnostics.
    pub fn describe(&self) -> String {
        match self {
            PsValue::Null => "null".to_string(),
            PsValue::Object(obj) => obj
                .type_names()
                .first()
                .cloned()
                .unwrap_or_else(|| "object".to_string()),
            PsValue::String(s) => s.clone(),
            other => format!("{other:?}"),
        }
    }

    /// Widen any integer variant to i128 for range-checked conversion.
    pub(crate) fn integral(&self) -> Option<i128> {
        Some(match *self {
            PsValue::UInt8(v) => v as i128,
            PsValue::Int8(v) => v as i128,
            PsValue::UInt16(v) => v as i128,
            PsValue::Int16(v) => v as i128,
            PsValue::UInt32(v) => v as i128,
            PsValue::Int32(v) => v as i128,
            PsValue::UInt64(v) => v as i128,
            PsValue::Int64(v) => v as i128,
            PsValue::Char(v) => v as i128,
            _ => return None,
        })
    }
}

impl From<bool> for PsValue {
    fn from(value: bool) -> Self {
        PsValue::Bool(value)
    }
}

impl From<i32> for PsValue {
    fn from(value: i32) -> Self {
        PsValue::Int32(value)
    }
}

/// Host integers take the narrowest signed tag that fits their magnitude:
/// values within i32 serialize as `I32`, larger ones as `I64`.
impl From<i64> for PsValue {
    fn from(value: i64) -> Self {
        match i32::try_from(value) {
            Ok(narrow) => PsValue::Int32(narrow),
            Err(_) => PsValue::Int64(value),
        }
    }
}

impl From<f32> for PsValue {
    fn from(value: f32) -> Self {
        PsValue::Single(value)
    }
}

impl From<f64> for PsValue {
    fn from(value: f64) -> Self {
        PsValue::Double(value)
    }
}

impl From<&str> for PsValue {
    fn from(value: &str) -> Self {
        PsValue::String(value.to_string())
    }
}

impl From<String> for PsValue {
    fn from(value: String) -> Self {
        PsValue::String(value)
    }
}

impl From<Vec<u8>> for PsValue {
    fn from(value: Vec<u8>) -> Self {
        PsValue::Bytes(value)
    }
}

impl From<Uuid> for PsValue {
    fn from(value: Uuid) -> Self {
        PsValue::Guid(value)
    }
}

impl From<PsDateTime> for PsValue {
    fn from(value: PsDateTime) -> Self {
        PsValue::DateTime(value)
    }
}

impl From<PsDuration> for PsValue {
    fn from(value: PsDuration) -> Self {
        PsValue::Duration(value)
    }
}

impl From<PsVersion> for PsValue {
    fn from(value: PsVersion) -> Self {
        PsValue::Version(value)
    }
}

impl From<PsObject> for PsValue {
    fn from(value: PsObject) -> Self {
        PsValue::Object(value)
    }
}

impl From<Vec<PsValue>> for PsValue {
    fn from(items: Vec<PsValue>) -> Self {
        PsValue::Object(PsObject::list(items))
    }
}

/// The registered primitive wire types, keyed by their CLIXML element tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PsType {
    String,
    Char,
    Bool,
    DateTime,
    Duration,
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Single,
    Double,
    Decimal,
    Bytes,
    Guid,
    Uri,
    Version,
    XmlDocument,
    ScriptBlock,
    SecureString,
}

impl PsType {
    /// Every primitive type, used to seed the tag registry.
    pub const ALL: [PsType; 23] = [
        PsType::String,
        PsType::Char,
        PsType::Bool,
        PsType::DateTime,
        PsType::Duration,
        PsType::UInt8,
        PsType::Int8,
        PsType::UInt16,
        PsType::Int16,
        PsType::UInt32,
        PsType::Int32,
        PsType::UInt64,
        PsType::Int64,
        PsType::Single,
        PsType::Double,
        PsType::Decimal,
        PsType::Bytes,
        PsType::Guid,
        PsType::Uri,
        PsType::Version,
        PsType::XmlDocument,
        PsType::ScriptBlock,
        PsType::SecureString,
    ];

    /// The CLIXML element tag for this type (MS-PSRP §2.2.5).
    pub fn tag(self) -> &'static str {
        match self {
            PsType::String => "S",
            PsType::Char => "C",
            PsType::Bool => "B",
            PsType::DateTime => "DT",
            PsType::Duration => "TS",
            PsType::UInt8 => "By",
            PsType::Int8 => "SB",
            PsType::UInt16 => "U16",
            PsType::Int16 => "I16",
            PsType::UInt32 => "U32",
            PsType::Int32 => "I32",
            PsType::UInt64 => "U64",
            PsType::Int64 => "I64",
            PsType::Single => "Sg",
            PsType::Double => "Db",
            PsType::Decimal => "D",
            PsType::Bytes => "BA",
            PsType::Guid => "G",
            PsType::Uri => "URI",
            PsType::Version => "Version",
            PsType::XmlDocument => "XD",
            PsType::ScriptBlock => "SBK",
            PsType::SecureString => "SS",
        }
    }

    /// The canonical .NET type name, used in diagnostics and rehydration.
    pub fn dotnet_name(self) -> &'static str {
        match self {
            PsType::String => "System.String",
            PsType::Char => "System.Char",
            PsType::Bool => "System.Boolean",
            PsType::DateTime => "System.DateTime",
            PsType::Duration => "System.TimeSpan",
            PsType::UInt8 => "System.Byte",
            PsType::Int8 => "System.SByte",
            PsType::UInt16 => "System.UInt16",
            PsType::Int16 => "System.Int16",
            PsType::UInt32 => "System.UInt32",
            PsType::Int32 => "System.Int32",
            PsType::UInt64 => "System.UInt64",
            PsType::Int64 => "System.Int64",
            PsType::Single => "System.Single",
            PsType::Double => "System.Double",
            PsType::Decimal => "System.Decimal",
            PsType::Bytes => "System.Byte[]",
            PsType::Guid => "System.Guid",
            PsType::Uri => "System.Uri",
            PsType::Version => "System.Version",
            PsType::XmlDocument => "System.Xml.XmlDocument",
            PsType::ScriptBlock => "System.Management.Automation.ScriptBlock",
            PsType::SecureString => "System.Security.SecureString",
        }
    }

    /// Parse already-unescaped element text into a value of this type.
    ///
    /// `SecureString` text is ciphertext and is handled by the
    /// deserializer, which owns the cipher.
    pub fn parse_text(self, text: &str) -> Result<PsValue> {
        let value = match self {
            PsType::String => PsValue::String(text.to_string()),
            PsType::Uri => PsValue::Uri(text.to_string()),
            PsType::XmlDocument => PsValue::XmlDocument(text.to_string()),
            PsType::ScriptBlock => PsValue::ScriptBlock(text.to_string()),
            PsType::Char => PsValue::Char(
                text.parse()
                    .map_err(|_| PsrpError::parse("Char", text))?,
            ),
            PsType::Bool => match text {
                "true" => PsValue::Bool(true),
                "false" => PsValue::Bool(false),
                _ => return Err(PsrpError::parse("Boolean", text)),
            },
            PsType::DateTime => PsValue::DateTime(text.parse()?),
            PsType::Duration => PsValue::Duration(text.parse()?),
            PsType::UInt8 => parse_int(text, "Byte", PsValue::UInt8)?,
            PsType::Int8 => parse_int(text, "SByte", PsValue::Int8)?,
            PsType::UInt16 => parse_int(text, "UInt16", PsValue::UInt16)?,
            PsType::Int16 => parse_int(text, "Int16", PsValue::Int16)?,
            PsType::UInt32 => parse_int(text, "UInt32", PsValue::UInt32)?,
            PsType::Int32 => parse_int(text, "Int32", PsValue::Int32)?,
            PsType::UInt64 => parse_int(text, "UInt64", PsValue::UInt64)?,
            PsType::Int64 => parse_int(text, "Int64", PsValue::Int64)?,
            PsType::Single => PsValue::Single(parse_float(text)? as f32),
            PsType::Double => PsValue::Double(parse_float(text)?),
            PsType::Decimal => PsValue::Decimal(text.parse()?),
            PsType::Bytes => PsValue::Bytes(
                BASE64
                    .decode(text)
                    .map_err(|_| PsrpError::parse("Byte[]", text))?,
            ),
            PsType::Guid => PsValue::Guid(
                Uuid::parse_str(text).map_err(|_| PsrpError::parse("Guid", text))?,
            ),
            PsType::Version => PsValue::Version(text.parse()?),
            PsType::SecureString => {
                return Err(PsrpError::Unsupported(
                    "SecureString text requires a crypto provider".to_string(),
                ))
            }
        };
        Ok(value)
    }

    /// Cast a value to this declared type, per the Note-property contract:
    /// null passes through, matching variants pass through, and anything
    /// else converts through this type's parser or fails.
    pub fn cast(self, value: PsValue) -> Result<PsValue> {
        if value.is_null() || value.primitive_type() == Some(self) {
            return Ok(value);
        }

        // Integral widening/narrowing with a range check
        if let Some(n) = value.integral() {
            let cast = match self {
                PsType::UInt8 => u8::try_from(n).map(PsValue::UInt8).ok(),
                PsType::Int8 => i8::try_from(n).map(PsValue::Int8).ok(),
                PsType::UInt16 => u16::try_from(n).map(PsValue::UInt16).ok(),
                PsType::Int16 => i16::try_from(n).map(PsValue::Int16).ok(),
                PsType::UInt32 => u32::try_from(n).map(PsValue::UInt32).ok(),
                PsType::Int32 => i32::try_from(n).map(PsValue::Int32).ok(),
                PsType::UInt64 => u64::try_from(n).map(PsValue::UInt64).ok(),
                PsType::Int64 => i64::try_from(n).map(PsValue::Int64).ok(),
                PsType::Char => u16::try_from(n).map(PsValue::Char).ok(),
                PsType::Single => Some(PsValue::Single(n as f32)),
                PsType::Double => Some(PsValue::Double(n as f64)),
                PsType::Decimal => i64::try_from(n)
                    .map(|v| PsValue::Decimal(PsDecimal::from(v)))
                    .ok(),
                PsType::String => Some(PsValue::String(n.to_string())),
                _ => None,
            };
            return cast.ok_or_else(|| {
                PsrpError::conversion(value.describe(), self.dotnet_name())
            });
        }

        // String re-parse through the target's literal grammar
        if let PsValue::String(ref s) = value {
            if self != PsType::SecureString {
                if let Ok(parsed) = self.parse_text(s) {
                    return Ok(parsed);
                }
            }
        }

        // Everything string-like renders to String
        if self == PsType::String {
            let text = match &value {
                PsValue::Uri(s) | PsValue::XmlDocument(s) | PsValue::ScriptBlock(s) => s.clone(),
                PsValue::Bool(b) => b.to_string(),
                PsValue::Guid(g) => g.to_string(),
                PsValue::Version(v) => v.to_string(),
                PsValue::DateTime(dt) => dt.to_string(),
                PsValue::Duration(d) => d.to_string(),
                PsValue::Decimal(d) => d.to_string(),
                PsValue::Single(f) => f.to_string(),
                PsValue::Double(f) => f.to_string(),
                _ => return Err(PsrpError::conversion(value.describe(), self.dotnet_name())),
            };
            return Ok(PsValue::String(text));
        }

        Err(PsrpError::conversion(value.describe(), self.dotnet_name()))
    }
}

fn parse_int<T: FromStr>(
    text: &str,
    kind: &'static str,
    wrap: impl FnOnce(T) -> PsValue,
) -> Result<PsValue> {
    text.parse()
        .map(wrap)
        .map_err(|_| PsrpError::parse(kind, text))
}

fn parse_float(text: &str) -> Result<f64> {
    match text {
        "NaN" => Ok(f64::NAN),
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        _ => text
            .parse()
            .map_err(|_| PsrpError::parse("floating point number", text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_integer_narrowing() {
        assert_eq!(PsValue::from(2_147_483_647i64), PsValue::Int32(2_147_483_647));
        assert_eq!(PsValue::from(2_147_483_648i64), PsValue::Int64(2_147_483_648));
        assert_eq!(PsValue::from(-2_147_483_649i64), PsValue::Int64(-2_147_483_649));
    }

    #[test]
    fn test_tag_mapping_is_bijective() {
        for ty in PsType::ALL {
            assert!(!ty.tag().is_empty());
        }
        let tags: std::collections::HashSet<_> = PsType::ALL.iter().map(|t| t.tag()).collect();
        assert_eq!(tags.len(), PsType::ALL.len());
    }

    #[test]
    fn test_cast_range_check() {
        assert_eq!(
            PsType::UInt8.cast(PsValue::Int32(200)).unwrap(),
            PsValue::UInt8(200)
        );
        assert!(PsType::UInt8.cast(PsValue::Int32(300)).is_err());
        assert!(PsType::Int16.cast(PsValue::Int32(-40_000)).is_err());
    }

    #[test]
    fn test_cast_string_reparse() {
        assert_eq!(
            PsType::Int32.cast(PsValue::String("42".to_string())).unwrap(),
            PsValue::Int32(42)
        );
        assert!(PsType::Int32.cast(PsValue::String("forty".to_string())).is_err());
    }

    #[test]
    fn test_cast_null_passthrough() {
        assert_eq!(PsType::Int32.cast(PsValue::Null).unwrap(), PsValue::Null);
    }

    #[test]
    fn test_float_special_values_parse() {
        assert!(matches!(
            PsType::Double.parse_text("NaN").unwrap(),
            PsValue::Double(f) if f.is_nan()
        ));
        assert_eq!(
            PsType::Single.parse_text("-Infinity").unwrap(),
            PsValue::Single(f32::NEG_INFINITY)
        );
    }
}
