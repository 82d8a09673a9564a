//! CLIXML serialization: object graph to element tree.
//!
//! A [`Serializer`] is one encode session. It owns the reference tables
//! that turn shared and cyclic graphs into a finite document, and it is
//! consumed by [`Serializer::serialize`] so a session's tables can never
//! leak into a second document.

use crate::core::object::{ObjectBody, PsObject};
use crate::core::primitive::PsSecureString;
use crate::core::property::PsProperty;
use crate::core::registry::lookup_type;
use crate::core::value::PsValue;
use crate::core::xml::Element;
use crate::error::{PsrpError, Result};
use crate::utils::crypto::CryptoProvider;
use crate::utils::escape::escape;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use tracing::trace;

/// Serialize a value into a CLIXML element tree.
pub fn serialize(value: &PsValue) -> Result<Element> {
    Serializer::new().serialize(value)
}

/// Serialize with a cipher available for SecureString values.
pub fn serialize_with(value: &PsValue, cipher: &dyn CryptoProvider) -> Result<Element> {
    Serializer::with_cipher(cipher).serialize(value)
}

/// One encode session: reference tables plus an optional cipher.
pub struct Serializer<'a> {
    cipher: Option<&'a dyn CryptoProvider>,
    object_refs: HashMap<usize, u64>,
    type_name_refs: HashMap<Vec<String>, u64>,
    next_object_ref: u64,
    next_type_name_ref: u64,
}

impl Default for Serializer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Serializer<'a> {
    pub fn new() -> Self {
        Self {
            cipher: None,
            object_refs: HashMap::new(),
            type_name_refs: HashMap::new(),
            next_object_ref: 0,
            next_type_name_ref: 0,
        }
    }

    pub fn with_cipher(cipher: &'a dyn CryptoProvider) -> Self {
        Self {
            cipher: Some(cipher),
            ..Self::new()
        }
    }

    /// Serialize one top-level value, consuming the session.
    pub fn serialize(mut self, value: &PsValue) -> Result<Element> {
        self.value_element(value)
    }

    fn value_element(&mut self, value: &PsValue) -> Result<Element> {
        match value {
            PsValue::Null => Ok(Element::new("Nil")),
            PsValue::Object(obj) => self.object_element(obj),
            PsValue::SecureString(ss) => self.secure_string_element(ss),
            primitive => {
                let ty = primitive.primitive_type().ok_or_else(|| {
                    PsrpError::Unsupported(format!("cannot serialize {primitive:?}"))
                })?;
                Ok(Element::with_text(ty.tag(), primitive_text(primitive)))
            }
        }
    }

    fn secure_string_element(&mut self, value: &PsSecureString) -> Result<Element> {
        let Some(cipher) = self.cipher else {
            return Err(PsrpError::Unsupported(
                "serializing a SecureString requires a crypto provider".to_string(),
            ));
        };

        let utf16le: Vec<u8> = value
            .value()
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        let ciphertext = cipher.encrypt(&utf16le)?;
        Ok(Element::with_text("SS", BASE64.encode(ciphertext)))
    }

    fn object_element(&mut self, obj: &PsObject) -> Result<Element> {
        // A to-wire hook converts a friendly type to the flatter shape the
        // wire expects; the result is serialized instead of the original.
        let descriptor = obj.type_names().first().and_then(|n| lookup_type(n));
        if let Some(hook) = descriptor.as_ref().and_then(|d| d.to_wire()) {
            let transformed = hook(obj)?;
            if let PsValue::Object(t) = &transformed {
                if !t.same_as(obj) {
                    // keep the original identity where both sides define one
                    if !obj.type_names().is_empty() && !t.type_names().is_empty() {
                        t.set_type_names(obj.type_names());
                    }
                    if obj.to_string_repr().is_some() && t.to_string_repr().is_some() {
                        t.set_to_string(obj.to_string_repr());
                    }
                }
                return self.complex_element(t);
            }
            return self.value_element(&transformed);
        }

        self.complex_element(obj)
    }

    fn complex_element(&mut self, obj: &PsObject) -> Result<Element> {
        if let Some(&ref_id) = self.object_refs.get(&obj.identity()) {
            let mut el = Element::new("Ref");
            el.set_attribute("RefId", ref_id.to_string());
            return Ok(el);
        }

        let type_names = obj.type_names();
        let to_string = obj.to_string_repr();
        let body = obj.body();

        // A primitive with no properties and no type identity needs no
        // Obj envelope at all.
        if let ObjectBody::Primitive(inner) = &body {
            if !obj.has_properties() && type_names.is_empty() && to_string.is_none() {
                return self.value_element(inner);
            }
        }

        let ref_id = self.next_object_ref;
        self.next_object_ref += 1;
        self.object_refs.insert(obj.identity(), ref_id);
        trace!(ref_id, ty = ?type_names.first(), "assigning object RefId");

        let mut el = Element::new("Obj");
        el.set_attribute("RefId", ref_id.to_string());

        if !type_names.is_empty() {
            el.push(self.type_names_element(&type_names));
        }
        if let Some(repr) = &to_string {
            el.push(Element::with_text("ToString", escape(repr)));
        }

        let adapted = obj.adapted_properties();
        if !adapted.is_empty() {
            el.push(self.property_block("Props", obj, &adapted)?);
        }
        let extended = obj.extended_properties();
        if !extended.is_empty() {
            el.push(self.property_block("MS", obj, &extended)?);
        }

        match body {
            ObjectBody::None => {}
            ObjectBody::Primitive(inner) => el.push(self.value_element(&inner)?),
            ObjectBody::Enum(value) => el.push(enum_literal(value)),
            ObjectBody::List(items) => el.push(self.container_element("LST", &items)?),
            ObjectBody::Stack(items) => el.push(self.container_element("STK", &items)?),
            ObjectBody::Queue(_) => {
                // draining is intentional: the wire queue is one-shot
                let items = obj.drain_queue().unwrap_or_default();
                el.push(self.container_element("QUE", &items)?);
            }
            ObjectBody::Dictionary(entries) => el.push(self.dictionary_element(&entries)?),
        }

        Ok(el)
    }

    fn type_names_element(&mut self, type_names: &[String]) -> Element {
        if let Some(&tn_id) = self.type_name_refs.get(type_names) {
            let mut el = Element::new("TNRef");
            el.set_attribute("RefId", tn_id.to_string());
            return el;
        }

        let tn_id = self.next_type_name_ref;
        self.next_type_name_ref += 1;
        self.type_name_refs.insert(type_names.to_vec(), tn_id);

        let mut el = Element::new("TN");
        el.set_attribute("RefId", tn_id.to_string());
        for name in type_names {
            el.push(Element::with_text("T", escape(name)));
        }
        el
    }

    fn property_block(
        &mut self,
        tag: &str,
        obj: &PsObject,
        properties: &[PsProperty],
    ) -> Result<Element> {
        let mut block = Element::new(tag);
        for property in properties {
            let value = property.get(obj)?;
            let mut child = self.value_element(&value)?;
            child.set_attribute("N", escape(property.name()));
            block.push(child);
        }
        Ok(block)
    }

    fn container_element(&mut self, tag: &str, items: &[PsValue]) -> Result<Element> {
        let mut el = Element::new(tag);
        for item in items {
            el.push(self.value_element(item)?);
        }
        Ok(el)
    }

    fn dictionary_element(&mut self, entries: &[(PsValue, PsValue)]) -> Result<Element> {
        let mut dct = Element::new("DCT");
        for (key, value) in entries {
            let mut en = Element::new("En");

            let mut key_el = self.value_element(key)?;
            key_el.set_attribute("N", "Key");
            en.push(key_el);

            let mut value_el = self.value_element(value)?;
            value_el.set_attribute("N", "Value");
            en.push(value_el);

            dct.push(en);
        }
        Ok(dct)
    }
}

/// Render a primitive's element text. String kinds go through the
/// `_xHHHH_` escape; numerics and the rest use their canonical literals.
fn primitive_text(value: &PsValue) -> String {
    match value {
        PsValue::Bool(b) => b.to_string(),
        PsValue::UInt8(v) => v.to_string(),
        PsValue::Int8(v) => v.to_string(),
        PsValue::UInt16(v) => v.to_string(),
        PsValue::Int16(v) => v.to_string(),
        PsValue::UInt32(v) => v.to_string(),
        PsValue::Int32(v) => v.to_string(),
        PsValue::UInt64(v) => v.to_string(),
        PsValue::Int64(v) => v.to_string(),
        PsValue::Single(v) => {
            if v.is_nan() || v.is_infinite() {
                float_text(*v as f64)
            } else {
                v.to_string()
            }
        }
        PsValue::Double(v) => float_text(*v),
        PsValue::Decimal(v) => v.to_string(),
        PsValue::Char(v) => v.to_string(),
        PsValue::String(s)
        | PsValue::Uri(s)
        | PsValue::XmlDocument(s)
        | PsValue::ScriptBlock(s) => escape(s),
        PsValue::Version(v) => v.to_string(),
        PsValue::Guid(g) => g.to_string(),
        PsValue::DateTime(dt) => dt.to_string(),
        PsValue::Duration(d) => d.to_string(),
        PsValue::Bytes(b) => BASE64.encode(b),
        // handled by dedicated paths before this point
        PsValue::Null | PsValue::SecureString(_) | PsValue::Object(_) => String::new(),
    }
}

/// .NET spells the float specials NaN / Infinity / -Infinity.
fn float_text(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        value.to_string()
    }
}

/// An enum's underlying value takes the narrowest signed tag that fits.
fn enum_literal(value: i64) -> Element {
    match i32::try_from(value) {
        Ok(narrow) => Element::with_text("I32", narrow.to_string()),
        Err(_) => Element::with_text("I64", value.to_string()),
    }
}
