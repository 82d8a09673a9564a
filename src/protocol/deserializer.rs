//! CLIXML deserialization: element tree back to an object graph.
//!
//! A [`Deserializer`] is one decode session. RefIds are registered before
//! an object's children are visited, so a `Ref` appearing inside its own
//! object resolves to the same handle — self-referential graphs come back
//! with their sharing intact.

use crate::core::object::{ObjectBody, PsObject};
use crate::core::primitive::PsSecureString;
use crate::core::registry::{lookup_type, TypeRegistry};
use crate::core::value::{PsType, PsValue};
use crate::core::xml::Element;
use crate::error::{PsrpError, Result};
use crate::utils::crypto::CryptoProvider;
use crate::utils::escape::unescape;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;

/// Deserialize a CLIXML element tree into a value.
pub fn deserialize(element: &Element) -> Result<PsValue> {
    Deserializer::new().deserialize(element)
}

/// Deserialize with a cipher available for SecureString elements.
pub fn deserialize_with(element: &Element, cipher: &dyn CryptoProvider) -> Result<PsValue> {
    Deserializer::with_cipher(cipher).deserialize(element)
}

/// One decode session: reference tables plus an optional cipher.
pub struct Deserializer<'a> {
    cipher: Option<&'a dyn CryptoProvider>,
    object_refs: HashMap<u64, PsValue>,
    type_name_refs: HashMap<u64, Vec<String>>,
}

impl Default for Deserializer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Deserializer<'a> {
    pub fn new() -> Self {
        Self {
            cipher: None,
            object_refs: HashMap::new(),
            type_name_refs: HashMap::new(),
        }
    }

    pub fn with_cipher(cipher: &'a dyn CryptoProvider) -> Self {
        Self {
            cipher: Some(cipher),
            ..Self::new()
        }
    }

    /// Deserialize one top-level element, consuming the session.
    pub fn deserialize(mut self, element: &Element) -> Result<PsValue> {
        self.value_from(element)
    }

    fn value_from(&mut self, element: &Element) -> Result<PsValue> {
        match element.tag.as_str() {
            "Nil" => Ok(PsValue::Null),
            "Ref" => {
                let ref_id = ref_id_of(element)?;
                self.object_refs
                    .get(&ref_id)
                    .cloned()
                    .ok_or(PsrpError::UnresolvedReference(ref_id))
            }
            "Obj" => self.complex_from(element),
            "SS" => self.secure_string_from(element),
            tag => {
                let ty = TypeRegistry::global()
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .primitive_for_tag(tag)
                    .ok_or_else(|| PsrpError::UnknownElement(tag.to_string()))?;

                let text = element.text_content();
                match ty {
                    PsType::String | PsType::Uri | PsType::XmlDocument | PsType::ScriptBlock => {
                        ty.parse_text(&unescape(text)?)
                    }
                    _ => ty.parse_text(text),
                }
            }
        }
    }

    fn secure_string_from(&mut self, element: &Element) -> Result<PsValue> {
        let Some(cipher) = self.cipher else {
            return Err(PsrpError::Unsupported(
                "deserializing a SecureString requires a crypto provider".to_string(),
            ));
        };

        let text = element.text_content();
        let ciphertext = BASE64
            .decode(text)
            .map_err(|_| PsrpError::parse("SecureString", text))?;
        let plaintext = cipher.decrypt(&ciphertext)?;

        if plaintext.len() % 2 != 0 {
            return Err(PsrpError::parse("SecureString", text));
        }
        let units: Vec<u16> = plaintext
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let value =
            String::from_utf16(&units).map_err(|_| PsrpError::parse("SecureString", text))?;
        Ok(PsValue::SecureString(PsSecureString::new(value)))
    }

    fn complex_from(&mut self, element: &Element) -> Result<PsValue> {
        let ref_id = ref_id_of(element)?;

        // First pass: resolve the type-name chain so a skeleton can be
        // rehydrated before any child is visited.
        let mut type_names: Vec<String> = Vec::new();
        for child in &element.children {
            match child.tag.as_str() {
                "TN" => {
                    let tn_id = ref_id_of(child)?;
                    let names = child
                        .children
                        .iter()
                        .filter(|t| t.tag == "T")
                        .map(|t| unescape(t.text_content()))
                        .collect::<Result<Vec<String>>>()?;
                    self.type_name_refs.insert(tn_id, names.clone());
                    type_names = names;
                }
                "TNRef" => {
                    let tn_id = ref_id_of(child)?;
                    type_names = self
                        .type_name_refs
                        .get(&tn_id)
                        .cloned()
                        .ok_or(PsrpError::UnresolvedTypeNames(tn_id))?;
                }
                _ => {}
            }
        }

        let obj = TypeRegistry::global()
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rehydrate(&type_names);
        let is_enum = matches!(obj.body(), ObjectBody::Enum(_));

        // Registered before descending: a Ref inside this object's own
        // children must resolve to this skeleton.
        self.object_refs
            .insert(ref_id, PsValue::Object(obj.clone()));

        for child in &element.children {
            match child.tag.as_str() {
                "TN" | "TNRef" => {}
                "Props" => {
                    for prop in &child.children {
                        let name = property_name_of(prop)?;
                        let value = self.value_from(prop)?;
                        obj.set_adapted_raw(&name, value);
                    }
                }
                "MS" => {
                    for prop in &child.children {
                        let name = property_name_of(prop)?;
                        let value = self.value_from(prop)?;
                        obj.set_extended_raw(&name, value);
                    }
                }
                "LST" | "IE" => {
                    obj.set_body(ObjectBody::List(self.items_from(child)?));
                }
                "STK" => {
                    obj.set_body(ObjectBody::Stack(self.items_from(child)?));
                }
                "QUE" => {
                    obj.set_body(ObjectBody::Queue(self.items_from(child)?.into()));
                }
                "DCT" => {
                    obj.set_body(ObjectBody::Dictionary(self.entries_from(child)?));
                }
                "ToString" => {
                    obj.set_to_string(Some(unescape(child.text_content())?));
                }
                _ => {
                    // the literal value of an enum or extended primitive
                    let value = self.value_from(child)?;
                    if is_enum {
                        let underlying = value.integral().and_then(|n| i64::try_from(n).ok());
                        match underlying {
                            Some(n) => obj.set_body(ObjectBody::Enum(n)),
                            None => {
                                return Err(PsrpError::parse(
                                    "enum value",
                                    child.text_content(),
                                ))
                            }
                        }
                    } else {
                        obj.set_body(ObjectBody::Primitive(value));
                    }
                }
            }
        }

        // A from-wire hook rebuilds the friendly shape; later Refs to this
        // RefId must observe the transformed object, so re-register it.
        if let Some(descriptor) = type_names.first().and_then(|n| lookup_type(n)) {
            if let Some(hook) = descriptor.from_wire() {
                let transformed = hook(obj)?;
                self.object_refs.insert(ref_id, transformed.clone());
                return Ok(transformed);
            }
        }

        Ok(PsValue::Object(obj))
    }

    fn items_from(&mut self, container: &Element) -> Result<Vec<PsValue>> {
        container
            .children
            .iter()
            .map(|child| self.value_from(child))
            .collect()
    }

    fn entries_from(&mut self, dct: &Element) -> Result<Vec<(PsValue, PsValue)>> {
        let mut entries = Vec::with_capacity(dct.children.len());
        for en in &dct.children {
            let key_el = en
                .children
                .iter()
                .find(|c| c.attribute("N") == Some("Key"))
                .ok_or(PsrpError::MalformedDictionary("Key"))?;
            let value_el = en
                .children
                .iter()
                .find(|c| c.attribute("N") == Some("Value"))
                .ok_or(PsrpError::MalformedDictionary("Value"))?;

            let key = self.value_from(key_el)?;
            let value = self.value_from(value_el)?;
            entries.push((key, value));
        }
        Ok(entries)
    }
}

fn ref_id_of(element: &Element) -> Result<u64> {
    let raw = element.attribute("RefId").ok_or_else(|| {
        PsrpError::MalformedXml(format!("<{}> element is missing a RefId", element.tag))
    })?;
    raw.parse().map_err(|_| PsrpError::parse("RefId", raw))
}

fn property_name_of(element: &Element) -> Result<String> {
    let raw = element.attribute("N").ok_or_else(|| {
        PsrpError::MalformedXml(format!(
            "property element <{}> is missing an N attribute",
            element.tag
        ))
    })?;
    unescape(raw)
}
