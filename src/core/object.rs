//! The in-memory representation of a typed, protocol-aware object.
//!
//! [`PsObject`] is a shared handle (`Arc` inside), so an object reachable
//! through multiple paths — or through itself — keeps one identity, which
//! is what the serializer's reference table keys on. Each instance owns a
//! private copy of its property lists, so per-instance member mutation
//! never leaks across instances of the same type.

use crate::core::property::{PropertyKind, PsProperty, ScriptSetter};
use crate::core::value::PsValue;
use crate::error::{PsrpError, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Type name given to property bags with no wire type of their own.
pub const PS_CUSTOM_OBJECT: &str = "System.Management.Automation.PSCustomObject";

/// Prefix marking a type that was rehydrated without a registered local type.
pub const DESERIALIZED_PREFIX: &str = "Deserialized.";

/// The structural payload of a complex object, beyond its properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ObjectBody {
    /// A plain property bag
    #[default]
    None,
    /// A primitive that carries extended properties
    Primitive(PsValue),
    /// An enumeration value (underlying integer)
    Enum(i64),
    List(Vec<PsValue>),
    Stack(Vec<PsValue>),
    Queue(VecDeque<PsValue>),
    /// Ordered key/value pairs; iteration order is insertion order
    Dictionary(Vec<(PsValue, PsValue)>),
}

#[derive(Default)]
struct ObjectInner {
    type_names: Vec<String>,
    adapted: Vec<PsProperty>,
    extended: Vec<PsProperty>,
    body: ObjectBody,
    to_string: Option<String>,
}

/// A typed, property-bearing object with shared identity.
#[derive(Clone, Default)]
pub struct PsObject {
    inner: Arc<RwLock<ObjectInner>>,
}

impl PsObject {
    pub fn new(type_names: Vec<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ObjectInner {
                type_names,
                ..ObjectInner::default()
            })),
        }
    }

    /// A generic custom object (property bag).
    pub fn custom() -> Self {
        Self::new(vec![
            PS_CUSTOM_OBJECT.to_string(),
            "System.Object".to_string(),
        ])
    }

    pub fn list(items: Vec<PsValue>) -> Self {
        Self::with_body(
            vec![
                "System.Object[]".to_string(),
                "System.Array".to_string(),
                "System.Object".to_string(),
            ],
            ObjectBody::List(items),
        )
    }

    pub fn stack(items: Vec<PsValue>) -> Self {
        Self::with_body(
            vec![
                "System.Collections.Stack".to_string(),
                "System.Object".to_string(),
            ],
            ObjectBody::Stack(items),
        )
    }

    pub fn queue(items: Vec<PsValue>) -> Self {
        Self::with_body(
            vec![
                "System.Collections.Queue".to_string(),
                "System.Object".to_string(),
            ],
            ObjectBody::Queue(items.into()),
        )
    }

    pub fn dictionary(entries: Vec<(PsValue, PsValue)>) -> Self {
        Self::with_body(
            vec![
                "System.Collections.Hashtable".to_string(),
                "System.Object".to_string(),
            ],
            ObjectBody::Dictionary(entries),
        )
    }

    /// An enumeration instance: underlying integer plus optional label.
    pub fn enumeration(type_names: Vec<String>, value: i64, label: Option<&str>) -> Self {
        let obj = Self::with_body(type_names, ObjectBody::Enum(value));
        if let Some(label) = label {
            obj.set_to_string(Some(label.to_string()));
        }
        obj
    }

    /// A primitive that needs an `Obj` envelope to carry extra properties.
    pub fn extended_primitive(value: PsValue, type_names: Vec<String>) -> Self {
        Self::with_body(type_names, ObjectBody::Primitive(value))
    }

    pub(crate) fn with_body(type_names: Vec<String>, body: ObjectBody) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ObjectInner {
                type_names,
                body,
                ..ObjectInner::default()
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ObjectInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObjectInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Stable identity for the reference table: the heap address of the
    /// shared state.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// True when both handles refer to the same object.
    pub fn same_as(&self, other: &PsObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn type_names(&self) -> Vec<String> {
        self.read().type_names.clone()
    }

    pub fn set_type_names(&self, type_names: Vec<String>) {
        self.write().type_names = type_names;
    }

    pub fn to_string_repr(&self) -> Option<String> {
        self.read().to_string.clone()
    }

    pub fn set_to_string(&self, value: Option<String>) {
        self.write().to_string = value;
    }

    pub fn body(&self) -> ObjectBody {
        self.read().body.clone()
    }

    pub fn set_body(&self, body: ObjectBody) {
        self.write().body = body;
    }

    /// Remove and return the queued items. Serializing a queue drains it;
    /// the wire queue has one-shot semantics.
    pub(crate) fn drain_queue(&self) -> Option<Vec<PsValue>> {
        let mut inner = self.write();
        match &mut inner.body {
            ObjectBody::Queue(items) => Some(std::mem::take(items).into()),
            _ => None,
        }
    }

    pub fn adapted_properties(&self) -> Vec<PsProperty> {
        self.read().adapted.clone()
    }

    pub fn extended_properties(&self) -> Vec<PsProperty> {
        self.read().extended.clone()
    }

    pub fn has_properties(&self) -> bool {
        let inner = self.read();
        !inner.adapted.is_empty() || !inner.extended.is_empty()
    }

    pub fn set_adapted(&self, properties: Vec<PsProperty>) {
        self.write().adapted = properties;
    }

    pub(crate) fn set_extended(&self, properties: Vec<PsProperty>) {
        self.write().extended = properties;
    }

    /// Insert a new extended property.
    ///
    /// Without `force`, any existing member of that name (adapted or
    /// extended) is a collision. With `force`, an existing extended entry
    /// is replaced in place; an existing adapted entry is left untouched
    /// and simply shadowed from now on.
    pub fn add_member(&self, property: PsProperty, force: bool) -> Result<()> {
        let mut inner = self.write();
        let name = property.name().to_string();

        let extended_idx = inner.extended.iter().position(|p| p.name() == name);
        let in_adapted = inner.adapted.iter().any(|p| p.name() == name);

        if !force && (extended_idx.is_some() || in_adapted) {
            return Err(PsrpError::AlreadyExists(name));
        }

        match extended_idx {
            Some(idx) => inner.extended[idx] = property,
            None => inner.extended.push(property),
        }
        Ok(())
    }

    /// Read a property value; extended properties shadow adapted ones.
    pub fn get_property(&self, name: &str) -> Result<PsValue> {
        let property = {
            let inner = self.read();
            inner
                .extended
                .iter()
                .chain(inner.adapted.iter())
                .find(|p| p.name() == name)
                .cloned()
        };
        // Alias and Script resolution may re-enter this object, so the
        // lock must be released before evaluation.
        match property {
            Some(p) => p.get(self),
            None => Err(PsrpError::UnknownArgument(name.to_string())),
        }
    }

    /// Write a property value; extended properties shadow adapted ones.
    pub fn set_property(&self, name: &str, value: PsValue) -> Result<()> {
        let mut guard = self.write();
        let inner = &mut *guard;
        let Some(property) = inner
            .extended
            .iter_mut()
            .chain(inner.adapted.iter_mut())
            .find(|p| p.name() == name)
        else {
            return Err(PsrpError::UnknownArgument(name.to_string()));
        };

        let script_setter: Option<(Option<crate::core::value::PsType>, ScriptSetter)> =
            match property.kind() {
                PropertyKind::Script {
                    setter: Some(setter),
                    ..
                } => Some((property.declared_type(), setter.clone())),
                PropertyKind::Script { setter: None, .. } => {
                    return Err(PsrpError::Unsupported(format!(
                        "script property '{name}' has no setter"
                    )))
                }
                _ => None,
            };

        match script_setter {
            None => property.store(value),
            Some((declared, setter)) => {
                // the setter may re-enter this object
                drop(guard);
                let value = match declared {
                    Some(ty) => ty.cast(value)?,
                    None => value,
                };
                setter(self, value)
            }
        }
    }

    /// Populate an adapted property from the wire, bypassing declared-type
    /// validation; appends a Note property when the name is new.
    pub(crate) fn set_adapted_raw(&self, name: &str, value: PsValue) {
        let mut inner = self.write();
        match inner.adapted.iter_mut().find(|p| p.name() == name) {
            Some(p) => p.store_raw(value),
            None => inner.adapted.push(PsProperty::note(name, value)),
        }
    }

    /// Populate an extended property from the wire; see `set_adapted_raw`.
    pub(crate) fn set_extended_raw(&self, name: &str, value: PsValue) {
        let mut inner = self.write();
        match inner.extended.iter_mut().find(|p| p.name() == name) {
            Some(p) => p.store_raw(value),
            None => inner.extended.push(PsProperty::note(name, value)),
        }
    }

    /// Type-compatibility check: true iff this object's type-name chain
    /// intersects `candidates`. With `ignore_deserialized_prefix`, a
    /// leading `Deserialized.` marker is stripped from both sides, so a
    /// rehydrated-without-local-type object still matches its kind.
    pub fn is_instance(&self, candidates: &[&str], ignore_deserialized_prefix: bool) -> bool {
        let strip = |name: &str| -> String {
            if ignore_deserialized_prefix {
                name.strip_prefix(DESERIALIZED_PREFIX).unwrap_or(name).to_string()
            } else {
                name.to_string()
            }
        };

        let inner = self.read();
        inner.type_names.iter().any(|tn| {
            let tn = strip(tn);
            candidates.iter().any(|c| strip(c) == tn)
        })
    }
}

impl PartialEq for PsObject {
    /// Structural equality. Shared handles compare by identity first;
    /// distinct objects compare their type names, properties, body, and
    /// string representation. Cyclic graphs should be compared by
    /// [`PsObject::same_as`] instead.
    fn eq(&self, other: &Self) -> bool {
        if self.same_as(other) {
            return true;
        }

        let (a_names, a_adapted, a_extended, a_body, a_str) = self.snapshot();
        let (b_names, b_adapted, b_extended, b_body, b_str) = other.snapshot();

        a_names == b_names
            && a_adapted == b_adapted
            && a_extended == b_extended
            && a_body == b_body
            && a_str == b_str
    }
}

impl PsObject {
    #[allow(clippy::type_complexity)]
    fn snapshot(
        &self,
    ) -> (
        Vec<String>,
        Vec<PsProperty>,
        Vec<PsProperty>,
        ObjectBody,
        Option<String>,
    ) {
        let inner = self.read();
        (
            inner.type_names.clone(),
            inner.adapted.clone(),
            inner.extended.clone(),
            inner.body.clone(),
            inner.to_string.clone(),
        )
    }
}

impl fmt::Debug for PsObject {
    /// Shallow by design: printing property values could recurse through a
    /// cyclic graph.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("PsObject")
            .field("type", &inner.type_names.first())
            .field("adapted", &inner.adapted.len())
            .field("extended", &inner.extended.len())
            .field("body", &std::mem::discriminant(&inner.body))
            .finish()
    }
}
