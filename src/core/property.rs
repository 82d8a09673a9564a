//! The property model.
//!
//! Every logical property on a wire object is one of three kinds: a Note
//! owns its value, an Alias forwards reads to another property, and a
//! Script computes its value through caller-supplied closures. The closure
//! signatures are fixed by the trait-object types, so getter/setter shape
//! is checked by the compiler rather than at call time.

use crate::core::object::PsObject;
use crate::core::value::{PsType, PsValue};
use crate::error::{PsrpError, Result};
use std::fmt;
use std::sync::Arc;

pub type ScriptGetter = Arc<dyn Fn(&PsObject) -> Result<PsValue> + Send + Sync>;
pub type ScriptSetter = Arc<dyn Fn(&PsObject, PsValue) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub enum PropertyKind {
    /// Owns a stored value
    Note { value: PsValue },
    /// Forwards reads to another property; never writable
    Alias { target: String },
    /// Computes its value at access time
    Script {
        getter: ScriptGetter,
        setter: Option<ScriptSetter>,
    },
}

#[derive(Clone)]
pub struct PsProperty {
    name: String,
    kind: PropertyKind,
    declared_type: Option<PsType>,
    mandatory: bool,
}

impl PsProperty {
    pub fn note(name: impl Into<String>, value: impl Into<PsValue>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Note {
                value: value.into(),
            },
            declared_type: None,
            mandatory: false,
        }
    }

    pub fn alias(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Alias {
                target: target.into(),
            },
            declared_type: None,
            mandatory: false,
        }
    }

    pub fn script(
        name: impl Into<String>,
        getter: ScriptGetter,
        setter: Option<ScriptSetter>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Script { getter, setter },
            declared_type: None,
            mandatory: false,
        }
    }

    /// Declare the property's value type; stored values and script results
    /// are cast through it on every write/read.
    pub fn with_type(mut self, ty: PsType) -> Self {
        self.declared_type = Some(ty);
        self
    }

    /// Mark the property mandatory for default construction.
    ///
    /// A mandatory property must be settable at construction time, so a
    /// getter-only Script property is rejected here.
    pub fn mandatory(mut self) -> Result<Self> {
        if let PropertyKind::Script { setter: None, .. } = self.kind {
            return Err(PsrpError::Unsupported(format!(
                "mandatory script property '{}' requires a setter",
                self.name
            )));
        }
        self.mandatory = true;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn declared_type(&self) -> Option<PsType> {
        self.declared_type
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Read the property value. Alias and Script evaluation is driven by
    /// [`PsObject::get_property`], which owns the locking discipline; this
    /// method only resolves the parts that need no instance access.
    pub fn get(&self, instance: &PsObject) -> Result<PsValue> {
        match &self.kind {
            PropertyKind::Note { value } => Ok(value.clone()),
            PropertyKind::Alias { target } => instance.get_property(target),
            PropertyKind::Script { getter, .. } => {
                let raw = getter(instance)?;
                match self.declared_type {
                    Some(ty) => ty.cast(raw),
                    None => Ok(raw),
                }
            }
        }
    }

    /// Store a value into a Note property, casting through the declared
    /// type when one is present.
    pub(crate) fn store(&mut self, value: PsValue) -> Result<()> {
        let cast = match self.declared_type {
            Some(ty) => ty.cast(value)?,
            None => value,
        };
        match &mut self.kind {
            PropertyKind::Note { value } => {
                *value = cast;
                Ok(())
            }
            PropertyKind::Alias { .. } => Err(PsrpError::Unsupported(format!(
                "cannot write to alias property '{}'",
                self.name
            ))),
            PropertyKind::Script { .. } => Err(PsrpError::Unsupported(format!(
                "script property '{}' has no stored value",
                self.name
            ))),
        }
    }

    /// Store a value with no declared-type validation. Deserialization
    /// populates skeletons this way; wire data was already validated by
    /// the peer's serializer.
    pub(crate) fn store_raw(&mut self, value: PsValue) {
        if let PropertyKind::Note {
            value: stored_value,
        } = &mut self.kind
        {
            *stored_value = value;
        }
    }
}

impl fmt::Debug for PsProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            PropertyKind::Note { value } => format!("Note({value:?})"),
            PropertyKind::Alias { target } => format!("Alias(-> {target})"),
            PropertyKind::Script { setter, .. } => {
                if setter.is_some() {
                    "Script(get/set)".to_string()
                } else {
                    "Script(get)".to_string()
                }
            }
        };
        f.debug_struct("PsProperty")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("mandatory", &self.mandatory)
            .finish()
    }
}

impl PartialEq for PsProperty {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name
            || self.declared_type != other.declared_type
            || self.mandatory != other.mandatory
        {
            return false;
        }
        match (&self.kind, &other.kind) {
            (PropertyKind::Note { value: a }, PropertyKind::Note { value: b }) => a == b,
            (PropertyKind::Alias { target: a }, PropertyKind::Alias { target: b }) => a == b,
            (
                PropertyKind::Script { getter: a, .. },
                PropertyKind::Script { getter: b, .. },
            ) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_store_casts_through_declared_type() {
        let mut prop = PsProperty::note("Count", PsValue::Null).with_type(PsType::Int32);
        prop.store(PsValue::String("7".to_string())).unwrap();
        assert!(matches!(prop.kind(), PropertyKind::Note { value: PsValue::Int32(7) }));
    }

    #[test]
    fn test_note_store_rejects_bad_cast() {
        let mut prop = PsProperty::note("Count", PsValue::Null).with_type(PsType::Int32);
        let err = prop.store(PsValue::String("many".to_string())).unwrap_err();
        assert!(matches!(err, PsrpError::Conversion { .. }));
    }

    #[test]
    fn test_alias_store_unsupported() {
        let mut prop = PsProperty::alias("Len", "Length");
        assert!(matches!(
            prop.store(PsValue::Int32(1)),
            Err(PsrpError::Unsupported(_))
        ));
    }

    #[test]
    fn test_mandatory_script_requires_setter() {
        let getter: ScriptGetter = Arc::new(|_| Ok(PsValue::Int32(1)));
        let err = PsProperty::script("Computed", getter.clone(), None)
            .mandatory()
            .unwrap_err();
        assert!(matches!(err, PsrpError::Unsupported(_)));

        let setter: ScriptSetter = Arc::new(|_, _| Ok(()));
        assert!(PsProperty::script("Computed", getter, Some(setter))
            .mandatory()
            .is_ok());
    }
}
