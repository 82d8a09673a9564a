//! The process-wide type registry.
//!
//! Wire-aware types register a [`TypeDescriptor`] once, at definition
//! time. The registry is append-only per primary type name — the first
//! writer wins and later registrations are silently ignored, so plugins
//! cannot override core types. It is read on every serialize/deserialize
//! call and never mutated mid-operation.

use crate::core::object::{ObjectBody, PsObject, DESERIALIZED_PREFIX};
use crate::core::property::PsProperty;
use crate::core::value::{PsType, PsValue};
use crate::error::{PsrpError, Result};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

/// Converts a friendly in-memory object to the flatter shape the wire
/// expects (an error record collapsing to its property bag, for example).
pub type ToWireHook = Arc<dyn Fn(&PsObject) -> Result<PsValue> + Send + Sync>;

/// Rebuilds the friendly shape from the fully populated wire object.
pub type FromWireHook = Arc<dyn Fn(PsObject) -> Result<PsValue> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Enum,
}

/// Per-type metadata: the type-name chain, property templates, and wire
/// behavior flags. Instances clone the templates at construction, so
/// mutating an instance never writes back into the descriptor.
#[derive(Clone)]
pub struct TypeDescriptor {
    type_names: Vec<String>,
    adapted: Vec<PsProperty>,
    extended: Vec<PsProperty>,
    rehydrate: bool,
    kind: TypeKind,
    to_wire: Option<ToWireHook>,
    from_wire: Option<FromWireHook>,
}

impl TypeDescriptor {
    pub fn builder(type_names: Vec<String>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            type_names,
            adapted: Vec::new(),
            extended: Vec::new(),
            rehydrate: true,
            kind: TypeKind::Class,
            to_wire: None,
            from_wire: None,
        }
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.type_names.first().map(String::as_str)
    }

    pub fn type_names(&self) -> &[String] {
        &self.type_names
    }

    pub fn rehydrates(&self) -> bool {
        self.rehydrate
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn to_wire(&self) -> Option<&ToWireHook> {
        self.to_wire.as_ref()
    }

    pub fn from_wire(&self) -> Option<&FromWireHook> {
        self.from_wire.as_ref()
    }

    /// Allocate a skeleton instance without running constructor
    /// validation; deserialization populates properties directly.
    fn skeleton(&self, wire_names: Vec<String>) -> PsObject {
        let body = match self.kind {
            TypeKind::Class => ObjectBody::None,
            TypeKind::Enum => ObjectBody::Enum(0),
        };
        let obj = PsObject::with_body(wire_names, body);
        obj.set_adapted(self.adapted.clone());
        obj.set_extended(self.extended.clone());
        obj
    }

    /// The default constructor for types that declare no custom one.
    ///
    /// Parameters are the merged adapted+extended property names in
    /// declaration order, the extended definition winning a name
    /// collision. Arguments may be positional, named, or both.
    pub fn instantiate(
        &self,
        positional: Vec<PsValue>,
        named: Vec<(String, PsValue)>,
    ) -> Result<PsObject> {
        let parameters = self.parameter_list();

        if positional.len() > parameters.len() {
            return Err(PsrpError::Arity {
                expected: parameters.len(),
                actual: positional.len(),
            });
        }

        let mut assigned: Vec<(String, PsValue)> = parameters
            .iter()
            .zip(positional)
            .map(|(name, value)| (name.clone(), value))
            .collect();

        for (name, value) in named {
            if !parameters.contains(&name) {
                return Err(PsrpError::UnknownArgument(name));
            }
            if assigned.iter().any(|(n, _)| *n == name) {
                return Err(PsrpError::DuplicateArgument(name));
            }
            assigned.push((name, value));
        }

        let missing: Vec<String> = self
            .mandatory_names()
            .into_iter()
            .filter(|name| !assigned.iter().any(|(n, _)| n == name))
            .collect();
        if !missing.is_empty() {
            return Err(PsrpError::MissingMandatory(missing));
        }

        let instance = self.skeleton(self.type_names.clone());
        for (name, value) in assigned {
            instance.set_property(&name, value)?;
        }
        Ok(instance)
    }

    fn parameter_list(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for p in self.adapted.iter().chain(self.extended.iter()) {
            if !names.iter().any(|n| n == p.name()) {
                names.push(p.name().to_string());
            }
        }
        names
    }

    fn mandatory_names(&self) -> Vec<String> {
        // the extended definition shadows an adapted one of the same name
        self.parameter_list()
            .into_iter()
            .filter(|name| {
                self.extended
                    .iter()
                    .find(|p| p.name() == name)
                    .or_else(|| self.adapted.iter().find(|p| p.name() == name))
                    .is_some_and(PsProperty::is_mandatory)
            })
            .collect()
    }
}

pub struct TypeDescriptorBuilder {
    type_names: Vec<String>,
    adapted: Vec<PsProperty>,
    extended: Vec<PsProperty>,
    rehydrate: bool,
    kind: TypeKind,
    to_wire: Option<ToWireHook>,
    from_wire: Option<FromWireHook>,
}

impl TypeDescriptorBuilder {
    pub fn adapted(mut self, property: PsProperty) -> Self {
        self.adapted.push(property);
        self
    }

    pub fn extended(mut self, property: PsProperty) -> Self {
        self.extended.push(property);
        self
    }

    pub fn rehydrate(mut self, rehydrate: bool) -> Self {
        self.rehydrate = rehydrate;
        self
    }

    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn to_wire(mut self, hook: ToWireHook) -> Self {
        self.to_wire = Some(hook);
        self
    }

    pub fn from_wire(mut self, hook: FromWireHook) -> Self {
        self.from_wire = Some(hook);
        self
    }

    /// Compose a parent type's metadata into this one: the parent chain is
    /// appended to this type's names and the parent's property templates
    /// come before this type's own additions. Explicit composition stands
    /// in for language inheritance.
    pub fn inherit(mut self, parent: &TypeDescriptor) -> Self {
        self.type_names.extend(parent.type_names.iter().cloned());

        let mut adapted = parent.adapted.clone();
        adapted.extend(self.adapted);
        self.adapted = adapted;

        let mut extended = parent.extended.clone();
        extended.extend(self.extended);
        self.extended = extended;

        self
    }

    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor {
            type_names: self.type_names,
            adapted: self.adapted,
            extended: self.extended,
            rehydrate: self.rehydrate,
            kind: self.kind,
            to_wire: self.to_wire,
            from_wire: self.from_wire,
        }
    }
}

/// Process-wide registry mapping primary type names to descriptors and
/// CLIXML tags to primitive types.
pub struct TypeRegistry {
    by_name: HashMap<String, Arc<TypeDescriptor>>,
    by_tag: HashMap<&'static str, PsType>,
}

static REGISTRY: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();

/// Complex types every peer understands; these rehydrate without a
/// `Deserialized.` prefix even when no user type is registered.
const BUILTIN_COMPLEX: &[&[&str]] = &[
    &["System.Management.Automation.PSCustomObject", "System.Object"],
    &["System.Object[]", "System.Array", "System.Object"],
    &["System.Collections.ArrayList", "System.Object"],
    &["System.Collections.Hashtable", "System.Object"],
    &["System.Collections.Stack", "System.Object"],
    &["System.Collections.Queue", "System.Object"],
];

impl TypeRegistry {
    fn with_builtins() -> Self {
        let by_tag = PsType::ALL.iter().map(|t| (t.tag(), *t)).collect();
        let mut registry = Self {
            by_name: HashMap::new(),
            by_tag,
        };
        for chain in BUILTIN_COMPLEX {
            let names = chain.iter().map(|n| n.to_string()).collect();
            registry.register(TypeDescriptor::builder(names).build());
        }
        registry
    }

    /// The shared registry instance.
    pub fn global() -> &'static RwLock<TypeRegistry> {
        REGISTRY.get_or_init(|| RwLock::new(TypeRegistry::with_builtins()))
    }

    /// Register a descriptor under its primary type name. A no-op when the
    /// chain is empty or the name is already taken: first write wins.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        let Some(primary) = descriptor.primary_name().map(str::to_string) else {
            debug!("ignoring registration with an empty type-name chain");
            return;
        };
        if self.by_name.contains_key(&primary) {
            debug!(type_name = %primary, "ignoring duplicate type registration");
            return;
        }
        self.by_name.insert(primary, Arc::new(descriptor));
    }

    pub fn lookup(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.by_name.get(type_name).cloned()
    }

    /// Resolve a CLIXML element tag to its primitive type.
    pub fn primitive_for_tag(&self, tag: &str) -> Option<PsType> {
        self.by_tag.get(tag).copied()
    }

    /// Build a blank instance for a wire type-name chain.
    ///
    /// A registered, rehydratable type yields a skeleton of that type
    /// (an enum descriptor yields an enum-bodied skeleton whose value is
    /// applied later from the decoded underlying integer). Anything else
    /// falls back to a generic object whose chain is every entry prefixed
    /// with `Deserialized.`.
    pub fn rehydrate(&self, type_names: &[String]) -> PsObject {
        if let Some(descriptor) = type_names.first().and_then(|n| self.lookup(n)) {
            if descriptor.rehydrates() {
                return descriptor.skeleton(type_names.to_vec());
            }
        }

        let prefixed = type_names
            .iter()
            .map(|name| {
                if name.starts_with(DESERIALIZED_PREFIX) {
                    name.clone()
                } else {
                    format!("{DESERIALIZED_PREFIX}{name}")
                }
            })
            .collect();
        PsObject::new(prefixed)
    }
}

/// Register a type with the shared registry.
pub fn register_type(descriptor: TypeDescriptor) {
    TypeRegistry::global()
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .register(descriptor);
}

/// Look up a descriptor in the shared registry.
pub fn lookup_type(type_name: &str) -> Option<Arc<TypeDescriptor>> {
    TypeRegistry::global()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .lookup(type_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(primary: &str) -> TypeDescriptor {
        TypeDescriptor::builder(vec![primary.to_string(), "System.Object".to_string()])
            .adapted(PsProperty::note("Name", PsValue::Null))
            .build()
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(descriptor("Test.First"));

        let replacement = TypeDescriptor::builder(vec!["Test.First".to_string()])
            .adapted(PsProperty::note("Other", PsValue::Null))
            .build();
        registry.register(replacement);

        let kept = registry.lookup("Test.First").unwrap();
        assert_eq!(kept.type_names().len(), 2);
    }

    #[test]
    fn test_empty_chain_is_ignored() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(TypeDescriptor::builder(Vec::new()).build());
        assert!(registry.lookup("").is_none());
    }

    #[test]
    fn test_tag_lookup() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.primitive_for_tag("I32"), Some(PsType::Int32));
        assert_eq!(registry.primitive_for_tag("DCT"), None);
    }

    #[test]
    fn test_rehydrate_registered_type() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(descriptor("Test.Rehydratable"));

        let chain = vec!["Test.Rehydratable".to_string(), "System.Object".to_string()];
        let obj = registry.rehydrate(&chain);
        assert_eq!(obj.type_names(), chain);
        assert_eq!(obj.adapted_properties().len(), 1);
    }

    #[test]
    fn test_rehydrate_unknown_type_prefixes_chain() {
        let registry = TypeRegistry::with_builtins();
        let obj = registry.rehydrate(&["My.Unknown".to_string(), "System.Object".to_string()]);
        assert_eq!(
            obj.type_names(),
            vec![
                "Deserialized.My.Unknown".to_string(),
                "Deserialized.System.Object".to_string()
            ]
        );
    }

    #[test]
    fn test_rehydrate_opt_out() {
        let mut registry = TypeRegistry::with_builtins();
        let descriptor = TypeDescriptor::builder(vec!["Test.NoRehydrate".to_string()])
            .rehydrate(false)
            .build();
        registry.register(descriptor);

        let obj = registry.rehydrate(&["Test.NoRehydrate".to_string()]);
        assert_eq!(obj.type_names(), vec!["Deserialized.Test.NoRehydrate".to_string()]);
    }

    #[test]
    fn test_instantiate_positional_and_named() {
        let descriptor = TypeDescriptor::builder(vec!["Test.Ctor".to_string()])
            .adapted(PsProperty::note("First", PsValue::Null))
            .adapted(PsProperty::note("Second", PsValue::Null))
            .build();

        let obj = descriptor
            .instantiate(
                vec![PsValue::Int32(1)],
                vec![("Second".to_string(), PsValue::Int32(2))],
            )
            .unwrap();
        assert_eq!(obj.get_property("First").unwrap(), PsValue::Int32(1));
        assert_eq!(obj.get_property("Second").unwrap(), PsValue::Int32(2));
    }

    #[test]
    fn test_instantiate_argument_validation() {
        let descriptor = TypeDescriptor::builder(vec!["Test.Args".to_string()])
            .adapted(PsProperty::note("Only", PsValue::Null))
            .build();

        assert!(matches!(
            descriptor.instantiate(vec![PsValue::Null, PsValue::Null], Vec::new()),
            Err(PsrpError::Arity { expected: 1, actual: 2 })
        ));
        assert!(matches!(
            descriptor.instantiate(
                vec![PsValue::Int32(1)],
                vec![("Only".to_string(), PsValue::Int32(2))]
            ),
            Err(PsrpError::DuplicateArgument(n)) if n == "Only"
        ));
        assert!(matches!(
            descriptor.instantiate(Vec::new(), vec![("Nope".to_string(), PsValue::Null)]),
            Err(PsrpError::UnknownArgument(n)) if n == "Nope"
        ));
    }

    #[test]
    fn test_instantiate_missing_mandatory_lists_all() {
        let descriptor = TypeDescriptor::builder(vec!["Test.Mandatory".to_string()])
            .adapted(PsProperty::note("A", PsValue::Null).mandatory().unwrap())
            .adapted(PsProperty::note("B", PsValue::Null).mandatory().unwrap())
            .adapted(PsProperty::note("C", PsValue::Null))
            .build();

        let err = descriptor.instantiate(Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            PsrpError::MissingMandatory(names) if names == vec!["A".to_string(), "B".to_string()]
        ));
    }
}
