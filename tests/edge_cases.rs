#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case coverage for the object model, codec, and framing
//! Exercises the full error taxonomy through the public API

use psrp_protocol::config::CodecConfig;
use psrp_protocol::core::object::PsObject;
use psrp_protocol::core::property::{PsProperty, ScriptGetter, ScriptSetter};
use psrp_protocol::core::registry::{lookup_type, register_type, TypeDescriptor};
use psrp_protocol::core::value::{PsType, PsValue};
use psrp_protocol::error::PsrpError;
use psrp_protocol::protocol::message::Message;
use psrp_protocol::protocol::{from_clixml, to_clixml};
use std::sync::Arc;

// ============================================================================
// CONSTRUCTOR ARGUMENT VALIDATION
// ============================================================================

fn ctor_descriptor(name: &str) -> TypeDescriptor {
    TypeDescriptor::builder(vec![name.to_string(), "System.Object".to_string()])
        .adapted(PsProperty::note("Host", PsValue::Null).mandatory().unwrap())
        .adapted(PsProperty::note("Port", PsValue::Null).with_type(PsType::Int32))
        .extended(PsProperty::note("Label", PsValue::Null))
        .build()
}

#[test]
fn test_constructor_happy_path() {
    let descriptor = ctor_descriptor("Edge.Ctor.Happy");
    let obj = descriptor
        .instantiate(
            vec![PsValue::String("srv1".to_string())],
            vec![("Port".to_string(), PsValue::String("5985".to_string()))],
        )
        .unwrap();

    assert_eq!(
        obj.get_property("Host").unwrap(),
        PsValue::String("srv1".to_string())
    );
    // the declared type cast the string to Int32
    assert_eq!(obj.get_property("Port").unwrap(), PsValue::Int32(5985));
}

#[test]
fn test_constructor_too_many_positional() {
    let descriptor = ctor_descriptor("Edge.Ctor.Arity");
    let err = descriptor
        .instantiate(
            vec![PsValue::Null, PsValue::Null, PsValue::Null, PsValue::Null],
            Vec::new(),
        )
        .unwrap_err();
    assert!(matches!(err, PsrpError::Arity { expected: 3, actual: 4 }));
}

#[test]
fn test_constructor_missing_mandatory() {
    let descriptor = ctor_descriptor("Edge.Ctor.Mandatory");
    let err = descriptor
        .instantiate(Vec::new(), vec![("Port".to_string(), PsValue::Int32(1))])
        .unwrap_err();
    assert!(matches!(
        err,
        PsrpError::MissingMandatory(names) if names == vec!["Host".to_string()]
    ));
}

#[test]
fn test_constructor_conversion_failure() {
    let descriptor = ctor_descriptor("Edge.Ctor.Convert");
    let err = descriptor
        .instantiate(
            vec![PsValue::Null],
            vec![("Port".to_string(), PsValue::String("not-a-port".to_string()))],
        )
        .unwrap_err();
    assert!(matches!(err, PsrpError::Conversion { .. }));
}

// ============================================================================
// MEMBER MUTATION
// ============================================================================

#[test]
fn test_add_member_shadowing_preserves_adapted() {
    let obj = PsObject::new(vec!["Edge.Shadow".to_string()]);
    obj.set_adapted(vec![PsProperty::note("Status", "native")]);

    obj.add_member(PsProperty::note("Status", "override"), true)
        .unwrap();
    assert_eq!(
        obj.get_property("Status").unwrap(),
        PsValue::String("override".to_string())
    );
    // the adapted entry is shadowed, not replaced
    assert_eq!(obj.adapted_properties().len(), 1);
    assert_eq!(obj.extended_properties().len(), 1);
}

#[test]
fn test_script_property_with_setter() {
    let getter: ScriptGetter = Arc::new(|obj| obj.get_property("Backing"));
    let setter: ScriptSetter =
        Arc::new(|obj, value| obj.set_property("Backing", value));

    let obj = PsObject::custom();
    obj.add_member(PsProperty::note("Backing", 0), false).unwrap();
    obj.add_member(PsProperty::script("Facade", getter, Some(setter)), false)
        .unwrap();

    obj.set_property("Facade", PsValue::Int32(9)).unwrap();
    assert_eq!(obj.get_property("Facade").unwrap(), PsValue::Int32(9));
    assert_eq!(obj.get_property("Backing").unwrap(), PsValue::Int32(9));
}

// ============================================================================
// REGISTRY
// ============================================================================

#[test]
fn test_global_registry_first_write_wins() {
    register_type(
        TypeDescriptor::builder(vec!["Edge.Registry.Stable".to_string()])
            .adapted(PsProperty::note("Original", PsValue::Null))
            .build(),
    );
    register_type(
        TypeDescriptor::builder(vec!["Edge.Registry.Stable".to_string()])
            .adapted(PsProperty::note("Usurper", PsValue::Null))
            .build(),
    );

    let kept = lookup_type("Edge.Registry.Stable").unwrap();
    let instance = kept.instantiate(Vec::new(), Vec::new()).unwrap();
    assert!(instance.get_property("Original").is_ok());
    assert!(instance.get_property("Usurper").is_err());
}

#[test]
fn test_descriptor_inheritance_composes_lists() {
    let base = TypeDescriptor::builder(vec![
        "Edge.Registry.Base".to_string(),
        "System.Object".to_string(),
    ])
    .adapted(PsProperty::note("BaseProp", PsValue::Null))
    .build();

    let derived = TypeDescriptor::builder(vec!["Edge.Registry.Derived".to_string()])
        .adapted(PsProperty::note("DerivedProp", PsValue::Null))
        .inherit(&base)
        .build();

    assert_eq!(
        derived.type_names(),
        &[
            "Edge.Registry.Derived".to_string(),
            "Edge.Registry.Base".to_string(),
            "System.Object".to_string()
        ]
    );

    let instance = derived
        .instantiate(
            vec![PsValue::Int32(1), PsValue::Int32(2)],
            Vec::new(),
        )
        .unwrap();
    // parent properties come first in the parameter list
    assert_eq!(instance.get_property("BaseProp").unwrap(), PsValue::Int32(1));
    assert_eq!(instance.get_property("DerivedProp").unwrap(), PsValue::Int32(2));
}

// ============================================================================
// MALFORMED DOCUMENTS
// ============================================================================

#[test]
fn test_malformed_documents() {
    for (doc, check) in [
        (
            "<Wat>1</Wat>",
            (|e| matches!(e, PsrpError::UnknownElement(_))) as fn(&PsrpError) -> bool,
        ),
        ("<Obj RefId=\"0\"><TNRef RefId=\"4\" /></Obj>", |e| {
            matches!(e, PsrpError::UnresolvedTypeNames(4))
        }),
        ("<Ref RefId=\"0\" />", |e| {
            matches!(e, PsrpError::UnresolvedReference(0))
        }),
        ("<Obj><I32>1</I32></Obj>", |e| {
            matches!(e, PsrpError::MalformedXml(_))
        }),
        ("<I32>forty-two</I32>", |e| {
            matches!(e, PsrpError::Parse { kind: "Int32", .. })
        }),
        ("<DT>yesterday</DT>", |e| {
            matches!(e, PsrpError::Parse { kind: "DateTime", .. })
        }),
        ("<B>TRUE</B>", |e| {
            matches!(e, PsrpError::Parse { kind: "Boolean", .. })
        }),
        ("<G>not-a-guid</G>", |e| {
            matches!(e, PsrpError::Parse { kind: "Guid", .. })
        }),
        ("not xml at all", |e| matches!(e, PsrpError::MalformedXml(_))),
    ] {
        let err = from_clixml(doc).unwrap_err();
        assert!(check(&err), "document {doc:?} produced {err:?}");
    }
}

#[test]
fn test_secure_string_deserialize_requires_cipher() {
    let err = from_clixml("<SS>AAAA</SS>").unwrap_err();
    assert!(matches!(err, PsrpError::Unsupported(_)));
}

// ============================================================================
// ENVELOPE AND CONFIG LIMITS
// ============================================================================

#[test]
fn test_message_buffer_boundaries() {
    assert!(matches!(
        Message::unpack(&[]),
        Err(PsrpError::BufferTooSmall { needed: 40, actual: 0 })
    ));

    // exactly the header with an empty payload is valid
    let mut header = vec![0x01, 0x00, 0x00, 0x00];
    header.extend_from_slice(&0x0001_0002u32.to_le_bytes());
    header.extend_from_slice(&[0u8; 32]);
    let message = Message::unpack(&header).unwrap();
    assert!(message.data.is_empty());
    assert_eq!(message.pipeline_id, None);
}

#[test]
fn test_config_rejects_unusable_fragment_budget() {
    let err = CodecConfig::from_toml("max_fragment_size = 10").unwrap_err();
    assert!(matches!(err, PsrpError::Config(_)));
}

#[test]
fn test_large_graph_roundtrip() {
    // 1,000-entry dictionary pushes the RefId tables well past toy sizes
    let entries: Vec<(PsValue, PsValue)> = (0..1_000)
        .map(|i| {
            (
                PsValue::String(format!("key{i}")),
                PsValue::from(i64::from(i)),
            )
        })
        .collect();
    let dict = PsObject::dictionary(entries.clone());

    let xml = to_clixml(&PsValue::Object(dict)).unwrap();
    let PsValue::Object(back) = from_clixml(&xml).unwrap() else {
        panic!("expected an object");
    };
    match back.body() {
        psrp_protocol::core::object::ObjectBody::Dictionary(decoded) => {
            assert_eq!(decoded, entries);
        }
        other => panic!("expected a dictionary body, got {other:?}"),
    }
}
