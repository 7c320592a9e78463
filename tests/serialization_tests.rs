//! Persisting and restoring object references.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use objbridge::prelude::*;
use objbridge::{NIL_TOKEN, TokenCursor};

fn setup() -> (Rc<RefCell<World>>, Bridge) {
    let world = Rc::new(RefCell::new(World::populated()));
    let bridge = bridge(&world);
    (world, bridge)
}

fn planet_value(bridge: &Bridge, world: &Rc<RefCell<World>>, index: usize) -> Value {
    Value::Object(bridge.wrap_exclusive(&world.borrow().planets[index]).unwrap())
}

fn ship_value(bridge: &Bridge, world: &Rc<RefCell<World>>, index: usize) -> Value {
    Value::Object(bridge.wrap_exclusive(&world.borrow().ships[index]).unwrap())
}

fn marker_value(bridge: &Bridge, world: &Rc<RefCell<World>>, index: usize) -> Value {
    Value::Object(bridge.wrap_shared(&world.borrow().markers[index]).unwrap())
}

#[test]
fn test_token_format() {
    let (world, bridge) = setup();
    let mars = planet_value(&bridge, &world, 1);
    assert_eq!(bridge.encode(&mars).unwrap(), "Planet\n1\n");
    assert_eq!(bridge.encode(&Value::Nil).unwrap(), format!("{NIL_TOKEN}\n"));
}

#[test]
fn test_round_trip_after_rebuild() {
    let (world, bridge) = setup();

    let originals = vec![
        planet_value(&bridge, &world, 1),
        ship_value(&bridge, &world, 0),
        marker_value(&bridge, &world, 1),
    ];
    let saved = bridge.encode_all(&originals).unwrap();
    assert_eq!(saved, "Planet\n1\nShip\n0\nMarker\n1\n");

    let expected_planet = world.borrow().planets[1].borrow().clone();
    let expected_ship = world.borrow().ships[0].borrow().clone();
    let expected_marker = world.borrow().markers[1].borrow().clone();

    // Discard every native entity, then rebuild the container from scratch.
    drop(originals);
    *world.borrow_mut() = World::default();
    assert!(bridge.identity_map().is_empty());
    *world.borrow_mut() = World::populated();

    let restored = bridge.decode_all(&saved).unwrap();
    assert_eq!(restored.len(), 3);

    let classes: Vec<_> = restored
        .iter()
        .map(|v| v.as_object().unwrap().class_name().to_string())
        .collect();
    assert_eq!(classes, vec!["Planet", "Ship", "Marker"]);

    let planet = bridge
        .entity::<Planet>(restored[0].as_object().unwrap())
        .unwrap();
    assert_eq!(planet.with(Clone::clone).unwrap(), expected_planet);
    let ship = bridge
        .entity::<Ship>(restored[1].as_object().unwrap())
        .unwrap();
    assert_eq!(ship.with(Clone::clone).unwrap(), expected_ship);
    let marker = bridge
        .entity::<Marker>(restored[2].as_object().unwrap())
        .unwrap();
    assert_eq!(marker.with(Clone::clone).unwrap(), expected_marker);

    // Decoded references go through the identity map like any push.
    assert_eq!(restored[0], planet_value(&bridge, &world, 1));
}

#[test]
fn test_nil_differs_from_end_of_stream() {
    let (world, bridge) = setup();
    let earth = planet_value(&bridge, &world, 0);
    let saved = bridge.encode_all([&Value::Nil, &earth]).unwrap();

    let mut cursor = TokenCursor::new(&saved);
    assert_eq!(bridge.decode_next(&mut cursor).unwrap(), Some(Value::Nil));
    assert_eq!(bridge.decode_next(&mut cursor).unwrap(), Some(earth));
    assert_eq!(bridge.decode_next(&mut cursor).unwrap(), None);
    assert!(cursor.is_at_end());
}

#[test]
fn test_corrupt_tokens_rejected() {
    let (_world, bridge) = setup();

    let cases = [
        ("Comet\n0\n", SerializationError::UnknownClass("Comet".to_string())),
        (
            "Body\n0\n",
            SerializationError::NoSerializer {
                class: "Body".to_string(),
            },
        ),
        ("Planet\n", SerializationError::Truncated { offset: 7 }),
        ("Planet", SerializationError::Truncated { offset: 0 }),
        (
            "Planet\nabc\n",
            SerializationError::malformed("Planet", "abc", "expected an index"),
        ),
        (
            "Ship\n7\n",
            SerializationError::OutOfRange {
                class: "Ship".to_string(),
                index: 7,
                len: 2,
            },
        ),
        (
            "Ship\n-1\n",
            SerializationError::OutOfRange {
                class: "Ship".to_string(),
                index: -1,
                len: 2,
            },
        ),
    ];

    for (input, expected) in cases {
        let mut cursor = TokenCursor::new(input);
        let err = bridge.decode_next(&mut cursor).unwrap_err();
        assert_eq!(err, expected, "input {input:?}");
        assert_eq!(cursor.position(), 0, "cursor moved on {input:?}");
    }
}

#[test]
fn test_decode_all_stops_at_first_error() {
    let (_world, bridge) = setup();
    let err = bridge.decode_all("nil\nPlanet\n0\nComet\n1\n").unwrap_err();
    assert_eq!(err, SerializationError::UnknownClass("Comet".to_string()));
}

#[test]
fn test_encode_errors() {
    let (_world, bridge) = setup();

    let body = Native::new(Body {
        label: "Ceres".to_string(),
        index: 0,
    });
    let plain = Value::Object(bridge.wrap_exclusive(&body).unwrap());
    assert_eq!(
        bridge.encode(&plain).unwrap_err(),
        SerializationError::NoSerializer {
            class: "Body".to_string()
        }
    );
    assert_eq!(
        bridge.encode(&plain).unwrap_err().to_string(),
        "no registered serializer for type Body"
    );

    let doomed = Native::new(planet("Vulcan", 0, 1.0));
    let value = Value::Object(bridge.wrap_exclusive(&doomed).unwrap());
    doomed.destroy();
    assert_eq!(
        bridge.encode(&value).unwrap_err(),
        SerializationError::DeadObject {
            class: "Planet".to_string()
        }
    );

    assert_eq!(
        bridge.encode(&Value::Int(4)).unwrap_err(),
        SerializationError::NotAnObject { actual: "integer" }
    );
}

#[test]
fn test_multiline_payload_rejected() {
    let world = Rc::new(RefCell::new(World::populated()));
    let mut registry = base_registry();
    registry
        .register_serializer(
            "Marker",
            SerializerPair::typed(
                |marker: &Marker| Ok(format!("{}\n{}", marker.index, marker.name)),
                |_bridge: &Bridge, _payload: &str| Ok(Value::Nil),
            ),
        )
        .unwrap();
    let bridge = Bridge::with_defaults(registry);

    let marker = marker_value(&bridge, &world, 0);
    assert!(matches!(
        bridge.encode(&marker).unwrap_err(),
        SerializationError::InvalidPayload { .. }
    ));
}

#[test]
fn test_decoder_class_is_checked() {
    let world = Rc::new(RefCell::new(World::populated()));
    let decoy = Rc::clone(&world);
    let mut registry = base_registry();
    registry
        .register_serializer(
            "Ship",
            SerializerPair::typed(
                |ship: &Ship| Ok(ship.body.index.to_string()),
                move |bridge: &Bridge, _payload: &str| {
                    let world = decoy.borrow();
                    Ok(Value::Object(bridge.wrap_exclusive(&world.planets[0])?))
                },
            ),
        )
        .unwrap();
    let bridge = Bridge::with_defaults(registry);

    let err = bridge.decode_all("Ship\n0\n").unwrap_err();
    assert_eq!(
        err,
        SerializationError::malformed("Ship", "0", "decoded object has class Planet")
    );
}

#[test]
fn test_json_records() {
    let (world, bridge) = setup();
    let voyager = ship_value(&bridge, &world, 1);

    let record = bridge.to_json(&voyager).unwrap();
    assert_eq!(record, serde_json::json!({ "class": "Ship", "inner": "1" }));
    assert_eq!(bridge.from_json(&record).unwrap(), voyager);

    assert_eq!(bridge.to_json(&Value::Nil).unwrap(), serde_json::Value::Null);
    assert_eq!(
        bridge.from_json(&serde_json::Value::Null).unwrap(),
        Value::Nil
    );

    let missing = serde_json::json!({ "class": "Ship" });
    assert!(matches!(
        bridge.from_json(&missing).unwrap_err(),
        SerializationError::Malformed { .. }
    ));
    let unknown = serde_json::json!({ "class": "Comet", "inner": "0" });
    assert_eq!(
        bridge.from_json(&unknown).unwrap_err(),
        SerializationError::UnknownClass("Comet".to_string())
    );
}

#[test]
fn test_audit_flags_subclass_without_serializer() {
    let mut registry = base_registry();
    registry
        .create_class(ClassBuilder::new("Freighter").parent("Ship").build())
        .unwrap();
    registry
        .register_serializer(
            "Ship",
            SerializerPair::new(|_| Ok("0".to_string()), |_, _| Ok(Value::Nil)),
        )
        .unwrap();

    let gaps = registry.audit_serializers();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].class, "Freighter");
    assert_eq!(gaps[0].serializable_ancestor, "Ship");
}
