//! Shared fixtures for the integration tests.
//!
//! The fixture world is a small star system: `Body` is the script base
//! class, `Planet` and `Ship` embed a `Body` and descend from it, and
//! `Marker` is a reference-counted entity with no parent.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use objbridge::prelude::*;
use objbridge::Value;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub label: String,
    pub index: usize,
}

impl Wrappable for Body {
    const CLASS: &'static str = "Body";
}

#[derive(Debug, Clone, PartialEq)]
pub struct Planet {
    pub body: Body,
    pub radius: f64,
}

impl Wrappable for Planet {
    const CLASS: &'static str = "Planet";
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ship {
    pub body: Body,
    pub hull: u32,
    pub props: PropertyMap,
}

impl Wrappable for Ship {
    const CLASS: &'static str = "Ship";
}

impl Propertied for Ship {
    fn properties(&self) -> &PropertyMap {
        &self.props
    }

    fn properties_mut(&mut self) -> &mut PropertyMap {
        &mut self.props
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub name: String,
    pub index: usize,
}

impl Wrappable for Marker {
    const CLASS: &'static str = "Marker";
}

/// Sets a flag when dropped.
pub struct Probe {
    pub dropped: Rc<Cell<bool>>,
}

impl Wrappable for Probe {
    const CLASS: &'static str = "Probe";
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

pub fn planet(label: &str, index: usize, radius: f64) -> Planet {
    Planet {
        body: Body {
            label: label.to_string(),
            index,
        },
        radius,
    }
}

pub fn ship(label: &str, index: usize, hull: u32) -> Ship {
    Ship {
        body: Body {
            label: label.to_string(),
            index,
        },
        hull,
        props: PropertyMap::new(),
    }
}

// =============================================================================
// World
// =============================================================================

/// Native container that serializer payloads index into.
#[derive(Default)]
pub struct World {
    pub planets: Vec<Native<Planet>>,
    pub ships: Vec<Native<Ship>>,
    pub markers: Vec<Rc<RefCell<Marker>>>,
}

impl World {
    /// A world with two planets, two ships and two markers.
    pub fn populated() -> Self {
        Self {
            planets: vec![
                Native::new(planet("Earth", 0, 6371.0)),
                Native::new(planet("Mars", 1, 3389.5)),
            ],
            ships: vec![
                Native::new(ship("Pioneer", 0, 100)),
                Native::new(ship("Voyager", 1, 80)),
            ],
            markers: vec![
                Rc::new(RefCell::new(Marker {
                    name: "L1".to_string(),
                    index: 0,
                })),
                Rc::new(RefCell::new(Marker {
                    name: "L2".to_string(),
                    index: 1,
                })),
            ],
        }
    }
}

fn parse_index(class: &str, payload: &str, len: usize) -> Result<usize, SerializationError> {
    let index: i64 = payload
        .parse()
        .map_err(|_| SerializationError::malformed(class, payload, "expected an index"))?;
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| SerializationError::out_of_range(class, index, len))
}

fn planet_serializer(world: Rc<RefCell<World>>) -> SerializerPair {
    SerializerPair::typed(
        |planet: &Planet| Ok(planet.body.index.to_string()),
        move |bridge: &Bridge, payload: &str| {
            let world = world.borrow();
            let index = parse_index("Planet", payload, world.planets.len())?;
            Ok(Value::Object(bridge.wrap_exclusive(&world.planets[index])?))
        },
    )
}

fn ship_serializer(world: Rc<RefCell<World>>) -> SerializerPair {
    SerializerPair::typed(
        |ship: &Ship| Ok(ship.body.index.to_string()),
        move |bridge: &Bridge, payload: &str| {
            let world = world.borrow();
            let index = parse_index("Ship", payload, world.ships.len())?;
            Ok(Value::Object(bridge.wrap_exclusive(&world.ships[index])?))
        },
    )
}

fn marker_serializer(world: Rc<RefCell<World>>) -> SerializerPair {
    SerializerPair::typed(
        |marker: &Marker| Ok(marker.index.to_string()),
        move |bridge: &Bridge, payload: &str| {
            let world = world.borrow();
            let index = parse_index("Marker", payload, world.markers.len())?;
            Ok(Value::Object(bridge.wrap_shared(&world.markers[index])?))
        },
    )
}

// =============================================================================
// Registry
// =============================================================================

/// Registry with classes, upcasts and promotions but no serializers.
pub fn base_registry() -> BridgeRegistry {
    let mut registry = BridgeRegistry::new();
    registry
        .create_class(
            ClassBuilder::for_type::<Body>()
                .method_ref("GetLabel", |body: &Body| body.label.clone())
                .attribute_rw(
                    "label",
                    |body: &Body| body.label.clone(),
                    |body: &mut Body, label: String| body.label = label,
                )
                .meta(MetaMethod::ToString, |ctx| {
                    let label = ctx.this::<Body>()?.with(|b| b.label.clone())?;
                    let class = ctx.receiver()?.class_name().to_string();
                    ctx.ret(format!("{class}({label})"));
                    Ok(())
                })
                .build(),
        )
        .unwrap();
    registry
        .create_class(
            ClassBuilder::for_type::<Planet>()
                .parent("Body")
                .method_ref("GetRadius", |planet: &Planet| planet.radius)
                .build(),
        )
        .unwrap();
    registry
        .create_class(
            ClassBuilder::for_type::<Ship>()
                .parent("Body")
                .attribute_rw(
                    "hull",
                    |ship: &Ship| ship.hull,
                    |ship: &mut Ship, hull: u32| ship.hull = hull,
                )
                .with_properties::<Ship>()
                .build(),
        )
        .unwrap();
    registry
        .create_class(
            ClassBuilder::for_type::<Marker>()
                .method_ref("GetName", |marker: &Marker| marker.name.clone())
                .build(),
        )
        .unwrap();
    registry
        .create_class(ClassBuilder::for_type::<Probe>().build())
        .unwrap();

    registry
        .register_upcast::<Planet, Body>(|p| &p.body, |p| &mut p.body)
        .unwrap();
    registry
        .register_upcast::<Ship, Body>(|s| &s.body, |s| &mut s.body)
        .unwrap();
    registry
        .register_promotion("Body", "Planet", downcast_test::<Planet>())
        .unwrap();
    registry
        .register_promotion("Body", "Ship", downcast_test::<Ship>())
        .unwrap();
    registry
}

/// Full registry with serializers reading from `world`.
pub fn registry(world: &Rc<RefCell<World>>) -> BridgeRegistry {
    let mut registry = base_registry();
    registry
        .register_serializer("Planet", planet_serializer(Rc::clone(world)))
        .unwrap();
    registry
        .register_serializer("Ship", ship_serializer(Rc::clone(world)))
        .unwrap();
    registry
        .register_serializer("Marker", marker_serializer(Rc::clone(world)))
        .unwrap();
    registry
}

pub fn bridge(world: &Rc<RefCell<World>>) -> Bridge {
    init_tracing();
    Bridge::init(registry(world), BridgeConfig::default())
}
