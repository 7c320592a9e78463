//! Promotion and class-chain dispatch tests.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use objbridge::prelude::*;
use objbridge::predicate;

fn setup() -> (Rc<RefCell<World>>, Bridge) {
    let world = Rc::new(RefCell::new(World::default()));
    let bridge = bridge(&world);
    (world, bridge)
}

#[test]
fn test_derived_pushed_through_base_call_site() {
    init_tracing();

    struct Base;
    struct Derived;
    impl Wrappable for Base {
        const CLASS: &'static str = "Base";
    }
    impl Wrappable for Derived {
        const CLASS: &'static str = "Derived";
    }

    let mut registry = BridgeRegistry::new();
    registry
        .create_class(ClassBuilder::for_type::<Base>().build())
        .unwrap();
    registry
        .create_class(ClassBuilder::for_type::<Derived>().parent("Base").build())
        .unwrap();
    registry
        .register_promotion("Base", "Derived", downcast_test::<Derived>())
        .unwrap();
    let bridge = Bridge::with_defaults(registry);

    let derived = Native::new(Derived);
    let base = Native::new(Base);
    let mut stack = ScriptStack::new();
    bridge.push_exclusive_as(&mut stack, &derived, "Base").unwrap();
    bridge.push_exclusive_as(&mut stack, &base, "Base").unwrap();

    let promoted = bridge.check_from_script(&stack, 1, "Base").unwrap();
    assert_eq!(promoted.class_name(), "Derived");
    let plain = bridge.check_from_script(&stack, 2, "Base").unwrap();
    assert_eq!(plain.class_name(), "Base");
    assert_eq!(bridge.stats().promotions_applied, 1);
}

#[test]
fn test_promoted_proxy_answers_both_method_sets() {
    let (_world, bridge) = setup();
    let earth = Native::new(planet("Earth", 0, 6371.0));
    let mut stack = ScriptStack::new();
    bridge.push_exclusive_as(&mut stack, &earth, "Body").unwrap();
    let obj = stack.top().cloned().unwrap();

    assert_eq!(obj.as_object().unwrap().class_name(), "Planet");
    assert_eq!(
        bridge.call_method(&obj, "GetRadius", vec![]).unwrap(),
        vec![Value::Number(6371.0)]
    );
    assert_eq!(
        bridge.call_method(&obj, "GetLabel", vec![]).unwrap(),
        vec![Value::String("Earth".to_string())]
    );
    assert!(bridge.is_a(&obj, "Body").unwrap());
    assert!(!bridge.is_a(&obj, "Ship").unwrap());
}

#[test]
fn test_typed_pull_through_base_class() {
    let (_world, bridge) = setup();
    let pioneer = Native::new(ship("Pioneer", 0, 100));
    let mut stack = ScriptStack::new();
    bridge.push_exclusive(&mut stack, &pioneer).unwrap();

    let as_body = bridge.check::<Body>(&stack, 1).unwrap();
    as_body.with_mut(|b| b.label = "Pioneer II".to_string()).unwrap();
    assert_eq!(pioneer.borrow().body.label, "Pioneer II");

    let err = bridge.check::<Planet>(&stack, 1).unwrap_err();
    assert_eq!(
        err,
        BridgeError::TypeMismatch {
            expected: "Planet".to_string(),
            actual: "Ship".to_string()
        }
    );
}

#[test]
fn test_dedup_keeps_first_resolved_class() {
    let (_world, bridge) = setup();
    let mars = Native::new(planet("Mars", 1, 3389.5));

    let direct = bridge.wrap_exclusive(&mars).unwrap();
    let via_base = bridge.wrap_exclusive_as(&mars, "Body").unwrap();
    assert!(direct.same_object(&via_base));
    assert_eq!(via_base.class_name(), "Planet");
}

#[test]
fn test_shared_push_promotes() {
    let (_world, bridge) = setup();
    let shared = Rc::new(RefCell::new(ship("Tender", 3, 20)));
    let proxy = bridge.wrap_shared_as(&shared, "Body").unwrap();
    assert_eq!(proxy.class_name(), "Ship");
}

#[test]
fn test_unmatched_rule_keeps_static_class() {
    let (_world, bridge) = setup();
    let body = Native::new(Body {
        label: "Asteroid".to_string(),
        index: 0,
    });
    let proxy = bridge.wrap_exclusive(&body).unwrap();
    assert_eq!(proxy.class_name(), "Body");
    assert_eq!(bridge.stats().promotions_applied, 0);
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum HullClass {
    Freighter,
    Frigate,
    Carrier,
}

#[derive(Clone)]
struct Hull {
    class: HullClass,
}

impl Wrappable for Hull {
    const CLASS: &'static str = "Hull";
}

fn hull_registry(max_depth: usize) -> Bridge {
    let mut registry = BridgeRegistry::new();
    registry
        .create_class(ClassBuilder::new("Hull").build())
        .unwrap();
    registry
        .create_class(ClassBuilder::new("Warship").parent("Hull").build())
        .unwrap();
    registry
        .create_class(ClassBuilder::new("Carrier").parent("Warship").build())
        .unwrap();
    registry
        .register_promotion(
            "Hull",
            "Warship",
            predicate(|h: &Hull| h.class != HullClass::Freighter),
        )
        .unwrap();
    registry
        .register_promotion(
            "Warship",
            "Carrier",
            predicate(|h: &Hull| h.class == HullClass::Carrier),
        )
        .unwrap();
    Bridge::init(
        registry,
        BridgeConfig::default().with_max_promotion_depth(max_depth),
    )
}

#[test]
fn test_promotions_chain() {
    let bridge = hull_registry(16);
    let resolve = |class| {
        let hull = Native::new(Hull { class });
        bridge.wrap_exclusive(&hull).unwrap().class_name().to_string()
    };

    assert_eq!(resolve(HullClass::Freighter), "Hull");
    assert_eq!(resolve(HullClass::Frigate), "Warship");
    assert_eq!(resolve(HullClass::Carrier), "Carrier");

    let copy = bridge
        .wrap_copied(&Hull {
            class: HullClass::Frigate,
        })
        .unwrap();
    assert_eq!(copy.class_name(), "Warship");
    let owned = bridge
        .wrap_owned(Hull {
            class: HullClass::Carrier,
        })
        .unwrap();
    assert_eq!(owned.class_name(), "Carrier");
}

#[test]
fn test_promotion_depth_limit() {
    let bridge = hull_registry(1);
    let carrier = Native::new(Hull {
        class: HullClass::Carrier,
    });
    let proxy = bridge.wrap_exclusive(&carrier).unwrap();
    assert_eq!(proxy.class_name(), "Warship");
}

#[test]
fn test_pull_rejects_sibling_class() {
    let (_world, bridge) = setup();
    let earth = Native::new(planet("Earth", 0, 6371.0));
    let mut stack = ScriptStack::new();
    bridge.push_exclusive(&mut stack, &earth).unwrap();

    assert!(bridge.check_from_script(&stack, 1, "Body").is_ok());
    let err = bridge.check_from_script(&stack, 1, "Ship").unwrap_err();
    assert!(err.is_type_mismatch());
    assert_eq!(
        err.to_string(),
        "object on stack has type Planet which can not be used as type Ship"
    );
    assert_eq!(
        bridge.check_from_script(&stack, 1, "Comet").unwrap_err(),
        BridgeError::UnknownClass("Comet".to_string())
    );
}

struct ModelBody {
    body: Body,
}

impl Wrappable for ModelBody {
    const CLASS: &'static str = "ModelBody";
}

struct Freighter {
    model: ModelBody,
    cargo: u32,
}

impl Wrappable for Freighter {
    const CLASS: &'static str = "Freighter";
}

#[test]
fn test_upcasts_compose_across_levels() {
    init_tracing();
    let mut registry = BridgeRegistry::new();
    registry
        .create_class(
            ClassBuilder::for_type::<Body>()
                .method_ref("GetLabel", |b: &Body| b.label.clone())
                .build(),
        )
        .unwrap();
    registry
        .create_class(ClassBuilder::for_type::<ModelBody>().parent("Body").build())
        .unwrap();
    registry
        .create_class(
            ClassBuilder::for_type::<Freighter>()
                .parent("ModelBody")
                .method_ref("GetCargo", |f: &Freighter| f.cargo)
                .build(),
        )
        .unwrap();
    registry
        .register_upcast::<Freighter, ModelBody>(|f| &f.model, |f| &mut f.model)
        .unwrap();
    registry
        .register_upcast::<ModelBody, Body>(|m| &m.body, |m| &mut m.body)
        .unwrap();
    let bridge = Bridge::with_defaults(registry);

    let freighter = Native::new(Freighter {
        model: ModelBody {
            body: Body {
                label: "Hauler".to_string(),
                index: 0,
            },
        },
        cargo: 40,
    });
    let mut stack = ScriptStack::new();
    bridge.push_exclusive(&mut stack, &freighter).unwrap();
    let obj = stack.top().cloned().unwrap();

    assert_eq!(
        bridge.call_method(&obj, "GetLabel", vec![]).unwrap(),
        vec![Value::from("Hauler")]
    );
    assert_eq!(
        bridge.call_method(&obj, "GetCargo", vec![]).unwrap(),
        vec![Value::Int(40)]
    );

    let body = bridge.check::<Body>(&stack, 1).unwrap();
    body.with_mut(|b| b.label = "Hauler II".to_string()).unwrap();
    assert_eq!(freighter.borrow().model.body.label, "Hauler II");
}
