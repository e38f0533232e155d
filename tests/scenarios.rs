//! The concrete scenarios from `SPEC_FULL.md` §8, exercised end to end
//! against `Container`.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use wireframe::registry::{Constructor, StaticRegistry};
use wireframe::value::{MapKey, Primitive, RuntimeValue, SpecValue};
use wireframe::{Container, ContainerOptions, WiringError};

fn spec(pairs: Vec<(&str, SpecValue)>) -> IndexMap<String, SpecValue> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn map_of(pairs: Vec<(&str, SpecValue)>) -> SpecValue {
    SpecValue::Map(
        pairs
            .into_iter()
            .map(|(k, v)| (MapKey::Str(k.to_string()), v))
            .collect(),
    )
}

fn str_val(s: &str) -> SpecValue {
    SpecValue::Str(s.to_string())
}

fn int_val(i: i64) -> SpecValue {
    SpecValue::Primitive(Primitive::Int(i))
}

fn float_val(f: f64) -> SpecValue {
    SpecValue::Primitive(Primitive::Float(f))
}

/// An instance that just remembers the arguments it was built with, so
/// tests can inspect identity and argument routing.
struct Instance {
    pos: Vec<Arc<dyn Any + Send + Sync>>,
    kw: IndexMap<String, Arc<dyn Any + Send + Sync>>,
}

/// Counts invocations and wraps every build in an `Instance`.
struct RecordingCtor {
    calls: Arc<AtomicUsize>,
}

impl Constructor for RecordingCtor {
    fn construct(
        &self,
        pos: Vec<Arc<dyn Any + Send + Sync>>,
        kw: IndexMap<String, Arc<dyn Any + Send + Sync>>,
    ) -> Result<Arc<dyn Any + Send + Sync>, Box<dyn std::error::Error + Send + Sync>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Instance { pos, kw }))
    }
}

fn registry_with(entries: Vec<(&str, &str, Arc<dyn Constructor>)>) -> StaticRegistry {
    let mut registry = StaticRegistry::new();
    for (module, type_name, ctor) in entries {
        registry.register(module, type_name, None, ctor);
    }
    registry
}

fn as_float(value: &Arc<dyn Any + Send + Sync>) -> f64 {
    match value.downcast_ref::<RuntimeValue>() {
        Some(RuntimeValue::Primitive(Primitive::Float(f))) => *f,
        _ => panic!("expected a float primitive"),
    }
}

#[test]
fn s1_basic_memoization() {
    let raw = spec(vec![(
        "m.Date d",
        map_of(vec![
            ("year", int_val(2003)),
            ("month", int_val(12)),
            ("day", int_val(13)),
        ]),
    )]);
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(vec![(
        "m",
        "Date",
        Arc::new(RecordingCtor { calls: calls.clone() }),
    )]);

    let container = Container::new(&raw, Arc::new(registry), ContainerOptions::default()).unwrap();
    let first = container.get("d").unwrap();
    let second = container.get("d").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn s2_reference_identity() {
    let raw = spec(vec![
        ("m.C inner", map_of(vec![])),
        ("m.W outer", map_of(vec![("child", str_val("{inner}"))])),
    ]);
    let registry = registry_with(vec![
        ("m", "C", Arc::new(RecordingCtor { calls: Arc::new(AtomicUsize::new(0)) })),
        ("m", "W", Arc::new(RecordingCtor { calls: Arc::new(AtomicUsize::new(0)) })),
    ]);

    let container = Container::new(&raw, Arc::new(registry), ContainerOptions::default()).unwrap();
    let inner = container.get("inner").unwrap();
    let outer = container.get("outer").unwrap();
    let outer_instance = outer.downcast_ref::<Instance>().unwrap();
    let child = outer_instance.kw.get("child").unwrap();

    assert!(Arc::ptr_eq(&inner, child));
}

#[test]
fn s3_template_constant() {
    let raw = spec(vec![
        ("host", str_val("example.com")),
        ("url", str_val("http://{host}:{port}")),
        ("port", int_val(8080)),
    ]);
    let container =
        Container::new(&raw, Arc::new(StaticRegistry::new()), ContainerOptions::default()).unwrap();

    let url = container.get("url").unwrap();
    match url.downcast_ref::<RuntimeValue>() {
        Some(RuntimeValue::Primitive(Primitive::String(s))) => {
            assert_eq!(s, "http://example.com:8080");
        }
        _ => panic!("expected a string primitive"),
    }
}

#[test]
fn s4_auto_promoted_constant_interpolates_wired_entry() {
    let raw = spec(vec![
        ("m.H h", map_of(vec![])),
        ("label", str_val("h is {h}")),
    ]);
    let registry = registry_with(vec![(
        "m",
        "H",
        Arc::new(RecordingCtor { calls: Arc::new(AtomicUsize::new(0)) }),
    )]);
    let container = Container::new(&raw, Arc::new(registry), ContainerOptions::default()).unwrap();

    let label = container.get("label").unwrap();
    match label.downcast_ref::<RuntimeValue>() {
        Some(RuntimeValue::Primitive(Primitive::String(s))) => {
            assert_eq!(s, "h is <object>");
        }
        _ => panic!("expected a string primitive"),
    }
}

#[test]
fn s5_static_cycle_fails_construction() {
    let raw = spec(vec![
        ("m.A a", map_of(vec![("x", str_val("{b}"))])),
        ("m.B b", map_of(vec![("y", str_val("{a}"))])),
    ]);
    let err = Container::new(&raw, Arc::new(StaticRegistry::new()), ContainerOptions::default())
        .unwrap_err();
    assert!(matches!(err, WiringError::CircularWiring { .. }));
}

struct CycleInstance {
    other: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

struct CycleCtor;

impl Constructor for CycleCtor {
    fn construct(
        &self,
        _pos: Vec<Arc<dyn Any + Send + Sync>>,
        kw: IndexMap<String, Arc<dyn Any + Send + Sync>>,
    ) -> Result<Arc<dyn Any + Send + Sync>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Arc::new(CycleInstance {
            other: Mutex::new(kw.get("other").cloned()),
        }))
    }

    fn skeleton(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        Some(Arc::new(CycleInstance { other: Mutex::new(None) }))
    }

    fn init_skeleton(
        &self,
        skeleton: &Arc<dyn Any + Send + Sync>,
        _pos: Vec<Arc<dyn Any + Send + Sync>>,
        kw: IndexMap<String, Arc<dyn Any + Send + Sync>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let instance = skeleton
            .downcast_ref::<CycleInstance>()
            .expect("skeleton is a CycleInstance");
        *instance.other.lock().unwrap() = kw.get("other").cloned();
        Ok(())
    }
}

#[test]
fn s6_dynamic_cycle_with_allow_partial() {
    let raw = spec(vec![
        ("m.A a", map_of(vec![("other", str_val("{b}"))])),
        ("m.B b", map_of(vec![("other", str_val("{a}"))])),
    ]);
    let registry = registry_with(vec![
        ("m", "A", Arc::new(CycleCtor)),
        ("m", "B", Arc::new(CycleCtor)),
    ]);
    let options = ContainerOptions {
        allow_partial: true,
        ..ContainerOptions::default()
    };
    let container = Container::new(&raw, Arc::new(registry), options).unwrap();

    let a = container.get("a").unwrap();
    let b = container.get("b").unwrap();

    let a_inst = a.downcast_ref::<CycleInstance>().unwrap();
    let b_inst = b.downcast_ref::<CycleInstance>().unwrap();

    let a_other = a_inst.other.lock().unwrap().clone().expect("a.other set");
    let b_other = b_inst.other.lock().unwrap().clone().expect("b.other set");

    assert!(Arc::ptr_eq(&a_other, &b));
    assert!(Arc::ptr_eq(&b_other, &a));
}

#[test]
fn s7_unknown_placeholder_fails_only_on_access() {
    let raw = spec(vec![("m.A a", map_of(vec![("x", str_val("{missing}"))]))]);
    let registry = registry_with(vec![(
        "m",
        "A",
        Arc::new(RecordingCtor { calls: Arc::new(AtomicUsize::new(0)) }),
    )]);

    // Construction succeeds: `missing` is never eagerly evaluated.
    let container = Container::new(&raw, Arc::new(registry), ContainerOptions::default()).unwrap();

    let err = container.get("a").unwrap_err();
    match err {
        WiringError::UnknownPlaceholder { placeholder, .. } => {
            assert_eq!(placeholder, "missing");
        }
        other => panic!("expected UnknownPlaceholder, got {other:?}"),
    }
}

#[test]
fn s8_mixed_positional_and_keyword_arguments() {
    let raw = spec(vec![(
        "m.Complex c",
        SpecValue::Map(
            vec![
                (MapKey::Int(0), float_val(1.5)),
                (MapKey::Str("imag".to_string()), float_val(2.5)),
            ]
            .into_iter()
            .collect(),
        ),
    )]);
    let registry = registry_with(vec![(
        "m",
        "Complex",
        Arc::new(RecordingCtor { calls: Arc::new(AtomicUsize::new(0)) }),
    )]);
    let container = Container::new(&raw, Arc::new(registry), ContainerOptions::default()).unwrap();

    let c = container.get("c").unwrap();
    let instance = c.downcast_ref::<Instance>().unwrap();

    assert_eq!(instance.pos.len(), 1);
    assert_eq!(as_float(&instance.pos[0]), 1.5);
    assert_eq!(as_float(instance.kw.get("imag").unwrap()), 2.5);
}

#[test]
fn s9_concurrent_build_observes_single_construction() {
    let mut raw = IndexMap::new();
    for i in 0..10 {
        raw.insert(format!("m.Date d{i}"), map_of(vec![("year", int_val(2000 + i))]));
    }
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(vec![(
        "m",
        "Date",
        Arc::new(RecordingCtor { calls: calls.clone() }),
    )]);
    let options = ContainerOptions {
        thread_safe: true,
        ..ContainerOptions::default()
    };
    let container = Arc::new(Container::new(&raw, Arc::new(registry), options).unwrap());

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let container = container.clone();
            let name = format!("d{}", i % 10);
            std::thread::spawn(move || container.get(&name).unwrap())
        })
        .collect();

    let mut results: Vec<Arc<dyn Any + Send + Sync>> = Vec::new();
    for handle in handles {
        results.push(handle.join().unwrap());
    }

    for i in 0..10 {
        let matching: Vec<_> = results
            .iter()
            .enumerate()
            .filter(|(idx, _)| idx % 10 == i)
            .map(|(_, v)| v)
            .collect();
        for pair in matching.windows(2) {
            assert!(Arc::ptr_eq(pair[0], pair[1]));
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}
