//! Garbage collection and registry pinning.

use luna_engine::{Runtime, RuntimeError, RuntimeOptions, Value};

#[test]
fn test_unreachable_table_is_collected() {
    let mut rt = Runtime::new();
    let table = Value::Table(rt.create_table());

    let freed = rt.collect_garbage().unwrap();
    assert!(freed >= 1);
    assert!(!rt.is_alive(&table));
    assert_eq!(rt.gc_stats().collections, 1);
}

#[test]
fn test_registered_value_survives() {
    let mut rt = Runtime::new();
    let table = Value::Table(rt.create_table());
    let key = rt.register(table.clone());

    rt.collect_garbage().unwrap();
    assert!(rt.is_alive(&table));
    assert_eq!(rt.registry_value(key), Some(table.clone()));

    assert_eq!(rt.unregister(key), Some(table.clone()));
    rt.collect_garbage().unwrap();
    assert!(!rt.is_alive(&table));
}

#[test]
fn test_release_queue_is_applied_before_collection() {
    let mut rt = Runtime::new();
    let table = Value::Table(rt.create_table());
    let key = rt.register(table.clone());

    rt.release_queue().schedule(key);
    rt.collect_garbage().unwrap();
    assert!(!rt.is_alive(&table));
    assert_eq!(rt.registry_value(key), None);
}

#[test]
fn test_stale_reference_is_an_error() {
    let mut rt = Runtime::new();
    let table = rt.create_table();
    rt.collect_garbage().unwrap();

    let err = rt.raw_get(table, &Value::from(1)).unwrap_err();
    assert_eq!(err.to_string(), "attempt to use a collected table");
}

#[test]
fn test_collect_during_call_is_rejected() {
    let mut rt = Runtime::new();
    rt.register_function("collect", |rt, _| {
        rt.collect_garbage()?;
        Ok(Vec::new())
    });

    let err = rt.exec("collect()", "gc").unwrap_err();
    assert!(matches!(err, RuntimeError::CollectDuringCall));
}

#[test]
fn test_closures_keep_captured_values_alive() {
    let mut rt = Runtime::new();
    rt.exec("local t = { 1, 2, 3 } function get() return t end", "gc")
        .unwrap();
    rt.collect_garbage().unwrap();

    let get = rt.get_global("get");
    let results = rt.call(&get, Vec::new()).unwrap();
    let table = results[0].as_table().unwrap();
    assert_eq!(rt.table_border(table).unwrap(), 3);
}

#[test]
fn test_cycles_are_collected() {
    let mut rt = Runtime::new();
    let values = rt
        .exec("local a = {} local b = { a = a } a.b = b return a", "gc")
        .unwrap();
    let a = values[0].clone();

    rt.collect_garbage().unwrap();
    assert!(!rt.is_alive(&a));
}

#[test]
fn test_threshold_triggers_collection_at_top_level() {
    let options = RuntimeOptions::default().with_gc_threshold(10);
    let mut rt = Runtime::with_options(options).unwrap();
    for _ in 0..20 {
        rt.create_table();
    }

    let f = rt.load("return 1", "auto").unwrap();
    rt.call(&f, Vec::new()).unwrap();
    assert!(rt.gc_stats().collections >= 1);
    assert!(rt.gc_stats().objects_freed >= 20);
}
