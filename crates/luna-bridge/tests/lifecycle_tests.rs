//! Object construction, native retrieval and deletion.

use luna_bridge::{
    from_handle, BridgeError, BridgeResult, Exposable, MemorySink, Methods, NativePtr, ObjectError,
    ScriptState,
};
use luna_engine::{Args, Runtime, Value};
use std::rc::Rc;

// ============================================================================
// Test types
// ============================================================================

#[derive(Debug)]
struct Counter {
    count: f64,
}

impl Exposable for Counter {
    const CLASS: &'static str = "Counter";

    fn create(_rt: &mut Runtime, args: &Args) -> BridgeResult<Self> {
        Ok(Counter {
            count: args.opt_number(0, 0.0)?,
        })
    }

    fn methods(methods: &mut Methods<Self>) {
        methods
            .add("increment", |counter, _rt, args| {
                counter.count += args.opt_number(0, 1.0)?;
                Ok(Vec::new())
            })
            .add("value", |counter, _rt, _args| Ok(vec![Value::Number(counter.count)]))
            .add("with", |_counter, rt, args| Ok(rt.call(&args.get(0), Vec::new())?));
    }
}

fn state() -> (ScriptState, MemorySink) {
    let sink = MemorySink::new();
    let mut state = ScriptState::new(Rc::new(sink.clone())).unwrap();
    state.expose::<Counter>().unwrap();
    (state, sink)
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_native_methods_operate_on_the_object() {
    let (mut state, _) = state();
    let values = state
        .try_do_string(
            "local c = Counter:new(5) c:increment(2) c:increment() return c:value()",
            "counter",
        )
        .unwrap();
    assert_eq!(values, vec![Value::from(8)]);
}

#[test]
fn test_subclass_of_exposed_type_gets_native_object() {
    let (mut state, _) = state();
    let values = state
        .try_do_string(
            r#"
            class("Fancy", Counter)
            function Fancy:double() self:increment(self:value()) end
            local f = Fancy:new(3)
            f:double()
            return f:value()
            "#,
            "fancy",
        )
        .unwrap();
    assert_eq!(values, vec![Value::from(6)]);
}

#[test]
fn test_from_handle_returns_the_allocated_pointer() {
    let (mut state, _) = state();
    let (rt, bridge) = state.parts();
    let class = bridge.resolve(rt, "Counter").unwrap();

    let native = NativePtr::new(Counter { count: 1.0 }, "Counter");
    let handle = bridge
        .construct_with(rt, &class, native.clone(), Vec::new())
        .unwrap();
    let instance = handle.value();

    let found = from_handle(rt, &instance).unwrap();
    assert!(found.ptr_eq(&native));
    assert_eq!(found.downcast::<Counter>().unwrap().borrow().count, 1.0);

    handle.destroy(rt);
    assert_eq!(from_handle(rt, &instance).unwrap_err(), ObjectError::Released);
}

#[test]
fn test_construct_native_runs_script_constructor() {
    let (mut state, _) = state();
    assert!(state.do_string("function Counter:Counter(label) self.label = label end", "ctor"));

    let (rt, bridge) = state.parts();
    let handle = bridge
        .construct_native(rt, Counter { count: 0.0 }, vec![Value::from("host")])
        .unwrap();
    let label = rt.raw_get_str(handle.instance(), "label").unwrap();
    assert_eq!(label, Value::from("host"));
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_delete_invalidates_script_references() {
    let (mut state, _) = state();
    let values = state
        .try_do_string("local c = Counter:new() c:delete() return c", "delete")
        .unwrap();
    assert_eq!(
        from_handle(state.runtime(), &values[0]).unwrap_err(),
        ObjectError::Released
    );
    assert_eq!(state.bridge().owned_count(), 0);
}

#[test]
fn test_double_delete_is_an_object_error() {
    let (mut state, sink) = state();
    let values = state
        .try_do_string(
            r#"
            local c = Counter:new()
            c:delete()
            local ok, err = pcall(c.delete, c)
            return ok, err
            "#,
            "double",
        )
        .unwrap();
    assert_eq!(values[0], Value::Boolean(false));
    assert_eq!(values[1], Value::from("object has already been deleted"));
    assert!(sink.is_empty());
}

#[test]
fn test_method_on_deleted_object_fails_safely() {
    let (mut state, sink) = state();
    assert!(!state.do_string("local c = Counter:new() c:delete() c:increment()", "stale"));

    let diagnostics = sink.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "object has already been deleted");
}

#[test]
fn test_host_owned_object_cannot_be_deleted_by_bridge() {
    let (mut state, _) = state();
    let (rt, bridge) = state.parts();
    let handle = bridge
        .construct_native(rt, Counter { count: 0.0 }, Vec::new())
        .unwrap();

    let err = bridge.delete(rt, &handle.value()).unwrap_err();
    assert!(matches!(err, BridgeError::Object(ObjectError::NotOwned)));
    assert!(from_handle(rt, &handle.value()).is_ok());
}

#[test]
fn test_reentrant_borrow_is_an_error() {
    let (mut state, _) = state();
    let values = state
        .try_do_string(
            r#"
            local c = Counter:new()
            local ok, err = pcall(function()
                c:with(function() return c:value() end)
            end)
            return ok, err
            "#,
            "reentrant",
        )
        .unwrap();
    assert_eq!(values[0], Value::Boolean(false));
    assert_eq!(values[1], Value::from("native object is already borrowed"));
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_registry_round_trip() {
    let (mut state, _) = state();
    let rt = state.runtime_mut();
    let table = Value::Table(rt.create_table());

    let key = rt.register(table.clone());
    assert_eq!(rt.registry_value(key), Some(table.clone()));

    assert_eq!(rt.unregister(key), Some(table.clone()));
    assert_eq!(rt.registry_value(key), None);

    let next = rt.register(table);
    assert_ne!(next, key);
    assert_eq!(rt.registry_value(key), None);
}

#[test]
fn test_live_objects_hold_one_registry_entry() {
    let (mut state, _) = state();
    let baseline = state.runtime_mut().registry_len();

    assert!(state.do_string("a = Counter:new() b = Counter:new()", "pins"));
    assert_eq!(state.runtime_mut().registry_len(), baseline + 2);

    assert!(state.do_string("a:delete() b:delete()", "unpin"));
    assert_eq!(state.runtime_mut().registry_len(), baseline);
}
