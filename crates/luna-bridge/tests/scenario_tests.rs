//! End-to-end scenarios through `ScriptState`.

use luna_bridge::{
    from_handle, Bridge, BridgeError, BridgeResult, Exposable, MemorySink, Methods, ScriptState,
};
use luna_engine::{Args, Runtime, Value};
use std::io::Write;
use std::rc::Rc;

fn state() -> (ScriptState, MemorySink) {
    let sink = MemorySink::new();
    let state = ScriptState::new(Rc::new(sink.clone())).unwrap();
    (state, sink)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_inherited_method_on_subclass_instance() {
    let (mut state, sink) = state();
    let values = state
        .try_do_string(
            r#"
            class.defineClass(class, "Animal")
            function Animal:speak() return "generic noise" end
            class:defineClass("Dog", Animal)
            local rex = Dog.new()
            return rex:speak()
            "#,
            "animals",
        )
        .unwrap();
    assert_eq!(values, vec![Value::from("generic noise")]);
    assert!(sink.is_empty());
}

#[test]
fn test_define_class_with_too_few_arguments() {
    let (mut state, _) = state();
    let values = state
        .try_do_string(
            r#"
            local ok, err = pcall(class.defineClass, "Dog")
            return ok, err, Dog
            "#,
            "arity",
        )
        .unwrap();
    assert_eq!(
        values,
        vec![
            Value::Boolean(false),
            Value::from("Expected 1-2 arguments, got 1"),
            Value::Nil
        ]
    );
}

#[test]
fn test_define_class_argument_errors() {
    let (mut state, _) = state();
    let values = state
        .try_do_string(
            r#"
            local a, too_many = pcall(class, "A", nil, nil)
            local b, bad_super = pcall(class, "Cat", {})
            local c, bad_name = pcall(class, true)
            return too_many, bad_super, bad_name, Cat
            "#,
            "arguments",
        )
        .unwrap();
    assert_eq!(values[0], Value::from("Expected 1-2 arguments, got 4"));
    assert_eq!(
        values[1],
        Value::from("superclass of 'Cat' must be a class, got a table value")
    );
    assert_eq!(
        values[2],
        Value::from("class name must be a string, got a boolean value")
    );
    assert_eq!(values[3], Value::Nil);
}

#[test]
fn test_numeric_class_name_is_coerced() {
    let (mut state, _) = state();
    let values = state
        .try_do_string("local c = class(42) return c.__class, c == _G['42']", "numeric")
        .unwrap();
    assert_eq!(values, vec![Value::from("42"), Value::Boolean(true)]);
}

#[test]
fn test_class_argument_to_new_goes_to_constructor() {
    let (mut state, sink) = state();
    let values = state
        .try_do_string(
            r#"
            class("Animal")
            class("Dog", Animal)
            function Dog:Dog(friend) self.friend = friend end
            local d = Dog.new(Animal)
            local pup = Dog:new(Animal)
            return getmetatable(d) == Dog, d.friend == Animal,
                getmetatable(pup) == Dog, pup.friend == Animal
            "#,
            "friends",
        )
        .unwrap();
    assert_eq!(values, vec![Value::Boolean(true); 4]);
    assert!(sink.is_empty());
}

#[test]
fn test_subclass_receiver_for_inherited_new() {
    let (mut state, _) = state();
    let values = state
        .try_do_string(
            r#"
            class("Base")
            class("Derived", Base)
            local d = Base.new(Derived)
            local e = Base.new(Base)
            return getmetatable(d) == Derived, getmetatable(e) == Base
            "#,
            "receiver",
        )
        .unwrap();
    assert_eq!(values, vec![Value::Boolean(true), Value::Boolean(true)]);
}

#[test]
fn test_constructor_skips_non_callable_field() {
    let (mut state, sink) = state();
    let values = state
        .try_do_string(
            r#"
            class("Animal")
            function Animal:Animal() self.ok = true end
            class("Dog", Animal)
            Dog.Dog = "not a function"
            return Dog:new().ok
            "#,
            "shadowed",
        )
        .unwrap();
    assert_eq!(values, vec![Value::Boolean(true)]);
    assert!(sink.is_empty());
}

#[test]
fn test_failing_constructor_still_yields_instance() {
    let (mut state, sink) = state();
    assert!(state.do_string(
        r#"
        class("Fragile")
        function Fragile:Fragile(n)
            self.before = n
            error("constructor failed")
            self.after = true
        end
        fragile = Fragile:new(7)
        "#,
        "fragile",
    ));

    let diagnostics = sink.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "fragile:5: constructor failed");
    assert!(!diagnostics[0].trace.is_empty());
    assert!(diagnostics[0].trace.contains("fragile:5: in function <fragile:3>"));

    let rt = state.runtime();
    let fragile = rt.get_global("fragile");
    assert!(from_handle(rt, &fragile).is_ok());
    let table = fragile.as_table().unwrap();
    assert_eq!(rt.raw_get_str(table, "before").unwrap(), Value::from(7));
    assert_eq!(rt.raw_get_str(table, "after").unwrap(), Value::Nil);
}

#[test]
fn test_constructor_is_inherited() {
    let (mut state, _) = state();
    let values = state
        .try_do_string(
            r#"
            class("Vehicle")
            function Vehicle:Vehicle(wheels) self.wheels = wheels end
            class("Bike", Vehicle)
            return Bike:new(2).wheels
            "#,
            "vehicles",
        )
        .unwrap();
    assert_eq!(values, vec![Value::from(2)]);
}

// ============================================================================
// Error reporting
// ============================================================================

#[test]
fn test_uncaught_error_is_reported_once() {
    let (mut state, sink) = state();
    assert!(!state.do_string("local t = nil\nlocal x = t.field", "nil_index"));

    let diagnostics = sink.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].message,
        "nil_index:2: attempt to index local 't' (a nil value)"
    );
    assert!(diagnostics[0].trace.contains("nil_index:2: in main chunk"));
    assert_eq!(state.runtime().call_depth(), 0);
}

#[test]
fn test_replaced_trace_global_is_used() {
    let (mut state, sink) = state();
    assert!(state.do_string(
        "function stacktrace(msg) return 'custom: ' .. msg end",
        "setup",
    ));
    assert!(!state.do_string("error('boom')", "custom"));
    assert_eq!(sink.diagnostics()[0].message, "custom: custom:1: boom");
}

#[test]
fn test_uncallable_trace_global_falls_back() {
    let (mut state, sink) = state();
    assert!(state.do_string("stacktrace = 5", "setup"));
    assert!(!state.do_string("error('still traced')", "fallback"));

    let diagnostic = &sink.diagnostics()[0];
    assert_eq!(diagnostic.message, "fallback:1: still traced");
    assert!(diagnostic.has_trace());
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn test_do_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "class('FromFile')").unwrap();
    writeln!(file, "loaded = FromFile:new()").unwrap();

    let (mut state, sink) = state();
    assert!(state.do_file(file.path()));
    assert!(sink.is_empty());

    let loaded = state.runtime().get_global("loaded");
    assert!(from_handle(state.runtime(), &loaded).is_ok());
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.lua");

    let (mut state, sink) = state();
    assert!(!state.do_file(&path));
    let diagnostics = sink.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.starts_with("cannot open"));
}

// ============================================================================
// Nested calls
// ============================================================================

struct Host;

impl Exposable for Host {
    const CLASS: &'static str = "Host";

    fn create(_rt: &mut Runtime, _args: &Args) -> BridgeResult<Self> {
        Ok(Host)
    }

    fn methods(methods: &mut Methods<Self>) {
        methods.add("callback", |_, rt, args| {
            let bridge = rt
                .app_data::<Bridge>()
                .cloned()
                .ok_or_else(|| BridgeError::Argument("bridge not installed".into()))?;
            bridge.marshaler().call_value(rt, &args.get(0), &[], 0)
        });
    }
}

#[test]
fn test_nested_failure_is_reported_once() {
    let (mut state, sink) = state();
    state.expose::<Host>().unwrap();

    assert!(!state.do_string(
        "local h = Host:new()\nh:callback(function() error('inner') end)",
        "nested",
    ));

    let diagnostics = sink.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "nested:2: inner");
    assert!(diagnostics[0].trace.starts_with("stack traceback:"));
    assert_eq!(state.runtime().call_depth(), 0);
}

#[test]
fn test_nested_failure_caught_by_script_is_reported_once() {
    let (mut state, sink) = state();
    state.expose::<Host>().unwrap();

    let values = state
        .try_do_string(
            r#"
            local h = Host:new()
            local ok = pcall(h.callback, h, function() error('inner') end)
            return ok
            "#,
            "caught",
        )
        .unwrap();
    assert_eq!(values, vec![Value::Boolean(false)]);
    assert_eq!(sink.len(), 1);
}

// ============================================================================
// Fatal faults
// ============================================================================

struct Bomb;

impl Exposable for Bomb {
    const CLASS: &'static str = "Bomb";

    fn create(_rt: &mut Runtime, _args: &Args) -> BridgeResult<Self> {
        Ok(Bomb)
    }

    fn methods(methods: &mut Methods<Self>) {
        methods.add("explode", |_, _, _| panic!("kaboom"));
    }
}

#[test]
fn test_panic_becomes_fatal_and_state_survives() {
    let (mut state, sink) = state();
    state.expose::<Bomb>().unwrap();

    let err = state
        .try_do_string("local b = Bomb:new() b:explode()", "bomb")
        .unwrap_err();
    assert!(matches!(err, BridgeError::Fatal(ref message) if message == "kaboom"));
    assert_eq!(sink.diagnostics()[0].message, "PANIC: kaboom");
    assert_eq!(state.runtime().call_depth(), 0);

    assert!(state.do_string("after = 1", "after"));
    assert_eq!(state.runtime().get_global("after"), Value::from(1));
}

#[test]
fn test_close_tears_down_bridge() {
    let (mut state, _) = state();
    assert!(state.do_string("class('Short') obj = Short:new()", "short"));
    assert_eq!(state.bridge().owned_count(), 1);

    let bridge = state.bridge().clone();
    state.close();
    assert_eq!(bridge.owned_count(), 0);
    assert_eq!(bridge.class_count(), 0);
}
