//! Protected calls, message handlers and tracebacks.

use luna_engine::{Runtime, Value};

fn run(source: &str, chunk: &str) -> Vec<Value> {
    let mut rt = Runtime::new();
    rt.exec(source, chunk).unwrap()
}

fn text(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

#[test]
fn test_pcall_returns_status_and_message() {
    let values = run("return pcall(function() error('boom') end)", "pc");
    assert_eq!(values, vec![Value::Boolean(false), Value::from("pc:1: boom")]);

    let values = run("return pcall(function(a, b) return a + b end, 2, 3)", "pc");
    assert_eq!(values, vec![Value::Boolean(true), Value::from(5)]);
}

#[test]
fn test_handler_sees_the_failing_frames() {
    let values = run(
        "local function inner() error('deep') end\n\
         local function outer() inner() end\n\
         return xpcall(outer, debug.traceback)",
        "tb",
    );
    assert_eq!(values[0], Value::Boolean(false));

    let trace = text(&values[1]);
    assert!(trace.starts_with("tb:1: deep\nstack traceback:\n\t[native]: in function 'error'"), "{}", trace);
    assert!(trace.contains("\n\ttb:1: in function 'inner'"), "{}", trace);
    assert!(trace.contains("\n\ttb:2: in function <tb:2>"), "{}", trace);
    assert!(trace.contains("in function 'xpcall'"), "{}", trace);
    assert!(trace.ends_with("\n\ttb:3: in main chunk"), "{}", trace);
}

#[test]
fn test_handler_runs_exactly_once() {
    let values = run(
        "count = 0\n\
         local function handler(m) count = count + 1 return m end\n\
         local function a() error('x') end\n\
         local function b() a() end\n\
         xpcall(b, handler)\n\
         return count",
        "once",
    );
    assert_eq!(values, vec![Value::from(1)]);
}

#[test]
fn test_error_inside_handler() {
    let values = run(
        "return xpcall(function() error('x') end, function() error('again') end)",
        "h",
    );
    assert_eq!(
        values,
        vec![Value::Boolean(false), Value::from("error in error handling")]
    );
}

#[test]
fn test_inner_pcall_shields_outer_handler() {
    let values = run(
        "count = 0\n\
         local function handler(m) count = count + 1 return m end\n\
         local function body()\n\
           local ok = pcall(error, 'inner')\n\
           error('outer')\n\
         end\n\
         local ok, e = xpcall(body, handler)\n\
         return count, e",
        "shield",
    );
    assert_eq!(values, vec![Value::from(1), Value::from("shield:5: outer")]);
}

#[test]
fn test_host_handler_appends_traceback() {
    let mut rt = Runtime::new();
    rt.exec("function fail() error('host boom') end", "host").unwrap();
    let fail = rt.get_global("fail");
    let handler = rt.message_handler();

    let err = rt.pcall_with_handler(&fail, Vec::new(), handler).unwrap_err();
    assert!(err.is_traced());
    let message = err.to_string();
    assert!(message.starts_with("host:1: host boom\nstack traceback:"), "{}", message);
    assert!(message.contains("in function <host:1>"), "{}", message);
    assert_eq!(rt.call_depth(), 0);
}

#[test]
fn test_handler_covers_calls_that_never_start() {
    let mut rt = Runtime::new();
    let handler = rt.message_handler();
    let err = rt
        .pcall_with_handler(&Value::Nil, Vec::new(), handler)
        .unwrap_err();
    assert!(err
        .to_string()
        .starts_with("attempt to call a nil value\nstack traceback:"));
}

#[test]
fn test_non_string_errors_pass_through_handler() {
    let values = run(
        "local t = { code = 7 }\n\
         local ok, e = xpcall(function() error(t) end, debug.traceback)\n\
         return e == t",
        "obj",
    );
    assert_eq!(values, vec![Value::Boolean(true)]);
}
