//! Base library.

use crate::error::{RuntimeError, RuntimeResult};
use crate::gc::Table;
use crate::native::Args;
use crate::runtime::Runtime;
use crate::value::{parse_number, Key, Value};

/// Install the base library into the globals of `rt`.
pub(crate) fn open(rt: &mut Runtime) {
    rt.register_function("print", print);
    rt.register_function("type", type_of);
    rt.register_function("tostring", tostring);
    rt.register_function("tonumber", tonumber);
    rt.register_function("error", error);
    rt.register_function("assert", assert);
    rt.register_function("pcall", pcall);
    rt.register_function("xpcall", xpcall);
    rt.register_function("select", select);
    rt.register_function("rawget", rawget);
    rt.register_function("rawset", rawset);
    rt.register_function("rawequal", rawequal);
    rt.register_function("setmetatable", setmetatable);
    rt.register_function("getmetatable", getmetatable);
    rt.register_function("unpack", unpack);

    let next_fn = rt.create_function("next", next);
    rt.set_global("next", next_fn.clone());
    let pairs_fn = rt.create_closure("pairs", vec![next_fn], |_, args| {
        let table = args.check_table(0)?;
        Ok(vec![args.upvalue(0), Value::Table(table), Value::Nil])
    });
    rt.set_global("pairs", pairs_fn);

    let ipairs_step = rt.create_function("ipairs_step", ipairs_step);
    let ipairs_fn = rt.create_closure("ipairs", vec![ipairs_step], |_, args| {
        let table = args.check_table(0)?;
        Ok(vec![args.upvalue(0), Value::Table(table), Value::from(0)])
    });
    rt.set_global("ipairs", ipairs_fn);

    let mut debug = Table::new();
    debug.set_key(Key::from("traceback"), rt.create_function("traceback", traceback));
    let debug = rt.heap.alloc_table(debug);
    rt.set_global("debug", Value::Table(debug));
}

fn print(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let mut line = String::new();
    for (i, value) in args.values().iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        line.push_str(&rt.tostring(value)?);
    }
    line.push('\n');
    rt.write_output(&line);
    Ok(Vec::new())
}

fn type_of(_rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let value = args.check_any(0)?;
    Ok(vec![Value::from(value.type_name())])
}

fn tostring(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let value = args.check_any(0)?;
    Ok(vec![Value::String(rt.tostring(&value)?)])
}

fn tonumber(_rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let value = args.check_any(0)?;
    let base = args.opt_number(1, 10.0)?;

    if base == 10.0 {
        let number = match &value {
            Value::Number(n) => Some(*n),
            Value::String(s) => parse_number(s),
            _ => None,
        };
        return Ok(vec![number.map(Value::Number).unwrap_or_default()]);
    }

    if !(2.0..=36.0).contains(&base) {
        return Err(args.bad_argument(1, "base out of range"));
    }
    let text = args.check_string(0)?;
    let parsed = i64::from_str_radix(text.trim(), base as u32)
        .ok()
        .map(|n| Value::Number(n as f64));
    Ok(vec![parsed.unwrap_or_default()])
}

/// `error(message, level)`. String messages get the position of the function
/// `level` frames up the stack.
fn error(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let value = args.get(0);
    let level = args.opt_number(1, 1.0)? as usize;

    if let (Value::String(message), true) = (&value, level > 0) {
        let frames = rt.frames();
        let position = frames
            .len()
            .checked_sub(level + 1)
            .and_then(|i| frames.get(i))
            .filter(|frame| !frame.is_native())
            .map(|frame| frame.location());
        if let Some(position) = position {
            return Err(RuntimeError::raise(format!("{}: {}", position, message)));
        }
    }

    Err(RuntimeError::from_value(value))
}

fn assert(_rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let condition = args.check_any(0)?;
    if condition.is_truthy() {
        return Ok(args.into_values());
    }
    match args.get(1) {
        Value::Nil => Err(RuntimeError::raise("assertion failed!")),
        message => Err(RuntimeError::from_value(message)),
    }
}

fn pcall(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let function = args.check_any(0)?;
    let rest = args.into_values().into_iter().skip(1).collect();
    Ok(protected(rt.pcall(&function, rest)))
}

fn xpcall(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let function = args.check_any(0)?;
    let handler = args.check_any(1)?;
    let rest = args.into_values().into_iter().skip(2).collect();
    Ok(protected(rt.pcall_with_handler(&function, rest, handler)))
}

fn protected(result: RuntimeResult<Vec<Value>>) -> Vec<Value> {
    match result {
        Ok(mut values) => {
            values.insert(0, Value::Boolean(true));
            values
        }
        Err(error) => vec![Value::Boolean(false), error.value()],
    }
}

fn select(_rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let rest = args.len().saturating_sub(1);
    if args.get(0).as_str() == Some("#") {
        return Ok(vec![Value::from(rest)]);
    }

    let n = args.check_number(0)? as i64;
    let start = if n < 0 {
        match (rest as i64).checked_add(n) {
            Some(start) if start >= 0 => start as usize,
            _ => return Err(args.bad_argument(0, "index out of range")),
        }
    } else if n == 0 {
        return Err(args.bad_argument(0, "index out of range"));
    } else {
        (n - 1) as usize
    };

    Ok(args.into_values().into_iter().skip(1 + start).collect())
}

fn next(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let table = args.check_table(0)?;
    match rt.next(table, &args.get(1))? {
        Some((key, value)) => Ok(vec![key, value]),
        None => Ok(vec![Value::Nil]),
    }
}

fn ipairs_step(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let table = args.check_table(0)?;
    let index = args.check_number(1)? + 1.0;
    let value = rt.raw_get(table, &Value::Number(index))?;
    if value.is_nil() {
        return Ok(vec![Value::Nil]);
    }
    Ok(vec![Value::Number(index), value])
}

fn rawget(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let table = args.check_table(0)?;
    Ok(vec![rt.raw_get(table, &args.get(1))?])
}

fn rawset(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let table = args.check_table(0)?;
    rt.raw_set(table, args.get(1), args.get(2))?;
    Ok(vec![Value::Table(table)])
}

fn rawequal(_rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    Ok(vec![Value::Boolean(args.get(0) == args.get(1))])
}

fn setmetatable(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let table = args.check_table(0)?;
    let metatable = match args.get(1) {
        Value::Nil => None,
        Value::Table(mt) => Some(mt),
        _ => return Err(args.type_error(1, "nil or table")),
    };
    rt.set_metatable(&Value::Table(table), metatable)?;
    Ok(vec![Value::Table(table)])
}

fn getmetatable(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let value = args.check_any(0)?;
    Ok(vec![rt
        .metatable_of(&value)
        .map(Value::Table)
        .unwrap_or_default()])
}

fn unpack(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let table = args.check_table(0)?;
    let first = args.opt_number(1, 1.0)? as i64;
    let last = match args.get(2) {
        Value::Nil => rt.table_border(table)? as i64,
        _ => args.check_number(2)? as i64,
    };

    let mut values = Vec::new();
    for i in first..=last {
        values.push(rt.raw_get(table, &Value::Number(i as f64))?);
    }
    Ok(values)
}

/// `debug.traceback([message [, level]])`
fn traceback(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let message = args.get(0);
    let text = match &message {
        Value::Nil => None,
        other => match other.to_text() {
            Some(text) => Some(text),
            None => return Ok(vec![message]),
        },
    };
    let level = args.opt_number(1, 1.0)?.max(0.0) as usize;
    Ok(vec![Value::from(rt.traceback(text.as_deref(), level))])
}

#[cfg(test)]
mod tests {
    use crate::runtime::{OutputBuffer, Runtime};
    use crate::value::Value;

    fn eval(source: &str) -> Vec<Value> {
        Runtime::new().exec(source, "test").unwrap()
    }

    #[test]
    fn test_type_and_tostring() {
        let values = eval("return type(1), type('a'), type({}), type(print), tostring(12.5)");
        assert_eq!(
            values,
            vec![
                Value::from("number"),
                Value::from("string"),
                Value::from("table"),
                Value::from("function"),
                Value::from("12.5"),
            ]
        );
    }

    #[test]
    fn test_tonumber() {
        let values = eval("return tonumber('0x10'), tonumber(' 7 '), tonumber('z'), tonumber('ff', 16)");
        assert_eq!(
            values,
            vec![
                Value::Number(16.0),
                Value::Number(7.0),
                Value::Nil,
                Value::Number(255.0)
            ]
        );
    }

    #[test]
    fn test_error_levels() {
        let values = eval(
            "local ok, a = pcall(error, 'plain', 0)\n\
             local function f() error('here') end\n\
             local ok2, b = pcall(f)\n\
             return a, b",
        );
        assert_eq!(values[0], Value::from("plain"));
        assert_eq!(values[1], Value::from("test:2: here"));
    }

    #[test]
    fn test_error_with_table_value() {
        let values = eval("local t = {} local ok, e = pcall(error, t) return ok, e == t");
        assert_eq!(values, vec![Value::Boolean(false), Value::Boolean(true)]);
    }

    #[test]
    fn test_assert() {
        let values = eval("return pcall(assert, false), select(2, pcall(assert, nil, 'custom'))");
        assert_eq!(values[0], Value::Boolean(false));
        assert_eq!(values[1], Value::from("custom"));
        assert_eq!(eval("return assert(1, 2)"), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn test_select() {
        assert_eq!(eval("return select('#', 1, 2, 3)"), vec![Value::from(3)]);
        assert_eq!(
            eval("return select(2, 'a', 'b', 'c')"),
            vec![Value::from("b"), Value::from("c")]
        );
        assert_eq!(eval("return select(-1, 'a', 'b')"), vec![Value::from("b")]);
    }

    #[test]
    fn test_pairs_and_ipairs() {
        let values = eval(
            "local t = { 10, 20, 30, x = 1 }\n\
             local n, sum = 0, 0\n\
             for k, v in pairs(t) do n = n + 1 end\n\
             for i, v in ipairs(t) do sum = sum + v end\n\
             return n, sum",
        );
        assert_eq!(values, vec![Value::from(4), Value::from(60)]);
    }

    #[test]
    fn test_raw_access_bypasses_metatables() {
        let values = eval(
            "local t = setmetatable({}, { __index = function() return 'meta' end })\n\
             return t.x, rawget(t, 'x'), rawequal(t, t)",
        );
        assert_eq!(values, vec![Value::from("meta"), Value::Nil, Value::Boolean(true)]);
    }

    #[test]
    fn test_unpack() {
        assert_eq!(
            eval("return unpack({1, 2, 3})"),
            vec![Value::from(1), Value::from(2), Value::from(3)]
        );
    }

    #[test]
    fn test_print_uses_tostring_metamethod() {
        let mut rt = Runtime::new();
        let buffer = OutputBuffer::new();
        rt.set_output(buffer.clone());
        rt.exec(
            "print(setmetatable({}, { __tostring = function() return 'custom' end }))",
            "t",
        )
        .unwrap();
        assert_eq!(buffer.contents(), "custom\n");
    }

    #[test]
    fn test_debug_traceback() {
        let values = eval("local function f() return debug.traceback('msg') end return f()");
        let trace = values[0].as_str().unwrap().to_string();
        assert!(trace.starts_with("msg\nstack traceback:\n\ttest:1: in function 'f'"));
        assert!(trace.ends_with("in main chunk"));
    }
}
