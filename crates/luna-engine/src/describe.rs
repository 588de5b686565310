//! Human-readable dumps of values and of the call stack.
//!
//! These back the `dump` and `dumpStack` diagnostics. Neither function can
//! fail: stale references and cycles are rendered inline.

use crate::runtime::Runtime;
use crate::value::{format_number, TableRef, Value};
use rustc_hash::FxHashSet;

const INDENT: &str = "    ";

/// Render a value. Tables are expanded recursively.
pub fn describe(rt: &Runtime, value: &Value) -> String {
    let mut out = String::new();
    let mut visited = FxHashSet::default();
    write_value(rt, value, 0, &mut visited, &mut out);
    out
}

/// Render the active call frames, innermost first.
pub fn describe_stack(rt: &Runtime) -> String {
    let frames = rt.frames();
    if frames.is_empty() {
        return "<empty stack>".to_string();
    }

    let mut out = format!("call stack ({} frames):", frames.len());
    for (i, frame) in frames.iter().rev().enumerate() {
        out.push_str(&format!("\n{}[{}] {}", INDENT, i + 1, frame));
    }
    out
}

fn write_value(
    rt: &Runtime,
    value: &Value,
    depth: usize,
    visited: &mut FxHashSet<TableRef>,
    out: &mut String,
) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::String(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        Value::Table(table) => write_table(rt, *table, depth, visited, out),
        other => out.push_str(&opaque(other)),
    }
}

fn write_table(
    rt: &Runtime,
    table: TableRef,
    depth: usize,
    visited: &mut FxHashSet<TableRef>,
    out: &mut String,
) {
    if !visited.insert(table) {
        out.push_str("<cycle>");
        return;
    }
    let entries = match rt.table_entries(table) {
        Ok(entries) => entries,
        Err(_) => {
            out.push_str("<collected table>");
            return;
        }
    };
    if entries.is_empty() {
        out.push_str("{}");
        return;
    }

    out.push_str("{\n");
    for (key, value) in &entries {
        out.push_str(&INDENT.repeat(depth + 1));
        match key {
            Value::String(name) if is_identifier(name) => out.push_str(name),
            other => {
                out.push('[');
                write_value(rt, other, depth + 1, visited, out);
                out.push(']');
            }
        }
        out.push_str(" = ");
        if key.as_str() == Some("__index") {
            out.push_str("...");
        } else {
            write_value(rt, value, depth + 1, visited, out);
        }
        out.push_str(",\n");
    }
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
}

fn opaque(value: &Value) -> String {
    format!(
        "<{} @0x{:08x}>",
        value.type_name(),
        value.address().unwrap_or_default()
    )
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
