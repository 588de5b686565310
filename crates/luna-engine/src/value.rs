//! Dynamic values.
//!
//! A [`Value`] is either an immediate (nil, boolean, number, string) or a
//! reference into the [`Heap`](crate::gc::Heap). References are generational
//! arena keys, so a reference that outlives its object is detected on access
//! instead of aliasing a newer object.

use slotmap::{new_key_type, Key as _};
use std::fmt;
use std::rc::Rc;

new_key_type! {
    /// Reference to a table on the heap.
    pub struct TableRef;
    /// Reference to a function on the heap.
    pub struct FunctionRef;
    /// Reference to a userdata block on the heap.
    pub struct UserdataRef;
}

/// A script-observable value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Table(TableRef),
    Function(FunctionRef),
    Userdata(UserdataRef),
}

impl Value {
    /// Name of the value's type as reported by `type()`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(_) => "userdata",
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `nil` and `false` is true.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<TableRef> {
        match self {
            Value::Table(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionRef> {
        match self {
            Value::Function(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric view with string coercion, as used by arithmetic.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => parse_number(s),
            _ => None,
        }
    }

    /// Printable identity of a heap reference.
    pub fn address(&self) -> Option<u64> {
        let data = match self {
            Value::Table(t) => t.data(),
            Value::Function(f) => f.data(),
            Value::Userdata(u) => u.data(),
            _ => return None,
        };
        Some(data.as_ffi() & 0xffff_ffff)
    }

    /// String view with number coercion, as used by concatenation.
    pub fn to_text(&self) -> Option<Rc<str>> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n).into()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            other => write!(
                f,
                "{}: 0x{:08x}",
                other.type_name(),
                other.address().unwrap_or_default()
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<FunctionRef> for Value {
    fn from(f: FunctionRef) -> Self {
        Value::Function(f)
    }
}

impl From<UserdataRef> for Value {
    fn from(u: UserdataRef) -> Self {
        Value::Userdata(u)
    }
}

/// Hashable table key.
///
/// Numbers are stored by bit pattern with `-0.0` folded into `0.0`; `nil` and
/// NaN cannot be keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Boolean(bool),
    Number(u64),
    String(Rc<str>),
    Table(TableRef),
    Function(FunctionRef),
    Userdata(UserdataRef),
}

impl Key {
    pub fn from_value(value: &Value) -> Option<Key> {
        Some(match value {
            Value::Nil => return None,
            Value::Number(n) if n.is_nan() => return None,
            Value::Number(n) => Key::Number(if *n == 0.0 { 0f64.to_bits() } else { n.to_bits() }),
            Value::Boolean(b) => Key::Boolean(*b),
            Value::String(s) => Key::String(s.clone()),
            Value::Table(t) => Key::Table(*t),
            Value::Function(f) => Key::Function(*f),
            Value::Userdata(u) => Key::Userdata(*u),
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Boolean(b) => Value::Boolean(*b),
            Key::Number(bits) => Value::Number(f64::from_bits(*bits)),
            Key::String(s) => Value::String(s.clone()),
            Key::Table(t) => Value::Table(*t),
            Key::Function(f) => Value::Function(*f),
            Key::Userdata(u) => Value::Userdata(*u),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.into())
    }
}

/// Format a number the way `tostring` does (`%.14g`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == n.trunc() && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }

    let exponent = n.abs().log10().floor() as i32;
    if !(-4..14).contains(&exponent) {
        let scientific = format!("{:.13e}", n);
        match scientific.split_once('e') {
            Some((mantissa, exp)) => {
                let exp: i32 = exp.parse().unwrap_or(0);
                format!(
                    "{}e{}{:02}",
                    trim_fraction(mantissa),
                    if exp < 0 { '-' } else { '+' },
                    exp.abs()
                )
            }
            None => scientific,
        }
    } else {
        let decimals = (13 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, n))
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Parse a numeric literal the way `tonumber` does: surrounding whitespace
/// is ignored and hexadecimal integers are accepted.
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        let value = u64::from_str_radix(hex, 16).ok()? as f64;
        return Some(if negative { -value } else { value });
    }
    // Rust accepts "inf" and "nan"; scripts don't.
    if !text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    text.parse().ok()
}
