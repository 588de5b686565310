//! Host functions.
//!
//! A native function receives the runtime and its arguments and returns its
//! results. Argument checking helpers produce the same "bad argument"
//! messages scripts see from the base library.

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::Runtime;
use crate::value::{TableRef, Value};
use std::rc::Rc;

/// Callback type of native functions.
pub type NativeCallback = Rc<dyn Fn(&mut Runtime, Args) -> RuntimeResult<Vec<Value>>>;

/// Arguments of one native call.
#[derive(Debug, Clone)]
pub struct Args {
    function: Rc<str>,
    values: Vec<Value>,
    upvalues: Rc<[Value]>,
}

impl Args {
    pub fn new(function: Rc<str>, values: Vec<Value>, upvalues: Rc<[Value]>) -> Self {
        Self {
            function,
            values,
            upvalues,
        }
    }

    /// Name the function was registered under.
    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument `index` (0-based), `nil` when absent.
    pub fn get(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or_default()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Upvalue `index` captured when the function was created.
    pub fn upvalue(&self, index: usize) -> Value {
        self.upvalues.get(index).cloned().unwrap_or_default()
    }

    pub fn check_any(&self, index: usize) -> RuntimeResult<Value> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| self.bad_argument(index, "value expected"))
    }

    pub fn check_number(&self, index: usize) -> RuntimeResult<f64> {
        self.get(index)
            .to_number()
            .ok_or_else(|| self.type_error(index, "number"))
    }

    pub fn check_string(&self, index: usize) -> RuntimeResult<Rc<str>> {
        self.get(index)
            .to_text()
            .ok_or_else(|| self.type_error(index, "string"))
    }

    pub fn check_table(&self, index: usize) -> RuntimeResult<TableRef> {
        self.get(index)
            .as_table()
            .ok_or_else(|| self.type_error(index, "table"))
    }

    pub fn opt_number(&self, index: usize, default: f64) -> RuntimeResult<f64> {
        if self.get(index).is_nil() {
            Ok(default)
        } else {
            self.check_number(index)
        }
    }

    pub fn type_error(&self, index: usize, expected: &str) -> RuntimeError {
        let got = match self.values.get(index) {
            Some(value) => value.type_name(),
            None => "no value",
        };
        self.bad_argument(index, &format!("{} expected, got {}", expected, got))
    }

    pub fn bad_argument(&self, index: usize, message: &str) -> RuntimeError {
        RuntimeError::raise(format!(
            "bad argument #{} to '{}' ({})",
            index + 1,
            self.function,
            message
        ))
    }
}
