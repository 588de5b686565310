//! Typed calls from the host into script methods.

use crate::error::{BridgeError, BridgeResult, ObjectError};
use crate::handle::ObjectHandle;
use crate::report::ErrorReporter;
use luna_engine::{RegistryKey, Runtime, Value};

/// One marshaled argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSpec {
    Number(f64),
    Text(String),
    /// A registered value, passed by its registry key
    ObjectRef(RegistryKey),
}

impl ArgSpec {
    /// Format tag of this kind: `n`, `s` or `o`.
    pub fn tag(&self) -> char {
        match self {
            ArgSpec::Number(_) => 'n',
            ArgSpec::Text(_) => 's',
            ArgSpec::ObjectRef(_) => 'o',
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ArgSpec::Number(_) => "number",
            ArgSpec::Text(_) => "string",
            ArgSpec::ObjectRef(_) => "object reference",
        }
    }

    fn to_value(&self, rt: &Runtime) -> Result<Value, ObjectError> {
        match self {
            ArgSpec::Number(n) => Ok(Value::Number(*n)),
            ArgSpec::Text(text) => Ok(Value::from(text.as_str())),
            ArgSpec::ObjectRef(key) => rt.registry_value(*key).ok_or_else(|| unknown_key(*key)),
        }
    }
}

fn unknown_key(key: RegistryKey) -> ObjectError {
    let error = ObjectError::UnknownKey(key);
    log::warn!("bridge: {}", error);
    error
}

impl From<f64> for ArgSpec {
    fn from(n: f64) -> Self {
        ArgSpec::Number(n)
    }
}

impl From<&str> for ArgSpec {
    fn from(text: &str) -> Self {
        ArgSpec::Text(text.to_string())
    }
}

impl From<String> for ArgSpec {
    fn from(text: String) -> Self {
        ArgSpec::Text(text)
    }
}

impl From<RegistryKey> for ArgSpec {
    fn from(key: RegistryKey) -> Self {
        ArgSpec::ObjectRef(key)
    }
}

impl From<&ObjectHandle> for ArgSpec {
    fn from(handle: &ObjectHandle) -> Self {
        ArgSpec::ObjectRef(handle.key())
    }
}

/// Check `args` against a tag string such as `"nso"`.
///
/// Every tag is validated before counts or kinds, so an unknown tag is
/// always reported as such.
pub fn parse_format(function: &str, format: &str, args: Vec<ArgSpec>) -> BridgeResult<Vec<ArgSpec>> {
    let format_error = |reason: String| {
        log::error!("bridge: format error in call to function {}, {}", function, reason);
        BridgeError::Format {
            function: function.to_string(),
            reason,
        }
    };

    if let Some(unknown) = format.chars().find(|tag| !matches!(tag, 'n' | 's' | 'o')) {
        return Err(format_error(format!("type {} unknown", unknown)));
    }

    let expected = format.chars().count();
    if expected != args.len() {
        return Err(format_error(format!(
            "format declares {} arguments but {} were supplied",
            expected,
            args.len()
        )));
    }

    for (position, (tag, arg)) in format.chars().zip(&args).enumerate() {
        if tag != arg.tag() {
            return Err(format_error(format!(
                "argument #{} is a {}, format expects '{}'",
                position + 1,
                arg.kind(),
                tag
            )));
        }
    }
    Ok(args)
}

/// Resolves and invokes script methods under the reporter's protected call.
#[derive(Clone)]
pub struct CallMarshaler {
    reporter: ErrorReporter,
}

impl CallMarshaler {
    pub fn new(reporter: ErrorReporter) -> Self {
        Self { reporter }
    }

    /// Call method `function` of the value registered under `target`.
    ///
    /// The receiver is passed first, then `args` in order. The result list
    /// is truncated or padded with nil to `expected` values.
    pub fn call_by_name(
        &self,
        rt: &mut Runtime,
        target: RegistryKey,
        function: &str,
        args: &[ArgSpec],
        expected: usize,
    ) -> BridgeResult<Vec<Value>> {
        let receiver = rt
            .registry_value(target)
            .ok_or_else(|| unknown_key(target))?;
        let method = rt
            .index(&receiver, &Value::from(function))
            .map_err(|error| self.reporter.fail(&error, None))?;
        if !rt.is_callable(&method) {
            log::debug!("bridge: method '{}' not found on registry key {}", function, target);
            return Err(BridgeError::MethodNotFound(function.to_string()));
        }

        let values = marshal(rt, args)?;
        self.invoke(rt, &method, Some(receiver), values, expected)
    }

    /// [`call_by_name`](Self::call_by_name) with arguments checked against
    /// a tag string first. Nothing is resolved when the format is invalid.
    pub fn call_with_format(
        &self,
        rt: &mut Runtime,
        target: RegistryKey,
        function: &str,
        format: &str,
        args: Vec<ArgSpec>,
        expected: usize,
    ) -> BridgeResult<Vec<Value>> {
        let args = parse_format(function, format, args)?;
        self.call_by_name(rt, target, function, &args, expected)
    }

    /// Call a function value with marshaled arguments and no receiver.
    pub fn call_value(
        &self,
        rt: &mut Runtime,
        function: &Value,
        args: &[ArgSpec],
        expected: usize,
    ) -> BridgeResult<Vec<Value>> {
        let values = marshal(rt, args)?;
        self.invoke(rt, function, None, values, expected)
    }

    /// Protected call of `function` with an optional receiver prepended.
    pub(crate) fn invoke(
        &self,
        rt: &mut Runtime,
        function: &Value,
        receiver: Option<Value>,
        args: Vec<Value>,
        expected: usize,
    ) -> BridgeResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len() + 1);
        values.extend(receiver);
        values.extend(args);

        let mut results = self.reporter.protected_call(rt, function, values)?;
        results.resize(expected, Value::Nil);
        Ok(results)
    }
}

fn marshal(rt: &Runtime, args: &[ArgSpec]) -> BridgeResult<Vec<Value>> {
    args.iter()
        .map(|arg| arg.to_value(rt).map_err(BridgeError::from))
        .collect()
}
