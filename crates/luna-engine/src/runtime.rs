//! The runtime facade.
//!
//! [`Runtime`] owns the heap, the globals table, the registry and the call
//! stack. Host code drives everything through it: loading chunks, calling
//! functions, reading and writing tables, pinning values and collecting
//! garbage.

use crate::error::{RuntimeError, RuntimeResult};
use crate::gc::{Closure, Function, GcStats, Heap, NativeFunction, Table, Userdata};
use crate::native::Args;
use crate::options::RuntimeOptions;
use crate::parser;
use crate::registry::{Registry, RegistryKey, ReleaseQueue};
use crate::stdlib;
use crate::value::{Key, TableRef, UserdataRef, Value};
use crate::vm::{render_traceback, CallFrame, Env};
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::io::{self, Write};
use std::path::Path;
use std::rc::{Rc, Weak};

/// An embedded script runtime.
pub struct Runtime {
    pub(crate) heap: Heap,
    pub(crate) globals: TableRef,
    pub(crate) registry: Registry,
    pub(crate) frames: Vec<CallFrame>,
    /// Message handlers of active protected calls, innermost last. `None`
    /// marks a plain `pcall`, which shields errors from outer handlers.
    pub(crate) handlers: Vec<Option<Value>>,
    pub(crate) options: RuntimeOptions,
    output: Box<dyn Write>,
    app_data: FxHashMap<TypeId, Box<dyn Any>>,
    gc_stats: GcStats,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with default options and the base library installed.
    pub fn new() -> Self {
        Self::build(RuntimeOptions::default())
    }

    pub fn with_options(options: RuntimeOptions) -> RuntimeResult<Self> {
        options.validate()?;
        Ok(Self::build(options))
    }

    fn build(options: RuntimeOptions) -> Self {
        let mut heap = Heap::new();
        let globals = heap.alloc_table(Table::new());
        let mut runtime = Self {
            heap,
            globals,
            registry: Registry::new(),
            frames: Vec::new(),
            handlers: Vec::new(),
            options,
            output: Box::new(io::stdout()),
            app_data: FxHashMap::default(),
            gc_stats: GcStats::default(),
        };
        stdlib::open(&mut runtime);
        runtime.set_global("_G", Value::Table(globals));
        runtime
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Redirect `print` and friends.
    pub fn set_output(&mut self, output: impl Write + 'static) {
        self.output = Box::new(output);
    }

    pub fn write_output(&mut self, text: &str) {
        if let Err(e) = self
            .output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush())
        {
            log::warn!("runtime: failed to write output: {}", e);
        }
    }

    // ========================================================================
    // Globals
    // ========================================================================

    pub fn globals(&self) -> TableRef {
        self.globals
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.heap
            .table(self.globals)
            .map(|globals| globals.get_str(name))
            .unwrap_or_default()
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        if let Ok(globals) = self.heap.table_mut(self.globals) {
            globals.set_key(Key::from(name), value);
        }
    }

    // ========================================================================
    // Object creation
    // ========================================================================

    pub fn create_table(&mut self) -> TableRef {
        self.heap.alloc_table(Table::new())
    }

    pub fn create_function<F>(&mut self, name: &str, callback: F) -> Value
    where
        F: Fn(&mut Runtime, Args) -> RuntimeResult<Vec<Value>> + 'static,
    {
        self.create_closure(name, Vec::new(), callback)
    }

    /// Create a native function that keeps `upvalues` reachable for as long
    /// as the function itself is.
    pub fn create_closure<F>(&mut self, name: &str, upvalues: Vec<Value>, callback: F) -> Value
    where
        F: Fn(&mut Runtime, Args) -> RuntimeResult<Vec<Value>> + 'static,
    {
        let native = NativeFunction {
            name: name.into(),
            callback: Rc::new(callback),
            upvalues: upvalues.into(),
        };
        Value::Function(self.heap.alloc_function(Function::Native(native)))
    }

    pub fn create_userdata(&mut self, type_name: &str, pointer: Weak<dyn Any>) -> UserdataRef {
        self.heap
            .alloc_userdata(Userdata::new(type_name.into(), pointer))
    }

    /// Create a native function and publish it as a global.
    pub fn register_function<F>(&mut self, name: &str, callback: F)
    where
        F: Fn(&mut Runtime, Args) -> RuntimeResult<Vec<Value>> + 'static,
    {
        let function = self.create_function(name, callback);
        self.set_global(name, function);
    }

    // ========================================================================
    // Raw table access
    // ========================================================================

    pub fn raw_get(&self, table: TableRef, key: &Value) -> RuntimeResult<Value> {
        Ok(self.heap.table(table)?.get(key))
    }

    pub fn raw_get_str(&self, table: TableRef, name: &str) -> RuntimeResult<Value> {
        Ok(self.heap.table(table)?.get_str(name))
    }

    pub fn raw_set(&mut self, table: TableRef, key: Value, value: Value) -> RuntimeResult<()> {
        self.heap.table_mut(table)?.set(&key, value)
    }

    pub fn raw_set_str(&mut self, table: TableRef, name: &str, value: Value) -> RuntimeResult<()> {
        self.heap.table_mut(table)?.set_key(Key::from(name), value);
        Ok(())
    }

    pub fn next(&self, table: TableRef, key: &Value) -> RuntimeResult<Option<(Value, Value)>> {
        self.heap.table(table)?.next(key)
    }

    /// Snapshot of a table's live entries in traversal order.
    pub fn table_entries(&self, table: TableRef) -> RuntimeResult<Vec<(Value, Value)>> {
        Ok(self
            .heap
            .table(table)?
            .iter()
            .map(|(k, v)| (k, v.clone()))
            .collect())
    }

    pub fn table_border(&self, table: TableRef) -> RuntimeResult<usize> {
        Ok(self.heap.table(table)?.border())
    }

    // ========================================================================
    // Metatables and indexing
    // ========================================================================

    pub fn metatable_of(&self, value: &Value) -> Option<TableRef> {
        match value {
            Value::Table(t) => self.heap.table(*t).ok()?.metatable,
            Value::Userdata(u) => self.heap.userdata(*u).ok()?.metatable,
            _ => None,
        }
    }

    pub fn set_metatable(&mut self, value: &Value, metatable: Option<TableRef>) -> RuntimeResult<()> {
        match value {
            Value::Table(t) => self.heap.table_mut(*t)?.metatable = metatable,
            Value::Userdata(u) => self.heap.userdata_mut(*u)?.metatable = metatable,
            other => {
                return Err(RuntimeError::raise(format!(
                    "cannot set metatable of a {} value",
                    other.type_name()
                )))
            }
        }
        Ok(())
    }

    /// Raw lookup of `name` in the metatable of `value`.
    pub fn metamethod(&self, value: &Value, name: &str) -> Option<Value> {
        let metatable = self.metatable_of(value)?;
        let handler = self.heap.table(metatable).ok()?.get_str(name);
        (!handler.is_nil()).then_some(handler)
    }

    pub(crate) fn is_indexable(&self, value: &Value) -> bool {
        matches!(value, Value::Table(_))
            || self.metamethod(value, "__index").is_some()
            || self.metamethod(value, "__newindex").is_some()
    }

    pub fn is_callable(&self, value: &Value) -> bool {
        matches!(value, Value::Function(_)) || self.metamethod(value, "__call").is_some()
    }

    /// `object[key]`, following `__index` through tables and functions.
    pub fn index(&mut self, object: &Value, key: &Value) -> RuntimeResult<Value> {
        let mut current = object.clone();

        for _ in 0..self.options.max_index_chain {
            let handler = match &current {
                Value::Table(t) => {
                    let value = self.heap.table(*t)?.get(key);
                    if !value.is_nil() {
                        return Ok(value);
                    }
                    match self.metamethod(&current, "__index") {
                        Some(handler) => handler,
                        None => return Ok(Value::Nil),
                    }
                }
                other => match self.metamethod(other, "__index") {
                    Some(handler) => handler,
                    None => {
                        return Err(self.error_at(format!(
                            "attempt to index a {} value",
                            other.type_name()
                        )))
                    }
                },
            };

            if let Value::Function(_) = handler {
                let results =
                    self.call_value(handler, vec![current, key.clone()], Some("__index".into()))?;
                return Ok(results.into_iter().next().unwrap_or_default());
            }
            current = handler;
        }

        Err(self.error_at("'__index' chain too long; possible loop"))
    }

    /// `object[key] = value`, following `__newindex` for absent keys.
    pub fn set_index(&mut self, object: &Value, key: Value, value: Value) -> RuntimeResult<()> {
        let mut current = object.clone();

        for _ in 0..self.options.max_index_chain {
            let handler = match &current {
                Value::Table(t) => {
                    let table = *t;
                    let absent = self.heap.table(table)?.get(&key).is_nil();
                    match self.metamethod(&current, "__newindex") {
                        Some(handler) if absent => handler,
                        _ => {
                            let result = self.heap.table_mut(table)?.set(&key, value);
                            return result.map_err(|error| self.locate(error));
                        }
                    }
                }
                other => match self.metamethod(other, "__newindex") {
                    Some(handler) => handler,
                    None => {
                        return Err(self.error_at(format!(
                            "attempt to index a {} value",
                            other.type_name()
                        )))
                    }
                },
            };

            if let Value::Function(_) = handler {
                self.call_value(handler, vec![current, key, value], Some("__newindex".into()))?;
                return Ok(());
            }
            current = handler;
        }

        Err(self.error_at("'__newindex' chain too long; possible loop"))
    }

    pub fn userdata(&self, userdata: UserdataRef) -> RuntimeResult<&Userdata> {
        self.heap.userdata(userdata)
    }

    pub fn userdata_mut(&mut self, userdata: UserdataRef) -> RuntimeResult<&mut Userdata> {
        self.heap.userdata_mut(userdata)
    }

    // ========================================================================
    // Loading and calling
    // ========================================================================

    /// Compile `source` into a function value without running it.
    pub fn load(&mut self, source: &str, chunk: &str) -> RuntimeResult<Value> {
        let parsed = parser::parse(source, chunk)?;
        let closure = Closure {
            body: parsed.body,
            chunk: parsed.name,
            env: Env::new(),
        };
        Ok(Value::Function(
            self.heap.alloc_function(Function::Script(Rc::new(closure))),
        ))
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> RuntimeResult<Value> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| RuntimeError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.load(&source, &path.display().to_string())
    }

    /// Load and run a chunk.
    pub fn exec(&mut self, source: &str, chunk: &str) -> RuntimeResult<Vec<Value>> {
        let function = self.load(source, chunk)?;
        self.call(&function, Vec::new())
    }

    /// Call a function value. Errors propagate unhandled.
    pub fn call(&mut self, function: &Value, args: Vec<Value>) -> RuntimeResult<Vec<Value>> {
        self.maybe_collect(function, &args);
        self.call_value(function.clone(), args, None)
    }

    /// Call a function, shielding the error from any enclosing message
    /// handler.
    pub fn pcall(&mut self, function: &Value, args: Vec<Value>) -> RuntimeResult<Vec<Value>> {
        self.handlers.push(None);
        let result = self.call_value(function.clone(), args, None);
        self.handlers.pop();
        result
    }

    /// Call a function with a message handler. The handler runs at the point
    /// the error was raised, before any frame is unwound, and its result
    /// becomes the error value.
    pub fn pcall_with_handler(
        &mut self,
        function: &Value,
        args: Vec<Value>,
        handler: Value,
    ) -> RuntimeResult<Vec<Value>> {
        self.handlers.push(Some(handler.clone()));
        let result = self.call_value(function.clone(), args, None);
        self.handlers.pop();

        match result {
            Err(RuntimeError::Raised {
                value,
                traced: false,
                ..
            }) => Err(self.run_handler(handler, value)),
            other => other,
        }
    }

    // ========================================================================
    // Tracebacks
    // ========================================================================

    /// Render the current call stack, skipping the `level` innermost frames.
    pub fn traceback(&self, message: Option<&str>, level: usize) -> String {
        render_traceback(&self.frames, message, level)
    }

    /// A message handler that appends a traceback to string errors.
    pub fn message_handler(&mut self) -> Value {
        self.create_function("traceback", |rt, args| {
            let message = args.get(0);
            let text = match &message {
                Value::Nil => None,
                other => match other.to_text() {
                    Some(text) => Some(text),
                    None => return Ok(vec![message]),
                },
            };
            let trace = rt.traceback(text.as_deref(), 1);
            Ok(vec![Value::from(trace)])
        })
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// Discard call state left behind by a call that unwound without
    /// returning (a panic in a native function).
    pub fn recover(&mut self) {
        if !self.frames.is_empty() || !self.handlers.is_empty() {
            log::warn!(
                "runtime: discarding {} frames and {} handlers after an aborted call",
                self.frames.len(),
                self.handlers.len()
            );
        }
        self.frames.clear();
        self.handlers.clear();
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Pin a value so it survives collection; returns its key.
    pub fn register(&mut self, value: Value) -> RegistryKey {
        self.registry.insert(value)
    }

    pub fn registry_value(&self, key: RegistryKey) -> Option<Value> {
        self.registry.get(key).cloned()
    }

    pub fn unregister(&mut self, key: RegistryKey) -> Option<Value> {
        self.registry.release(key)
    }

    pub fn release_queue(&self) -> ReleaseQueue {
        self.registry.release_queue()
    }

    pub fn registry_len(&mut self) -> usize {
        self.registry.drain_pending();
        self.registry.len()
    }

    // ========================================================================
    // Garbage collection
    // ========================================================================

    /// Run a full collection. Only allowed when no call is in progress.
    pub fn collect_garbage(&mut self) -> RuntimeResult<usize> {
        if !self.frames.is_empty() {
            return Err(RuntimeError::CollectDuringCall);
        }
        self.registry.drain_pending();
        let roots = self.roots();
        Ok(self.heap.collect(roots, &mut self.gc_stats))
    }

    fn maybe_collect(&mut self, function: &Value, args: &[Value]) {
        let Some(threshold) = self.options.gc_threshold else {
            return;
        };
        if !self.frames.is_empty() || self.heap.allocated_since_collection() < threshold {
            return;
        }
        self.registry.drain_pending();
        let mut roots = self.roots();
        roots.push(function.clone());
        roots.extend(args.iter().cloned());
        self.heap.collect(roots, &mut self.gc_stats);
    }

    fn roots(&self) -> Vec<Value> {
        let mut roots = vec![Value::Table(self.globals)];
        roots.extend(self.registry.values().cloned());
        roots.extend(self.handlers.iter().flatten().cloned());
        roots
    }

    pub fn gc_stats(&self) -> &GcStats {
        &self.gc_stats
    }

    pub fn object_count(&self) -> usize {
        self.heap.object_count()
    }

    /// Whether a reference value still points at a live object.
    pub fn is_alive(&self, value: &Value) -> bool {
        self.heap.contains(value)
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// String conversion honouring `__tostring`.
    pub fn tostring(&mut self, value: &Value) -> RuntimeResult<Rc<str>> {
        if let Some(handler) = self.metamethod(value, "__tostring") {
            let results = self.call_value(handler, vec![value.clone()], Some("__tostring".into()))?;
            return match results.into_iter().next() {
                Some(Value::String(s)) => Ok(s),
                _ => Err(self.error_at("'__tostring' must return a string")),
            };
        }
        Ok(match value {
            Value::String(s) => s.clone(),
            other => other.to_string().into(),
        })
    }

    // ========================================================================
    // Application data
    // ========================================================================

    /// Attach host state to the runtime, keyed by type. Returns the value it
    /// replaced.
    pub fn set_app_data<T: 'static>(&mut self, data: T) -> Option<T> {
        self.app_data
            .insert(TypeId::of::<T>(), Box::new(data))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn app_data<T: 'static>(&self) -> Option<&T> {
        self.app_data.get(&TypeId::of::<T>())?.downcast_ref()
    }

    pub fn app_data_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.app_data.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    pub fn remove_app_data<T: 'static>(&mut self) -> Option<T> {
        self.app_data
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }
}

/// Shared in-memory sink for runtime output.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Rc<RefCell<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
