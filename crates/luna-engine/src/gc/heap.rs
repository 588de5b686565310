//! Heap objects and their arenas.

use crate::error::{RuntimeError, RuntimeResult};
use crate::native::NativeCallback;
use crate::parser::ast::FunctionBody;
use crate::value::{FunctionRef, Key, TableRef, UserdataRef, Value};
use crate::vm::scope::Env;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use slotmap::SlotMap;
use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

/// Associative array with an optional metatable.
///
/// Assigning `nil` to an existing key leaves a tombstone so that a traversal
/// with `next` can continue past it; tombstones are dropped when the
/// collector compacts the table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: IndexMap<Key, Value, FxBuildHasher>,
    pub metatable: Option<TableRef>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Value) -> Value {
        match Key::from_value(key) {
            Some(key) => self.entries.get(&key).cloned().unwrap_or_default(),
            None => Value::Nil,
        }
    }

    pub fn get_str(&self, name: &str) -> Value {
        self.entries
            .get(&Key::from(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Raw assignment. Fails for `nil` and NaN keys.
    pub fn set(&mut self, key: &Value, value: Value) -> RuntimeResult<()> {
        let key = match Key::from_value(key) {
            Some(key) => key,
            None if key.is_nil() => return Err(RuntimeError::raise("table index is nil")),
            None => return Err(RuntimeError::raise("table index is NaN")),
        };
        self.set_key(key, value);
        Ok(())
    }

    pub fn set_key(&mut self, key: Key, value: Value) {
        if value.is_nil() {
            if let Some(slot) = self.entries.get_mut(&key) {
                *slot = Value::Nil;
            }
        } else {
            self.entries.insert(key, value);
        }
    }

    /// Entry following `key` in traversal order; `nil` starts the traversal.
    pub fn next(&self, key: &Value) -> RuntimeResult<Option<(Value, Value)>> {
        let start = if key.is_nil() {
            0
        } else {
            let index = Key::from_value(key)
                .and_then(|k| self.entries.get_index_of(&k))
                .ok_or_else(|| RuntimeError::raise("invalid key to 'next'"))?;
            index + 1
        };

        Ok(self
            .entries
            .iter()
            .skip(start)
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.to_value(), v.clone())))
    }

    /// Length of the array part: the first border `n` with `t[n + 1] == nil`.
    pub fn border(&self) -> usize {
        let mut n = 0;
        while !self.get(&Value::Number((n + 1) as f64)).is_nil() {
            n += 1;
        }
        n
    }

    /// Live entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Value, &Value)> + '_ {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.to_value(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|v| !v.is_nil()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn compact(&mut self) {
        self.entries.retain(|_, v| !v.is_nil());
    }

    pub(crate) fn trace(&self, out: &mut Vec<Value>) {
        for (key, value) in &self.entries {
            out.push(key.to_value());
            out.push(value.clone());
        }
        if let Some(mt) = self.metatable {
            out.push(Value::Table(mt));
        }
    }
}

/// A script closure.
pub struct Closure {
    pub body: Rc<FunctionBody>,
    pub chunk: Rc<str>,
    pub env: Env,
}

/// A host function callable from scripts.
///
/// Values the callback needs across calls live in `upvalues` so that the
/// collector can see them.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    pub callback: NativeCallback,
    pub upvalues: Rc<[Value]>,
}

#[derive(Clone)]
pub enum Function {
    Script(Rc<Closure>),
    Native(NativeFunction),
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Script(closure) => write!(
                f,
                "Function::Script({}:{})",
                closure.chunk, closure.body.line
            ),
            Function::Native(native) => write!(f, "Function::Native({})", native.name),
        }
    }
}

/// Opaque host data visible to scripts.
///
/// The heap holds only a weak pointer; the host owns the allocation. A
/// released userdata keeps its identity but no longer yields a pointer.
pub struct Userdata {
    pub type_name: Rc<str>,
    pointer: Option<Weak<dyn Any>>,
    pub metatable: Option<TableRef>,
}

impl Userdata {
    pub fn new(type_name: Rc<str>, pointer: Weak<dyn Any>) -> Self {
        Self {
            type_name,
            pointer: Some(pointer),
            metatable: None,
        }
    }

    /// The host object, if it is still alive and not released.
    pub fn pointer(&self) -> Option<Rc<dyn Any>> {
        self.pointer.as_ref()?.upgrade()
    }

    pub fn is_released(&self) -> bool {
        self.pointer.is_none()
    }

    /// Detach the host object permanently.
    pub fn release(&mut self) {
        self.pointer = None;
    }
}

/// Arenas for all collectable objects.
#[derive(Default)]
pub struct Heap {
    pub(crate) tables: SlotMap<TableRef, Table>,
    pub(crate) functions: SlotMap<FunctionRef, Function>,
    pub(crate) userdata: SlotMap<UserdataRef, Userdata>,
    /// Objects allocated since the last collection
    pub(crate) allocated: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_table(&mut self, table: Table) -> TableRef {
        self.allocated += 1;
        self.tables.insert(table)
    }

    pub fn alloc_function(&mut self, function: Function) -> FunctionRef {
        self.allocated += 1;
        self.functions.insert(function)
    }

    pub fn alloc_userdata(&mut self, userdata: Userdata) -> UserdataRef {
        self.allocated += 1;
        self.userdata.insert(userdata)
    }

    pub fn table(&self, table: TableRef) -> RuntimeResult<&Table> {
        self.tables.get(table).ok_or_else(|| collected("table"))
    }

    pub fn table_mut(&mut self, table: TableRef) -> RuntimeResult<&mut Table> {
        self.tables.get_mut(table).ok_or_else(|| collected("table"))
    }

    pub fn function(&self, function: FunctionRef) -> RuntimeResult<&Function> {
        self.functions.get(function).ok_or_else(|| collected("function"))
    }

    pub fn userdata(&self, userdata: UserdataRef) -> RuntimeResult<&Userdata> {
        self.userdata.get(userdata).ok_or_else(|| collected("userdata"))
    }

    pub fn userdata_mut(&mut self, userdata: UserdataRef) -> RuntimeResult<&mut Userdata> {
        self.userdata
            .get_mut(userdata)
            .ok_or_else(|| collected("userdata"))
    }

    /// Whether a reference still points at a live object.
    pub fn contains(&self, value: &Value) -> bool {
        match value {
            Value::Table(t) => self.tables.contains_key(*t),
            Value::Function(f) => self.functions.contains_key(*f),
            Value::Userdata(u) => self.userdata.contains_key(*u),
            _ => true,
        }
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.tables.len() + self.functions.len() + self.userdata.len()
    }

    pub fn allocated_since_collection(&self) -> usize {
        self.allocated
    }
}

fn collected(kind: &str) -> RuntimeError {
    RuntimeError::raise(format!("attempt to use a collected {}", kind))
}
