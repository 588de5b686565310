//! Class tables and the class registry.
//!
//! A class is a plain runtime table that doubles as its own metatable:
//! `__index` points back at the table, and `__class` holds the class name.
//! Inheritance is a separate metatable `{ __index = superclass }` on the
//! class table, so method lookups on an instance walk
//! instance -> class -> superclass -> ... through the runtime's own `__index`
//! machinery.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::NativePtr;
use crate::CLASS_NAME_FIELD;
use luna_engine::{Args, RegistryKey, Runtime, RuntimeResult, TableRef, Value};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Allocates the native object for a new instance.
pub type Factory = Rc<dyn Fn(&mut Runtime, &Args) -> BridgeResult<NativePtr>>;

// ============================================================================
// ClassTable
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ClassTable {
    name: Rc<str>,
    table: TableRef,
}

impl ClassTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> TableRef {
        self.table
    }

    pub fn value(&self) -> Value {
        Value::Table(self.table)
    }

    /// Accept `value` if it is class-shaped: a table with a string
    /// `__class` field whose `__index` is the table itself.
    pub fn from_value(rt: &Runtime, value: &Value) -> Option<Self> {
        let table = value.as_table()?;
        let name = match rt.raw_get_str(table, CLASS_NAME_FIELD).ok()? {
            Value::String(name) => name,
            _ => return None,
        };
        let index = rt.raw_get_str(table, "__index").ok()?;
        (index == Value::Table(table)).then_some(Self { name, table })
    }

    pub fn superclass(&self, rt: &Runtime) -> Option<ClassTable> {
        let link = rt.metatable_of(&self.value())?;
        let parent = rt.raw_get_str(link, "__index").ok()?;
        Self::from_value(rt, &parent)
    }

    /// This class followed by its ancestors, nearest first.
    ///
    /// Bounded by the runtime's index-chain limit; a chain that loops back
    /// on itself stops at the first repeated class.
    pub fn chain(&self, rt: &Runtime) -> Vec<ClassTable> {
        let limit = rt.options().max_index_chain;
        let mut chain = vec![self.clone()];
        while chain.len() < limit {
            let Some(parent) = chain.last().and_then(|class| class.superclass(rt)) else {
                break;
            };
            if chain.iter().any(|class| class.table == parent.table) {
                break;
            }
            chain.push(parent);
        }
        chain
    }

    /// A method stored on this class itself (nil if absent).
    pub fn method(&self, rt: &Runtime, name: &str) -> Value {
        rt.raw_get_str(self.table, name).unwrap_or_default()
    }

    pub fn set_method(&self, rt: &mut Runtime, name: &str, method: Value) -> RuntimeResult<()> {
        rt.raw_set_str(self.table, name, method)
    }

    /// Walk the chain once, returning the first class defining `name` and
    /// the value it defines.
    pub fn resolve_method(&self, rt: &Runtime, name: &str) -> Option<(ClassTable, Value)> {
        self.chain(rt).into_iter().find_map(|class| {
            let method = class.method(rt, name);
            (!method.is_nil()).then_some((class, method))
        })
    }
}

// ============================================================================
// ClassRegistry
// ============================================================================

/// Every class defined through the bridge, with the factories of exposed
/// native types.
#[derive(Default)]
pub struct ClassRegistry {
    classes: FxHashMap<Rc<str>, (ClassTable, RegistryKey)>,
    factories: FxHashMap<TableRef, Factory>,
}

impl ClassRegistry {
    /// Create a class table and publish it as global `name`.
    ///
    /// Redefinition replaces the global and the registry record; instances
    /// of the previous class keep their old metatable.
    pub fn define(
        &mut self,
        rt: &mut Runtime,
        name: &str,
        superclass: Option<&ClassTable>,
    ) -> BridgeResult<ClassTable> {
        let table = rt.create_table();
        rt.raw_set_str(table, CLASS_NAME_FIELD, Value::from(name))?;
        rt.raw_set_str(table, "__index", Value::Table(table))?;

        if let Some(parent) = superclass {
            let link = rt.create_table();
            rt.raw_set_str(link, "__index", parent.value())?;
            rt.set_metatable(&Value::Table(table), Some(link))?;
        }

        let class = ClassTable {
            name: name.into(),
            table,
        };
        rt.set_global(name, class.value());
        let key = rt.register(class.value());

        if let Some((replaced, previous)) = self.classes.insert(class.name.clone(), (class.clone(), key)) {
            rt.unregister(previous);
            self.prune_factory(rt, &replaced);
            log::debug!("bridge: class '{}' redefined", name);
        } else {
            log::debug!(
                "bridge: defined class '{}'{}",
                name,
                superclass
                    .map(|parent| format!(" extending '{}'", parent.name()))
                    .unwrap_or_default()
            );
        }
        Ok(class)
    }

    /// The class currently published as global `name`.
    pub fn resolve(&self, rt: &Runtime, name: &str) -> BridgeResult<ClassTable> {
        ClassTable::from_value(rt, &rt.get_global(name))
            .ok_or_else(|| BridgeError::Name(name.to_string()))
    }

    /// The class most recently defined under `name` through this registry.
    pub fn get(&self, name: &str) -> Option<&ClassTable> {
        self.classes.get(name).map(|(class, _)| class)
    }

    pub fn set_factory(&mut self, class: &ClassTable, factory: Factory) {
        self.factories.insert(class.table, factory);
    }

    /// Forget the factory of a replaced class unless a class still defined
    /// here inherits from it.
    fn prune_factory(&mut self, rt: &Runtime, replaced: &ClassTable) {
        if !self.factories.contains_key(&replaced.table) {
            return;
        }
        let inherited = self
            .classes
            .values()
            .any(|(class, _)| class.chain(rt).contains(replaced));
        if !inherited {
            self.factories.remove(&replaced.table);
            log::debug!("bridge: dropped factory of replaced class '{}'", replaced.name());
        }
    }

    pub fn factory_count(&self) -> usize {
        self.factories.len()
    }

    /// The factory of the nearest class in `class`'s chain that has one.
    pub fn factory_for(&self, rt: &Runtime, class: &ClassTable) -> Option<Factory> {
        class
            .chain(rt)
            .iter()
            .find_map(|class| self.factories.get(&class.table).cloned())
    }

    /// Drop every record and release the class pins.
    pub fn clear(&mut self, rt: &mut Runtime) {
        for (_, (_, key)) in self.classes.drain() {
            rt.unregister(key);
        }
        self.factories.clear();
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
