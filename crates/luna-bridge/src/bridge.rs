//! The bridge: class definition, object lifecycle and method calls.

use crate::class::{ClassRegistry, ClassTable, Factory};
use crate::error::{BridgeError, BridgeResult, ObjectError};
use crate::handle::{from_handle, NativePtr, ObjectHandle, ScriptObject};
use crate::marshal::{ArgSpec, CallMarshaler};
use crate::options::BridgeOptions;
use crate::report::ErrorReporter;
use luna_engine::{format_number, Args, RegistryKey, Runtime, RuntimeError, RuntimeResult, TableRef, Value};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

// ============================================================================
// Exposed native types
// ============================================================================

/// A native type that scripts can instantiate and call into.
pub trait Exposable: Sized + 'static {
    /// Name of the class published for this type
    const CLASS: &'static str;

    /// Build the native object for `Class.new(...)`. `args` are the
    /// constructor arguments, without the class receiver.
    fn create(rt: &mut Runtime, args: &Args) -> BridgeResult<Self>;

    /// Register the native methods of the class.
    fn methods(_methods: &mut Methods<Self>) {}
}

type Method<T> = Rc<dyn Fn(&mut T, &mut Runtime, &Args) -> BridgeResult<Vec<Value>>>;

/// Native methods collected by [`Exposable::methods`].
pub struct Methods<T> {
    entries: Vec<(String, Method<T>)>,
}

impl<T> Methods<T> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Add a method. Its `Args` exclude the receiver.
    pub fn add<F>(&mut self, name: &str, method: F) -> &mut Self
    where
        F: Fn(&mut T, &mut Runtime, &Args) -> BridgeResult<Vec<Value>> + 'static,
    {
        self.entries.push((name.to_string(), Rc::new(method)));
        self
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Composition root tying classes, handles and calls together.
///
/// Cheap to clone; every clone refers to the same state. One bridge is
/// installed per runtime and stored in the runtime's app data, where the
/// script-callable entry points find it.
#[derive(Clone)]
pub struct Bridge {
    inner: Rc<BridgeInner>,
}

struct BridgeInner {
    options: BridgeOptions,
    classes: RefCell<ClassRegistry>,
    /// Objects created by script `new`, alive until script `delete`
    owned: RefCell<FxHashMap<TableRef, ObjectHandle>>,
    marshaler: CallMarshaler,
    reporter: ErrorReporter,
}

impl Bridge {
    /// Publish the class namespace into `rt`.
    ///
    /// Installing twice into the same runtime returns the bridge already
    /// there.
    pub fn install(
        rt: &mut Runtime,
        options: BridgeOptions,
        reporter: ErrorReporter,
    ) -> BridgeResult<Bridge> {
        if let Some(existing) = rt.app_data::<Bridge>() {
            log::debug!("bridge: already installed");
            return Ok(existing.clone());
        }

        let namespace = rt.create_table();
        let define = rt.create_function(&options.define_function, define_class_entry);
        rt.raw_set_str(namespace, &options.define_function, define.clone())?;
        let callable = rt.create_table();
        rt.raw_set_str(callable, "__call", define)?;
        rt.set_metatable(&Value::Table(namespace), Some(callable))?;
        rt.set_global(&options.namespace, Value::Table(namespace));

        log::debug!(
            "bridge: installed as '{}.{}'",
            options.namespace,
            options.define_function
        );
        let bridge = Bridge {
            inner: Rc::new(BridgeInner {
                options,
                classes: RefCell::new(ClassRegistry::default()),
                owned: RefCell::new(FxHashMap::default()),
                marshaler: CallMarshaler::new(reporter.clone()),
                reporter,
            }),
        };
        rt.set_app_data(bridge.clone());
        Ok(bridge)
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }

    pub fn marshaler(&self) -> &CallMarshaler {
        &self.inner.marshaler
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.inner.reporter
    }

    // ------------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------------

    /// Define and publish class `name`, with `new` and `delete` entry points
    /// bound to it.
    pub fn define_class(
        &self,
        rt: &mut Runtime,
        name: &str,
        superclass: Option<&ClassTable>,
    ) -> BridgeResult<ClassTable> {
        let class = self.inner.classes.borrow_mut().define(rt, name, superclass)?;

        let new = rt.create_closure("new", vec![class.value()], new_entry);
        class.set_method(rt, "new", new)?;
        let delete = rt.create_function("delete", delete_entry);
        class.set_method(rt, "delete", delete)?;
        Ok(class)
    }

    /// Define `name` extending the class published as `superclass`.
    pub fn define_class_named_super(
        &self,
        rt: &mut Runtime,
        name: &str,
        superclass: &str,
    ) -> BridgeResult<ClassTable> {
        let parent = self.resolve(rt, superclass)?;
        self.define_class(rt, name, Some(&parent))
    }

    pub fn resolve(&self, rt: &Runtime, name: &str) -> BridgeResult<ClassTable> {
        self.inner.classes.borrow().resolve(rt, name)
    }

    pub fn class_count(&self) -> usize {
        self.inner.classes.borrow().len()
    }

    /// Expose `T` under [`Exposable::CLASS`]: instances created from the
    /// class (and its subclasses) get a native `T`, and `T`'s methods become
    /// class methods. An already published class of that name is reused.
    pub fn expose_class<T: Exposable>(&self, rt: &mut Runtime) -> BridgeResult<ClassTable> {
        let class = match self.resolve(rt, T::CLASS) {
            Ok(class) => class,
            Err(_) => self.define_class(rt, T::CLASS, None)?,
        };

        let factory: Factory = Rc::new(|rt: &mut Runtime, args: &Args| -> BridgeResult<NativePtr> {
            let object = T::create(rt, args)?;
            Ok(NativePtr::new(object, T::CLASS))
        });
        self.inner.classes.borrow_mut().set_factory(&class, factory);

        let mut methods = Methods::new();
        T::methods(&mut methods);
        for (name, method) in methods.entries {
            let entry = rt.create_function(&name, move |rt, args| {
                let native = from_handle(rt, &args.get(0)).map_err(BridgeError::from)?;
                let cell = native.downcast::<T>().map_err(BridgeError::from)?;
                let mut object = cell
                    .try_borrow_mut()
                    .map_err(|_| BridgeError::from(ObjectError::AlreadyBorrowed))?;
                let rest = Args::new(
                    args.function().into(),
                    args.values().get(1..).unwrap_or_default().to_vec(),
                    Rc::from(Vec::new()),
                );
                Ok(method(&mut *object, rt, &rest)?)
            });
            class.set_method(rt, &name, entry)?;
        }

        log::debug!("bridge: exposed native type as class '{}'", T::CLASS);
        Ok(class)
    }

    // ------------------------------------------------------------------------
    // Object lifecycle
    // ------------------------------------------------------------------------

    /// Create a bridge-owned instance of `class`, as script `new` does.
    ///
    /// The native object comes from the nearest factory in the class chain.
    /// A failing constructor is reported but the instance is still returned.
    pub fn construct(
        &self,
        rt: &mut Runtime,
        class: &ClassTable,
        args: Vec<Value>,
    ) -> BridgeResult<TableRef> {
        let factory = self.inner.classes.borrow().factory_for(rt, class);
        let native = match factory {
            Some(factory) => {
                let native_args = Args::new("new".into(), args.clone(), Rc::from(Vec::new()));
                factory(rt, &native_args)?
            }
            None => NativePtr::new(
                ScriptObject {
                    class: class.name().into(),
                },
                class.name(),
            ),
        };

        let handle = ObjectHandle::create(rt, class, native)?;
        let instance = handle.instance();
        let key = handle.key();
        self.inner.owned.borrow_mut().insert(instance, handle);

        self.run_constructor(rt, class, key, args);
        Ok(instance)
    }

    /// Create a host-owned instance of `class` around `native`.
    ///
    /// The handle is not tracked by the bridge and scripts cannot delete it;
    /// dropping or destroying the handle ends the object.
    pub fn construct_with(
        &self,
        rt: &mut Runtime,
        class: &ClassTable,
        native: NativePtr,
        args: Vec<Value>,
    ) -> BridgeResult<ObjectHandle> {
        let handle = ObjectHandle::create(rt, class, native)?;
        self.run_constructor(rt, class, handle.key(), args);
        Ok(handle)
    }

    /// [`construct_with`](Self::construct_with) for an exposed type.
    pub fn construct_native<T: Exposable>(
        &self,
        rt: &mut Runtime,
        object: T,
        args: Vec<Value>,
    ) -> BridgeResult<ObjectHandle> {
        let class = self.resolve(rt, T::CLASS)?;
        self.construct_with(rt, &class, NativePtr::new(object, T::CLASS), args)
    }

    /// Run the constructor of a fresh instance: the method named after the
    /// first class in the chain that defines a callable method with its own
    /// name.
    fn run_constructor(&self, rt: &mut Runtime, class: &ClassTable, key: RegistryKey, args: Vec<Value>) {
        let constructor = class.chain(rt).into_iter().find_map(|owner| {
            let method = owner.method(rt, owner.name());
            if method.is_nil() {
                None
            } else if rt.is_callable(&method) {
                Some(method)
            } else {
                log::debug!("bridge: '{}.{}' is not callable, skipping", owner.name(), owner.name());
                None
            }
        });
        let Some(constructor) = constructor else {
            return;
        };

        let receiver = rt.registry_value(key);
        if let Err(error) = self.inner.marshaler.invoke(rt, &constructor, receiver, args, 0) {
            log::warn!(
                "bridge: constructor of '{}' failed, instance is partially initialized: {}",
                class.name(),
                error
            );
        }
    }

    /// Delete a bridge-owned instance.
    ///
    /// Deleting twice yields [`ObjectError::Released`]; deleting an object
    /// the host owns yields [`ObjectError::NotOwned`].
    pub fn delete(&self, rt: &mut Runtime, instance: &Value) -> BridgeResult<NativePtr> {
        from_handle(rt, instance)?;
        let table = instance
            .as_table()
            .ok_or(ObjectError::NotATable(instance.type_name()))?;

        let handle = self.inner.owned.borrow_mut().remove(&table);
        match handle {
            Some(handle) => Ok(handle.destroy(rt)),
            None => {
                log::warn!("bridge: refusing to delete a host-owned object");
                Err(ObjectError::NotOwned.into())
            }
        }
    }

    /// Registry key of a bridge-owned instance.
    pub fn handle_key(&self, instance: TableRef) -> Option<RegistryKey> {
        self.inner.owned.borrow().get(&instance).map(ObjectHandle::key)
    }

    pub fn owned_count(&self) -> usize {
        self.inner.owned.borrow().len()
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    /// Call method `name` of a host-owned object.
    pub fn call_method(
        &self,
        rt: &mut Runtime,
        handle: &ObjectHandle,
        name: &str,
        args: &[ArgSpec],
        expected: usize,
    ) -> BridgeResult<Vec<Value>> {
        self.inner
            .marshaler
            .call_by_name(rt, handle.key(), name, args, expected)
    }

    /// Call method `name` of a bridge-owned instance.
    pub fn call_method_on(
        &self,
        rt: &mut Runtime,
        instance: TableRef,
        name: &str,
        args: &[ArgSpec],
        expected: usize,
    ) -> BridgeResult<Vec<Value>> {
        let key = self
            .handle_key(instance)
            .ok_or(ObjectError::NotOwned)?;
        self.inner.marshaler.call_by_name(rt, key, name, args, expected)
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Destroy every bridge-owned object, forget all classes and remove the
    /// namespace.
    pub fn close(&self, rt: &mut Runtime) {
        let handles: Vec<ObjectHandle> = self
            .inner
            .owned
            .borrow_mut()
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        let destroyed = handles.len();
        for handle in handles {
            handle.destroy(rt);
        }
        self.inner.classes.borrow_mut().clear(rt);
        rt.set_global(&self.inner.options.namespace, Value::Nil);
        rt.remove_app_data::<Bridge>();
        log::debug!("bridge: closed, {} objects destroyed", destroyed);
    }
}

// ============================================================================
// Script entry points
// ============================================================================

fn installed(rt: &Runtime) -> RuntimeResult<Bridge> {
    rt.app_data::<Bridge>()
        .cloned()
        .ok_or_else(|| RuntimeError::raise("class bridge is not installed"))
}

/// `class:defineClass(name [, superclass])`, also reached as
/// `class(name [, superclass])`. The namespace is always the first argument.
fn define_class_entry(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let bridge = installed(rt)?;
    if !(2..=3).contains(&args.len()) {
        return Err(BridgeError::Argument(format!("Expected 1-2 arguments, got {}", args.len())).into());
    }

    let name = match args.get(1) {
        Value::String(name) => name,
        Value::Number(n) => Rc::from(format_number(n)),
        other => {
            return Err(BridgeError::Argument(format!(
                "class name must be a string, got a {} value",
                other.type_name()
            ))
            .into())
        }
    };
    let superclass = if args.len() == 3 {
        let value = args.get(2);
        match ClassTable::from_value(rt, &value) {
            Some(class) => Some(class),
            None => {
                return Err(BridgeError::Argument(format!(
                    "superclass of '{}' must be a class, got a {} value",
                    name,
                    value.type_name()
                ))
                .into())
            }
        }
    } else {
        None
    };

    let class = bridge.define_class(rt, &name, superclass.as_ref())?;
    Ok(vec![class.value()])
}

/// `Class:new(...)` or `Class.new(...)`.
fn new_entry(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let bridge = installed(rt)?;
    let bound = ClassTable::from_value(rt, &args.upvalue(0))
        .ok_or_else(|| RuntimeError::raise("'new' is not bound to a class"))?;
    // A class argument is the receiver only when it is the bound class or
    // one of its subclasses. Any other value goes to the constructor.
    let receiver = ClassTable::from_value(rt, &args.get(0)).filter(|class| class.chain(rt).contains(&bound));
    let (class, ctor_args) = match receiver {
        Some(class) => (class, args.values()[1..].to_vec()),
        None => (bound, args.into_values()),
    };
    let instance = bridge.construct(rt, &class, ctor_args)?;
    Ok(vec![Value::Table(instance)])
}

/// `obj:delete()` or `Class.delete(obj)`: the instance is the last argument.
fn delete_entry(rt: &mut Runtime, args: Args) -> RuntimeResult<Vec<Value>> {
    let bridge = installed(rt)?;
    let instance = args.values().last().cloned().unwrap_or_default();
    bridge.delete(rt, &instance)?;
    Ok(Vec::new())
}
