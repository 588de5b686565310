//! Object handles: the glue between a native object and its script table.
//!
//! An instance is a table whose `__this` slot holds a userdata. The userdata
//! carries only a weak pointer to the native object, so once the handle is
//! destroyed every stale script reference resolves to
//! [`ObjectError::Released`] instead of a dangling pointer.

use crate::class::ClassTable;
use crate::error::{BridgeResult, ObjectError};
use crate::NATIVE_SLOT;
use luna_engine::{RegistryKey, ReleaseQueue, Runtime, TableRef, UserdataRef, Value};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

// ============================================================================
// Native pointers
// ============================================================================

/// Type-erased, shared pointer to a bridged native object.
///
/// The object lives in a `RefCell<T>`; [`NativePtr::downcast`] recovers the
/// typed cell.
#[derive(Clone)]
pub struct NativePtr {
    object: Rc<dyn Any>,
    type_name: Rc<str>,
}

impl NativePtr {
    pub fn new<T: 'static>(value: T, type_name: &str) -> Self {
        Self {
            object: Rc::new(RefCell::new(value)),
            type_name: type_name.into(),
        }
    }

    /// Name of the class the object was created for.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast<T: 'static>(&self) -> Result<Rc<RefCell<T>>, ObjectError> {
        Rc::clone(&self.object)
            .downcast::<RefCell<T>>()
            .map_err(|_| ObjectError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                actual: self.type_name.to_string(),
            })
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &NativePtr) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.object), Rc::as_ptr(&other.object))
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn Any> {
        Rc::downgrade(&self.object)
    }
}

impl fmt::Debug for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativePtr({} @{:p})", self.type_name, Rc::as_ptr(&self.object))
    }
}

/// Native side of instances of classes with no native type.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptObject {
    pub class: Rc<str>,
}

// ============================================================================
// Handles
// ============================================================================

/// One bridged object: native pointer, script table and registry pin.
///
/// Dropping a live handle schedules its registry entry for release; use
/// [`ObjectHandle::destroy`] to release it immediately.
pub struct ObjectHandle {
    instance: TableRef,
    userdata: UserdataRef,
    key: RegistryKey,
    native: NativePtr,
    releases: ReleaseQueue,
    live: bool,
}

impl ObjectHandle {
    /// Build the instance table for `native`, link it to `class` and pin it.
    pub fn create(rt: &mut Runtime, class: &ClassTable, native: NativePtr) -> BridgeResult<Self> {
        let instance = rt.create_table();
        let userdata = rt.create_userdata(native.type_name(), native.downgrade());
        rt.raw_set_str(instance, NATIVE_SLOT, Value::Userdata(userdata))?;
        rt.set_metatable(&Value::Table(instance), Some(class.table()))?;
        let key = rt.register(Value::Table(instance));

        log::debug!("bridge: created {} object (registry key {})", class.name(), key);
        Ok(Self {
            instance,
            userdata,
            key,
            native,
            releases: rt.release_queue(),
            live: true,
        })
    }

    pub fn instance(&self) -> TableRef {
        self.instance
    }

    pub fn value(&self) -> Value {
        Value::Table(self.instance)
    }

    pub fn key(&self) -> RegistryKey {
        self.key
    }

    pub fn native(&self) -> &NativePtr {
        &self.native
    }

    /// Release the registry entry, then detach the native object from its
    /// script table. Returns the native pointer so the caller decides when
    /// the object itself goes away.
    pub fn destroy(mut self, rt: &mut Runtime) -> NativePtr {
        self.live = false;
        if rt.unregister(self.key).is_none() {
            log::warn!("bridge: registry entry {} was already released", self.key);
        }
        if let Ok(userdata) = rt.userdata_mut(self.userdata) {
            userdata.release();
        }
        log::debug!("bridge: destroyed {} object (registry key {})", self.native.type_name(), self.key);
        self.native.clone()
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        if self.live {
            self.releases.schedule(self.key);
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("key", &self.key)
            .field("native", &self.native)
            .finish()
    }
}

/// Retrieve the native pointer behind a script instance.
///
/// Never panics: every malformed or stale value yields an [`ObjectError`],
/// which is also logged.
pub fn from_handle(rt: &Runtime, value: &Value) -> Result<NativePtr, ObjectError> {
    let result = native_of(rt, value);
    if let Err(error) = &result {
        log::warn!("bridge: unable to retrieve native object: {}", error);
    }
    result
}

fn native_of(rt: &Runtime, value: &Value) -> Result<NativePtr, ObjectError> {
    let table = value
        .as_table()
        .ok_or(ObjectError::NotATable(value.type_name()))?;
    let slot = rt
        .raw_get_str(table, NATIVE_SLOT)
        .map_err(|_| ObjectError::Released)?;

    let userdata = match slot {
        Value::Userdata(userdata) => userdata,
        Value::Nil => return Err(ObjectError::MissingSlot),
        other => return Err(ObjectError::InvalidSlot(other.type_name())),
    };
    let userdata = rt.userdata(userdata).map_err(|_| ObjectError::Released)?;
    let object = userdata.pointer().ok_or(ObjectError::Released)?;
    Ok(NativePtr {
        object,
        type_name: userdata.type_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassRegistry;

    #[test]
    fn test_downcast_checks_type() {
        let ptr = NativePtr::new(5u32, "Counter");
        assert_eq!(*ptr.downcast::<u32>().unwrap().borrow(), 5);

        let err = ptr.downcast::<String>().unwrap_err();
        assert!(matches!(err, ObjectError::TypeMismatch { .. }));
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let mut rt = Runtime::new();
        assert_eq!(
            from_handle(&rt, &Value::from(1)).unwrap_err(),
            ObjectError::NotATable("number")
        );

        let table = rt.create_table();
        assert_eq!(
            from_handle(&rt, &Value::Table(table)).unwrap_err(),
            ObjectError::MissingSlot
        );

        rt.raw_set_str(table, NATIVE_SLOT, Value::from("fake")).unwrap();
        assert_eq!(
            from_handle(&rt, &Value::Table(table)).unwrap_err(),
            ObjectError::InvalidSlot("string")
        );
    }

    #[test]
    fn test_dropped_handle_is_released_lazily() {
        let mut rt = Runtime::new();
        let mut classes = ClassRegistry::default();
        let class = classes.define(&mut rt, "Thing", None).unwrap();
        let baseline = rt.registry_len();

        let handle = ObjectHandle::create(&mut rt, &class, NativePtr::new((), "Thing")).unwrap();
        let value = handle.value();
        assert_eq!(rt.registry_len(), baseline + 1);

        drop(handle);
        assert_eq!(rt.registry_len(), baseline);
        assert_eq!(from_handle(&rt, &value).unwrap_err(), ObjectError::Released);
    }
}
