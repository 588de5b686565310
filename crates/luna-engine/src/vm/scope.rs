//! Lexical environments.
//!
//! An environment is a persistent linked list of bindings. Each `local`
//! statement prepends a binding, so a closure captures exactly the variables
//! that were visible where it was created, and later declarations in the same
//! block never leak into it. Each binding owns a shared cell so that
//! assignments through any closure are observed by all of them.

use crate::value::Value;
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::rc::Rc;

pub struct Binding {
    name: Rc<str>,
    cell: Rc<RefCell<Value>>,
    parent: Option<Rc<Binding>>,
}

#[derive(Clone, Default)]
pub struct Env {
    head: Option<Rc<Binding>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the environment with a new variable.
    pub fn bind(&self, name: Rc<str>, value: Value) -> Env {
        Env {
            head: Some(Rc::new(Binding {
                name,
                cell: Rc::new(RefCell::new(value)),
                parent: self.head.clone(),
            })),
        }
    }

    /// Innermost binding with the given name.
    pub fn lookup(&self, name: &str) -> Option<Rc<RefCell<Value>>> {
        let mut current = self.head.as_ref();
        while let Some(binding) = current {
            if binding.name.as_ref() == name {
                return Some(binding.cell.clone());
            }
            current = binding.parent.as_ref();
        }
        None
    }

    /// Push every value reachable from this environment, visiting each
    /// binding once even when chains are shared between closures.
    pub(crate) fn trace(&self, visited: &mut FxHashSet<*const Binding>, out: &mut Vec<Value>) {
        let mut current = self.head.as_ref();
        while let Some(binding) = current {
            if !visited.insert(Rc::as_ptr(binding)) {
                break;
            }
            out.push(binding.cell.borrow().clone());
            current = binding.parent.as_ref();
        }
    }
}
