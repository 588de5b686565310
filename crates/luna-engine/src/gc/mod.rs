//! Garbage collection.
//!
//! Objects live in generational arenas ([`Heap`]). Collection is a plain
//! mark-sweep from the roots handed in by the runtime: the globals table and
//! every registry entry. Values held only by host code are not roots, which
//! is why hosts pin long-lived values in the registry.

pub mod collector;
pub mod heap;

pub use collector::GcStats;
pub use heap::{Closure, Function, Heap, NativeFunction, Table, Userdata};
