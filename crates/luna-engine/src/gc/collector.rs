//! Mark-sweep collection over the heap arenas.

use super::heap::{Function, Heap};
use crate::value::{FunctionRef, TableRef, UserdataRef, Value};
use crate::vm::scope::Binding;
use rustc_hash::FxHashSet;
use std::time::{Duration, Instant};

/// GC statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Objects freed by the last collection
    pub last_freed: usize,

    /// Objects alive after the last collection
    pub live_objects: usize,

    /// Total pause time
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,
}

#[derive(Default)]
struct Marks {
    tables: FxHashSet<TableRef>,
    functions: FxHashSet<FunctionRef>,
    userdata: FxHashSet<UserdataRef>,
    bindings: FxHashSet<*const Binding>,
}

impl Heap {
    /// Run a full collection. Returns the number of objects freed.
    pub(crate) fn collect(&mut self, roots: Vec<Value>, stats: &mut GcStats) -> usize {
        let start = Instant::now();

        let marks = self.mark(roots);
        let freed = self.sweep(&marks);

        let duration = start.elapsed();
        stats.collections += 1;
        stats.objects_freed += freed;
        stats.last_freed = freed;
        stats.live_objects = self.object_count();
        stats.last_pause_time = duration;
        stats.total_pause_time += duration;
        self.allocated = 0;

        log::debug!(
            "gc: freed {} objects, {} alive ({:?})",
            freed,
            stats.live_objects,
            duration
        );
        freed
    }

    fn mark(&self, roots: Vec<Value>) -> Marks {
        let mut marks = Marks::default();
        let mut pending = roots;

        while let Some(value) = pending.pop() {
            match value {
                Value::Table(table) => {
                    if marks.tables.insert(table) {
                        if let Some(table) = self.tables.get(table) {
                            table.trace(&mut pending);
                        }
                    }
                }
                Value::Function(function) => {
                    if marks.functions.insert(function) {
                        match self.functions.get(function) {
                            Some(Function::Native(native)) => {
                                pending.extend(native.upvalues.iter().cloned());
                            }
                            Some(Function::Script(closure)) => {
                                closure.env.trace(&mut marks.bindings, &mut pending);
                            }
                            None => {}
                        }
                    }
                }
                Value::Userdata(userdata) => {
                    if marks.userdata.insert(userdata) {
                        if let Some(mt) = self.userdata.get(userdata).and_then(|u| u.metatable) {
                            pending.push(Value::Table(mt));
                        }
                    }
                }
                _ => {}
            }
        }

        marks
    }

    fn sweep(&mut self, marks: &Marks) -> usize {
        let before = self.object_count();

        self.tables.retain(|key, _| marks.tables.contains(&key));
        self.functions.retain(|key, _| marks.functions.contains(&key));
        self.userdata.retain(|key, _| marks.userdata.contains(&key));

        for (_, table) in self.tables.iter_mut() {
            table.compact();
        }

        before - self.object_count()
    }
}

#[cfg(test)]
mod tests {
    use super::super::heap::Table;
    use super::*;

    #[test]
    fn test_unreachable_tables_are_freed() {
        let mut heap = Heap::new();
        let root = heap.alloc_table(Table::new());
        let child = heap.alloc_table(Table::new());
        let garbage = heap.alloc_table(Table::new());
        heap.table_mut(root)
            .unwrap()
            .set(&Value::from("child"), Value::Table(child))
            .unwrap();

        let mut stats = GcStats::default();
        let freed = heap.collect(vec![Value::Table(root)], &mut stats);

        assert_eq!(freed, 1);
        assert!(heap.table(child).is_ok());
        assert!(heap.table(garbage).is_err());
        assert_eq!(stats.collections, 1);
        assert_eq!(stats.live_objects, 2);
    }

    #[test]
    fn test_metatables_and_keys_are_traced() {
        let mut heap = Heap::new();
        let root = heap.alloc_table(Table::new());
        let meta = heap.alloc_table(Table::new());
        let key = heap.alloc_table(Table::new());
        {
            let table = heap.table_mut(root).unwrap();
            table.metatable = Some(meta);
            table.set(&Value::Table(key), Value::Boolean(true)).unwrap();
        }

        let mut stats = GcStats::default();
        assert_eq!(heap.collect(vec![Value::Table(root)], &mut stats), 0);
        assert!(heap.table(meta).is_ok());
        assert!(heap.table(key).is_ok());
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new();
        let a = heap.alloc_table(Table::new());
        let b = heap.alloc_table(Table::new());
        heap.table_mut(a).unwrap().set(&Value::from(1), Value::Table(b)).unwrap();
        heap.table_mut(b).unwrap().set(&Value::from(1), Value::Table(a)).unwrap();

        let mut stats = GcStats::default();
        assert_eq!(heap.collect(Vec::new(), &mut stats), 2);
        assert_eq!(heap.object_count(), 0);
    }
}
