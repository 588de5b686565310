//! Runtime configuration.

use crate::error::{RuntimeError, RuntimeResult};

/// Options controlling a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Maximum number of nested calls before "stack overflow" is raised
    pub max_call_depth: usize,

    /// Collect automatically at top-level calls once this many objects were
    /// allocated since the last cycle. `None` leaves collection to the host.
    pub gc_threshold: Option<usize>,

    /// Maximum length of an `__index` / `__newindex` chain
    pub max_index_chain: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 200,
            gc_threshold: None,
            max_index_chain: 100,
        }
    }
}

impl RuntimeOptions {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = Some(threshold);
        self
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.max_call_depth == 0 {
            return Err(RuntimeError::InvalidOptions(
                "max_call_depth must be at least 1".to_string(),
            ));
        }
        if self.max_index_chain == 0 {
            return Err(RuntimeError::InvalidOptions(
                "max_index_chain must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
