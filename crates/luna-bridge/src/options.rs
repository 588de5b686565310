//! Bridge configuration.

/// Names under which the bridge publishes itself into a runtime.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Global holding the class namespace object
    pub namespace: String,

    /// Field of the namespace holding the class-definition function
    pub define_function: String,

    /// Global used as the message handler of every protected call
    pub trace_global: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            namespace: "class".to_string(),
            define_function: "defineClass".to_string(),
            trace_global: "stacktrace".to_string(),
        }
    }
}

impl BridgeOptions {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_trace_global(mut self, name: impl Into<String>) -> Self {
        self.trace_global = name.into();
        self
    }
}
