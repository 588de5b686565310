//! Script state bootstrap: a runtime with the bridge and diagnostic globals
//! installed, plus file and string execution entry points.

use crate::bridge::{Bridge, Exposable};
use crate::class::ClassTable;
use crate::error::{BridgeError, BridgeResult};
use crate::options::BridgeOptions;
use crate::report::{Diagnostic, DiagnosticSink, ErrorReporter};
use luna_engine::{describe, describe_stack, Runtime, RuntimeError, RuntimeOptions, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::rc::Rc;

/// A runtime with the bridge installed.
pub struct ScriptState {
    runtime: Runtime,
    bridge: Bridge,
    reporter: ErrorReporter,
}

impl ScriptState {
    pub fn new(sink: Rc<dyn DiagnosticSink>) -> BridgeResult<Self> {
        Self::with_options(RuntimeOptions::default(), BridgeOptions::default(), sink)
    }

    /// Create the runtime, register `stacktrace`, `dump` and `dumpStack`,
    /// and install the bridge. A runtime that cannot be created is a fatal
    /// fault.
    pub fn with_options(
        runtime_options: RuntimeOptions,
        bridge_options: BridgeOptions,
        sink: Rc<dyn DiagnosticSink>,
    ) -> BridgeResult<Self> {
        let mut runtime = Runtime::with_options(runtime_options).map_err(|e| {
            log::error!("unable to initialize runtime: {}", e);
            BridgeError::Fatal(e.to_string())
        })?;

        let reporter = ErrorReporter::new(sink, &bridge_options.trace_global);
        register_diagnostics(&mut runtime, &bridge_options.trace_global);
        let bridge = Bridge::install(&mut runtime, bridge_options, reporter.clone())?;

        Ok(Self {
            runtime,
            bridge,
            reporter,
        })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// The runtime and the bridge, borrowed together.
    pub fn parts(&mut self) -> (&mut Runtime, &Bridge) {
        (&mut self.runtime, &self.bridge)
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    pub fn expose<T: Exposable>(&mut self) -> BridgeResult<ClassTable> {
        self.bridge.expose_class::<T>(&mut self.runtime)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run a chunk; every failure is reported.
    pub fn do_string(&mut self, source: &str, chunk: &str) -> bool {
        self.try_do_string(source, chunk).is_ok()
    }

    /// Run a script file; every failure is reported.
    pub fn do_file(&mut self, path: impl AsRef<Path>) -> bool {
        self.try_do_file(path).is_ok()
    }

    pub fn try_do_string(&mut self, source: &str, chunk: &str) -> BridgeResult<Vec<Value>> {
        let function = self
            .runtime
            .load(source, chunk)
            .map_err(|error| self.reporter.fail(&error, Some(source)))?;

        let reporter = self.reporter.clone();
        self.guarded(|rt| reporter.protected_call(rt, &function, Vec::new()))
    }

    pub fn try_do_file(&mut self, path: impl AsRef<Path>) -> BridgeResult<Vec<Value>> {
        let path = path.as_ref();
        let chunk = path.display().to_string();
        log::debug!("running {}", chunk);

        let source = std::fs::read_to_string(path).map_err(|e| {
            let error = RuntimeError::Io {
                path: chunk.clone(),
                message: e.to_string(),
            };
            self.reporter.fail(&error, None)
        })?;
        self.try_do_string(&source, &chunk)
    }

    /// Run `f` so that a panic escaping every protected call becomes a
    /// reported fatal error and the runtime stays usable.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Runtime) -> BridgeResult<T>) -> BridgeResult<T> {
        match panic::catch_unwind(AssertUnwindSafe(|| f(&mut self.runtime))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("PANIC: {}", message);
                self.runtime.recover();
                self.reporter
                    .report(&Diagnostic::new(format!("PANIC: {}", message)));
                Err(BridgeError::Fatal(message))
            }
        }
    }

    /// Tear down the bridge: every script-owned object is destroyed.
    pub fn close(mut self) {
        self.bridge.close(&mut self.runtime);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Install the trace handler and the dump helpers.
fn register_diagnostics(rt: &mut Runtime, trace_global: &str) {
    rt.register_function(trace_global, |rt, args| {
        let message = rt.tostring(&args.get(0))?;
        let trace = rt.traceback(Some(&message), 1);
        Ok(vec![Value::from(trace)])
    });

    rt.register_function("dump", |rt, args| {
        let value = args.values().last().cloned().unwrap_or_default();
        let text = describe(rt, &value);
        rt.write_output(&format!("{}\n", text));
        Ok(vec![Value::from(text)])
    });

    rt.register_function("dumpStack", |rt, _| {
        let text = describe_stack(rt);
        rt.write_output(&format!("{}\n", text));
        Ok(vec![Value::from(text)])
    });
}
