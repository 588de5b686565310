//! Failure capture and reporting.
//!
//! Every call that crosses the native/script boundary runs under
//! [`ErrorReporter::protected_call`]. The trace handler runs while the
//! failing frames are still live, the result is split into message and
//! trace, and the [`Diagnostic`] is written to a sink exactly once.

use crate::error::{BridgeError, BridgeResult};
use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use luna_engine::{ParseError, Runtime, RuntimeError, Value};
use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;
use termcolor::{ColorChoice, StandardStream};

const TRACE_MARKER: &str = "\nstack traceback:";

/// Source position of a syntax error.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub chunk: String,
    pub source: String,
    pub span: Range<usize>,
}

/// A reported failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// The stringified error value
    pub message: String,
    /// Call-stack trace; empty when none was captured
    pub trace: String,
    /// Set for syntax errors
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: String::new(),
            location: None,
        }
    }

    /// Split handler output of the form `message\nstack traceback:...`.
    pub fn from_traced(text: &str) -> Self {
        match text.find(TRACE_MARKER) {
            Some(at) => Self {
                message: text[..at].to_string(),
                trace: text[at + 1..].to_string(),
                location: None,
            },
            None => Self::new(text),
        }
    }

    pub fn from_parse_error(error: &ParseError, source: &str) -> Self {
        let end = error.span.end.max(error.span.start + 1).min(source.len());
        let start = error.span.start.min(end);
        Self {
            message: error.to_string(),
            trace: String::new(),
            location: Some(SourceLocation {
                chunk: error.chunk.to_string(),
                source: source.to_string(),
                span: start..end,
            }),
        }
    }

    /// Build a diagnostic from any runtime error. `source` enables source
    /// labels for syntax errors.
    pub fn from_runtime_error(error: &RuntimeError, source: Option<&str>) -> Self {
        match (error, source) {
            (RuntimeError::Syntax(parse), Some(source)) => Self::from_parse_error(parse, source),
            (other, _) => Self::from_traced(&other.to_string()),
        }
    }

    pub fn has_trace(&self) -> bool {
        !self.trace.is_empty()
    }

    /// `message` and `trace` joined the way the trace handler produced them.
    pub fn render(&self) -> String {
        if self.trace.is_empty() {
            self.message.clone()
        } else {
            format!("{}\n{}", self.message, self.trace)
        }
    }
}

/// Destination for diagnostics.
pub trait DiagnosticSink {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Renders diagnostics to stderr with `codespan-reporting`.
pub struct TerminalSink {
    color: ColorChoice,
}

impl TerminalSink {
    pub fn new(color: ColorChoice) -> Self {
        Self { color }
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new(ColorChoice::Auto)
    }
}

impl DiagnosticSink for TerminalSink {
    fn report(&self, diagnostic: &Diagnostic) {
        let mut files = SimpleFiles::new();
        let mut rendered = CsDiagnostic::error().with_message(&diagnostic.message);

        if let Some(location) = &diagnostic.location {
            let file_id = files.add(location.chunk.clone(), location.source.clone());
            rendered = rendered.with_labels(vec![
                Label::primary(file_id, location.span.clone()).with_message("here"),
            ]);
        }
        if diagnostic.has_trace() {
            rendered = rendered.with_notes(vec![diagnostic.trace.clone()]);
        }

        let writer = StandardStream::stderr(self.color);
        let mut lock = writer.lock();
        let config = term::Config::default();
        if let Err(e) = term::emit(&mut lock, &config, &files, &rendered) {
            log::error!("unable to render diagnostic: {}", e);
        }
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    diagnostics: Rc<RefCell<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.borrow().is_empty()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.borrow_mut())
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic.clone());
    }
}

/// Runs protected calls and routes their failures to a sink.
#[derive(Clone)]
pub struct ErrorReporter {
    sink: Rc<dyn DiagnosticSink>,
    trace_global: Rc<str>,
}

impl ErrorReporter {
    pub fn new(sink: Rc<dyn DiagnosticSink>, trace_global: &str) -> Self {
        Self {
            sink,
            trace_global: trace_global.into(),
        }
    }

    /// The handler used for protected calls: the trace global when a script
    /// hasn't replaced it with something uncallable, the runtime's built-in
    /// traceback handler otherwise.
    fn handler(&self, rt: &mut Runtime) -> Value {
        let global = rt.get_global(&self.trace_global);
        if rt.is_callable(&global) {
            global
        } else {
            rt.message_handler()
        }
    }

    /// Call `function` so that a failure becomes a reported [`Diagnostic`].
    pub fn protected_call(
        &self,
        rt: &mut Runtime,
        function: &Value,
        args: Vec<Value>,
    ) -> BridgeResult<Vec<Value>> {
        let handler = self.handler(rt);
        match rt.pcall_with_handler(function, args, handler) {
            Ok(values) => Ok(values),
            Err(error) => Err(self.fail(&error, None)),
        }
    }

    /// Report `error` and wrap the diagnostic as a [`BridgeError::Call`].
    /// An error reported by a nested call reaches the sink only once.
    pub fn fail(&self, error: &RuntimeError, source: Option<&str>) -> BridgeError {
        let diagnostic = Diagnostic::from_runtime_error(error, source);
        if error.is_reported() {
            log::debug!("already reported: {}", diagnostic.message);
        } else {
            self.report(&diagnostic);
        }
        BridgeError::Call(diagnostic)
    }

    pub fn report(&self, diagnostic: &Diagnostic) {
        log::debug!("reporting diagnostic: {}", diagnostic.message);
        self.sink.report(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_traced_message() {
        let diagnostic =
            Diagnostic::from_traced("main.lua:3: boom\nstack traceback:\n\tmain.lua:3: in main chunk");
        assert_eq!(diagnostic.message, "main.lua:3: boom");
        assert_eq!(diagnostic.trace, "stack traceback:\n\tmain.lua:3: in main chunk");
        assert_eq!(
            diagnostic.render(),
            "main.lua:3: boom\nstack traceback:\n\tmain.lua:3: in main chunk"
        );
    }

    #[test]
    fn test_untraced_message() {
        let diagnostic = Diagnostic::from_traced("plain");
        assert_eq!(diagnostic.message, "plain");
        assert!(!diagnostic.has_trace());
    }

    #[test]
    fn test_parse_error_location() {
        let source = "local x = = 1";
        let error = luna_engine::parse(source, "bad.lua").unwrap_err();
        let diagnostic = Diagnostic::from_parse_error(&error, source);
        let location = diagnostic.location.unwrap();
        assert_eq!(location.chunk, "bad.lua");
        assert_eq!(&source[location.span], "=");
    }

    #[test]
    fn test_terminal_sink_renders() {
        let source = "local x = = 1";
        let error = luna_engine::parse(source, "bad.lua").unwrap_err();
        TerminalSink::new(ColorChoice::Never).report(&Diagnostic::from_parse_error(&error, source));
        TerminalSink::default().report(&Diagnostic::from_traced("boom\nstack traceback:\n\t[C]: ?"));
    }

    #[test]
    fn test_protected_call_reports_once() {
        let sink = MemorySink::new();
        let reporter = ErrorReporter::new(Rc::new(sink.clone()), "stacktrace");
        let mut rt = Runtime::new();
        let failing = rt.load("error('nope')", "chunk").unwrap();

        let err = reporter.protected_call(&mut rt, &failing, Vec::new()).unwrap_err();
        assert!(matches!(err, BridgeError::Call(_)));
        assert_eq!(sink.len(), 1);

        let diagnostic = &sink.diagnostics()[0];
        assert_eq!(diagnostic.message, "chunk:1: nope");
        assert!(diagnostic.trace.contains("in main chunk"));
    }

    #[test]
    fn test_success_reports_nothing() {
        let sink = MemorySink::new();
        let reporter = ErrorReporter::new(Rc::new(sink.clone()), "stacktrace");
        let mut rt = Runtime::new();
        let ok = rt.load("return 1", "chunk").unwrap();
        let values = reporter.protected_call(&mut rt, &ok, Vec::new()).unwrap();
        assert_eq!(values, vec![Value::from(1)]);
        assert!(sink.is_empty());
    }
}
