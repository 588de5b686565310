//! Class and object bridge between native types and Luna scripts.
//!
//! Scripts define classes through a namespace object:
//!
//! ```text
//! Animal = class("Animal")
//! function Animal:speak() return "..." end
//!
//! class("Dog", Animal)
//! local rex = Dog:new()
//! rex:speak()
//! rex:delete()
//! ```
//!
//! Native types implement [`Exposable`] and are published with
//! [`Bridge::expose_class`]; instances created from scripts then carry a
//! native object reachable through [`from_handle`]. The host calls script
//! methods with [`CallMarshaler`], and every failure crossing the boundary
//! is reported once through an [`ErrorReporter`].
//!
//! # Architecture
//!
//! ```text
//! ScriptState
//!   ├── Runtime (luna-engine)
//!   ├── Bridge
//!   │     ├── ClassRegistry   class tables, factories
//!   │     ├── owned handles   objects created by script `new`
//!   │     └── CallMarshaler   typed host -> script calls
//!   └── ErrorReporter ──> DiagnosticSink
//! ```

#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod class;
pub mod error;
pub mod handle;
pub mod marshal;
pub mod options;
pub mod report;
pub mod state;

/// Instance field holding the native pointer userdata.
pub const NATIVE_SLOT: &str = "__this";

/// Class field holding the class name.
pub const CLASS_NAME_FIELD: &str = "__class";

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{Bridge, Exposable, Methods};
pub use class::{ClassRegistry, ClassTable, Factory};
pub use error::{BridgeError, BridgeResult, ObjectError};
pub use handle::{from_handle, NativePtr, ObjectHandle, ScriptObject};
pub use marshal::{parse_format, ArgSpec, CallMarshaler};
pub use options::BridgeOptions;
pub use report::{Diagnostic, DiagnosticSink, ErrorReporter, MemorySink, SourceLocation, TerminalSink};
pub use state::ScriptState;
