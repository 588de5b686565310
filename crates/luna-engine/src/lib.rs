//! Luna Engine
//!
//! An embeddable dynamic scripting runtime with a Lua-compatible surface:
//! - **Parser**: `logos` lexer and recursive-descent parser (`parser` module)
//! - **VM**: tree-walking interpreter, call frames and tracebacks (`vm` module)
//! - **GC**: arena heap with mark-sweep collection (`gc` module)
//! - **Registry**: keyed pins that keep host-held values alive
//!
//! # Example
//!
//! ```rust,ignore
//! use luna_engine::{Runtime, Value};
//!
//! let mut rt = Runtime::new();
//! rt.register_function("double", |_, args| {
//!     Ok(vec![Value::Number(args.check_number(0)? * 2.0)])
//! });
//! let results = rt.exec("return double(21)", "example")?;
//! assert_eq!(results, vec![Value::Number(42.0)]);
//! ```

#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Lexer, parser and AST
pub mod parser;

/// Interpreter, scopes and call frames
pub mod vm;

/// Heap arenas and the collector
pub mod gc;

pub mod describe;
pub mod error;
pub mod native;
pub mod options;
pub mod registry;
pub mod runtime;
mod stdlib;
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use describe::{describe, describe_stack};
pub use error::{RuntimeError, RuntimeResult};
pub use gc::{GcStats, Table, Userdata};
pub use native::{Args, NativeCallback};
pub use options::RuntimeOptions;
pub use parser::{parse, ParseError};
pub use registry::{RegistryKey, ReleaseQueue};
pub use runtime::{OutputBuffer, Runtime};
pub use value::{format_number, FunctionRef, Key, TableRef, UserdataRef, Value};
pub use vm::{render_traceback, CallFrame, FrameKind};
