//! Tree-walking interpreter.

pub mod frame;
mod interpreter;
pub mod scope;

pub use frame::{render_traceback, CallFrame, FrameKind};
pub use scope::Env;
