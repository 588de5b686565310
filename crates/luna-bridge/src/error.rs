//! Bridge error types.

use crate::report::Diagnostic;
use luna_engine::{RegistryKey, RuntimeError};
use thiserror::Error;

/// Failures resolving a script value back to its native object.
///
/// These are always recoverable: the caller gets the error instead of a
/// pointer and decides what to do.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObjectError {
    /// Value is not an object table
    #[error("expected an object, got a {0} value")]
    NotATable(&'static str),

    /// Table has no native pointer slot
    #[error("object has no '__this' slot")]
    MissingSlot,

    /// Native pointer slot holds something other than a native pointer
    #[error("'__this' slot does not hold a native pointer (found a {0} value)")]
    InvalidSlot(&'static str),

    /// Object was deleted or its native side was dropped
    #[error("object has already been deleted")]
    Released,

    /// Native object is of another type
    #[error("native object is a {actual}, expected {expected}")]
    TypeMismatch { expected: String, actual: String },

    /// Delete requested for an object the bridge doesn't own
    #[error("object is owned by the host and cannot be deleted from a script")]
    NotOwned,

    /// Native object is already in use further up the call stack
    #[error("native object is already borrowed")]
    AlreadyBorrowed,

    /// Registry key has no live entry
    #[error("registry key {0} does not resolve to a value")]
    UnknownKey(RegistryKey),
}

/// Errors surfaced by the bridge.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Class or global lookup by name failed
    #[error("no class named '{0}'")]
    Name(String),

    /// Wrong arity or argument type at a script-callable entry point
    #[error("{0}")]
    Argument(String),

    /// Method is absent or not callable
    #[error("method '{0}' not found")]
    MethodNotFound(String),

    #[error(transparent)]
    Object(#[from] ObjectError),

    /// A protected call failed. The diagnostic has already been reported.
    #[error("{}", .0.message)]
    Call(Diagnostic),

    /// Invalid argument format for a marshaled call
    #[error("format error in call to function {function}: {reason}")]
    Format { function: String, reason: String },

    /// Unrecoverable fault: runtime initialization failure or a panic that
    /// escaped every protected call
    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<BridgeError> for RuntimeError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Runtime(inner) => inner,
            BridgeError::Call(diagnostic) => RuntimeError::reported(diagnostic.render()),
            other => RuntimeError::raise(other.to_string()),
        }
    }
}
