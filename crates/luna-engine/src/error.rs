//! Runtime error types.

use crate::parser::ParseError;
use crate::value::Value;
use thiserror::Error;

/// Errors produced by the runtime.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// An error raised during execution, carrying the script-visible value.
    ///
    /// `traced` is set once a message handler has processed the error, so
    /// enclosing call frames don't run it again. `reported` is set by hosts
    /// that already surfaced the error to the user.
    #[error("{message}")]
    Raised {
        value: Value,
        message: String,
        traced: bool,
        reported: bool,
    },

    /// Source failed to parse
    #[error(transparent)]
    Syntax(#[from] ParseError),

    /// A script file could not be read
    #[error("cannot open {path}: {message}")]
    Io { path: String, message: String },

    /// Garbage collection was requested while a call was on the stack
    #[error("cannot collect garbage while a call is in progress")]
    CollectDuringCall,

    /// Runtime options failed validation
    #[error("invalid runtime options: {0}")]
    InvalidOptions(String),
}

impl RuntimeError {
    /// Raise a string error.
    pub fn raise(message: impl Into<String>) -> Self {
        let message = message.into();
        RuntimeError::Raised {
            value: Value::String(message.as_str().into()),
            message,
            traced: false,
            reported: false,
        }
    }

    /// Raise an arbitrary value, as `error(value)` does.
    pub fn from_value(value: Value) -> Self {
        let message = match &value {
            Value::String(_) | Value::Number(_) => value.to_string(),
            Value::Nil => "nil".to_string(),
            other => format!("(error object is a {} value)", other.type_name()),
        };
        RuntimeError::Raised {
            value,
            message,
            traced: false,
            reported: false,
        }
    }

    /// A traced error that has already been shown to the user. Message
    /// handlers and hosts pass it through untouched.
    pub fn reported(message: impl Into<String>) -> Self {
        let message = message.into();
        RuntimeError::Raised {
            value: Value::String(message.as_str().into()),
            message,
            traced: true,
            reported: true,
        }
    }

    /// The value a script `pcall` observes for this error.
    pub fn value(&self) -> Value {
        match self {
            RuntimeError::Raised { value, .. } => value.clone(),
            other => Value::String(other.to_string().into()),
        }
    }

    pub fn is_traced(&self) -> bool {
        matches!(self, RuntimeError::Raised { traced: true, .. })
    }

    pub fn is_reported(&self) -> bool {
        matches!(self, RuntimeError::Raised { reported: true, .. })
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
