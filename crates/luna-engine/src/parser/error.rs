//! Parse error type.

use super::lexer::LexError;
use super::token::Span;
use std::rc::Rc;
use thiserror::Error;

/// A syntax error with its location in the source chunk.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}:{}: {}", .chunk, .span.line, .message)]
pub struct ParseError {
    /// Name of the chunk being parsed (usually the file name)
    pub chunk: Rc<str>,

    /// Human-readable error message
    pub message: String,

    /// Source location of the error
    pub span: Span,
}

impl ParseError {
    pub fn new(chunk: Rc<str>, message: impl Into<String>, span: Span) -> Self {
        Self {
            chunk,
            message: message.into(),
            span,
        }
    }

    pub(crate) fn from_lex(chunk: Rc<str>, error: &LexError) -> Self {
        Self::new(chunk, error.message(), error.span())
    }
}
