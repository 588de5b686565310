//! Script frontend.
//!
//! The parser is a recursive descent parser over a pre-tokenized input with
//! one token of lookahead. It stops at the first error; scripts are small and
//! the first error is the one reported to the user.

pub mod ast;
pub mod error;
mod expr;
pub mod lexer;
pub mod precedence;
mod stmt;
pub mod token;

use self::ast::{Chunk, FunctionBody};
use self::lexer::Lexer;
use self::token::{Span, Token};
use std::rc::Rc;

pub use error::ParseError;

/// Parse `source` into a chunk named `chunk`.
pub fn parse(source: &str, chunk: &str) -> Result<Chunk, ParseError> {
    Parser::new(source, chunk)?.parse()
}

/// Parser state.
pub struct Parser {
    /// Pre-tokenized input, always terminated by `Token::Eof`
    tokens: Vec<(Token, Span)>,

    /// Current position in token stream
    pos: usize,

    /// Chunk name used in error messages
    chunk: Rc<str>,

    /// Number of enclosing loops in the current function, for `break`
    loop_depth: usize,
}

impl Parser {
    /// Create a new parser from source code.
    pub fn new(source: &str, chunk: &str) -> Result<Self, ParseError> {
        let chunk: Rc<str> = chunk.into();
        let tokens = Lexer::new(source).tokenize().map_err(|errors| {
            errors
                .first()
                .map(|e| ParseError::from_lex(chunk.clone(), e))
                .unwrap_or_else(|| ParseError::new(chunk.clone(), "lexer failed", Span::default()))
        })?;

        Ok(Self {
            tokens,
            pos: 0,
            chunk,
            loop_depth: 0,
        })
    }

    /// Parse the whole input as a main chunk.
    pub fn parse(mut self) -> Result<Chunk, ParseError> {
        let block = self.parse_block()?;
        if !self.at_eof() {
            return Err(self.error_near("'<eof>' expected"));
        }

        Ok(Chunk {
            name: self.chunk.clone(),
            body: Rc::new(FunctionBody {
                params: Vec::new(),
                block,
                line: 0,
                is_main: true,
            }),
        })
    }

    // ========================================================================
    // Token Management
    // ========================================================================

    #[inline]
    fn current(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    #[inline]
    fn current_span(&self) -> Span {
        self.tokens[self.pos].1
    }

    #[inline]
    fn current_line(&self) -> u32 {
        self.tokens[self.pos].1.line
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(tok, _)| tok)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    /// Check if the current token matches the given kind.
    #[inline]
    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(expected)
    }

    #[inline]
    fn at_eof(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    /// Consume the current token if it matches.
    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<Token, ParseError> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.error_near(format!("'{}' expected", expected)))
        }
    }

    /// Expect a closing token, mentioning the opening one when it was on an
    /// earlier line.
    fn expect_closing(&mut self, close: Token, open: &str, open_line: u32) -> Result<(), ParseError> {
        if self.eat(&close) {
            return Ok(());
        }
        if open_line == self.current_line() {
            Err(self.error_near(format!("'{}' expected", close)))
        } else {
            Err(self.error_near(format!(
                "'{}' expected (to close '{}' at line {})",
                close, open, open_line
            )))
        }
    }

    fn expect_identifier(&mut self) -> Result<Rc<str>, ParseError> {
        match self.current() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_near("<name> expected")),
        }
    }

    fn error_near(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(
            self.chunk.clone(),
            format!("{} near '{}'", message.into(), self.current()),
            self.current_span(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use super::*;

    #[test]
    fn test_parse_empty_chunk() {
        let chunk = parse("", "empty").unwrap();
        assert!(chunk.body.is_main);
        assert!(chunk.body.block.statements.is_empty());
    }

    #[test]
    fn test_parse_records_lines() {
        let chunk = parse("local a = 1\n\nprint(a)", "lines").unwrap();
        let lines: Vec<u32> = chunk.body.block.statements.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 3]);
    }

    #[test]
    fn test_syntax_error_message() {
        let err = parse("local = 3", "bad.lua").unwrap_err();
        assert_eq!(err.to_string(), "bad.lua:1: <name> expected near '='");
    }

    #[test]
    fn test_unclosed_block_mentions_opener() {
        let err = parse("function f()\n  return 1\n", "open.lua").unwrap_err();
        assert_eq!(
            err.message,
            "'end' expected (to close 'function' at line 1) near '<eof>'"
        );
    }

    #[test]
    fn test_lex_error_becomes_parse_error() {
        let err = parse("x = 'unterminated", "lex.lua").unwrap_err();
        assert!(err.message.contains("unfinished string"));
    }

    #[test]
    fn test_break_outside_loop() {
        let err = parse("break", "b.lua").unwrap_err();
        assert!(err.message.contains("no loop to break"));
    }

    #[test]
    fn test_method_definition_desugars_to_assignment() {
        let chunk = parse("function Dog:speak(x) return x end", "m.lua").unwrap();
        match &chunk.body.block.statements[0].kind {
            StatementKind::Assign { targets, values } => {
                assert!(matches!(targets[0], Expr::Index(_, _)));
                match &values[0] {
                    Expr::Function(body) => {
                        let params: Vec<&str> = body.params.iter().map(|p| p.as_ref()).collect();
                        assert_eq!(params, vec!["self", "x"]);
                    }
                    other => panic!("expected function, got {:?}", other),
                }
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_operator_precedence() {
        let chunk = parse("return 1 + 2 * 3 .. 'x'", "p.lua").unwrap();
        match &chunk.body.block.statements[0].kind {
            StatementKind::Return(values) => match &values[0] {
                Expr::Binary(BinaryOp::Concat, left, _) => {
                    assert!(matches!(left.as_ref(), Expr::Binary(BinaryOp::Add, _, _)));
                }
                other => panic!("unexpected tree {:?}", other),
            },
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_call_sugar() {
        let chunk = parse("print 'hi'\nsetup { size = 2 }\nobj:method()", "c.lua").unwrap();
        for statement in &chunk.body.block.statements {
            assert!(matches!(statement.kind, StatementKind::Call(_)));
        }
    }

    #[test]
    fn test_varargs_rejected() {
        let err = parse("function f(...) end", "v.lua").unwrap_err();
        assert!(err.message.contains("varargs"));
    }
}
