//! Expression parsing.

use super::ast::*;
use super::precedence::{binary_operator, UNARY_PRIORITY};
use super::token::Token;
use super::{ParseError, Parser};

impl Parser {
    pub(super) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_subexpr(0)
    }

    pub(super) fn parse_expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(&Token::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    /// Precedence climbing: parse operators whose left binding power is
    /// greater than `limit`.
    fn parse_subexpr(&mut self, limit: u8) -> Result<Expr, ParseError> {
        let unary = match self.current() {
            Token::Not => Some(UnaryOp::Not),
            Token::Minus => Some(UnaryOp::Negate),
            Token::Hash => Some(UnaryOp::Length),
            _ => None,
        };

        let mut left = match unary {
            Some(op) => {
                self.advance();
                let operand = self.parse_subexpr(UNARY_PRIORITY)?;
                Expr::Unary(op, Box::new(operand))
            }
            None => self.parse_simple_expr()?,
        };

        while let Some((op, left_power, right_power)) = binary_operator(self.current()) {
            if left_power <= limit {
                break;
            }
            self.advance();
            let right = self.parse_subexpr(right_power)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_simple_expr(&mut self) -> Result<Expr, ParseError> {
        let expr = match self.current() {
            Token::Number(n) => Expr::Number(*n),
            Token::String(s) => Expr::String(s.clone()),
            Token::Nil => Expr::Nil,
            Token::True => Expr::True,
            Token::False => Expr::False,
            Token::DotDotDot => return Err(self.error_near("varargs are not supported")),
            Token::LeftBrace => return self.parse_table(),
            Token::Function => {
                let line = self.current_line();
                self.advance();
                return Ok(Expr::Function(self.parse_function_body(false, line)?));
            }
            _ => return self.parse_suffixed_expr(),
        };
        self.advance();
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.current() {
            Token::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::Name(name))
            }
            Token::LeftParen => {
                let line = self.current_line();
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_closing(Token::RightParen, "(", line)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            _ => Err(self.error_near("unexpected symbol")),
        }
    }

    /// Primary expression followed by any number of `.name`, `[key]`,
    /// `:method(args)` and call suffixes.
    pub(super) fn parse_suffixed_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary_expr()?;

        loop {
            match self.current() {
                Token::Dot => {
                    self.advance();
                    let key = self.expect_identifier()?;
                    expr = Expr::Index(Box::new(expr), Box::new(Expr::String(key)));
                }
                Token::LeftBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(Token::RightBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                Token::Colon => {
                    self.advance();
                    let method = self.expect_identifier()?;
                    let line = self.current_line();
                    let args = self.parse_call_args()?;
                    expr = Expr::Call(Box::new(CallExpr {
                        callee: expr,
                        method: Some(method),
                        args,
                        line,
                    }));
                }
                Token::LeftParen | Token::String(_) | Token::LeftBrace => {
                    let line = self.current_line();
                    let args = self.parse_call_args()?;
                    expr = Expr::Call(Box::new(CallExpr {
                        callee: expr,
                        method: None,
                        args,
                        line,
                    }));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        match self.current() {
            Token::String(s) => {
                let arg = Expr::String(s.clone());
                self.advance();
                Ok(vec![arg])
            }
            Token::LeftBrace => Ok(vec![self.parse_table()?]),
            Token::LeftParen => {
                let line = self.current_line();
                self.advance();
                if self.eat(&Token::RightParen) {
                    return Ok(Vec::new());
                }
                let args = self.parse_expr_list()?;
                self.expect_closing(Token::RightParen, "(", line)?;
                Ok(args)
            }
            _ => Err(self.error_near("function arguments expected")),
        }
    }

    fn parse_table(&mut self) -> Result<Expr, ParseError> {
        let line = self.current_line();
        self.expect(Token::LeftBrace)?;
        let mut fields = Vec::new();

        while !self.check(&Token::RightBrace) {
            let field = match self.current() {
                Token::LeftBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(Token::RightBracket)?;
                    self.expect(Token::Equal)?;
                    TableField::Keyed(key, self.parse_expr()?)
                }
                Token::Identifier(name) if matches!(self.peek(), Some(Token::Equal)) => {
                    let key = Expr::String(name.clone());
                    self.advance();
                    self.advance();
                    TableField::Keyed(key, self.parse_expr()?)
                }
                _ => TableField::Positional(self.parse_expr()?),
            };
            fields.push(field);

            if !self.eat(&Token::Comma) && !self.eat(&Token::Semicolon) {
                break;
            }
        }

        self.expect_closing(Token::RightBrace, "{", line)?;
        Ok(Expr::Table(fields))
    }
}
