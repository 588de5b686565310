//! Statement parsing.

use super::ast::*;
use super::token::Token;
use super::{ParseError, Parser};
use std::rc::Rc;

impl Parser {
    /// Parse statements until a block terminator. A `return` ends the block.
    pub(super) fn parse_block(&mut self) -> Result<Block, ParseError> {
        let mut statements = Vec::new();

        while !self.block_follow() {
            if self.check(&Token::Return) {
                statements.push(self.parse_return()?);
                break;
            }
            if let Some(statement) = self.parse_statement()? {
                statements.push(statement);
            }
        }

        Ok(Block { statements })
    }

    fn block_follow(&self) -> bool {
        matches!(
            self.current(),
            Token::Else | Token::Elseif | Token::End | Token::Until | Token::Eof
        )
    }

    fn parse_statement(&mut self) -> Result<Option<Statement>, ParseError> {
        let line = self.current_line();
        let kind = match self.current() {
            Token::Semicolon => {
                self.advance();
                return Ok(None);
            }
            Token::If => self.parse_if(line)?,
            Token::While => self.parse_while(line)?,
            Token::Do => {
                self.advance();
                let block = self.parse_block()?;
                self.expect_closing(Token::End, "do", line)?;
                StatementKind::Do(block)
            }
            Token::For => self.parse_for(line)?,
            Token::Repeat => self.parse_repeat(line)?,
            Token::Function => self.parse_function_statement(line)?,
            Token::Local => {
                self.advance();
                if self.eat(&Token::Function) {
                    let name = self.expect_identifier()?;
                    let body = self.parse_function_body(false, line)?;
                    StatementKind::LocalFunction { name, body }
                } else {
                    self.parse_local()?
                }
            }
            Token::Break => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(self.error_near("no loop to break"));
                }
                StatementKind::Break
            }
            _ => self.parse_expr_statement()?,
        };

        Ok(Some(Statement { kind, line }))
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        let line = self.current_line();
        self.advance();
        let values = if self.block_follow() || self.check(&Token::Semicolon) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.eat(&Token::Semicolon);
        Ok(Statement {
            kind: StatementKind::Return(values),
            line,
        })
    }

    fn parse_if(&mut self, line: u32) -> Result<StatementKind, ParseError> {
        self.advance();
        let mut branches = Vec::new();

        let condition = self.parse_expr()?;
        self.expect(Token::Then)?;
        branches.push((condition, self.parse_block()?));

        let mut otherwise = None;
        loop {
            if self.eat(&Token::Elseif) {
                let condition = self.parse_expr()?;
                self.expect(Token::Then)?;
                branches.push((condition, self.parse_block()?));
            } else if self.eat(&Token::Else) {
                otherwise = Some(self.parse_block()?);
                break;
            } else {
                break;
            }
        }

        self.expect_closing(Token::End, "if", line)?;
        Ok(StatementKind::If {
            branches,
            otherwise,
        })
    }

    fn parse_while(&mut self, line: u32) -> Result<StatementKind, ParseError> {
        self.advance();
        let condition = self.parse_expr()?;
        self.expect(Token::Do)?;
        let body = self.parse_loop_body()?;
        self.expect_closing(Token::End, "while", line)?;
        Ok(StatementKind::While { condition, body })
    }

    fn parse_repeat(&mut self, line: u32) -> Result<StatementKind, ParseError> {
        self.advance();
        let body = self.parse_loop_body()?;
        self.expect_closing(Token::Until, "repeat", line)?;
        let condition = self.parse_expr()?;
        Ok(StatementKind::Repeat { body, condition })
    }

    fn parse_for(&mut self, line: u32) -> Result<StatementKind, ParseError> {
        self.advance();
        let first = self.expect_identifier()?;

        if self.eat(&Token::Equal) {
            let start = self.parse_expr()?;
            self.expect(Token::Comma)?;
            let limit = self.parse_expr()?;
            let step = if self.eat(&Token::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(Token::Do)?;
            let body = self.parse_loop_body()?;
            self.expect_closing(Token::End, "for", line)?;
            return Ok(StatementKind::NumericFor {
                variable: first,
                start,
                limit,
                step,
                body,
            });
        }

        let mut names = vec![first];
        while self.eat(&Token::Comma) {
            names.push(self.expect_identifier()?);
        }
        self.expect(Token::In)?;
        let values = self.parse_expr_list()?;
        self.expect(Token::Do)?;
        let body = self.parse_loop_body()?;
        self.expect_closing(Token::End, "for", line)?;
        Ok(StatementKind::GenericFor {
            names,
            values,
            body,
        })
    }

    fn parse_loop_body(&mut self) -> Result<Block, ParseError> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    /// `function a.b.c:m(...)` becomes an assignment to the indexed path.
    fn parse_function_statement(&mut self, line: u32) -> Result<StatementKind, ParseError> {
        self.advance();
        let mut target = Expr::Name(self.expect_identifier()?);
        while self.eat(&Token::Dot) {
            let key = self.expect_identifier()?;
            target = Expr::Index(Box::new(target), Box::new(Expr::String(key)));
        }
        let is_method = self.eat(&Token::Colon);
        if is_method {
            let key = self.expect_identifier()?;
            target = Expr::Index(Box::new(target), Box::new(Expr::String(key)));
        }

        let body = self.parse_function_body(is_method, line)?;
        Ok(StatementKind::Assign {
            targets: vec![target],
            values: vec![Expr::Function(body)],
        })
    }

    /// Parameter list and body, starting at `(`.
    pub(super) fn parse_function_body(
        &mut self,
        is_method: bool,
        line: u32,
    ) -> Result<Rc<FunctionBody>, ParseError> {
        self.expect(Token::LeftParen)?;
        let mut params: Vec<Rc<str>> = Vec::new();
        if is_method {
            params.push("self".into());
        }
        if !self.check(&Token::RightParen) {
            loop {
                if self.check(&Token::DotDotDot) {
                    return Err(self.error_near("varargs are not supported"));
                }
                params.push(self.expect_identifier()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RightParen)?;

        let enclosing_loops = std::mem::take(&mut self.loop_depth);
        let block = self.parse_block();
        self.loop_depth = enclosing_loops;
        let block = block?;
        self.expect_closing(Token::End, "function", line)?;

        Ok(Rc::new(FunctionBody {
            params,
            block,
            line,
            is_main: false,
        }))
    }

    fn parse_local(&mut self) -> Result<StatementKind, ParseError> {
        let mut names = vec![self.expect_identifier()?];
        while self.eat(&Token::Comma) {
            names.push(self.expect_identifier()?);
        }
        let values = if self.eat(&Token::Equal) {
            self.parse_expr_list()?
        } else {
            Vec::new()
        };
        Ok(StatementKind::Local { names, values })
    }

    fn parse_expr_statement(&mut self) -> Result<StatementKind, ParseError> {
        let first = self.parse_suffixed_expr()?;

        if self.check(&Token::Equal) || self.check(&Token::Comma) {
            let mut targets = vec![first];
            while self.eat(&Token::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            if targets
                .iter()
                .any(|t| !matches!(t, Expr::Name(_) | Expr::Index(_, _)))
            {
                return Err(self.error_near("syntax error"));
            }
            self.expect(Token::Equal)?;
            let values = self.parse_expr_list()?;
            return Ok(StatementKind::Assign { targets, values });
        }

        match first {
            Expr::Call(_) => Ok(StatementKind::Call(first)),
            _ => Err(self.error_near("syntax error")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    fn statements(source: &str) -> Vec<StatementKind> {
        parse(source, "test")
            .unwrap()
            .body
            .block
            .statements
            .iter()
            .map(|s| s.kind.clone())
            .collect()
    }

    #[test]
    fn test_parse_local_multiple() {
        match &statements("local a, b = 1")[0] {
            StatementKind::Local { names, values } => {
                assert_eq!(names.len(), 2);
                assert_eq!(values.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_chain() {
        match &statements("if a then x() elseif b then y() else z() end")[0] {
            StatementKind::If {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert!(otherwise.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_loops() {
        let parsed = statements(
            "for i = 1, 10, 2 do end\nfor k, v in pairs(t) do break end\nwhile true do break end\nrepeat local x = 1 until x",
        );
        assert!(matches!(parsed[0], StatementKind::NumericFor { step: Some(_), .. }));
        assert!(matches!(parsed[1], StatementKind::GenericFor { .. }));
        assert!(matches!(parsed[2], StatementKind::While { .. }));
        assert!(matches!(parsed[3], StatementKind::Repeat { .. }));
    }

    #[test]
    fn test_break_inside_nested_function_is_rejected() {
        let err = parse("while true do local f = function() break end end", "t").unwrap_err();
        assert!(err.message.contains("no loop to break"));
    }

    #[test]
    fn test_return_must_end_block() {
        assert!(parse("return 1 print(2)", "t").is_err());
        assert!(parse("do return end print(2)", "t").is_ok());
    }

    #[test]
    fn test_assignment_to_call_is_rejected() {
        assert!(parse("f() = 1", "t").is_err());
    }

    #[test]
    fn test_bare_expression_is_rejected() {
        let err = parse("x", "t").unwrap_err();
        assert!(err.message.starts_with("syntax error"));
    }
}
