//! Operator precedence table.
//!
//! Each binary operator has a left and a right binding power; an operator is
//! right associative when its right power is lower than its left one.

use super::ast::BinaryOp;
use super::token::Token;

/// Binding power of unary operators.
pub const UNARY_PRIORITY: u8 = 12;

/// Map a token to its binary operator and `(left, right)` binding powers.
pub fn binary_operator(token: &Token) -> Option<(BinaryOp, u8, u8)> {
    let entry = match token {
        Token::Or => (BinaryOp::Or, 1, 1),
        Token::And => (BinaryOp::And, 2, 2),
        Token::Less => (BinaryOp::Less, 3, 3),
        Token::Greater => (BinaryOp::Greater, 3, 3),
        Token::LessEqual => (BinaryOp::LessEqual, 3, 3),
        Token::GreaterEqual => (BinaryOp::GreaterEqual, 3, 3),
        Token::TildeEqual => (BinaryOp::NotEqual, 3, 3),
        Token::EqualEqual => (BinaryOp::Equal, 3, 3),
        Token::DotDot => (BinaryOp::Concat, 9, 8),
        Token::Plus => (BinaryOp::Add, 10, 10),
        Token::Minus => (BinaryOp::Subtract, 10, 10),
        Token::Star => (BinaryOp::Multiply, 11, 11),
        Token::Slash => (BinaryOp::Divide, 11, 11),
        Token::Percent => (BinaryOp::Modulo, 11, 11),
        Token::Caret => (BinaryOp::Power, 14, 13),
        _ => return None,
    };
    Some(entry)
}
