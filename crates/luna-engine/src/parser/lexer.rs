//! Lexer for script sources.
//!
//! Built on logos. Comments and whitespace are skipped inside the generated
//! state machine; long brackets (`[[ ... ]]`, `[==[ ... ]==]`) are consumed by
//! callbacks because their terminator depends on the opening level.

use super::token::{Span, Token};
use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
enum LogosToken {
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[token("--", lex_comment)]
    Comment,

    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    Elseif,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("local")]
    Local,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("repeat")]
    Repeat,
    #[token("return")]
    Return,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("until")]
    Until,
    #[token("while")]
    While,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", parse_float)]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\(.|\n))*""#, parse_string)]
    #[regex(r#"'([^'\\\n]|\\(.|\n))*'"#, parse_string)]
    #[regex(r"\[=*\[", lex_long_string)]
    String(String),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("#")]
    Hash,
    #[token("==")]
    EqualEqual,
    #[token("~=")]
    TildeEqual,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Equal,
    #[token("..")]
    DotDot,
    #[token("...")]
    DotDotDot,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
}

/// Level of a long bracket opening at the start of `text` (`[[` is level 0).
fn long_bracket_level(text: &str) -> Option<usize> {
    let rest = text.strip_prefix('[')?;
    let level = rest.chars().take_while(|&c| c == '=').count();
    rest[level..].starts_with('[').then_some(level)
}

fn lex_comment(lex: &mut logos::Lexer<LogosToken>) -> logos::Skip {
    let remainder = lex.remainder();

    if let Some(level) = long_bracket_level(remainder) {
        let close = format!("]{}]", "=".repeat(level));
        match remainder.find(&close) {
            Some(end) => lex.bump(end + close.len()),
            None => lex.bump(remainder.len()),
        }
    } else {
        let end = remainder.find('\n').unwrap_or(remainder.len());
        lex.bump(end);
    }

    logos::Skip
}

fn lex_long_string(lex: &mut logos::Lexer<LogosToken>) -> Option<String> {
    let level = lex.slice().len() - 2;
    let close = format!("]{}]", "=".repeat(level));
    let remainder = lex.remainder();
    let end = remainder.find(&close)?;
    let content = &remainder[..end];
    // A newline right after the opening bracket is not part of the string.
    let content = content
        .strip_prefix("\r\n")
        .or_else(|| content.strip_prefix('\n'))
        .unwrap_or(content)
        .to_string();
    lex.bump(end + close.len());
    Some(content)
}

fn parse_hex(lex: &mut logos::Lexer<LogosToken>) -> Option<f64> {
    u64::from_str_radix(&lex.slice()[2..], 16)
        .ok()
        .map(|n| n as f64)
}

fn parse_float(lex: &mut logos::Lexer<LogosToken>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_string(lex: &mut logos::Lexer<LogosToken>) -> Option<String> {
    let s = lex.slice();
    unescape(&s[1..s.len() - 1])
}

fn unescape(inner: &str) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next()? {
            'n' | '\n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'v' => '\x0b',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            digit if digit.is_ascii_digit() => {
                let mut code = digit.to_digit(10)?;
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(10)) {
                        Some(d) => {
                            code = code * 10 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                if code > 255 {
                    return None;
                }
                char::from(code as u8)
            }
            _ => return None,
        };
        out.push(escaped);
    }

    Some(out)
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnexpectedCharacter { char: char, span: Span },
    UnterminatedString { span: Span },
    InvalidNumber { text: String, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::InvalidNumber { span, .. } => *span,
        }
    }

    pub fn message(&self) -> String {
        match self {
            LexError::UnexpectedCharacter { char, .. } => {
                format!("unexpected symbol near '{}'", char)
            }
            LexError::UnterminatedString { .. } => "unfinished string".to_string(),
            LexError::InvalidNumber { text, .. } => format!("malformed number near '{}'", text),
        }
    }
}

/// Converts source text into tokens with line/column information.
pub struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<(Token, Span)>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Tokenize the whole source. The token list always ends with `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<(Token, Span)>, Vec<LexError>> {
        let mut logos_lexer = LogosToken::lexer(self.source);
        let mut line = 1u32;
        let mut column = 1u32;
        let mut last_end = 0;

        while let Some(token_result) = logos_lexer.next() {
            let range = logos_lexer.span();
            advance_position(&self.source[last_end..range.start], &mut line, &mut column);
            let span = Span::new(range.start, range.end, line, column);

            match token_result {
                Ok(logos_token) => {
                    let token = self.convert_token(logos_token, logos_lexer.slice());
                    self.tokens.push((token, span));
                }
                Err(()) => {
                    let text = &self.source[range.clone()];
                    let first = text.chars().next().unwrap_or('\0');
                    let error = match first {
                        '"' | '\'' | '[' => LexError::UnterminatedString { span },
                        c if c.is_ascii_digit() || c == '.' => LexError::InvalidNumber {
                            text: text.to_string(),
                            span,
                        },
                        c => LexError::UnexpectedCharacter { char: c, span },
                    };
                    self.errors.push(error);
                }
            }

            advance_position(&self.source[range.clone()], &mut line, &mut column);
            last_end = range.end;
        }

        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        advance_position(&self.source[last_end..], &mut line, &mut column);
        let end = self.source.len();
        self.tokens.push((Token::Eof, Span::new(end, end, line, column)));
        Ok(self.tokens)
    }

    fn convert_token(&self, token: LogosToken, slice: &str) -> Token {
        match token {
            LogosToken::Whitespace | LogosToken::Comment => Token::Eof,
            LogosToken::And => Token::And,
            LogosToken::Break => Token::Break,
            LogosToken::Do => Token::Do,
            LogosToken::Else => Token::Else,
            LogosToken::Elseif => Token::Elseif,
            LogosToken::End => Token::End,
            LogosToken::False => Token::False,
            LogosToken::For => Token::For,
            LogosToken::Function => Token::Function,
            LogosToken::If => Token::If,
            LogosToken::In => Token::In,
            LogosToken::Local => Token::Local,
            LogosToken::Nil => Token::Nil,
            LogosToken::Not => Token::Not,
            LogosToken::Or => Token::Or,
            LogosToken::Repeat => Token::Repeat,
            LogosToken::Return => Token::Return,
            LogosToken::Then => Token::Then,
            LogosToken::True => Token::True,
            LogosToken::Until => Token::Until,
            LogosToken::While => Token::While,
            LogosToken::Identifier => Token::Identifier(slice.into()),
            LogosToken::Number(n) => Token::Number(n),
            LogosToken::String(s) => Token::String(s.into()),
            LogosToken::Plus => Token::Plus,
            LogosToken::Minus => Token::Minus,
            LogosToken::Star => Token::Star,
            LogosToken::Slash => Token::Slash,
            LogosToken::Percent => Token::Percent,
            LogosToken::Caret => Token::Caret,
            LogosToken::Hash => Token::Hash,
            LogosToken::EqualEqual => Token::EqualEqual,
            LogosToken::TildeEqual => Token::TildeEqual,
            LogosToken::LessEqual => Token::LessEqual,
            LogosToken::GreaterEqual => Token::GreaterEqual,
            LogosToken::Less => Token::Less,
            LogosToken::Greater => Token::Greater,
            LogosToken::Equal => Token::Equal,
            LogosToken::DotDot => Token::DotDot,
            LogosToken::DotDotDot => Token::DotDotDot,
            LogosToken::LeftParen => Token::LeftParen,
            LogosToken::RightParen => Token::RightParen,
            LogosToken::LeftBrace => Token::LeftBrace,
            LogosToken::RightBrace => Token::RightBrace,
            LogosToken::LeftBracket => Token::LeftBracket,
            LogosToken::RightBracket => Token::RightBracket,
            LogosToken::Semicolon => Token::Semicolon,
            LogosToken::Colon => Token::Colon,
            LogosToken::Comma => Token::Comma,
            LogosToken::Dot => Token::Dot,
        }
    }
}

fn advance_position(text: &str, line: &mut u32, column: &mut u32) {
    for c in text.chars() {
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .expect("lexing failed")
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            lex("local function foo end"),
            vec![
                Token::Local,
                Token::Function,
                Token::Identifier("foo".into()),
                Token::End,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            lex("3 0.5 .25 1e3 0x10"),
            vec![
                Token::Number(3.0),
                Token::Number(0.5),
                Token::Number(0.25),
                Token::Number(1000.0),
                Token::Number(16.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            lex(r#""a\tb" 'it\'s' "\65""#),
            vec![
                Token::String("a\tb".into()),
                Token::String("it's".into()),
                Token::String("A".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_long_strings() {
        assert_eq!(
            lex("[[\nline one\nline two]] [==[a]]b]==]"),
            vec![
                Token::String("line one\nline two".into()),
                Token::String("a]]b".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            lex("a -- line comment\n--[[ block\ncomment ]] b"),
            vec![
                Token::Identifier("a".into()),
                Token::Identifier("b".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("a .. b ~= c ... #t"),
            vec![
                Token::Identifier("a".into()),
                Token::DotDot,
                Token::Identifier("b".into()),
                Token::TildeEqual,
                Token::Identifier("c".into()),
                Token::DotDotDot,
                Token::Hash,
                Token::Identifier("t".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Lexer::new("a\n  b\n\nc").tokenize().unwrap();
        let lines: Vec<(u32, u32)> = tokens.iter().map(|(_, s)| (s.line, s.column)).collect();
        assert_eq!(lines[0], (1, 1));
        assert_eq!(lines[1], (2, 3));
        assert_eq!(lines[2], (4, 1));
    }

    #[test]
    fn test_unterminated_string() {
        let errors = Lexer::new("x = \"open").tokenize().unwrap_err();
        assert!(matches!(errors[0], LexError::UnterminatedString { .. }));
    }

    #[test]
    fn test_unexpected_character() {
        let errors = Lexer::new("a = $").tokenize().unwrap_err();
        assert!(matches!(
            errors[0],
            LexError::UnexpectedCharacter { char: '$', .. }
        ));
    }
}
