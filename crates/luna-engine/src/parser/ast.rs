//! Abstract syntax tree.
//!
//! Function bodies are reference counted so closures created at runtime can
//! share them with the chunk that defined them.

use std::rc::Rc;

/// A parsed source unit.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub name: Rc<str>,
    pub body: Rc<FunctionBody>,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    /// `local a, b = x, y`
    Local { names: Vec<Rc<str>>, values: Vec<Expr> },
    /// `local function f() end`
    LocalFunction { name: Rc<str>, body: Rc<FunctionBody> },
    /// `a, t.b = x, y`, also `function a.b:c() end` after desugaring.
    Assign { targets: Vec<Expr>, values: Vec<Expr> },
    /// A call used as a statement.
    Call(Expr),
    If {
        branches: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
    },
    While { condition: Expr, body: Block },
    Repeat { body: Block, condition: Expr },
    NumericFor {
        variable: Rc<str>,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    GenericFor {
        names: Vec<Rc<str>>,
        values: Vec<Expr>,
        body: Block,
    },
    Do(Block),
    Break,
    Return(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Nil,
    True,
    False,
    Number(f64),
    String(Rc<str>),
    Function(Rc<FunctionBody>),
    Table(Vec<TableField>),
    Name(Rc<str>),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<CallExpr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    /// Parenthesized expression; truncates multiple results to one.
    Paren(Box<Expr>),
}

impl Expr {
    /// Whether the expression can produce more than one value.
    pub fn is_multi(&self) -> bool {
        matches!(self, Expr::Call(_))
    }
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Expr,
    /// `obj:method(...)` form.
    pub method: Option<Rc<str>>,
    pub args: Vec<Expr>,
    pub line: u32,
}

impl CallExpr {
    /// Name of the called function as seen at the call site, for tracebacks.
    pub fn callee_name(&self) -> Option<Rc<str>> {
        if let Some(method) = &self.method {
            return Some(method.clone());
        }
        match &self.callee {
            Expr::Name(name) => Some(name.clone()),
            Expr::Index(_, key) => match key.as_ref() {
                Expr::String(name) => Some(name.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TableField {
    /// `{ x }`
    Positional(Expr),
    /// `{ name = x }` and `{ [k] = x }`
    Keyed(Expr, Expr),
}

#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub params: Vec<Rc<str>>,
    pub block: Block,
    /// Line of the `function` keyword; 0 for the main chunk.
    pub line: u32,
    pub is_main: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    NotEqual,
    Equal,
    Concat,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::NotEqual => "~=",
            BinaryOp::Equal => "==",
            BinaryOp::Concat => "..",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Power => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Length,
}
