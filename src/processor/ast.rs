//! Syntax tree of one Zeile source file, before it is lowered to IR.
//!
//! Every statement and expression remembers the 1-based line it started on;
//! that is all the builder needs to anchor its diagnostics.

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    /// Name of the annotated type, if any (`who: Character`).
    pub annotation: Option<Ident>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    /// Line of the closing brace.
    pub end_line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceArm {
    pub label: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `let name = value` / `var name = value`
    Let {
        name: Ident,
        mutable: bool,
        value: Expr,
    },

    /// `name = value`
    Assign { target: Ident, value: Expr },

    /// `func name(a, b: Int) { … }`
    Func {
        name: Ident,
        params: Vec<Param>,
        body: Block,
    },

    /// `return [value]`
    Return(Option<Expr>),

    /// `if cond { … } [else { … } | else if …]`
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },

    /// `while cond { … }`
    While { condition: Expr, body: Block },

    /// `choice { "label" { … } … }`
    Choice { arms: Vec<ChoiceArm> },

    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Str(String),
    Bool(bool),
    Ident(String),

    /// `["en": "Hello", "jp": "こんにちは"]` – resolved against the build locale.
    Localized(Vec<(String, String)>),

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },

    /// `base.name`
    Member {
        base: Box<Expr>,
        name: Ident,
    },

    /// Stand-in for an expression that failed to parse. Already reported.
    Error,
}

impl Expr {
    pub fn new(kind: ExprKind, line: u32) -> Self {
        Self { kind, line }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ExprKind::Error)
    }
}
