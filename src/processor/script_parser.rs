//! Recursive-descent parser that turns the token stream into a `Script`.
//!
//! Parsing never stops at the first problem. A malformed statement produces an
//! error diagnostic on the offending token's line, the parser skips to the end
//! of that line (or past the block the line opened) and carries on, so the
//! editor can show every problem in the file at once.

use super::ast::*;
use super::lexer::{Keyword, Punct, Token, TokenKind, tokenize};
use crate::model::Diagnostic;

/// Marker for "a diagnostic was already recorded, unwind to the statement".
#[derive(Debug)]
struct Recover;

type PResult<T> = Result<T, Recover>;

/// Deepest nesting of expressions and blocks accepted in one statement.
const MAX_DEPTH: usize = 128;

/// Parses one source file. Always returns a (possibly partial) script.
pub fn parse(source: &str) -> (Script, Vec<Diagnostic>) {
    let tokens = tokenize(source)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Comment)
        .collect();
    let mut parser = Parser::new(tokens);
    let body = parser.parse_script();
    (Script { body }, parser.diagnostics)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Depth of open `(`/`[`; newlines are insignificant while positive.
    nesting: usize,
    /// Recursion depth of the statement being parsed; capped at `MAX_DEPTH`.
    depth: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            depth: 0,
            diagnostics: Vec::new(),
        }
    }

    // ── token cursor ────────────────────────────────────────────────────

    fn peek(&mut self) -> &Token {
        if self.nesting > 0 {
            while self.tokens[self.pos].kind == TokenKind::Newline {
                self.pos += 1;
            }
        }
        &self.tokens[self.pos]
    }

    fn peek_kind(&mut self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_nth_kind(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn line(&mut self) -> u32 {
        self.peek().line
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn at_punct(&mut self, p: Punct) -> bool {
        *self.peek_kind() == TokenKind::Punct(p)
    }

    fn at_keyword(&mut self, k: Keyword) -> bool {
        *self.peek_kind() == TokenKind::Keyword(k)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.at_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn at_statement_end(&mut self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Eof | TokenKind::Punct(Punct::RBrace)
        )
    }

    fn skip_newlines(&mut self) {
        while *self.peek_kind() == TokenKind::Newline {
            self.bump();
        }
    }

    fn error<T>(&mut self, message: impl Into<String>) -> PResult<T> {
        let line = self.line();
        self.error_at(line, message);
        Err(Recover)
    }

    fn error_at(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(line, message));
    }

    fn descend(&mut self, what: &str) -> PResult<()> {
        if self.depth >= MAX_DEPTH {
            return self.error(format!("{what} is nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn expect_punct(&mut self, p: Punct, context: &str) -> PResult<Token> {
        if self.at_punct(p) {
            Ok(self.bump())
        } else {
            let found = describe(self.peek_kind());
            self.error(format!("expected '{}' {context}, found {found}", p.as_str()))
        }
    }

    fn expect_ident(&mut self, context: &str) -> PResult<Ident> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Ident {
                    name,
                    line: tok.line,
                })
            }
            TokenKind::Keyword(k) => self.error(format!(
                "keyword '{}' cannot be used as an identifier",
                k.as_str()
            )),
            other => self.error(format!("expected identifier {context}, found {}", describe(&other))),
        }
    }

    /// Skips the rest of a broken statement. Stops before a `}` that closes
    /// the enclosing block and after the newline ending the statement; a `{`
    /// opened on the broken line is skipped together with its block.
    fn synchronize(&mut self) {
        self.nesting = 0;
        let mut depth = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::Newline if depth == 0 => {
                    self.bump();
                    return;
                }
                TokenKind::Punct(Punct::RBrace) if depth == 0 => return,
                TokenKind::Punct(Punct::RBrace) => depth -= 1,
                TokenKind::Punct(Punct::LBrace) => depth += 1,
                _ => {}
            }
            self.bump();
        }
    }

    // ── statements ──────────────────────────────────────────────────────

    fn parse_script(&mut self) -> Vec<Stmt> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Punct(Punct::RBrace) => {
                    let line = self.line();
                    self.error_at(line, "unexpected '}' without a matching '{'");
                    self.bump();
                }
                _ => {
                    if let Some(stmt) = self.parse_stmt_recovering() {
                        body.push(stmt);
                    }
                }
            }
        }
        body
    }

    fn parse_stmt_recovering(&mut self) -> Option<Stmt> {
        let depth = self.depth;
        let result = self.parse_stmt().and_then(|stmt| {
            if self.at_statement_end() {
                Ok(stmt)
            } else {
                let found = describe(self.peek_kind());
                self.error(format!(
                    "consecutive statements on a line must be separated by a newline, found {found}"
                ))
            }
        });
        self.depth = depth;
        match result {
            Ok(stmt) => Some(stmt),
            Err(Recover) => {
                self.synchronize();
                None
            }
        }
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let line = self.line();
        let kind = match self.peek_kind().clone() {
            TokenKind::Keyword(Keyword::Let) => self.parse_let(false)?,
            TokenKind::Keyword(Keyword::Var) => self.parse_let(true)?,
            TokenKind::Keyword(Keyword::Func) => self.parse_func()?,
            TokenKind::Keyword(Keyword::Return) => {
                self.bump();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expr()?))
                }
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::While) => {
                self.bump();
                let condition = self.parse_expr()?;
                let body = self.parse_block("after 'while' condition")?;
                StmtKind::While { condition, body }
            }
            TokenKind::Keyword(Keyword::Choice) => self.parse_choice()?,
            TokenKind::Keyword(Keyword::Else) => {
                return self.error("'else' without a matching 'if'");
            }
            TokenKind::Ident(name)
                if *self.peek_nth_kind(1) == TokenKind::Punct(Punct::Assign) =>
            {
                self.bump();
                self.bump();
                let value = self.parse_expr()?;
                StmtKind::Assign {
                    target: Ident { name, line },
                    value,
                }
            }
            _ => StmtKind::Expr(self.parse_expr()?),
        };
        Ok(Stmt { kind, line })
    }

    fn parse_let(&mut self, mutable: bool) -> PResult<StmtKind> {
        let keyword = if mutable { "var" } else { "let" };
        self.bump();
        let name = self.expect_ident(&format!("after '{keyword}'"))?;
        self.expect_punct(Punct::Assign, "in declaration")?;
        let value = self.parse_expr()?;
        Ok(StmtKind::Let {
            name,
            mutable,
            value,
        })
    }

    fn parse_func(&mut self) -> PResult<StmtKind> {
        self.bump();
        let name = self.expect_ident("after 'func'")?;
        self.expect_punct(Punct::LParen, "after function name")?;
        self.nesting += 1;
        let mut params = Vec::new();
        if !self.at_punct(Punct::RParen) {
            loop {
                let pname = self.expect_ident("in parameter list")?;
                let annotation = if self.eat_punct(Punct::Colon) {
                    Some(self.expect_ident("after ':'")?)
                } else {
                    None
                };
                params.push(Param {
                    name: pname,
                    annotation,
                });
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen, "to close parameter list")?;
        self.nesting -= 1;
        let body = self.parse_block("before function body")?;
        Ok(StmtKind::Func { name, params, body })
    }

    fn parse_if(&mut self) -> PResult<StmtKind> {
        self.descend("'if'")?;
        self.bump();
        let condition = self.parse_expr()?;
        let then_branch = self.parse_block("after 'if' condition")?;
        let else_branch = if self.at_keyword(Keyword::Else) {
            self.bump();
            if self.at_keyword(Keyword::If) {
                let line = self.line();
                let nested = self.parse_if()?;
                Some(Block {
                    stmts: vec![Stmt { kind: nested, line }],
                    end_line: line,
                })
            } else {
                Some(self.parse_block("after 'else'")?)
            }
        } else {
            None
        };
        self.ascend(1);
        Ok(StmtKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_choice(&mut self) -> PResult<StmtKind> {
        let choice_line = self.line();
        self.bump();
        self.expect_punct(Punct::LBrace, "after 'choice'")?;
        let mut arms = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::Punct(Punct::RBrace) => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => {
                    return self.error(format!(
                        "expected '}}' to close 'choice' opened on line {choice_line}"
                    ));
                }
                _ => {}
            }
            let label = match self.peek_kind() {
                TokenKind::Str { .. } | TokenKind::Punct(Punct::LBracket) => self.parse_primary()?,
                other => {
                    let found = describe(other);
                    return self.error(format!(
                        "choice option must start with a string label, found {found}"
                    ));
                }
            };
            let body = self.parse_block("after choice label")?;
            arms.push(ChoiceArm { label, body });
        }
        if arms.is_empty() {
            self.error_at(choice_line, "'choice' needs at least one option");
        }
        Ok(StmtKind::Choice { arms })
    }

    /// `{` stmt* `}`. Statements inside recover on their own; only a missing
    /// opening brace or end of input fails the block.
    fn parse_block(&mut self, context: &str) -> PResult<Block> {
        self.descend("block")?;
        let open = self.expect_punct(Punct::LBrace, context)?;
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::Punct(Punct::RBrace) => {
                    let close = self.bump();
                    self.ascend(1);
                    return Ok(Block {
                        stmts,
                        end_line: close.line,
                    });
                }
                TokenKind::Eof => {
                    return self.error(format!(
                        "expected '}}' to close block opened on line {}",
                        open.line
                    ));
                }
                _ => {
                    if let Some(stmt) = self.parse_stmt_recovering() {
                        stmts.push(stmt);
                    }
                }
            }
        }
    }

    // ── expressions ─────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.descend("expression")?;
        let expr = self.parse_binary(1)?;
        self.ascend(1);
        Ok(expr)
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        let mut chained = 0;
        loop {
            let Some((op, prec)) = binary_op(self.peek_kind()) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.descend("expression")?;
            chained += 1;
            let op_tok = self.bump();
            if self.at_statement_end() {
                return self.error(format!(
                    "expected expression after '{}'",
                    op.symbol()
                ));
            }
            let rhs = self.parse_binary(prec + 1)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                op_tok.line,
            );
        }
        self.ascend(chained);
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Punct(Punct::Minus) => UnaryOp::Neg,
            TokenKind::Punct(Punct::Bang) => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.descend("expression")?;
        let tok = self.bump();
        let operand = self.parse_unary()?;
        self.ascend(1);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            tok.line,
        ))
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        let mut chained = 0;
        loop {
            if self.at_punct(Punct::LParen) || self.at_punct(Punct::Dot) {
                self.descend("expression")?;
                chained += 1;
            }
            if self.at_punct(Punct::LParen) {
                let open = self.bump();
                self.nesting += 1;
                let mut args = Vec::new();
                if !self.at_punct(Punct::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat_punct(Punct::Comma) {
                            break;
                        }
                    }
                }
                self.expect_punct(Punct::RParen, "to close argument list")?;
                self.nesting -= 1;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    open.line,
                );
            } else if self.at_punct(Punct::Dot) {
                self.bump();
                let name = self.expect_ident("after '.'")?;
                let line = expr.line;
                expr = Expr::new(
                    ExprKind::Member {
                        base: Box::new(expr),
                        name,
                    },
                    line,
                );
            } else {
                break;
            }
        }
        self.ascend(chained);
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        let line = tok.line;
        let kind = match tok.kind {
            TokenKind::Int(Some(v)) => ExprKind::Int(v),
            TokenKind::Int(None) => {
                self.error_at(line, "integer literal is too large");
                ExprKind::Error
            }
            TokenKind::Str { value, terminated } => {
                if !terminated {
                    self.error_at(line, "unterminated string literal");
                }
                ExprKind::Str(value)
            }
            TokenKind::Keyword(Keyword::True) => ExprKind::Bool(true),
            TokenKind::Keyword(Keyword::False) => ExprKind::Bool(false),
            TokenKind::Ident(name) => ExprKind::Ident(name),
            TokenKind::Placeholder(name) => {
                self.error_at(line, format!("editor placeholder <#{name}#> in source file"));
                ExprKind::Error
            }
            TokenKind::Punct(Punct::LParen) => {
                self.bump();
                self.nesting += 1;
                let inner = self.parse_expr()?;
                self.expect_punct(Punct::RParen, "to close parenthesized expression")?;
                self.nesting -= 1;
                return Ok(inner);
            }
            TokenKind::Punct(Punct::LBracket) => return self.parse_localized(),
            other => {
                return self.error(format!("expected expression, found {}", describe(&other)));
            }
        };
        self.bump();
        Ok(Expr::new(kind, line))
    }

    fn parse_localized(&mut self) -> PResult<Expr> {
        let open = self.bump();
        self.nesting += 1;
        let mut entries = Vec::new();
        if !self.at_punct(Punct::RBracket) {
            loop {
                let key = self.expect_string("as locale key")?;
                self.expect_punct(Punct::Colon, "after locale key")?;
                let value = self.expect_string("as localized text")?;
                entries.push((key, value));
                if !self.eat_punct(Punct::Comma) || self.at_punct(Punct::RBracket) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RBracket, "to close localized text")?;
        self.nesting -= 1;
        if entries.is_empty() {
            self.error_at(open.line, "localized text needs at least one entry");
            return Ok(Expr::new(ExprKind::Error, open.line));
        }
        Ok(Expr::new(ExprKind::Localized(entries), open.line))
    }

    fn expect_string(&mut self, context: &str) -> PResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Str { value, terminated } => {
                let line = self.line();
                if !terminated {
                    self.error_at(line, "unterminated string literal");
                }
                self.bump();
                Ok(value)
            }
            other => self.error(format!(
                "expected string literal {context}, found {}",
                describe(&other)
            )),
        }
    }
}

fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    let TokenKind::Punct(p) = kind else {
        return None;
    };
    let op = match p {
        Punct::OrOr => (BinaryOp::Or, 1),
        Punct::AndAnd => (BinaryOp::And, 2),
        Punct::EqEq => (BinaryOp::Eq, 3),
        Punct::NotEq => (BinaryOp::NotEq, 3),
        Punct::Lt => (BinaryOp::Lt, 4),
        Punct::LtEq => (BinaryOp::LtEq, 4),
        Punct::Gt => (BinaryOp::Gt, 4),
        Punct::GtEq => (BinaryOp::GtEq, 4),
        Punct::Plus => (BinaryOp::Add, 5),
        Punct::Minus => (BinaryOp::Sub, 5),
        Punct::Star => (BinaryOp::Mul, 6),
        Punct::Slash => (BinaryOp::Div, 6),
        Punct::Percent => (BinaryOp::Rem, 6),
        _ => return None,
    };
    Some(op)
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Keyword(k) => format!("keyword '{}'", k.as_str()),
        TokenKind::Ident(name) => format!("identifier '{name}'"),
        TokenKind::Int(_) => "integer literal".to_string(),
        TokenKind::Str { .. } => "string literal".to_string(),
        TokenKind::Punct(p) => format!("'{}'", p.as_str()),
        TokenKind::Comment => "comment".to_string(),
        TokenKind::Placeholder(_) => "editor placeholder".to_string(),
        TokenKind::Newline => "end of line".to_string(),
        TokenKind::Unknown(c) => format!("unexpected character '{c}'"),
        TokenKind::Eof => "end of file".to_string(),
    }
}
