//! IR builder: checks and lowers the phases of a project into one `StoryIR`.
//!
//! Phases are linked in order through a single global scope, so a phase can
//! only see what earlier phases (and earlier lines of itself) declared. Every
//! problem becomes a `Diagnostic` attributed to the phase it was found in; the
//! build yields a program only when no phase produced an error.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::ast::*;
use super::builtins::{self, AssetKind, BuiltinFunction, BuiltinOp, ParamKind, Position, Ty};
use super::ir::{
    ArithOp, AssetRef, ChoiceOption, FunctionInfo, Instruction, MAX_SLOTS, SourceLoc, StoryIR,
};
use super::script_parser::parse;
use crate::model::{Diagnostic, DiagnosticSet, Locale, ProjectMetadata};

/// One source file fed to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase<'a> {
    pub name: &'a str,
    pub source: &'a str,
}

impl<'a> Phase<'a> {
    pub fn new(name: &'a str, source: &'a str) -> Self {
        Self { name, source }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Carried into the IR; `metadata.locale` picks localized texts.
    pub metadata: ProjectMetadata,
    /// When set, asset references are checked against this folder.
    pub asset_folder: Option<PathBuf>,
}

impl BuildOptions {
    pub fn for_locale(locale: Locale) -> Self {
        Self {
            metadata: ProjectMetadata {
                locale,
                ..ProjectMetadata::default()
            },
            asset_folder: None,
        }
    }

    pub fn with_asset_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.asset_folder = Some(folder.into());
        self
    }

    pub fn locale(&self) -> Locale {
        self.metadata.locale
    }
}

/// Builds all phases into a single program.
///
/// Diagnostics of every phase are appended to `diagnostics`, keyed by phase
/// name. Returns `None` when any of them is an error.
pub fn build_ir(
    phases: &[Phase<'_>],
    options: &BuildOptions,
    diagnostics: &mut DiagnosticSet,
) -> Option<StoryIR> {
    let (ir, per_phase) = compile_phases(phases, options);
    for (phase, diags) in phases.iter().zip(per_phase) {
        diagnostics.extend(phase.name, diags);
    }
    ir
}

/// Diagnostics for `source` as if it were linked after `preceding`.
///
/// Only the diagnostics of `source` itself are returned.
pub fn generate_diagnostics(
    preceding: &[Phase<'_>],
    source: &str,
    options: &BuildOptions,
) -> Vec<Diagnostic> {
    let mut phases = preceding.to_vec();
    phases.push(Phase::new("", source));
    let (_, mut per_phase) = compile_phases(&phases, options);
    let mut diags = per_phase.pop().unwrap_or_default();
    diags.sort_by_key(|d| d.line);
    diags
}

const MAX_PHASES: usize = u16::MAX as usize + 1;

fn compile_phases(
    phases: &[Phase<'_>],
    options: &BuildOptions,
) -> (Option<StoryIR>, Vec<Vec<Diagnostic>>) {
    let mut builder = Builder::new(options, phases.len());
    for (idx, phase) in phases.iter().enumerate() {
        let (script, parse_diags) = parse(phase.source);
        debug!(
            phase = phase.name,
            statements = script.body.len(),
            parse_errors = parse_diags.len(),
            "linking phase"
        );
        let Ok(phase_no) = u16::try_from(idx) else {
            builder.diags[idx].push(Diagnostic::error(
                1,
                format!(
                    "too many code phases; at most {} are supported",
                    MAX_PHASES
                ),
            ));
            break;
        };
        builder.phase = phase_no;
        builder.diags[idx].extend(parse_diags);
        if script.body.is_empty() {
            builder.diags[idx].push(Diagnostic::remark(
                1,
                format!("phase '{}' contains no statements", phase.name),
            ));
        }
        for stmt in &script.body {
            builder.compile_stmt(stmt);
        }
    }
    builder.emit(Instruction::Halt);

    let failed = builder
        .diags
        .iter()
        .flatten()
        .any(|d| d.severity.is_blocking());
    let ir = if failed {
        None
    } else {
        Some(StoryIR {
            metadata: options.metadata.clone(),
            phases: phases.iter().map(|p| p.name.to_string()).collect(),
            strings: builder.strings,
            assets: builder.assets,
            functions: builder.functions,
            globals: builder.globals,
            code: builder.code,
            lines: builder.lines,
        })
    };
    (ir, builder.diags)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Global(u32),
    Local(u32),
    Function(u32),
}

#[derive(Debug, Clone)]
struct Symbol {
    slot: Slot,
    ty: Ty,
    mutable: bool,
    line: u32,
    phase: u16,
    used: bool,
    mutated: bool,
    /// Parameters and top-level declarations are exempt from unused checks.
    checked: bool,
}

#[derive(Debug, Clone)]
struct FunctionSig {
    name: String,
    params: Vec<Ty>,
    returns_value: bool,
}

struct FunctionContext {
    next_local: u32,
}

struct Builder<'o> {
    options: &'o BuildOptions,
    phase: u16,
    line: u32,
    diags: Vec<Vec<Diagnostic>>,

    code: Vec<Instruction>,
    lines: Vec<SourceLoc>,
    strings: Vec<String>,
    string_index: HashMap<String, u32>,
    assets: Vec<AssetRef>,
    asset_index: HashMap<(AssetKind, String), u32>,
    functions: Vec<FunctionInfo>,
    signatures: Vec<FunctionSig>,
    globals: u32,

    symbols: Vec<Symbol>,
    /// `scopes[0]` is the global scope shared by all phases.
    scopes: Vec<HashMap<String, usize>>,
    function: Option<FunctionContext>,
}

impl<'o> Builder<'o> {
    fn new(options: &'o BuildOptions, phase_count: usize) -> Self {
        Self {
            options,
            phase: 0,
            line: 1,
            diags: vec![Vec::new(); phase_count.max(1)],
            code: Vec::new(),
            lines: Vec::new(),
            strings: Vec::new(),
            string_index: HashMap::new(),
            assets: Vec::new(),
            asset_index: HashMap::new(),
            functions: Vec::new(),
            signatures: Vec::new(),
            globals: 0,
            symbols: Vec::new(),
            scopes: vec![HashMap::new()],
            function: None,
        }
    }

    // ── emission ────────────────────────────────────────────────────────

    fn emit(&mut self, ins: Instruction) -> usize {
        self.code.push(ins);
        self.lines.push(SourceLoc {
            phase: self.phase,
            line: self.line,
        });
        self.code.len() - 1
    }

    fn here(&self) -> u32 {
        self.code.len() as u32
    }

    fn patch_jump(&mut self, at: usize, target: u32) {
        match &mut self.code[at] {
            Instruction::Jump(t) | Instruction::JumpUnless(t) => *t = target,
            _ => unreachable!("patching a non-jump instruction"),
        }
    }

    fn intern_string(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.string_index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), idx);
        idx
    }

    fn intern_asset(&mut self, kind: AssetKind, path: &str) -> u32 {
        let key = (kind, path.to_string());
        if let Some(&idx) = self.asset_index.get(&key) {
            return idx;
        }
        let idx = self.assets.len() as u32;
        self.assets.push(AssetRef {
            kind,
            path: path.to_string(),
        });
        self.asset_index.insert(key, idx);
        idx
    }

    // ── diagnostics ─────────────────────────────────────────────────────

    fn error(&mut self, line: u32, message: impl Into<String>) {
        self.diags[self.phase as usize].push(Diagnostic::error(line, message));
    }

    fn warning(&mut self, line: u32, message: impl Into<String>) {
        self.diags[self.phase as usize].push(Diagnostic::warning(line, message));
    }

    fn note_in(&mut self, phase: u16, line: u32, message: impl Into<String>) {
        self.diags[phase as usize].push(Diagnostic::note(line, message));
    }

    // ── scopes ──────────────────────────────────────────────────────────

    fn lookup(&self, name: &str) -> Option<usize> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        let mut ended: Vec<(String, usize)> = scope.into_iter().collect();
        ended.sort_by_key(|(_, id)| *id);
        for (name, id) in ended {
            let sym = self.symbols[id].clone();
            if !sym.checked || name.starts_with('_') {
                continue;
            }
            if !sym.used {
                self.warning(sym.line, format!("variable '{name}' was never used"));
            } else if sym.mutable && !sym.mutated {
                self.warning(
                    sym.line,
                    format!("variable '{name}' was never mutated; consider changing to 'let'"),
                );
            }
        }
    }

    /// Registers `name` in the innermost scope, reporting clashes.
    fn declare(&mut self, name: &Ident, slot: Slot, ty: Ty, mutable: bool) -> Option<usize> {
        if builtins::is_reserved(&name.name) {
            self.error(name.line, format!("cannot redeclare builtin '{}'", name.name));
            return None;
        }
        let innermost = self.scopes.len() - 1;
        if let Some(&prev) = self.scopes[innermost].get(&name.name) {
            let prev = self.symbols[prev].clone();
            self.error(name.line, format!("invalid redeclaration of '{}'", name.name));
            self.note_in(
                prev.phase,
                prev.line,
                format!("'{}' previously declared here", name.name),
            );
            return None;
        }
        let checked = innermost > 0 && !matches!(slot, Slot::Function(_));
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            slot,
            ty,
            mutable,
            line: name.line,
            phase: self.phase,
            used: false,
            mutated: false,
            checked,
        });
        self.scopes[innermost].insert(name.name.clone(), id);
        Some(id)
    }

    fn allocate_variable(&mut self) -> Slot {
        match &mut self.function {
            Some(ctx) => {
                let slot = ctx.next_local;
                ctx.next_local += 1;
                Slot::Local(slot)
            }
            None => {
                let slot = self.globals;
                self.globals += 1;
                Slot::Global(slot)
            }
        }
    }

    fn compile_scoped_block(&mut self, block: &Block) {
        self.push_scope();
        for stmt in &block.stmts {
            self.compile_stmt(stmt);
        }
        self.pop_scope();
    }

    // ── statements ──────────────────────────────────────────────────────

    fn compile_stmt(&mut self, stmt: &Stmt) {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Let {
                name,
                mutable,
                value,
            } => {
                let ty = self.compile_value(value);
                self.line = stmt.line;
                let slot = self.allocate_variable();
                if let Slot::Global(index) | Slot::Local(index) = slot
                    && index >= MAX_SLOTS
                {
                    self.error(
                        stmt.line,
                        format!("too many variables; at most {MAX_SLOTS} are supported"),
                    );
                }
                if self.declare(name, slot, ty, *mutable).is_some() {
                    self.emit_store(slot);
                }
            }
            StmtKind::Assign { target, value } => self.compile_assign(target, value),
            StmtKind::Func { name, params, body } => self.compile_func(stmt.line, name, params, body),
            StmtKind::Return(value) => {
                if self.function.is_none() {
                    self.error(stmt.line, "'return' outside of a function");
                    return;
                }
                match value {
                    Some(v) => {
                        self.compile_value(v);
                    }
                    None => {
                        self.emit(Instruction::PushUnit);
                    }
                }
                self.line = stmt.line;
                self.emit(Instruction::Return);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_condition(condition, "if");
                let to_else = self.emit(Instruction::JumpUnless(0));
                self.compile_scoped_block(then_branch);
                match else_branch {
                    Some(else_branch) => {
                        self.line = then_branch.end_line;
                        let to_end = self.emit(Instruction::Jump(0));
                        let else_start = self.here();
                        self.patch_jump(to_else, else_start);
                        self.compile_scoped_block(else_branch);
                        let end = self.here();
                        self.patch_jump(to_end, end);
                    }
                    None => {
                        let end = self.here();
                        self.patch_jump(to_else, end);
                    }
                }
            }
            StmtKind::While { condition, body } => {
                let start = self.here();
                self.compile_condition(condition, "while");
                let to_end = self.emit(Instruction::JumpUnless(0));
                self.compile_scoped_block(body);
                self.line = body.end_line;
                self.emit(Instruction::Jump(start));
                let end = self.here();
                self.patch_jump(to_end, end);
            }
            StmtKind::Choice { arms } => self.compile_choice(stmt.line, arms),
            StmtKind::Expr(expr) => {
                let ty = self.compile_expr(expr);
                self.line = stmt.line;
                if ty != Ty::Void {
                    self.emit(Instruction::Pop);
                    let is_call = matches!(expr.kind, ExprKind::Call { .. });
                    if !is_call && !expr.is_error() && ty != Ty::Unknown {
                        self.warning(stmt.line, "expression result is unused");
                    }
                }
            }
        }
    }

    fn emit_store(&mut self, slot: Slot) {
        match slot {
            Slot::Global(g) => self.emit(Instruction::StoreGlobal(g)),
            Slot::Local(l) => self.emit(Instruction::StoreLocal(l)),
            Slot::Function(_) => unreachable!("functions are not stored"),
        };
    }

    fn compile_assign(&mut self, target: &Ident, value: &Expr) {
        let Some(id) = self.lookup(&target.name) else {
            self.compile_value(value);
            self.error(target.line, format!("cannot find '{}' in scope", target.name));
            return;
        };
        let sym = self.symbols[id].clone();
        if let Slot::Function(_) = sym.slot {
            self.error(target.line, format!("cannot assign to function '{}'", target.name));
            return;
        }
        let ty = self.compile_value(value);
        self.line = target.line;
        if !sym.mutable {
            self.error(
                target.line,
                format!("cannot assign to value: '{}' is a 'let' constant", target.name),
            );
            self.note_in(
                sym.phase,
                sym.line,
                format!("change 'let' to 'var' to make '{}' mutable", target.name),
            );
            return;
        }
        if !sym.ty.accepts(ty) {
            self.error(
                target.line,
                format!(
                    "cannot assign value of type {ty} to variable '{}' of type {}",
                    target.name, sym.ty
                ),
            );
            return;
        }
        self.symbols[id].mutated = true;
        self.emit_store(sym.slot);
    }

    fn compile_func(&mut self, line: u32, name: &Ident, params: &[Param], body: &Block) {
        if self.function.is_some() || self.scopes.len() > 1 {
            self.error(line, "functions can only be declared at the top level of a phase");
            return;
        }
        if params.len() > u8::MAX as usize {
            self.error(line, "too many parameters");
            return;
        }

        let mut param_tys = Vec::with_capacity(params.len());
        for p in params {
            let ty = match &p.annotation {
                None => Ty::Unknown,
                Some(ann) => match Ty::from_annotation(&ann.name) {
                    Some(ty) => ty,
                    None => {
                        self.error(ann.line, format!("cannot find type '{}' in scope", ann.name));
                        Ty::Unknown
                    }
                },
            };
            param_tys.push(ty);
        }

        let index = self.functions.len() as u32;
        if self
            .declare(name, Slot::Function(index), Ty::Unknown, false)
            .is_none()
        {
            return;
        }
        self.signatures.push(FunctionSig {
            name: name.name.clone(),
            params: param_tys.clone(),
            returns_value: returns_value(&body.stmts),
        });
        self.functions.push(FunctionInfo {
            name: name.name.clone(),
            entry: 0,
            arity: params.len() as u8,
            locals: params.len() as u32,
        });

        self.line = line;
        let skip = self.emit(Instruction::Jump(0));
        let entry = self.here();
        self.function = Some(FunctionContext {
            next_local: params.len() as u32,
        });
        self.push_scope();
        for (i, (p, ty)) in params.iter().zip(param_tys).enumerate() {
            if self.declare(&p.name, Slot::Local(i as u32), ty, false).is_some() {
                if let Some(id) = self.lookup(&p.name.name) {
                    self.symbols[id].checked = false;
                }
            }
        }
        for stmt in &body.stmts {
            self.compile_stmt(stmt);
        }
        self.pop_scope();
        self.line = body.end_line;
        self.emit(Instruction::PushUnit);
        self.emit(Instruction::Return);

        let locals = self.function.take().map(|c| c.next_local).unwrap_or(0);
        let info = &mut self.functions[index as usize];
        info.entry = entry;
        info.locals = locals;
        let end = self.here();
        self.patch_jump(skip, end);
    }

    fn compile_condition(&mut self, condition: &Expr, keyword: &str) {
        let ty = self.compile_value(condition);
        if !Ty::Bool.accepts(ty) {
            self.error(
                condition.line,
                format!("'{keyword}' condition must be Bool, found {ty}"),
            );
        }
    }

    fn compile_choice(&mut self, line: u32, arms: &[ChoiceArm]) {
        let mut options = Vec::with_capacity(arms.len());
        for arm in arms {
            let label = match self.literal_text(&arm.label) {
                Some(text) => text,
                None => {
                    if !arm.label.is_error() {
                        self.error(arm.label.line, "choice label must be a string literal");
                    }
                    String::new()
                }
            };
            options.push(ChoiceOption {
                label: self.intern_string(&label),
                target: 0,
            });
        }
        self.line = line;
        let choice_at = self.emit(Instruction::Choice(options));

        let mut exits = Vec::with_capacity(arms.len());
        let mut targets = Vec::with_capacity(arms.len());
        for arm in arms {
            targets.push(self.here());
            self.compile_scoped_block(&arm.body);
            self.line = arm.body.end_line;
            exits.push(self.emit(Instruction::Jump(0)));
        }
        let end = self.here();
        for exit in exits {
            self.patch_jump(exit, end);
        }
        if let Instruction::Choice(options) = &mut self.code[choice_at] {
            for (opt, target) in options.iter_mut().zip(targets) {
                opt.target = target;
            }
        }
    }

    /// Text of a string or localized literal, resolved for the build locale.
    fn literal_text(&mut self, expr: &Expr) -> Option<String> {
        match &expr.kind {
            ExprKind::Str(s) => Some(s.clone()),
            ExprKind::Localized(entries) => Some(self.resolve_localized(expr.line, entries)),
            _ => None,
        }
    }

    fn resolve_localized(&mut self, line: u32, entries: &[(String, String)]) -> String {
        for (key, _) in entries {
            if Locale::from_code(key).is_none() {
                self.warning(line, format!("unknown locale '{key}' in localized text"));
            }
        }
        let locale = self.options.locale();
        if let Some((_, text)) = entries.iter().find(|(k, _)| k == locale.code()) {
            return text.clone();
        }
        let Some((fallback_key, fallback)) = entries.first() else {
            return String::new();
        };
        self.warning(
            line,
            format!("localized text has no '{locale}' entry; falling back to '{fallback_key}'"),
        );
        fallback.clone()
    }

    // ── expressions ─────────────────────────────────────────────────────

    /// Compiles an expression whose value is needed on the stack.
    fn compile_value(&mut self, expr: &Expr) -> Ty {
        let ty = self.compile_expr(expr);
        if ty == Ty::Void {
            self.error(expr.line, "expression does not produce a value");
            return Ty::Unknown;
        }
        ty
    }

    fn compile_expr(&mut self, expr: &Expr) -> Ty {
        self.line = expr.line;
        match &expr.kind {
            ExprKind::Int(v) => {
                self.emit(Instruction::PushInt(*v));
                Ty::Int
            }
            ExprKind::Str(s) => {
                let idx = self.intern_string(s);
                self.emit(Instruction::PushString(idx));
                Ty::String
            }
            ExprKind::Bool(b) => {
                self.emit(Instruction::PushBool(*b));
                Ty::Bool
            }
            ExprKind::Localized(entries) => {
                let text = self.resolve_localized(expr.line, entries);
                let idx = self.intern_string(&text);
                self.emit(Instruction::PushString(idx));
                Ty::String
            }
            ExprKind::Ident(name) => self.compile_ident(expr.line, name),
            ExprKind::Unary { op, operand } => {
                let ty = self.compile_value(operand);
                self.line = expr.line;
                let (expected, ins) = match op {
                    UnaryOp::Neg => (Ty::Int, Instruction::Neg),
                    UnaryOp::Not => (Ty::Bool, Instruction::Not),
                };
                if !expected.accepts(ty) {
                    let sym = if *op == UnaryOp::Neg { "-" } else { "!" };
                    self.error(
                        expr.line,
                        format!("unary operator '{sym}' cannot be applied to an operand of type {ty}"),
                    );
                    return Ty::Unknown;
                }
                self.emit(ins);
                expected
            }
            ExprKind::Binary { op, lhs, rhs } => self.compile_binary(expr.line, *op, lhs, rhs),
            ExprKind::Call { callee, args } => self.compile_call(expr.line, callee, args),
            ExprKind::Member { base, name } => self.compile_member(base, name),
            ExprKind::Error => Ty::Unknown,
        }
    }

    fn compile_ident(&mut self, line: u32, name: &str) -> Ty {
        let Some(id) = self.lookup(name) else {
            if builtins::function(name).is_some() {
                self.error(line, format!("builtin function '{name}' must be called"));
            } else if builtins::is_reserved(name) {
                self.error(line, format!("type '{name}' cannot be used as a value"));
            } else {
                self.error(line, format!("cannot find '{name}' in scope"));
            }
            return Ty::Unknown;
        };
        self.symbols[id].used = true;
        let sym = self.symbols[id].clone();
        match sym.slot {
            Slot::Global(g) => {
                self.emit(Instruction::LoadGlobal(g));
            }
            Slot::Local(l) => {
                self.emit(Instruction::LoadLocal(l));
            }
            Slot::Function(_) => {
                self.error(line, format!("function '{name}' must be called"));
                return Ty::Unknown;
            }
        }
        sym.ty
    }

    fn compile_binary(&mut self, line: u32, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Ty {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.compile_logical(line, op, lhs, rhs);
        }
        let lt = self.compile_value(lhs);
        let rt = self.compile_value(rhs);
        self.line = line;
        let (arith, result) = match op {
            BinaryOp::Add => {
                let ty = if lt == Ty::String || rt == Ty::String {
                    Some(Ty::String)
                } else if Ty::Int.accepts(lt) && Ty::Int.accepts(rt) {
                    Some(if lt == Ty::Unknown || rt == Ty::Unknown {
                        Ty::Unknown
                    } else {
                        Ty::Int
                    })
                } else {
                    None
                };
                (ArithOp::Add, ty)
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let ty = (Ty::Int.accepts(lt) && Ty::Int.accepts(rt)).then_some(Ty::Int);
                let arith = match op {
                    BinaryOp::Sub => ArithOp::Sub,
                    BinaryOp::Mul => ArithOp::Mul,
                    BinaryOp::Div => ArithOp::Div,
                    _ => ArithOp::Rem,
                };
                (arith, ty)
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let ty = lt.accepts(rt).then_some(Ty::Bool);
                let arith = if op == BinaryOp::Eq {
                    ArithOp::Eq
                } else {
                    ArithOp::NotEq
                };
                (arith, ty)
            }
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let ty = (Ty::Int.accepts(lt) && Ty::Int.accepts(rt)).then_some(Ty::Bool);
                let arith = match op {
                    BinaryOp::Lt => ArithOp::Lt,
                    BinaryOp::LtEq => ArithOp::LtEq,
                    BinaryOp::Gt => ArithOp::Gt,
                    _ => ArithOp::GtEq,
                };
                (arith, ty)
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        match result {
            Some(ty) => {
                if matches!(arith, ArithOp::Div | ArithOp::Rem)
                    && matches!(rhs.kind, ExprKind::Int(0))
                {
                    self.error(line, "division by zero");
                }
                self.emit(Instruction::Arith(arith));
                ty
            }
            None => {
                self.error(
                    line,
                    format!(
                        "binary operator '{}' cannot be applied to operands of type {lt} and {rt}",
                        op.symbol()
                    ),
                );
                Ty::Unknown
            }
        }
    }

    /// `a && b` / `a || b` with short-circuit jumps.
    fn compile_logical(&mut self, line: u32, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Ty {
        let lt = self.compile_value(lhs);
        self.line = line;
        let mut ok = Ty::Bool.accepts(lt);
        match op {
            BinaryOp::And => {
                // lhs false → false
                let short = self.emit(Instruction::JumpUnless(0));
                let rt = self.compile_value(rhs);
                ok &= Ty::Bool.accepts(rt);
                self.line = line;
                let to_end = self.emit(Instruction::Jump(0));
                let short_target = self.here();
                self.patch_jump(short, short_target);
                self.emit(Instruction::PushBool(false));
                let end = self.here();
                self.patch_jump(to_end, end);
            }
            _ => {
                // lhs true → true
                let eval_rhs = self.emit(Instruction::JumpUnless(0));
                self.emit(Instruction::PushBool(true));
                let to_end = self.emit(Instruction::Jump(0));
                let rhs_target = self.here();
                self.patch_jump(eval_rhs, rhs_target);
                let rt = self.compile_value(rhs);
                ok &= Ty::Bool.accepts(rt);
                let end = self.here();
                self.patch_jump(to_end, end);
            }
        }
        if !ok {
            self.error(
                line,
                format!("operator '{}' requires Bool operands", op.symbol()),
            );
            return Ty::Unknown;
        }
        Ty::Bool
    }

    fn compile_member(&mut self, base: &Expr, name: &Ident) -> Ty {
        if let ExprKind::Ident(type_name) = &base.kind {
            if let Some(e) = builtins::enumeration(type_name) {
                return match Position::from_name(&name.name) {
                    Some(p) if e.cases.contains(&name.name.as_str()) => {
                        self.emit(Instruction::PushPosition(p));
                        Ty::Position
                    }
                    _ => {
                        self.error(
                            name.line,
                            format!("type '{type_name}' has no member '{}'", name.name),
                        );
                        Ty::Unknown
                    }
                };
            }
            if let Some(s) = builtins::structure(type_name) {
                if s.static_methods.iter().any(|m| m.name == name.name) {
                    self.error(name.line, format!("static method '{}' must be called", name.name));
                } else {
                    self.error(
                        name.line,
                        format!("type '{type_name}' has no member '{}'", name.name),
                    );
                }
                return Ty::Unknown;
            }
        }
        let ty = self.compile_value(base);
        if builtins::instance_methods(ty)
            .iter()
            .any(|m| m.name == name.name)
        {
            self.error(name.line, format!("method '{}' must be called", name.name));
        } else if ty != Ty::Unknown {
            self.error(
                name.line,
                format!("value of type {ty} has no member '{}'", name.name),
            );
        } else {
            self.error(name.line, format!("cannot resolve member '{}'", name.name));
        }
        Ty::Unknown
    }

    fn compile_call(&mut self, line: u32, callee: &Expr, args: &[Expr]) -> Ty {
        match &callee.kind {
            ExprKind::Ident(name) => {
                if let Some(id) = self.lookup(name) {
                    let sym = self.symbols[id].clone();
                    if let Slot::Function(index) = sym.slot {
                        self.symbols[id].used = true;
                        return self.compile_user_call(line, index, args);
                    }
                    self.compile_args(args);
                    self.error(line, format!("cannot call value of non-function type {}", sym.ty));
                    return Ty::Unknown;
                }
                if let Some(f) = builtins::function(name) {
                    return self.compile_builtin(line, f, args);
                }
                if let Some(s) = builtins::structure(name) {
                    return self.compile_builtin(line, &s.constructor, args);
                }
                if builtins::enumeration(name).is_some() {
                    self.compile_args(args);
                    self.error(line, format!("enumeration '{name}' cannot be constructed"));
                    return Ty::Unknown;
                }
                self.compile_args(args);
                self.error(callee.line, format!("cannot find '{name}' in scope"));
                Ty::Unknown
            }
            ExprKind::Member { base, name } => {
                if let ExprKind::Ident(type_name) = &base.kind {
                    if let Some(s) = builtins::structure(type_name) {
                        return match s.static_methods.iter().find(|m| m.name == name.name) {
                            Some(m) => self.compile_builtin(line, m, args),
                            None => {
                                self.compile_args(args);
                                self.error(
                                    name.line,
                                    format!("type '{type_name}' has no member '{}'", name.name),
                                );
                                Ty::Unknown
                            }
                        };
                    }
                    if builtins::enumeration(type_name).is_some() {
                        self.compile_args(args);
                        self.error(
                            name.line,
                            format!("enumeration case '{}' cannot be called", name.name),
                        );
                        return Ty::Unknown;
                    }
                }
                let receiver = self.compile_value(base);
                let methods = match receiver {
                    Ty::Unknown => builtins::CHARACTER.instance_methods,
                    ty => builtins::instance_methods(ty),
                };
                match methods.iter().find(|m| m.name == name.name) {
                    Some(m) => self.compile_builtin(line, m, args),
                    None => {
                        self.compile_args(args);
                        self.error(
                            name.line,
                            format!("value of type {receiver} has no member '{}'", name.name),
                        );
                        Ty::Unknown
                    }
                }
            }
            _ => {
                self.compile_value(callee);
                self.compile_args(args);
                self.error(line, "cannot call a value that is not a function");
                Ty::Unknown
            }
        }
    }

    /// Compiles arguments of a call that already failed, for their diagnostics.
    fn compile_args(&mut self, args: &[Expr]) {
        for arg in args {
            self.compile_expr(arg);
        }
    }

    fn check_arity(&mut self, line: u32, name: &str, expected: usize, args: &[Expr]) -> bool {
        if expected == args.len() {
            return true;
        }
        let plural = if expected == 1 { "" } else { "s" };
        self.error(
            line,
            format!(
                "'{name}' expects {expected} argument{plural} but {} were given",
                args.len()
            ),
        );
        self.compile_args(args);
        false
    }

    fn compile_user_call(&mut self, line: u32, index: u32, args: &[Expr]) -> Ty {
        let sig = self.signatures[index as usize].clone();
        if !self.check_arity(line, &sig.name, sig.params.len(), args) {
            return Ty::Unknown;
        }
        for (arg, expected) in args.iter().zip(&sig.params) {
            let ty = self.compile_value(arg);
            if !expected.accepts(ty) {
                self.error(
                    arg.line,
                    format!("cannot convert value of type {ty} to expected argument type {expected}"),
                );
            }
        }
        self.line = line;
        self.emit(Instruction::Call {
            function: index,
            argc: args.len() as u8,
        });
        if sig.returns_value {
            Ty::Unknown
        } else {
            self.emit(Instruction::Pop);
            Ty::Void
        }
    }

    fn compile_builtin(&mut self, line: u32, f: &BuiltinFunction, args: &[Expr]) -> Ty {
        if !self.check_arity(line, f.name, f.params.len(), args) {
            return Ty::Unknown;
        }
        for (arg, param) in args.iter().zip(f.params) {
            match param.kind {
                ParamKind::Value(expected) => {
                    let ty = self.compile_value(arg);
                    if !expected.accepts(ty) {
                        self.error(
                            arg.line,
                            format!(
                                "cannot convert value of type {ty} to expected argument type {expected}"
                            ),
                        );
                    }
                }
                ParamKind::Speaker => {
                    let ty = self.compile_value(arg);
                    if !matches!(ty, Ty::String | Ty::Character | Ty::Unknown) {
                        self.error(
                            arg.line,
                            format!("speaker must be a String or a Character, found {ty}"),
                        );
                    }
                }
                ParamKind::Asset(kind) => self.compile_asset_arg(f.name, kind, arg),
            }
        }
        self.line = line;
        let ins = match f.op {
            BuiltinOp::Say => Instruction::Say,
            BuiltinOp::Narrate => Instruction::Narrate,
            BuiltinOp::Background => Instruction::Background,
            BuiltinOp::Music => Instruction::Music,
            BuiltinOp::Wait => Instruction::Wait,
            BuiltinOp::MakeCharacter => Instruction::MakeCharacter,
            BuiltinOp::Narrator => Instruction::Narrator,
            BuiltinOp::Show => Instruction::Show,
            BuiltinOp::Hide => Instruction::Hide,
            BuiltinOp::Motion => Instruction::Motion,
            BuiltinOp::Expression => Instruction::Expression,
        };
        self.emit(ins);
        f.returns
    }

    fn compile_asset_arg(&mut self, func: &str, kind: AssetKind, arg: &Expr) {
        let ExprKind::Str(path) = &arg.kind else {
            if !arg.is_error() {
                self.error(
                    arg.line,
                    format!("'{func}' expects a string literal naming an {} asset", kind.name()),
                );
            }
            return;
        };
        if !is_relative_asset_path(path) {
            self.error(
                arg.line,
                format!("asset path '{path}' must be relative to the asset folder"),
            );
            return;
        }
        if let Some(folder) = &self.options.asset_folder {
            if !folder.join(path).exists() {
                self.warning(
                    arg.line,
                    format!("{} asset '{path}' not found in the asset folder", kind.name()),
                );
            }
        }
        let idx = self.intern_asset(kind, path);
        self.line = arg.line;
        self.emit(Instruction::PushAsset(idx));
    }
}

fn is_relative_asset_path(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Whether a function body contains `return <value>` anywhere.
fn returns_value(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|s| match &s.kind {
        StmtKind::Return(Some(_)) => true,
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            returns_value(&then_branch.stmts)
                || else_branch
                    .as_ref()
                    .is_some_and(|b| returns_value(&b.stmts))
        }
        StmtKind::While { body, .. } => returns_value(&body.stmts),
        StmtKind::Choice { arms } => arms.iter().any(|a| returns_value(&a.body.stmts)),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    fn build(sources: &[(&str, &str)]) -> (Option<StoryIR>, DiagnosticSet) {
        let phases: Vec<Phase> = sources.iter().map(|(n, s)| Phase::new(n, s)).collect();
        let mut diags = DiagnosticSet::new();
        let ir = build_ir(&phases, &BuildOptions::for_locale(Locale::En), &mut diags);
        (ir, diags)
    }

    fn messages(diags: &DiagnosticSet, severity: Severity) -> Vec<String> {
        diags
            .iter()
            .filter(|(_, d)| d.severity == severity)
            .map(|(_, d)| d.message.clone())
            .collect()
    }

    #[test]
    fn test_dangling_operator_blocks_build() {
        let (ir, diags) = build(&[("Main.zeile", "let x = 1\nlet y = x +\n")]);
        assert!(ir.is_none());
        let errors: Vec<_> = diags
            .for_file("Main.zeile")
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        assert!(errors.iter().any(|d| d.line == 2));
    }

    #[test]
    fn test_warnings_do_not_block() {
        let src = "\
let greeting = [\"jp\": \"やあ\"]
if true {
    var unused = 1
}
1 + 2
";
        let (ir, diags) = build(&[("Main.zeile", src)]);
        assert!(ir.is_some(), "{diags:?}");
        let warnings = messages(&diags, Severity::Warning);
        assert_eq!(warnings.len(), 3, "{warnings:?}");
        assert!(warnings[0].contains("falling back to 'jp'"));
        assert!(warnings.iter().any(|w| w.contains("'unused' was never used")));
        assert!(warnings.iter().any(|w| w.contains("result is unused")));
    }

    #[test]
    fn test_phase_order_matters() {
        let p1 = ("Intro.zeile", "let kasumi = Character(\"Kasumi\", \"live2d/kasumi\")\n");
        let p2 = ("Main.zeile", "kasumi.say(\"Hello!\")\n");

        let (ir, diags) = build(&[p1, p2]);
        assert!(ir.is_some(), "{diags:?}");

        let (ir, diags) = build(&[p2, p1]);
        assert!(ir.is_none());
        let main = diags.for_file("Main.zeile");
        assert_eq!(main.len(), 1);
        assert_eq!(main[0].line, 1);
        assert!(main[0].message.contains("cannot find 'kasumi'"));
    }

    #[test]
    fn test_immutable_assignment_and_redeclaration() {
        let src = "let a = 1\na = 2\nlet a = 3\n";
        let (ir, diags) = build(&[("Main.zeile", src)]);
        assert!(ir.is_none());
        let d = diags.for_file("Main.zeile");
        let errors: Vec<u32> = d
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.line)
            .collect();
        assert_eq!(errors, vec![2, 3]);
        let notes: Vec<u32> = d
            .iter()
            .filter(|d| d.severity == Severity::Note)
            .map(|d| d.line)
            .collect();
        assert_eq!(notes, vec![1, 1]);
    }

    #[test]
    fn test_redeclaration_note_lands_in_declaring_phase() {
        let (_, diags) = build(&[("A.zeile", "\nlet x = 1\n"), ("B.zeile", "let x = 2\n")]);
        assert_eq!(diags.for_file("A.zeile")[0].severity, Severity::Note);
        assert_eq!(diags.for_file("A.zeile")[0].line, 2);
        assert_eq!(diags.for_file("B.zeile")[0].severity, Severity::Error);
    }

    #[test]
    fn test_type_errors() {
        let cases = [
            ("wait(\"soon\")", "cannot convert value of type String"),
            ("let n = 1 - true", "cannot be applied to operands of type Int and Bool"),
            ("if 3 {\n}", "condition must be Bool"),
            ("narrate(\"a\", \"b\")", "expects 1 argument but 2 were given"),
            ("let p = Position.up", "has no member 'up'"),
            ("let s = say(\"a\", \"b\")", "does not produce a value"),
            ("background(\"../secret.png\")", "must be relative"),
            ("let bg = \"a.png\"\nbackground(bg)", "string literal"),
            ("return 1", "outside of a function"),
            ("let v = 3 / 0", "division by zero"),
            ("let say = 1", "cannot redeclare builtin"),
            ("1.show(Position.left)", "Int has no member 'show'"),
        ];
        for (src, expected) in cases {
            let (ir, diags) = build(&[("Main.zeile", src)]);
            assert!(ir.is_none(), "{src} should fail");
            let errors = messages(&diags, Severity::Error);
            assert!(
                errors.iter().any(|e| e.contains(expected)),
                "{src}: {errors:?}"
            );
        }
    }

    #[test]
    fn test_functions_and_locals() {
        let src = "\
func greet(who: Character, line: String) {
    let prefix = \"» \"
    who.say(prefix + line)
}
func double(n: Int) {
    return n * 2
}
let kasumi = Character(\"Kasumi\", \"live2d/kasumi\")
greet(kasumi, \"Hi\")
wait(double(250))
";
        let (ir, diags) = build(&[("Main.zeile", src)]);
        let ir = ir.unwrap_or_else(|| panic!("{diags:?}"));
        assert_eq!(ir.functions.len(), 2);
        assert_eq!(ir.functions[0].arity, 2);
        assert_eq!(ir.functions[0].locals, 3);
        assert_eq!(ir.globals, 1);
        assert_eq!(ir.validate(), Ok(()));
        // `greet` is void, so its call result is popped right away.
        let call = ir
            .code
            .iter()
            .position(|i| matches!(i, Instruction::Call { function: 0, .. }))
            .unwrap();
        assert_eq!(ir.code[call + 1], Instruction::Pop);
    }

    #[test]
    fn test_nested_function_rejected() {
        let (ir, diags) = build(&[("Main.zeile", "if true {\n    func f() {\n    }\n}\n")]);
        assert!(ir.is_none());
        assert!(messages(&diags, Severity::Error)[0].contains("top level"));
    }

    #[test]
    fn test_localized_choice_labels() {
        let src = "\
choice {
    [\"jp\": \"左\", \"en\": \"Left\"] {
        narrate(\"left\")
    }
    \"Right\" {
    }
}
";
        let (ir, _) = build(&[("Main.zeile", src)]);
        let ir = ir.unwrap();
        let Instruction::Choice(options) = &ir.code[0] else {
            panic!("expected choice first");
        };
        assert_eq!(ir.strings[options[0].label as usize], "Left");
        assert_eq!(ir.strings[options[1].label as usize], "Right");
        assert!(options[0].target < options[1].target);
    }

    #[test]
    fn test_missing_asset_warns_with_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("park.png"), b"png").unwrap();
        let options = BuildOptions::for_locale(Locale::En).with_asset_folder(dir.path());
        let src = "background(\"park.png\")\nbackground(\"school.png\")\n";
        let mut diags = DiagnosticSet::new();
        let ir = build_ir(&[Phase::new("Main.zeile", src)], &options, &mut diags);
        assert!(ir.is_some());
        let d = diags.for_file("Main.zeile");
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].line, 2);
        assert_eq!(d[0].severity, Severity::Warning);
        assert_eq!(ir.unwrap().assets.len(), 2);
    }

    #[test]
    fn test_empty_phase_is_a_remark() {
        let (ir, diags) = build(&[("Empty.zeile", "// nothing yet\n")]);
        assert!(ir.is_some());
        assert_eq!(diags.count(Severity::Remark), 1);
    }

    #[test]
    fn test_generate_diagnostics_sees_preceding_phases() {
        let options = BuildOptions::for_locale(Locale::Jp);
        let prelude = [Phase::new("Cast.zeile", "let name = \"Arisa\"\nlet broken = \n")];
        let diags = generate_diagnostics(&prelude, "narrate(name)\nnarrate(nobody)\n", &options);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, 2);
    }

    #[test]
    fn test_deeply_nested_expression_fails_softly() {
        let src = format!("let x = {}1\n", "-".repeat(20_000));
        let (ir, diags) = build(&[("Main.zeile", &src)]);
        assert!(ir.is_none());
        let errors = messages(&diags, Severity::Error);
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("nested too deeply"));
    }

    #[test]
    fn test_phase_count_is_bounded() {
        let phases = vec![Phase::new("Empty.zeile", ""); MAX_PHASES + 1];
        let (ir, per_phase) = compile_phases(&phases, &BuildOptions::for_locale(Locale::Jp));
        assert!(ir.is_none());
        let last = per_phase.last().unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].severity, Severity::Error);
        assert!(last[0].message.contains("too many code phases"));
        assert!(per_phase[MAX_PHASES - 1].iter().all(|d| d.severity == Severity::Remark));
    }
}
