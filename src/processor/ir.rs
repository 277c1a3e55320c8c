//! The linked, locale-specialised story program.
//!
//! A `StoryIR` is a flat instruction stream for a small stack machine plus the
//! tables the instructions index into. It is immutable once the builder hands
//! it out; players share it behind an `Arc`.

use super::builtins::{AssetKind, Position};
use crate::model::{Locale, ProjectMetadata};

/// Bumped whenever the binary layout or instruction semantics change.
pub const FORMAT_VERSION: u16 = 1;

/// Most global slots, and most local slots per function, a program may use.
pub const MAX_SLOTS: u32 = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub kind: AssetKind,
    /// Path relative to the asset root, `/`-separated.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    /// Index of the first instruction of the body.
    pub entry: u32,
    pub arity: u8,
    /// Local slots including parameters.
    pub locals: u32,
}

/// Where an instruction came from; one per instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceLoc {
    pub phase: u16,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
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
}

impl ArithOp {
    pub const ALL: [ArithOp; 11] = [
        ArithOp::Add,
        ArithOp::Sub,
        ArithOp::Mul,
        ArithOp::Div,
        ArithOp::Rem,
        ArithOp::Eq,
        ArithOp::NotEq,
        ArithOp::Lt,
        ArithOp::LtEq,
        ArithOp::Gt,
        ArithOp::GtEq,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
            ArithOp::Eq => "eq",
            ArithOp::NotEq => "ne",
            ArithOp::Lt => "lt",
            ArithOp::LtEq => "le",
            ArithOp::Gt => "gt",
            ArithOp::GtEq => "ge",
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        Self::ALL.iter().position(|&op| op == self).unwrap_or(0) as u8
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    /// Index into `StoryIR::strings`.
    pub label: u32,
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    PushInt(i64),
    PushBool(bool),
    PushString(u32),
    PushAsset(u32),
    PushPosition(Position),
    PushUnit,

    LoadGlobal(u32),
    StoreGlobal(u32),
    LoadLocal(u32),
    StoreLocal(u32),
    Pop,

    Neg,
    Not,
    Arith(ArithOp),

    Jump(u32),
    /// Pops a `Bool`; jumps when it is `false`.
    JumpUnless(u32),
    Call { function: u32, argc: u8 },
    Return,

    /// `[name, model] -> character`
    MakeCharacter,
    /// `[] -> narrator character`
    Narrator,
    /// `[speaker, text] -> []`
    Say,
    /// `[text] -> []`
    Narrate,
    /// `[image] -> []`
    Background,
    /// `[track] -> []`
    Music,
    /// `[milliseconds] -> []`
    Wait,
    /// `[character, position] -> []`
    Show,
    /// `[character] -> []`
    Hide,
    /// `[character, id] -> []`
    Motion,
    /// `[character, id] -> []`
    Expression,

    /// Suspends until the player picks an option, then jumps to its target.
    Choice(Vec<ChoiceOption>),
    Halt,
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::PushInt(_) => "push.int",
            Instruction::PushBool(_) => "push.bool",
            Instruction::PushString(_) => "push.str",
            Instruction::PushAsset(_) => "push.asset",
            Instruction::PushPosition(_) => "push.pos",
            Instruction::PushUnit => "push.unit",
            Instruction::LoadGlobal(_) => "load.global",
            Instruction::StoreGlobal(_) => "store.global",
            Instruction::LoadLocal(_) => "load.local",
            Instruction::StoreLocal(_) => "store.local",
            Instruction::Pop => "pop",
            Instruction::Neg => "neg",
            Instruction::Not => "not",
            Instruction::Arith(op) => op.name(),
            Instruction::Jump(_) => "jump",
            Instruction::JumpUnless(_) => "jump.unless",
            Instruction::Call { .. } => "call",
            Instruction::Return => "ret",
            Instruction::MakeCharacter => "character.make",
            Instruction::Narrator => "character.narrator",
            Instruction::Say => "say",
            Instruction::Narrate => "narrate",
            Instruction::Background => "background",
            Instruction::Music => "music",
            Instruction::Wait => "wait",
            Instruction::Show => "show",
            Instruction::Hide => "hide",
            Instruction::Motion => "motion",
            Instruction::Expression => "expression",
            Instruction::Choice(_) => "choice",
            Instruction::Halt => "halt",
        }
    }

    /// Jump targets this instruction can transfer control to.
    pub fn targets(&self) -> Vec<u32> {
        match self {
            Instruction::Jump(t) | Instruction::JumpUnless(t) => vec![*t],
            Instruction::Choice(options) => options.iter().map(|o| o.target).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryIR {
    pub metadata: ProjectMetadata,
    /// Source file names in link order; `SourceLoc::phase` indexes this.
    pub phases: Vec<String>,
    pub strings: Vec<String>,
    pub assets: Vec<AssetRef>,
    pub functions: Vec<FunctionInfo>,
    pub globals: u32,
    pub code: Vec<Instruction>,
    pub lines: Vec<SourceLoc>,
}

impl StoryIR {
    pub fn locale(&self) -> Locale {
        self.metadata.locale
    }

    /// Decodes a `.zir` image, `None` for anything that is not a valid one.
    pub fn from_binary(bytes: &[u8]) -> Option<Self> {
        crate::writer::bin::decode(bytes).ok()
    }

    pub fn binary_encoded(&self) -> Vec<u8> {
        crate::writer::bin::encode(self)
    }

    pub fn source_loc(&self, pc: usize) -> Option<SourceLoc> {
        self.lines.get(pc).copied()
    }

    /// Checks every index the instructions carry, so a structurally valid
    /// program can be run without bounds surprises.
    pub fn validate(&self) -> Result<(), String> {
        let code_len = self.code.len() as u32;
        if self.lines.len() != self.code.len() {
            return Err(format!(
                "line table has {} entries for {} instructions",
                self.lines.len(),
                self.code.len()
            ));
        }
        if self.code.last() != Some(&Instruction::Halt) {
            return Err("program does not end with halt".to_string());
        }
        for (i, loc) in self.lines.iter().enumerate() {
            if loc.phase as usize >= self.phases.len().max(1) {
                return Err(format!("instruction {i} refers to unknown phase {}", loc.phase));
            }
        }
        // Every slot is written by at least one instruction.
        if self.globals > MAX_SLOTS || self.globals > code_len {
            return Err(format!("program declares {} global slots", self.globals));
        }
        for f in &self.functions {
            if f.locals > MAX_SLOTS || f.locals > f.arity as u32 + code_len {
                return Err(format!("function `{}` declares {} local slots", f.name, f.locals));
            }
            if f.entry >= code_len {
                return Err(format!("function `{}` starts outside the program", f.name));
            }
            if (f.arity as u32) > f.locals {
                return Err(format!("function `{}` has fewer locals than parameters", f.name));
            }
        }
        for (i, ins) in self.code.iter().enumerate() {
            let bad = match ins {
                Instruction::PushString(s) => *s as usize >= self.strings.len(),
                Instruction::PushAsset(a) => *a as usize >= self.assets.len(),
                Instruction::LoadGlobal(g) | Instruction::StoreGlobal(g) => *g >= self.globals,
                Instruction::Call { function, argc } => match self.functions.get(*function as usize) {
                    Some(f) => f.arity != *argc,
                    None => true,
                },
                Instruction::Choice(options) => {
                    options.is_empty()
                        || options.iter().any(|o| o.label as usize >= self.strings.len())
                }
                _ => false,
            };
            if bad || ins.targets().iter().any(|&t| t >= code_len) {
                return Err(format!("instruction {i} ({}) is out of range", ins.mnemonic()));
            }
        }
        Ok(())
    }
}
