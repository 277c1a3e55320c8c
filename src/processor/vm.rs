//! Story player: a small stack machine over `StoryIR`.
//!
//! The player runs instructions until something needs to be shown, then hands
//! that back as a `PlayerEvent` and waits for the next `advance`. A `choice`
//! parks it in `Branching` until `choose` picks an option.
//!
//! Faults never panic. They move the player into the terminal `Error` state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use super::builtins::Position;
use super::ir::{ArithOp, ChoiceOption, Instruction, MAX_SLOTS, StoryIR};

/// Instructions one `advance` may run before the story is considered stuck.
pub const INSTRUCTION_BUDGET: usize = 1_000_000;
const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerState {
    NotStarted,
    Playing,
    /// Waiting for `choose`; holds the option labels.
    Branching(Vec<String>),
    Finished,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAsset {
    /// Found under the asset root.
    File(PathBuf),
    /// No asset root; the presentation layer looks the path up in its bundle.
    Bundled(String),
}

impl ResolvedAsset {
    pub fn display_path(&self) -> String {
        match self {
            ResolvedAsset::File(p) => p.display().to_string(),
            ResolvedAsset::Bundled(p) => format!("bundle:{p}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Dialogue { speaker: String, text: String },
    Narration { text: String },
    Background { image: ResolvedAsset },
    Music { track: ResolvedAsset },
    Wait { milliseconds: u64 },
    Show {
        character: String,
        model: Option<ResolvedAsset>,
        position: Position,
    },
    Hide { character: String },
    Motion { character: String, motion: ResolvedAsset },
    Expression { character: String, expression: ResolvedAsset },
    Choice { options: Vec<String> },
    Finished,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("the player is waiting for a choice")]
    AwaitingChoice,
    #[error("the player is not at a choice")]
    NotBranching,
    #[error("choice {index} is out of range ({count} options)")]
    InvalidChoice { index: usize, count: usize },
    #[error("{phase}:{line}: {message}")]
    Fault {
        phase: String,
        line: u32,
        message: String,
    },
    #[error("the player stopped after an error: {0}")]
    Stopped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Asset(u32),
    Position(Position),
    Character { name: String, model: Option<u32> },
    Unit,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::Str(_) => "String",
            Value::Asset(_) => "Asset",
            Value::Position(_) => "Position",
            Value::Character { .. } => "Character",
            Value::Unit => "Void",
        }
    }
}

struct DisplayValue<'a>(&'a Value, &'a StoryIR);

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => f.write_str(s),
            Value::Asset(a) => match self.1.assets.get(*a as usize) {
                Some(asset) => f.write_str(&asset.path),
                None => Ok(()),
            },
            Value::Position(p) => f.write_str(p.name()),
            Value::Character { name, .. } => f.write_str(name),
            Value::Unit => Ok(()),
        }
    }
}

struct Frame {
    return_pc: usize,
    stack_base: usize,
    locals: Vec<Value>,
}

type Step = Result<Option<PlayerEvent>, String>;

pub struct Player {
    ir: Arc<StoryIR>,
    asset_root: Option<PathBuf>,
    state: PlayerState,
    pc: usize,
    stack: Vec<Value>,
    globals: Vec<Value>,
    frames: Vec<Frame>,
    choice: Vec<ChoiceOption>,
}

impl Player {
    pub fn new(ir: Arc<StoryIR>, asset_root: Option<PathBuf>) -> Self {
        let globals = vec![Value::Unit; ir.globals.min(MAX_SLOTS) as usize];
        Self {
            ir,
            asset_root,
            state: PlayerState::NotStarted,
            pc: 0,
            stack: Vec::new(),
            globals,
            frames: Vec::new(),
            choice: Vec::new(),
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn ir(&self) -> &Arc<StoryIR> {
        &self.ir
    }

    pub fn asset_root(&self) -> Option<&Path> {
        self.asset_root.as_deref()
    }

    /// Runs until the next event.
    pub fn advance(&mut self) -> Result<PlayerEvent, PlayerError> {
        match &self.state {
            PlayerState::Finished => return Ok(PlayerEvent::Finished),
            PlayerState::Error(msg) => return Err(PlayerError::Stopped(msg.clone())),
            PlayerState::Branching(_) => return Err(PlayerError::AwaitingChoice),
            PlayerState::NotStarted | PlayerState::Playing => {}
        }
        self.state = PlayerState::Playing;

        for _ in 0..INSTRUCTION_BUDGET {
            let at = self.pc;
            match self.step() {
                Ok(Some(event)) => {
                    trace!(pc = at, ?event, "player event");
                    return Ok(event);
                }
                Ok(None) => {}
                Err(message) => return Err(self.fault(at, message)),
            }
        }
        let at = self.pc;
        Err(self.fault(
            at,
            format!("gave up after {INSTRUCTION_BUDGET} instructions without an event"),
        ))
    }

    /// Picks option `index` of the pending choice.
    pub fn choose(&mut self, index: usize) -> Result<(), PlayerError> {
        if !matches!(self.state, PlayerState::Branching(_)) {
            return Err(PlayerError::NotBranching);
        }
        let Some(option) = self.choice.get(index) else {
            return Err(PlayerError::InvalidChoice {
                index,
                count: self.choice.len(),
            });
        };
        self.pc = option.target as usize;
        self.choice.clear();
        self.state = PlayerState::Playing;
        Ok(())
    }

    fn fault(&mut self, pc: usize, message: String) -> PlayerError {
        let loc = self.ir.source_loc(pc).unwrap_or_default();
        let phase = self
            .ir
            .phases
            .get(loc.phase as usize)
            .cloned()
            .unwrap_or_default();
        self.state = PlayerState::Error(message.clone());
        PlayerError::Fault {
            phase,
            line: loc.line,
            message,
        }
    }

    // ── stack helpers ───────────────────────────────────────────────────

    fn pop(&mut self) -> Result<Value, String> {
        let floor = self.frames.last().map_or(0, |f| f.stack_base);
        if self.stack.len() <= floor {
            return Err("stack underflow".to_string());
        }
        self.stack.pop().ok_or_else(|| "stack underflow".to_string())
    }

    fn pop_int(&mut self) -> Result<i64, String> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            other => Err(format!("expected Int, found {}", other.type_name())),
        }
    }

    fn pop_bool(&mut self) -> Result<bool, String> {
        match self.pop()? {
            Value::Bool(b) => Ok(b),
            other => Err(format!("expected Bool, found {}", other.type_name())),
        }
    }

    fn pop_text(&mut self) -> Result<String, String> {
        match self.pop()? {
            Value::Str(s) => Ok(s),
            other => Err(format!("expected String, found {}", other.type_name())),
        }
    }

    fn pop_asset(&mut self) -> Result<String, String> {
        match self.pop()? {
            Value::Asset(a) => self.asset_path(a).map(str::to_string),
            other => Err(format!("expected an asset, found {}", other.type_name())),
        }
    }

    fn pop_character(&mut self) -> Result<(String, Option<u32>), String> {
        match self.pop()? {
            Value::Character { name, model } => Ok((name, model)),
            other => Err(format!("expected Character, found {}", other.type_name())),
        }
    }

    fn asset_path(&self, idx: u32) -> Result<&str, String> {
        self.ir
            .assets
            .get(idx as usize)
            .map(|a| a.path.as_str())
            .ok_or_else(|| format!("asset #{idx} does not exist"))
    }

    fn resolve(&self, relative: &str) -> Result<ResolvedAsset, String> {
        match &self.asset_root {
            Some(root) => {
                let path = root.join(relative);
                if path.exists() {
                    Ok(ResolvedAsset::File(path))
                } else {
                    Err(format!(
                        "asset '{relative}' not found under {}",
                        root.display()
                    ))
                }
            }
            None => Ok(ResolvedAsset::Bundled(relative.to_string())),
        }
    }

    /// `<model>/<folder>/<id><suffix>` for the character's Live2D model.
    fn resolve_model_file(
        &self,
        character: &str,
        model: Option<u32>,
        folder: &str,
        id: &str,
        suffix: &str,
    ) -> Result<ResolvedAsset, String> {
        let Some(model) = model else {
            return Err(format!("'{character}' has no Live2D model"));
        };
        let base = self.asset_path(model)?.trim_end_matches('/');
        self.resolve(&format!("{base}/{folder}/{id}{suffix}"))
    }

    fn local_mut(&mut self, slot: u32) -> Result<&mut Value, String> {
        self.frames
            .last_mut()
            .and_then(|f| f.locals.get_mut(slot as usize))
            .ok_or_else(|| format!("local slot {slot} is not available"))
    }

    // ── execution ───────────────────────────────────────────────────────

    fn step(&mut self) -> Step {
        let ir = Arc::clone(&self.ir);
        let Some(ins) = ir.code.get(self.pc) else {
            return Err(format!("program counter {} left the program", self.pc));
        };
        self.pc += 1;

        use Instruction as I;
        match ins {
            I::PushInt(v) => self.stack.push(Value::Int(*v)),
            I::PushBool(b) => self.stack.push(Value::Bool(*b)),
            I::PushString(s) => {
                let text = ir
                    .strings
                    .get(*s as usize)
                    .ok_or_else(|| format!("string #{s} does not exist"))?;
                self.stack.push(Value::Str(text.clone()));
            }
            I::PushAsset(a) => self.stack.push(Value::Asset(*a)),
            I::PushPosition(p) => self.stack.push(Value::Position(*p)),
            I::PushUnit => self.stack.push(Value::Unit),

            I::LoadGlobal(g) => {
                let v = self
                    .globals
                    .get(*g as usize)
                    .cloned()
                    .ok_or_else(|| format!("global slot {g} does not exist"))?;
                self.stack.push(v);
            }
            I::StoreGlobal(g) => {
                let v = self.pop()?;
                let slot = self
                    .globals
                    .get_mut(*g as usize)
                    .ok_or_else(|| format!("global slot {g} does not exist"))?;
                *slot = v;
            }
            I::LoadLocal(l) => {
                let v = self.local_mut(*l)?.clone();
                self.stack.push(v);
            }
            I::StoreLocal(l) => {
                let v = self.pop()?;
                *self.local_mut(*l)? = v;
            }
            I::Pop => {
                self.pop()?;
            }

            I::Neg => {
                let v = self.pop_int()?;
                let r = v.checked_neg().ok_or("integer overflow")?;
                self.stack.push(Value::Int(r));
            }
            I::Not => {
                let b = self.pop_bool()?;
                self.stack.push(Value::Bool(!b));
            }
            I::Arith(op) => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let v = self.arith(*op, lhs, rhs)?;
                self.stack.push(v);
            }

            I::Jump(t) => self.pc = *t as usize,
            I::JumpUnless(t) => {
                if !self.pop_bool()? {
                    self.pc = *t as usize;
                }
            }
            I::Call { function, argc } => {
                let f = ir
                    .functions
                    .get(*function as usize)
                    .ok_or_else(|| format!("function #{function} does not exist"))?;
                if self.frames.len() >= MAX_CALL_DEPTH {
                    return Err(format!("call depth exceeded in '{}'", f.name));
                }
                let argc = *argc as usize;
                let floor = self.frames.last().map_or(0, |fr| fr.stack_base);
                if self.stack.len() < floor + argc {
                    return Err("stack underflow".to_string());
                }
                let mut locals = self.stack.split_off(self.stack.len() - argc);
                locals.resize(f.locals.min(MAX_SLOTS).max(argc as u32) as usize, Value::Unit);
                self.frames.push(Frame {
                    return_pc: self.pc,
                    stack_base: self.stack.len(),
                    locals,
                });
                self.pc = f.entry as usize;
            }
            I::Return => {
                let v = self.pop()?;
                let frame = self
                    .frames
                    .pop()
                    .ok_or("return outside of a function call")?;
                self.stack.truncate(frame.stack_base);
                self.stack.push(v);
                self.pc = frame.return_pc;
            }

            I::MakeCharacter => {
                let model = match self.pop()? {
                    Value::Asset(a) => a,
                    other => return Err(format!("expected an asset, found {}", other.type_name())),
                };
                let name = self.pop_text()?;
                self.stack.push(Value::Character {
                    name,
                    model: Some(model),
                });
            }
            I::Narrator => self.stack.push(Value::Character {
                name: String::new(),
                model: None,
            }),
            I::Say => {
                let text = self.pop_text()?;
                let speaker = match self.pop()? {
                    Value::Str(s) => s,
                    Value::Character { name, .. } => name,
                    other => {
                        return Err(format!("expected a speaker, found {}", other.type_name()));
                    }
                };
                if speaker.is_empty() {
                    return Ok(Some(PlayerEvent::Narration { text }));
                }
                return Ok(Some(PlayerEvent::Dialogue { speaker, text }));
            }
            I::Narrate => {
                let text = self.pop_text()?;
                return Ok(Some(PlayerEvent::Narration { text }));
            }
            I::Background => {
                let path = self.pop_asset()?;
                let image = self.resolve(&path)?;
                return Ok(Some(PlayerEvent::Background { image }));
            }
            I::Music => {
                let path = self.pop_asset()?;
                let track = self.resolve(&path)?;
                return Ok(Some(PlayerEvent::Music { track }));
            }
            I::Wait => {
                let ms = self.pop_int()?;
                let milliseconds =
                    u64::try_from(ms).map_err(|_| format!("cannot wait {ms} milliseconds"))?;
                return Ok(Some(PlayerEvent::Wait { milliseconds }));
            }
            I::Show => {
                let position = match self.pop()? {
                    Value::Position(p) => p,
                    other => return Err(format!("expected Position, found {}", other.type_name())),
                };
                let (character, model) = self.pop_character()?;
                let model = match model {
                    Some(m) => Some(self.resolve(self.asset_path(m)?)?),
                    None => None,
                };
                return Ok(Some(PlayerEvent::Show {
                    character,
                    model,
                    position,
                }));
            }
            I::Hide => {
                let (character, _) = self.pop_character()?;
                return Ok(Some(PlayerEvent::Hide { character }));
            }
            I::Motion => {
                let id = self.pop_text()?;
                let (character, model) = self.pop_character()?;
                let motion =
                    self.resolve_model_file(&character, model, "motions", &id, ".motion3.json")?;
                return Ok(Some(PlayerEvent::Motion { character, motion }));
            }
            I::Expression => {
                let id = self.pop_text()?;
                let (character, model) = self.pop_character()?;
                let expression =
                    self.resolve_model_file(&character, model, "expressions", &id, ".exp3.json")?;
                return Ok(Some(PlayerEvent::Expression {
                    character,
                    expression,
                }));
            }

            I::Choice(options) => {
                if options.is_empty() {
                    return Err("choice without options".to_string());
                }
                let labels = options
                    .iter()
                    .map(|o| {
                        ir.strings
                            .get(o.label as usize)
                            .cloned()
                            .ok_or_else(|| format!("string #{} does not exist", o.label))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.choice = options.clone();
                self.state = PlayerState::Branching(labels.clone());
                return Ok(Some(PlayerEvent::Choice { options: labels }));
            }
            I::Halt => {
                self.pc -= 1;
                self.state = PlayerState::Finished;
                return Ok(Some(PlayerEvent::Finished));
            }
        }
        Ok(None)
    }

    fn arith(&self, op: ArithOp, lhs: Value, rhs: Value) -> Result<Value, String> {
        use ArithOp as A;
        let value = match (op, &lhs, &rhs) {
            (A::Add, Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_add(*b).ok_or("integer overflow")?)
            }
            (A::Add, Value::Str(_), _) | (A::Add, _, Value::Str(_)) => Value::Str(format!(
                "{}{}",
                DisplayValue(&lhs, &self.ir),
                DisplayValue(&rhs, &self.ir)
            )),
            (A::Sub, Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_sub(*b).ok_or("integer overflow")?)
            }
            (A::Mul, Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_mul(*b).ok_or("integer overflow")?)
            }
            (A::Div | A::Rem, Value::Int(_), Value::Int(0)) => {
                return Err("division by zero".to_string());
            }
            (A::Div, Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_div(*b).ok_or("integer overflow")?)
            }
            (A::Rem, Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_rem(*b).ok_or("integer overflow")?)
            }
            (A::Eq, _, _) => Value::Bool(lhs == rhs),
            (A::NotEq, _, _) => Value::Bool(lhs != rhs),
            (A::Lt, Value::Int(a), Value::Int(b)) => Value::Bool(a < b),
            (A::LtEq, Value::Int(a), Value::Int(b)) => Value::Bool(a <= b),
            (A::Gt, Value::Int(a), Value::Int(b)) => Value::Bool(a > b),
            (A::GtEq, Value::Int(a), Value::Int(b)) => Value::Bool(a >= b),
            _ => {
                return Err(format!(
                    "'{}' is not defined for {} and {}",
                    op.name(),
                    lhs.type_name(),
                    rhs.type_name()
                ));
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiagnosticSet, Locale};
    use crate::processor::ir::SourceLoc;
    use crate::processor::{BuildOptions, Phase, build_ir};

    fn player(src: &str) -> Player {
        let mut diags = DiagnosticSet::new();
        let ir = build_ir(
            &[Phase::new("Main.zeile", src)],
            &BuildOptions::for_locale(Locale::En),
            &mut diags,
        )
        .unwrap_or_else(|| panic!("{diags:?}"));
        Player::new(Arc::new(ir), None)
    }

    fn drain(p: &mut Player) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        loop {
            match p.advance().unwrap() {
                PlayerEvent::Finished => return events,
                e @ PlayerEvent::Choice { .. } => {
                    events.push(e);
                    return events;
                }
                e => events.push(e),
            }
        }
    }

    #[test]
    fn test_dialogue_and_branching() {
        let src = "\
let kasumi = Character(\"Kasumi\", \"live2d/kasumi\")
kasumi.show(Position.center)
kasumi.say(\"Let's play!\")
choice {
    \"Yes\" {
        say(kasumi, \"Yay\")
    }
    \"No\" {
        narrate(\"She looks sad.\")
    }
}
Character.narrator().say(\"The end.\")
";
        let mut p = player(src);
        assert_eq!(p.state(), &PlayerState::NotStarted);
        let events = drain(&mut p);
        assert_eq!(
            events[0],
            PlayerEvent::Show {
                character: "Kasumi".into(),
                model: Some(ResolvedAsset::Bundled("live2d/kasumi".into())),
                position: Position::Center,
            }
        );
        assert_eq!(
            events.last(),
            Some(&PlayerEvent::Choice {
                options: vec!["Yes".into(), "No".into()]
            })
        );
        assert_eq!(p.advance(), Err(PlayerError::AwaitingChoice));
        assert_eq!(
            p.choose(5),
            Err(PlayerError::InvalidChoice { index: 5, count: 2 })
        );

        p.choose(1).unwrap();
        assert_eq!(
            drain(&mut p),
            vec![
                PlayerEvent::Narration {
                    text: "She looks sad.".into()
                },
                PlayerEvent::Narration {
                    text: "The end.".into()
                },
            ]
        );
        assert_eq!(p.state(), &PlayerState::Finished);
        assert_eq!(p.advance(), Ok(PlayerEvent::Finished));
        assert_eq!(p.choose(0), Err(PlayerError::NotBranching));
    }

    #[test]
    fn test_functions_loops_and_arithmetic() {
        let src = "\
func fib(n: Int) {
    if n < 2 {
        return n
    }
    return fib(n - 1) + fib(n - 2)
}
var i = 0
while i < 3 {
    narrate(\"fib \" + i + \" = \" + fib(i + 5))
    i = i + 1
}
if !(i == 3) || false {
    narrate(\"unreachable\")
}
";
        let mut p = player(src);
        let texts: Vec<String> = drain(&mut p)
            .into_iter()
            .map(|e| match e {
                PlayerEvent::Narration { text } => text,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["fib 0 = 5", "fib 1 = 8", "fib 2 = 13"]);
    }

    #[test]
    fn test_runtime_fault_is_terminal() {
        let src = "var zero = 0\nzero = zero * 1\nwait(10 / zero)\n";
        let mut p = player(src);
        let err = p.advance().unwrap_err();
        assert_eq!(
            err,
            PlayerError::Fault {
                phase: "Main.zeile".into(),
                line: 3,
                message: "division by zero".into(),
            }
        );
        assert!(matches!(p.state(), PlayerState::Error(_)));
        assert!(matches!(p.advance(), Err(PlayerError::Stopped(_))));
    }

    #[test]
    fn test_missing_asset_under_root_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("live2d/kasumi/motions")).unwrap();
        std::fs::write(
            dir.path().join("live2d/kasumi/motions/smile.motion3.json"),
            "{}",
        )
        .unwrap();
        let src = "\
let kasumi = Character(\"Kasumi\", \"live2d/kasumi\")
kasumi.motion(\"smile\")
background(\"bg/missing.png\")
";
        let mut p = player(src);
        p.asset_root = Some(dir.path().to_path_buf());

        let PlayerEvent::Motion { motion, .. } = p.advance().unwrap() else {
            panic!("expected a motion event");
        };
        assert_eq!(
            motion,
            ResolvedAsset::File(dir.path().join("live2d/kasumi/motions/smile.motion3.json"))
        );
        let err = p.advance().unwrap_err();
        assert!(err.to_string().contains("bg/missing.png"), "{err}");
        assert!(matches!(p.state(), PlayerState::Error(_)));
    }

    #[test]
    fn test_budget_stops_silent_loops() {
        let mut p = player("while true {\n}\n");
        let err = p.advance().unwrap_err();
        assert!(err.to_string().contains("without an event"));
    }

    #[test]
    fn test_hand_built_program_underflow() {
        let ir = StoryIR {
            metadata: Default::default(),
            phases: vec!["Main.zeile".into()],
            strings: Vec::new(),
            assets: Vec::new(),
            functions: Vec::new(),
            globals: 0,
            code: vec![Instruction::Narrate, Instruction::Halt],
            lines: vec![SourceLoc { phase: 0, line: 1 }; 2],
        };
        let mut p = Player::new(Arc::new(ir), None);
        assert!(matches!(
            p.advance(),
            Err(PlayerError::Fault { message, .. }) if message == "stack underflow"
        ));
    }

    #[test]
    fn test_oversized_slot_counts_do_not_allocate() {
        let ir = StoryIR {
            metadata: Default::default(),
            phases: vec!["Main.zeile".into()],
            strings: Vec::new(),
            assets: Vec::new(),
            functions: Vec::new(),
            globals: u32::MAX,
            code: vec![
                Instruction::PushInt(1),
                Instruction::StoreGlobal(MAX_SLOTS + 5),
                Instruction::Halt,
            ],
            lines: vec![SourceLoc { phase: 0, line: 2 }; 3],
        };
        let mut p = Player::new(Arc::new(ir), None);
        let Err(PlayerError::Fault { line, message, .. }) = p.advance() else {
            panic!("expected a fault");
        };
        assert_eq!(line, 2);
        assert!(message.contains("does not exist"), "{message}");
    }
}
