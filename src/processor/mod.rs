//! The functional core: source text in, story program out, and the machine
//! that plays it back.
pub mod ast;
pub mod builder;
pub mod builtins;
pub mod completion;
pub mod ir;
pub mod lexer;
pub mod script_parser;
pub mod vm;

pub use builder::{BuildOptions, Phase, build_ir, generate_diagnostics};
pub use completion::{CodeCompletionItem, CompletionItemType, PreviewContent, complete_code};
pub use ir::StoryIR;
pub use vm::{Player, PlayerError, PlayerEvent, PlayerState};
