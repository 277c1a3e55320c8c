//! Token-based syntax highlighting.
//!
//! Ranges are character offsets (not bytes) so an editor can apply them to
//! its buffer directly.

use std::fmt;
use std::ops::Range;

use serde::Serialize;

use crate::processor::builtins;
use crate::processor::lexer::{Punct, TokenKind, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HighlightStyle {
    Keyword,
    Identifier,
    /// Builtin structures and enumerations.
    Type,
    Function,
    Member,
    Number,
    String,
    Comment,
    Placeholder,
    Punctuation,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightSpan {
    pub range: Range<usize>,
    pub style: HighlightStyle,
}

pub fn highlight(source: &str) -> Vec<HighlightSpan> {
    let tokens = tokenize(source);
    let mut spans = Vec::with_capacity(tokens.len());

    // Running byte → char conversion; tokens come in source order.
    let mut byte_pos = 0;
    let mut char_pos = 0;
    let mut to_chars = |byte: usize| {
        char_pos += source[byte_pos..byte].chars().count();
        byte_pos = byte;
        char_pos
    };

    for (i, tok) in tokens.iter().enumerate() {
        let after_dot =
            i > 0 && matches!(tokens[i - 1].kind, TokenKind::Punct(Punct::Dot));
        let before_call = tokens
            .get(i + 1)
            .is_some_and(|t| t.kind == TokenKind::Punct(Punct::LParen));
        let style = match &tok.kind {
            TokenKind::Newline | TokenKind::Eof => continue,
            TokenKind::Keyword(_) => HighlightStyle::Keyword,
            TokenKind::Ident(name) => {
                if after_dot {
                    HighlightStyle::Member
                } else if builtins::structure(name).is_some()
                    || builtins::enumeration(name).is_some()
                {
                    HighlightStyle::Type
                } else if before_call || builtins::function(name).is_some() {
                    HighlightStyle::Function
                } else {
                    HighlightStyle::Identifier
                }
            }
            TokenKind::Int(Some(_)) => HighlightStyle::Number,
            TokenKind::Int(None) => HighlightStyle::Invalid,
            TokenKind::Str { .. } => HighlightStyle::String,
            TokenKind::Comment => HighlightStyle::Comment,
            TokenKind::Placeholder(_) => HighlightStyle::Placeholder,
            TokenKind::Punct(_) => HighlightStyle::Punctuation,
            TokenKind::Unknown(_) => HighlightStyle::Invalid,
        };
        let start = to_chars(tok.range.start);
        let end = to_chars(tok.range.end);
        spans.push(HighlightSpan {
            range: start..end,
            style,
        });
    }
    spans
}

/// Text plus the highlight spans that apply to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StyledText {
    pub text: String,
    pub spans: Vec<HighlightSpan>,
}

impl StyledText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spans: Vec::new(),
        }
    }

    /// Highlights `text` as Zeile source.
    pub fn code(text: impl Into<String>) -> Self {
        let text = text.into();
        let spans = highlight(&text);
        Self { text, spans }
    }
}

impl fmt::Display for StyledText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
