//! Hand-written lexer for Zeile scripts.
//!
//! The lexer never fails: characters it does not understand come out as
//! `TokenKind::Unknown` and unterminated strings are flagged on the token, so
//! the parser can report them and keep going. It is re-run on every edit for
//! highlighting, hence the single forward pass without backtracking.
//
//  Lexical items (informal):
//
//      Ident       ::= [A-Za-z_][A-Za-z0-9_]*     (plus Unicode letters)
//      Int         ::= [0-9]+
//      String      ::= '"' ( escape | [^"\n] )* '"'
//      Placeholder ::= '<#' .*? '#>'              (same line only)
//      Comment     ::= '//' [^\n]*
//      Newline     ::= '\n'
//
//  Spaces, tabs and carriage returns are skipped.

use std::iter::Peekable;
use std::ops::Range;
use std::str::CharIndices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Let,
    Var,
    Func,
    Return,
    If,
    Else,
    While,
    Choice,
    True,
    False,
}

impl Keyword {
    pub const ALL: [Keyword; 10] = [
        Keyword::Let,
        Keyword::Var,
        Keyword::Func,
        Keyword::Return,
        Keyword::If,
        Keyword::Else,
        Keyword::While,
        Keyword::Choice,
        Keyword::True,
        Keyword::False,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Let => "let",
            Keyword::Var => "var",
            Keyword::Func => "func",
            Keyword::Return => "return",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::Choice => "choice",
            Keyword::True => "true",
            Keyword::False => "false",
        }
    }

    pub fn from_ident(ident: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == ident)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Assign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
}

impl Punct {
    pub fn as_str(self) -> &'static str {
        match self {
            Punct::LParen => "(",
            Punct::RParen => ")",
            Punct::LBrace => "{",
            Punct::RBrace => "}",
            Punct::LBracket => "[",
            Punct::RBracket => "]",
            Punct::Comma => ",",
            Punct::Dot => ".",
            Punct::Colon => ":",
            Punct::Assign => "=",
            Punct::EqEq => "==",
            Punct::NotEq => "!=",
            Punct::Lt => "<",
            Punct::LtEq => "<=",
            Punct::Gt => ">",
            Punct::GtEq => ">=",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::Percent => "%",
            Punct::Bang => "!",
            Punct::AndAnd => "&&",
            Punct::OrOr => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Ident(String),
    /// `None` when the literal does not fit in an `i64`.
    Int(Option<i64>),
    Str { value: String, terminated: bool },
    Punct(Punct),
    Comment,
    Placeholder(String),
    Newline,
    Unknown(char),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range in the source.
    pub range: Range<usize>,
    /// 1-based line the token starts on.
    pub line: u32,
}

#[derive(Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    finished: bool,
    /// Markers opened before this offset are known to be unclosed on their line.
    unclosed_until: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            line: 1,
            finished: false,
            unclosed_until: 0,
        }
    }

    fn next_char(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map(|&(i, _)| i).unwrap_or(self.src.len())
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.next_char();
            true
        } else {
            false
        }
    }

    fn consume_while<F: Fn(char) -> bool>(&mut self, pred: F) {
        while let Some(c) = self.peek_char() {
            if pred(c) {
                self.next_char();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self) -> TokenKind {
        let mut value = String::new();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return TokenKind::Str {
                        value,
                        terminated: false,
                    };
                }
                Some('"') => {
                    self.next_char();
                    return TokenKind::Str {
                        value,
                        terminated: true,
                    };
                }
                Some('\\') => {
                    self.next_char();
                    match self.peek_char() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('"') => value.push('"'),
                        Some('\\') => value.push('\\'),
                        // Unknown escapes are kept verbatim.
                        Some(c) if c != '\n' => {
                            value.push('\\');
                            value.push(c);
                        }
                        _ => {
                            value.push('\\');
                            continue;
                        }
                    }
                    self.next_char();
                }
                Some(c) => {
                    value.push(c);
                    self.next_char();
                }
            }
        }
    }

    /// Called after `<` was consumed with `#` next. Consumes nothing and
    /// falls back to a plain `<` when the marker is not closed on the same line.
    fn read_placeholder(&mut self, start: usize) -> Option<TokenKind> {
        let body_start = start + 2;
        if body_start < self.unclosed_until {
            return None;
        }
        let src = self.src;
        let rest = &src[body_start..];
        let line_end = rest.find('\n').unwrap_or(rest.len());
        let Some(close) = rest[..line_end].find("#>") else {
            self.unclosed_until = body_start + line_end;
            return None;
        };
        let body = rest[..close].to_string();
        let end = body_start + close + 2;
        while self.offset() < end {
            self.next_char();
        }
        Some(TokenKind::Placeholder(body))
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        self.consume_while(|c| c == ' ' || c == '\t' || c == '\r');

        let line = self.line;
        let Some((start, ch)) = self.next_char() else {
            self.finished = true;
            let end = self.src.len();
            return Some(Token {
                kind: TokenKind::Eof,
                range: end..end,
                line,
            });
        };

        let kind = match ch {
            '\n' => {
                self.line += 1;
                TokenKind::Newline
            }
            '"' => self.read_string(),
            '/' if self.peek_char() == Some('/') => {
                self.consume_while(|c| c != '\n');
                TokenKind::Comment
            }
            '<' if self.peek_char() == Some('#') => self
                .read_placeholder(start)
                .unwrap_or(TokenKind::Punct(Punct::Lt)),
            '(' => TokenKind::Punct(Punct::LParen),
            ')' => TokenKind::Punct(Punct::RParen),
            '{' => TokenKind::Punct(Punct::LBrace),
            '}' => TokenKind::Punct(Punct::RBrace),
            '[' => TokenKind::Punct(Punct::LBracket),
            ']' => TokenKind::Punct(Punct::RBracket),
            ',' => TokenKind::Punct(Punct::Comma),
            '.' => TokenKind::Punct(Punct::Dot),
            ':' => TokenKind::Punct(Punct::Colon),
            '+' => TokenKind::Punct(Punct::Plus),
            '-' => TokenKind::Punct(Punct::Minus),
            '*' => TokenKind::Punct(Punct::Star),
            '/' => TokenKind::Punct(Punct::Slash),
            '%' => TokenKind::Punct(Punct::Percent),
            '=' if self.eat('=') => TokenKind::Punct(Punct::EqEq),
            '=' => TokenKind::Punct(Punct::Assign),
            '!' if self.eat('=') => TokenKind::Punct(Punct::NotEq),
            '!' => TokenKind::Punct(Punct::Bang),
            '<' if self.eat('=') => TokenKind::Punct(Punct::LtEq),
            '<' => TokenKind::Punct(Punct::Lt),
            '>' if self.eat('=') => TokenKind::Punct(Punct::GtEq),
            '>' => TokenKind::Punct(Punct::Gt),
            '&' if self.eat('&') => TokenKind::Punct(Punct::AndAnd),
            '|' if self.eat('|') => TokenKind::Punct(Punct::OrOr),
            c if c.is_ascii_digit() => {
                self.consume_while(|c| c.is_ascii_digit());
                let end = self.offset();
                TokenKind::Int(self.src[start..end].parse().ok())
            }
            c if is_ident_start(c) => {
                self.consume_while(is_ident_continue);
                let end = self.offset();
                let ident = &self.src[start..end];
                match Keyword::from_ident(ident) {
                    Some(k) => TokenKind::Keyword(k),
                    None => TokenKind::Ident(ident.to_string()),
                }
            }
            c => TokenKind::Unknown(c),
        };

        let end = self.offset();
        Some(Token {
            kind,
            range: start..end,
            line,
        })
    }
}

/// Tokenizes the whole source. The last token is always `Eof`.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).collect()
}
