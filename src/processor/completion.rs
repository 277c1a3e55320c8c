//! Autocompletion for the script editor.
//!
//! `complete_code` looks at the character just left of the caret and decides
//! what to offer: members after a `.`, asset paths (or motion and expression
//! ids) inside a string, locale keys inside a localized literal, and every
//! visible name while an identifier is being typed. It works on the raw
//! token stream rather than the AST so half-typed code still completes.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::builtins::{self, BuiltinFunction, Ty};
use super::lexer::{Keyword, Punct, Token, TokenKind, tokenize};
use crate::editor::highlight::StyledText;
use crate::model::Locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionItemType {
    Variable,
    Function,
    InstanceMethod,
    StaticMethod,
    Structure,
    Enumeration,
    Keyword,
    Folder,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PreviewContent {
    Image(PathBuf),
    Live2D(PathBuf),
    Live2DMotion(PathBuf, String),
    Live2DExpression(PathBuf, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeCompletionItem {
    pub display_name: StyledText,
    pub item_type: CompletionItemType,
    pub declaration: StyledText,
    pub preview_content: Option<PreviewContent>,
    /// The whole buffer after accepting this item.
    pub replaced_code: String,
    /// How many characters the caret moves past its original position.
    pub replacing_length: usize,
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];
const MODEL_SUFFIX: &str = ".model3.json";
const MOTION_SUFFIX: &str = ".motion3.json";
const EXPRESSION_SUFFIX: &str = ".exp3.json";

/// Completions for the caret right after the character at `index`.
///
/// `index` counts characters. Returns nothing when it is out of range.
pub fn complete_code(
    code: &str,
    index: usize,
    locale: Locale,
    asset_folder: Option<&Path>,
) -> Vec<CodeCompletionItem> {
    let char_count = code.chars().count();
    if index >= char_count {
        return Vec::new();
    }
    let caret_byte = code
        .char_indices()
        .nth(index + 1)
        .map_or(code.len(), |(b, _)| b);

    let context = Context::new(code, caret_byte, locale, asset_folder);
    let Some((prefix, candidates)) = context.candidates() else {
        return Vec::new();
    };
    finish(code, caret_byte, &prefix, candidates)
}

/// An offer before it is turned into an edit of the buffer.
struct Candidate {
    name: String,
    item_type: CompletionItemType,
    declaration: String,
    insert: String,
    preview: Option<PreviewContent>,
    /// Sorts ahead of everything else of its kind.
    preferred: bool,
}

impl Candidate {
    fn new(name: impl Into<String>, item_type: CompletionItemType, declaration: String) -> Self {
        let name = name.into();
        Self {
            insert: name.clone(),
            name,
            item_type,
            declaration,
            preview: None,
            preferred: false,
        }
    }

    fn insert(mut self, insert: String) -> Self {
        self.insert = insert;
        self
    }

    fn preview(mut self, preview: Option<PreviewContent>) -> Self {
        self.preview = preview;
        self
    }
}

fn call_snippet(name: &str, params: &[&str]) -> String {
    let args: Vec<String> = params.iter().map(|p| format!("<#{p}#>")).collect();
    format!("{name}({})", args.join(", "))
}

fn builtin_candidate(f: &BuiltinFunction, item_type: CompletionItemType, prefix: &str) -> Candidate {
    let params: Vec<&str> = f.params.iter().map(|p| p.name).collect();
    Candidate::new(f.name, item_type, f.declaration(prefix)).insert(call_snippet(f.name, &params))
}

fn finish(
    code: &str,
    caret_byte: usize,
    prefix: &str,
    mut candidates: Vec<Candidate>,
) -> Vec<CodeCompletionItem> {
    let lowered = prefix.to_lowercase();
    candidates.retain(|c| c.name.to_lowercase().starts_with(&lowered));
    candidates.sort_by(|a, b| {
        let rank = |c: &Candidate| (!c.name.starts_with(prefix), !c.preferred, c.item_type);
        rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
    });
    candidates.dedup_by(|a, b| a.name == b.name && a.item_type == b.item_type);

    let start = caret_byte - prefix.len();
    let prefix_chars = prefix.chars().count();
    candidates
        .into_iter()
        .map(|c| {
            let mut replaced = String::with_capacity(code.len() + c.insert.len());
            replaced.push_str(&code[..start]);
            replaced.push_str(&c.insert);
            replaced.push_str(&code[caret_byte..]);
            CodeCompletionItem {
                display_name: StyledText::plain(c.name),
                item_type: c.item_type,
                declaration: StyledText::code(c.declaration),
                preview_content: c.preview,
                replaced_code: replaced,
                replacing_length: c.insert.chars().count().saturating_sub(prefix_chars),
            }
        })
        .collect()
}

// ── declarations visible at the caret ───────────────────────────────────

#[derive(Debug, Clone)]
struct Declaration {
    name: String,
    kind: DeclKind,
    ty: Ty,
    /// Live2D model path for characters built from a literal.
    model: Option<String>,
}

#[derive(Debug, Clone)]
enum DeclKind {
    Variable { mutable: bool },
    Parameter,
    Function { params: Vec<(String, Option<String>)> },
}

impl Declaration {
    fn candidate(&self) -> Candidate {
        match &self.kind {
            DeclKind::Variable { mutable } => {
                let keyword = if *mutable { "var" } else { "let" };
                Candidate::new(
                    &self.name,
                    CompletionItemType::Variable,
                    format!("{keyword} {}: {}", self.name, self.ty),
                )
            }
            DeclKind::Parameter => Candidate::new(
                &self.name,
                CompletionItemType::Variable,
                format!("{}: {}", self.name, self.ty),
            ),
            DeclKind::Function { params } => {
                let shown: Vec<String> = params
                    .iter()
                    .map(|(n, t)| match t {
                        Some(t) => format!("{n}: {t}"),
                        None => n.clone(),
                    })
                    .collect();
                let names: Vec<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
                Candidate::new(
                    &self.name,
                    CompletionItemType::Function,
                    format!("func {}({})", self.name, shown.join(", ")),
                )
                .insert(call_snippet(&self.name, &names))
            }
        }
    }
}

struct Context<'a> {
    code: &'a str,
    caret: usize,
    locale: Locale,
    asset_folder: Option<&'a Path>,
    /// Tokens before the caret, without comments, newlines or `Eof`.
    tokens: Vec<Token>,
    visible: Vec<Declaration>,
}

impl<'a> Context<'a> {
    fn new(code: &'a str, caret: usize, locale: Locale, asset_folder: Option<&'a Path>) -> Self {
        let tokens: Vec<Token> = tokenize(&code[..caret])
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Comment | TokenKind::Eof))
            .collect();
        let visible = scan_declarations(&tokens);
        let tokens = tokens
            .into_iter()
            .filter(|t| t.kind != TokenKind::Newline)
            .collect();
        Self {
            code,
            caret,
            locale,
            asset_folder,
            tokens,
            visible,
        }
    }

    fn last(&self, back: usize) -> Option<&TokenKind> {
        let len = self.tokens.len();
        (back < len).then(|| &self.tokens[len - 1 - back].kind)
    }

    fn ends_at_caret(&self) -> bool {
        self.tokens.last().is_some_and(|t| t.range.end == self.caret)
    }

    /// The typed prefix and every candidate for it.
    fn candidates(&self) -> Option<(String, Vec<Candidate>)> {
        if !self.ends_at_caret() {
            return None;
        }
        let last = self.tokens.last()?;
        match &last.kind {
            TokenKind::Str {
                terminated: false, ..
            } => {
                let typed = &self.code[last.range.start + 1..self.caret];
                Some((typed.to_string(), self.string_candidates(typed)))
            }
            TokenKind::Punct(Punct::Dot) => Some((String::new(), self.member_candidates(1))),
            TokenKind::Ident(name) => {
                if self.last(1) == Some(&TokenKind::Punct(Punct::Dot)) {
                    Some((name.clone(), self.member_candidates(2)))
                } else {
                    Some((name.clone(), self.scope_candidates()))
                }
            }
            TokenKind::Keyword(k) => Some((k.as_str().to_string(), self.scope_candidates())),
            _ => None,
        }
    }

    fn scope_candidates(&self) -> Vec<Candidate> {
        let mut out = Vec::new();
        for k in Keyword::ALL {
            out.push(Candidate::new(
                k.as_str(),
                CompletionItemType::Keyword,
                k.as_str().to_string(),
            ));
        }
        for f in builtins::FUNCTIONS {
            out.push(builtin_candidate(f, CompletionItemType::Function, "func "));
        }
        for s in builtins::STRUCTS {
            out.push(Candidate::new(
                s.name,
                CompletionItemType::Structure,
                format!("struct {}", s.name),
            ));
        }
        for e in builtins::ENUMS {
            out.push(Candidate::new(
                e.name,
                CompletionItemType::Enumeration,
                format!("enum {}", e.name),
            ));
        }
        out.extend(self.visible.iter().map(Declaration::candidate));
        out
    }

    /// Members of the receiver whose last token is `back` tokens from the end.
    fn member_candidates(&self, back: usize) -> Vec<Candidate> {
        match self.receiver_type(back) {
            Receiver::Struct(s) => s
                .static_methods
                .iter()
                .map(|m| builtin_candidate(m, CompletionItemType::StaticMethod, "static func "))
                .collect(),
            Receiver::Enum(e) => e
                .cases
                .iter()
                .map(|case| {
                    Candidate::new(*case, CompletionItemType::Variable, format!("case {case}"))
                })
                .collect(),
            Receiver::Value(ty) => builtins::instance_methods(ty)
                .iter()
                .map(|m| builtin_candidate(m, CompletionItemType::InstanceMethod, "func "))
                .collect(),
            Receiver::Unknown => Vec::new(),
        }
    }

    fn receiver_type(&self, back: usize) -> Receiver {
        match self.last(back) {
            Some(TokenKind::Ident(name)) => {
                if let Some(s) = builtins::structure(name) {
                    return Receiver::Struct(s);
                }
                if let Some(e) = builtins::enumeration(name) {
                    return Receiver::Enum(e);
                }
                match self.lookup(name) {
                    Some(decl) if decl.ty != Ty::Unknown => Receiver::Value(decl.ty),
                    _ => Receiver::Unknown,
                }
            }
            Some(TokenKind::Str { .. }) => Receiver::Value(Ty::String),
            Some(TokenKind::Int(_)) => Receiver::Value(Ty::Int),
            Some(TokenKind::Punct(Punct::RParen)) => {
                let close = self.tokens.len() - 1 - back;
                match call_result_type(&self.tokens, close) {
                    Some(ty) => Receiver::Value(ty),
                    None => Receiver::Unknown,
                }
            }
            _ => Receiver::Unknown,
        }
    }

    fn lookup(&self, name: &str) -> Option<&Declaration> {
        self.visible.iter().rev().find(|d| d.name == name)
    }

    fn string_candidates(&self, typed: &str) -> Vec<Candidate> {
        // ["jp": … , "en": …] keys
        let is_locale_key = match (self.last(1), self.last(2), self.last(3)) {
            (Some(TokenKind::Punct(Punct::LBracket)), _, _) => true,
            (
                Some(TokenKind::Punct(Punct::Comma)),
                Some(TokenKind::Str { .. }),
                Some(TokenKind::Punct(Punct::Colon)),
            ) => true,
            _ => false,
        };
        if is_locale_key {
            return Locale::ALL
                .into_iter()
                .map(|l| {
                    let mut c = Candidate::new(
                        l.code(),
                        CompletionItemType::Keyword,
                        format!("locale {}", l.code()),
                    );
                    c.preferred = l == self.locale;
                    c
                })
                .collect();
        }

        let Some(root) = self.asset_folder else {
            return Vec::new();
        };

        // character.motion("…") / character.expression("…")
        if let (
            Some(TokenKind::Punct(Punct::LParen)),
            Some(TokenKind::Ident(method)),
            Some(TokenKind::Punct(Punct::Dot)),
            Some(TokenKind::Ident(receiver)),
        ) = (self.last(1), self.last(2), self.last(3), self.last(4))
        {
            let lookup = match method.as_str() {
                "motion" => Some(("motions", MOTION_SUFFIX, true)),
                "expression" => Some(("expressions", EXPRESSION_SUFFIX, false)),
                _ => None,
            };
            if let Some((folder, suffix, is_motion)) = lookup {
                let model = self.lookup(receiver).and_then(|d| d.model.clone());
                return match model {
                    Some(model) => model_file_candidates(root, &model, folder, suffix, is_motion),
                    None => Vec::new(),
                };
            }
        }

        asset_candidates(root, typed)
    }
}

enum Receiver {
    Struct(&'static builtins::BuiltinStruct),
    Enum(&'static builtins::BuiltinEnum),
    Value(Ty),
    Unknown,
}

/// Type produced by the call whose `)` is at `close`, when it is a builtin.
fn call_result_type(tokens: &[Token], close: usize) -> Option<Ty> {
    let mut depth = 0usize;
    let mut open = None;
    for i in (0..=close).rev() {
        match tokens[i].kind {
            TokenKind::Punct(Punct::RParen) => depth += 1,
            TokenKind::Punct(Punct::LParen) => {
                depth -= 1;
                if depth == 0 {
                    open = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let callee = open?.checked_sub(1)?;
    let TokenKind::Ident(name) = &tokens[callee].kind else {
        return None;
    };
    if let Some(s) = builtins::structure(name) {
        return Some(s.constructor.returns);
    }
    let owner = callee
        .checked_sub(2)
        .filter(|&i| tokens[i + 1].kind == TokenKind::Punct(Punct::Dot))
        .map(|i| &tokens[i].kind);
    match owner {
        Some(TokenKind::Ident(owner)) => builtins::structure(owner)
            .and_then(|s| s.static_methods.iter().find(|m| m.name == name))
            .map(|m| m.returns),
        _ => None,
    }
}

/// Walks the tokens before the caret and keeps what is still in scope.
fn scan_declarations(tokens: &[Token]) -> Vec<Declaration> {
    let mut scopes: Vec<Vec<Declaration>> = vec![Vec::new()];
    let mut pending_params: Option<Vec<Declaration>> = None;
    let kind_at = |i: usize| tokens.get(i).map(|t| &t.kind);

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i].kind {
            TokenKind::Keyword(k @ (Keyword::Let | Keyword::Var)) => {
                if let Some(TokenKind::Ident(name)) = kind_at(i + 1) {
                    let (ty, model) = initializer_type(tokens, i + 3);
                    if let Some(scope) = scopes.last_mut() {
                        scope.push(Declaration {
                            name: name.clone(),
                            kind: DeclKind::Variable {
                                mutable: *k == Keyword::Var,
                            },
                            ty,
                            model,
                        });
                    }
                    i += 2;
                    continue;
                }
            }
            TokenKind::Keyword(Keyword::Func) => {
                if let Some(TokenKind::Ident(name)) = kind_at(i + 1) {
                    let (params, next) = scan_params(tokens, i + 2);
                    if let Some(scope) = scopes.last_mut() {
                        scope.push(Declaration {
                            name: name.clone(),
                            kind: DeclKind::Function {
                                params: params
                                    .iter()
                                    .map(|p| (p.name.clone(), annotation_name(p.ty)))
                                    .collect(),
                            },
                            ty: Ty::Unknown,
                            model: None,
                        });
                    }
                    pending_params = Some(params);
                    i = next;
                    continue;
                }
            }
            TokenKind::Punct(Punct::LBrace) => {
                scopes.push(pending_params.take().unwrap_or_default());
            }
            TokenKind::Punct(Punct::RBrace) => {
                if scopes.len() > 1 {
                    scopes.pop();
                }
            }
            TokenKind::Newline => {}
            _ => {}
        }
        i += 1;
    }
    scopes.into_iter().flatten().collect()
}

fn annotation_name(ty: Ty) -> Option<String> {
    (ty != Ty::Unknown).then(|| ty.name().to_string())
}

/// `( a, b: Int )` starting at `open`; returns the parameters and the index
/// after the closing paren.
fn scan_params(tokens: &[Token], open: usize) -> (Vec<Declaration>, usize) {
    let mut params = Vec::new();
    if tokens.get(open).map(|t| &t.kind) != Some(&TokenKind::Punct(Punct::LParen)) {
        return (params, open);
    }
    let mut i = open + 1;
    while let Some(tok) = tokens.get(i) {
        match &tok.kind {
            TokenKind::Punct(Punct::RParen) => return (params, i + 1),
            TokenKind::Ident(name) => {
                let mut ty = Ty::Unknown;
                if let (Some(TokenKind::Punct(Punct::Colon)), Some(TokenKind::Ident(ann))) = (
                    tokens.get(i + 1).map(|t| &t.kind),
                    tokens.get(i + 2).map(|t| &t.kind),
                ) {
                    ty = Ty::from_annotation(ann).unwrap_or(Ty::Unknown);
                    i += 2;
                }
                params.push(Declaration {
                    name: name.clone(),
                    kind: DeclKind::Parameter,
                    ty,
                    model: None,
                });
            }
            TokenKind::Punct(Punct::Comma) | TokenKind::Newline => {}
            _ => return (params, i),
        }
        i += 1;
    }
    (params, i)
}

/// Type of the expression starting at `start`, as far as its first tokens
/// tell, plus the model of a `Character("name", "model")` literal.
fn initializer_type(tokens: &[Token], start: usize) -> (Ty, Option<String>) {
    let kind_at = |i: usize| tokens.get(i).map(|t| &t.kind);
    match kind_at(start) {
        Some(TokenKind::Int(_)) => (Ty::Int, None),
        Some(TokenKind::Str { .. }) | Some(TokenKind::Punct(Punct::LBracket)) => (Ty::String, None),
        Some(TokenKind::Keyword(Keyword::True | Keyword::False)) => (Ty::Bool, None),
        Some(TokenKind::Ident(name)) if name == "Character" => {
            if kind_at(start + 1) == Some(&TokenKind::Punct(Punct::Dot)) {
                return (Ty::Character, None);
            }
            let model = match (kind_at(start + 2), kind_at(start + 3), kind_at(start + 4)) {
                (
                    Some(TokenKind::Str { .. }),
                    Some(TokenKind::Punct(Punct::Comma)),
                    Some(TokenKind::Str { value, .. }),
                ) => Some(value.clone()),
                _ => None,
            };
            (Ty::Character, model)
        }
        Some(TokenKind::Ident(name)) if name == "Position" => (Ty::Position, None),
        _ => (Ty::Unknown, None),
    }
}

// ── files ───────────────────────────────────────────────────────────────

fn asset_candidates(root: &Path, typed: &str) -> Vec<Candidate> {
    let (dir, _) = match typed.rfind('/') {
        Some(i) => typed.split_at(i + 1),
        None => ("", typed),
    };
    if Path::new(dir)
        .components()
        .any(|c| !matches!(c, std::path::Component::Normal(_)))
    {
        return Vec::new();
    }
    let base = root.join(dir);

    let mut out = Vec::new();
    for entry in WalkDir::new(&base)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let relative = format!("{dir}{name}");
        let path = entry.path().to_path_buf();
        let candidate = if entry.file_type().is_dir() {
            let preview = is_live2d_model(&path).then(|| PreviewContent::Live2D(path.clone()));
            Candidate::new(relative.clone(), CompletionItemType::Folder, format!("{relative}/"))
                .insert(format!("{relative}/"))
                .preview(preview)
        } else {
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            let preview = is_image.then(|| PreviewContent::Image(path.clone()));
            Candidate::new(relative.clone(), CompletionItemType::File, relative)
                .preview(preview)
        };
        out.push(candidate);
    }
    out
}

fn is_live2d_model(dir: &Path) -> bool {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .any(|e| e.file_name().to_string_lossy().ends_with(MODEL_SUFFIX))
}

fn model_file_candidates(
    root: &Path,
    model: &str,
    folder: &str,
    suffix: &str,
    is_motion: bool,
) -> Vec<Candidate> {
    let model_dir = root.join(model);
    WalkDir::new(model_dir.join(folder))
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let id = name.strip_suffix(suffix)?.to_string();
            let preview = if is_motion {
                PreviewContent::Live2DMotion(model_dir.clone(), id.clone())
            } else {
                PreviewContent::Live2DExpression(model_dir.clone(), id.clone())
            };
            Some(
                Candidate::new(id.clone(), CompletionItemType::File, format!("{model}/{folder}/{name}"))
                    .preview(Some(preview)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn complete(code: &str) -> Vec<CodeCompletionItem> {
        let index = code.chars().count() - 1;
        complete_code(code, index, Locale::En, None)
    }

    fn names(items: &[CodeCompletionItem]) -> Vec<String> {
        items.iter().map(|i| i.display_name.text.clone()).collect()
    }

    #[test]
    fn test_out_of_range_is_empty() {
        assert!(complete_code("", 0, Locale::Jp, None).is_empty());
        assert!(complete_code("say", 3, Locale::Jp, None).is_empty());
        assert!(complete_code("say", 99, Locale::Jp, None).is_empty());
    }

    #[test]
    fn test_identifier_prefix() {
        let items = complete("let narration = 1\nna");
        assert_eq!(names(&items), vec!["narration", "narrate"]);

        let narrate = &items[1];
        assert_eq!(narrate.item_type, CompletionItemType::Function);
        assert_eq!(
            narrate.replaced_code,
            "let narration = 1\nnarrate(<#text#>)"
        );
        assert_eq!(narrate.replacing_length, "rrate(<#text#>)".chars().count());
        assert_eq!(narrate.declaration.text, "func narrate(text: String)");
    }

    #[test]
    fn test_exact_case_ranks_first() {
        let items = complete("let character = 1\nChar");
        assert_eq!(names(&items), vec!["Character", "character"]);
        let items = complete("let character = 1\nchar");
        assert_eq!(names(&items), vec!["character", "Character"]);
    }

    #[test]
    fn test_scoping_of_declarations() {
        let code = "func greet(who: Character) {\n    let inner = 1\n}\nlet outer = 2\n";
        let items = complete(&format!("{code}w"));
        assert!(names(&items).iter().all(|n| n != "who"), "{:?}", names(&items));
        let items = complete("func greet(who: Character) {\n    w");
        assert!(names(&items).contains(&"who".to_string()));
        assert!(names(&items).contains(&"while".to_string()));
        let items = complete(&format!("{code}in"));
        assert!(names(&items).is_empty(), "{:?}", names(&items));
    }

    #[test]
    fn test_members() {
        let items = complete("Position.");
        assert_eq!(names(&items), vec!["center", "left", "right"]);

        let items = complete("let k = Character(\"K\", \"m\")\nk.s");
        assert_eq!(names(&items), vec!["say", "show"]);
        assert_eq!(items[1].replaced_code, "let k = Character(\"K\", \"m\")\nk.show(<#position#>)");

        let items = complete("Character.narrator().h");
        assert_eq!(names(&items), vec!["hide"]);
        assert_eq!(items[0].replaced_code, "Character.narrator().hide()");

        let items = complete("Character.");
        assert_eq!(names(&items), vec!["narrator"]);
        assert_eq!(items[0].declaration.text, "static func narrator() -> Character");

        assert!(complete("let n = 3\nn.").is_empty());
    }

    #[test]
    fn test_locale_keys_prefer_build_locale() {
        let items = complete_code("narrate([\"", 9, Locale::Kr, None);
        assert_eq!(names(&items)[0], "kr");
        assert_eq!(items.len(), 5);
    }

    #[test]
    fn test_asset_paths_and_motions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("bg")).unwrap();
        fs::write(root.join("bg/park.png"), b"").unwrap();
        fs::write(root.join("bg/park_night.png"), b"").unwrap();
        fs::write(root.join("bg/notes.txt"), b"").unwrap();
        fs::create_dir_all(root.join("live2d/kasumi/motions")).unwrap();
        fs::write(root.join("live2d/kasumi/kasumi.model3.json"), b"{}").unwrap();
        fs::write(root.join("live2d/kasumi/motions/smile.motion3.json"), b"{}").unwrap();
        fs::write(root.join("live2d/kasumi/motions/wave.motion3.json"), b"{}").unwrap();

        let code = "background(\"bg/pa";
        let items = complete_code(code, code.chars().count() - 1, Locale::Jp, Some(root));
        assert_eq!(names(&items), vec!["bg/park.png", "bg/park_night.png"]);
        assert_eq!(
            items[0].preview_content,
            Some(PreviewContent::Image(root.join("bg/park.png")))
        );
        assert_eq!(items[0].replaced_code, "background(\"bg/park.png");
        assert_eq!(items[0].replacing_length, 6);

        let code = "let k = Character(\"K\", \"live2d/";
        let items = complete_code(code, code.chars().count() - 1, Locale::Jp, Some(root));
        assert_eq!(names(&items), vec!["live2d/kasumi"]);
        assert_eq!(items[0].item_type, CompletionItemType::Folder);
        assert_eq!(
            items[0].preview_content,
            Some(PreviewContent::Live2D(root.join("live2d/kasumi")))
        );

        let code = "let k = Character(\"K\", \"live2d/kasumi\")\nk.motion(\"";
        let items = complete_code(code, code.chars().count() - 1, Locale::Jp, Some(root));
        assert_eq!(names(&items), vec!["smile", "wave"]);
        assert_eq!(
            items[1].preview_content,
            Some(PreviewContent::Live2DMotion(
                root.join("live2d/kasumi"),
                "wave".into()
            ))
        );
    }
}
