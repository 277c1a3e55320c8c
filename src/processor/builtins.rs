//! Catalog of everything a script can use without declaring it.
//!
//! The builder type-checks calls against these signatures and the completion
//! engine offers them as candidates, so both stay in sync.

use std::fmt;

/// Static type of a value as far as the builder can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    Int,
    Bool,
    String,
    Character,
    Position,
    /// Produced by calls that do not return a value.
    Void,
    Unknown,
}

impl Ty {
    /// Types a parameter may be annotated with.
    pub const ANNOTATABLE: [Ty; 5] = [Ty::Int, Ty::Bool, Ty::String, Ty::Character, Ty::Position];

    pub fn name(self) -> &'static str {
        match self {
            Ty::Int => "Int",
            Ty::Bool => "Bool",
            Ty::String => "String",
            Ty::Character => "Character",
            Ty::Position => "Position",
            Ty::Void => "Void",
            Ty::Unknown => "Any",
        }
    }

    pub fn from_annotation(name: &str) -> Option<Ty> {
        Self::ANNOTATABLE.into_iter().find(|t| t.name() == name)
    }

    /// `true` unless both types are known and differ.
    pub fn accepts(self, actual: Ty) -> bool {
        self == Ty::Unknown || actual == Ty::Unknown || self == actual
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Any expression of the given type. `Ty::Unknown` accepts anything.
    Value(Ty),
    /// Either a `String` or a `Character`.
    Speaker,
    /// A string literal naming a file under the asset folder.
    Asset(AssetKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    Audio,
    Live2DModel,
}

impl AssetKind {
    pub fn name(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Audio => "audio",
            AssetKind::Live2DModel => "Live2D model",
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            AssetKind::Image => 0,
            AssetKind::Audio => 1,
            AssetKind::Live2DModel => 2,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AssetKind::Image),
            1 => Some(AssetKind::Audio),
            2 => Some(AssetKind::Live2DModel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinParam {
    pub name: &'static str,
    pub kind: ParamKind,
}

const fn value(name: &'static str, ty: Ty) -> BuiltinParam {
    BuiltinParam {
        name,
        kind: ParamKind::Value(ty),
    }
}

const fn asset(name: &'static str, kind: AssetKind) -> BuiltinParam {
    BuiltinParam {
        name,
        kind: ParamKind::Asset(kind),
    }
}

/// Operation a builtin lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOp {
    Say,
    Narrate,
    Background,
    Music,
    Wait,
    MakeCharacter,
    Narrator,
    Show,
    Hide,
    Motion,
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub params: &'static [BuiltinParam],
    pub returns: Ty,
    pub op: BuiltinOp,
    pub summary: &'static str,
}

impl BuiltinFunction {
    /// `func say(speaker: String, text: String)`
    pub fn declaration(&self, prefix: &str) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, param_type_name(p.kind)))
            .collect();
        let mut decl = format!("{prefix}{}({})", self.name, params.join(", "));
        if self.returns != Ty::Void {
            decl.push_str(&format!(" -> {}", self.returns));
        }
        decl
    }
}

pub fn param_type_name(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::Value(ty) => ty.name(),
        ParamKind::Speaker => "Speaker",
        ParamKind::Asset(_) => "Asset",
    }
}

pub const FUNCTIONS: &[BuiltinFunction] = &[
    BuiltinFunction {
        name: "say",
        params: &[
            BuiltinParam {
                name: "speaker",
                kind: ParamKind::Speaker,
            },
            value("text", Ty::String),
        ],
        returns: Ty::Void,
        op: BuiltinOp::Say,
        summary: "Shows a line of dialogue.",
    },
    BuiltinFunction {
        name: "narrate",
        params: &[value("text", Ty::String)],
        returns: Ty::Void,
        op: BuiltinOp::Narrate,
        summary: "Shows narration without a speaker.",
    },
    BuiltinFunction {
        name: "background",
        params: &[asset("image", AssetKind::Image)],
        returns: Ty::Void,
        op: BuiltinOp::Background,
        summary: "Replaces the background image.",
    },
    BuiltinFunction {
        name: "music",
        params: &[asset("track", AssetKind::Audio)],
        returns: Ty::Void,
        op: BuiltinOp::Music,
        summary: "Starts background music.",
    },
    BuiltinFunction {
        name: "wait",
        params: &[value("milliseconds", Ty::Int)],
        returns: Ty::Void,
        op: BuiltinOp::Wait,
        summary: "Pauses playback.",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinStruct {
    pub name: &'static str,
    pub constructor: BuiltinFunction,
    pub static_methods: &'static [BuiltinFunction],
    pub instance_methods: &'static [BuiltinFunction],
}

pub const CHARACTER: BuiltinStruct = BuiltinStruct {
    name: "Character",
    constructor: BuiltinFunction {
        name: "Character",
        params: &[
            value("name", Ty::String),
            asset("model", AssetKind::Live2DModel),
        ],
        returns: Ty::Character,
        op: BuiltinOp::MakeCharacter,
        summary: "A named character backed by a Live2D model.",
    },
    static_methods: &[BuiltinFunction {
        name: "narrator",
        params: &[],
        returns: Ty::Character,
        op: BuiltinOp::Narrator,
        summary: "The nameless narrator voice.",
    }],
    instance_methods: &[
        BuiltinFunction {
            name: "say",
            params: &[value("text", Ty::String)],
            returns: Ty::Void,
            op: BuiltinOp::Say,
            summary: "Shows a line spoken by this character.",
        },
        BuiltinFunction {
            name: "show",
            params: &[value("position", Ty::Position)],
            returns: Ty::Void,
            op: BuiltinOp::Show,
            summary: "Brings the character on stage.",
        },
        BuiltinFunction {
            name: "hide",
            params: &[],
            returns: Ty::Void,
            op: BuiltinOp::Hide,
            summary: "Takes the character off stage.",
        },
        BuiltinFunction {
            name: "motion",
            params: &[value("id", Ty::String)],
            returns: Ty::Void,
            op: BuiltinOp::Motion,
            summary: "Plays a Live2D motion of the character's model.",
        },
        BuiltinFunction {
            name: "expression",
            params: &[value("id", Ty::String)],
            returns: Ty::Void,
            op: BuiltinOp::Expression,
            summary: "Applies a Live2D expression of the character's model.",
        },
    ],
};

pub const STRUCTS: &[BuiltinStruct] = &[CHARACTER];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Left,
    Center,
    Right,
}

impl Position {
    pub const ALL: [Position; 3] = [Position::Left, Position::Center, Position::Right];

    pub fn name(self) -> &'static str {
        match self {
            Position::Left => "left",
            Position::Center => "center",
            Position::Right => "right",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Position::Left => 0,
            Position::Center => 1,
            Position::Right => 2,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinEnum {
    pub name: &'static str,
    pub cases: &'static [&'static str],
}

pub const POSITION: BuiltinEnum = BuiltinEnum {
    name: "Position",
    cases: &["left", "center", "right"],
};

pub const ENUMS: &[BuiltinEnum] = &[POSITION];

pub fn function(name: &str) -> Option<&'static BuiltinFunction> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

pub fn structure(name: &str) -> Option<&'static BuiltinStruct> {
    STRUCTS.iter().find(|s| s.name == name)
}

pub fn enumeration(name: &str) -> Option<&'static BuiltinEnum> {
    ENUMS.iter().find(|e| e.name == name)
}

/// Instance methods available on a value of type `ty`.
pub fn instance_methods(ty: Ty) -> &'static [BuiltinFunction] {
    match ty {
        Ty::Character => CHARACTER.instance_methods,
        _ => &[],
    }
}

/// Whether `name` is taken by the catalog and cannot be redeclared.
pub fn is_reserved(name: &str) -> bool {
    function(name).is_some() || structure(name).is_some() || enumeration(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarations() {
        assert_eq!(
            function("say").unwrap().declaration("func "),
            "func say(speaker: Speaker, text: String)"
        );
        assert_eq!(
            CHARACTER.constructor.declaration("init "),
            "init Character(name: String, model: Asset) -> Character"
        );
    }

    #[test]
    fn test_catalog_lookup() {
        assert!(is_reserved("Character"));
        assert!(is_reserved("Position"));
        assert!(is_reserved("wait"));
        assert!(!is_reserved("kasumi"));
        assert_eq!(instance_methods(Ty::Character).len(), 5);
        assert!(instance_methods(Ty::Int).is_empty());
        assert_eq!(Position::from_name("center"), Some(Position::Center));
    }

    #[test]
    fn test_type_acceptance() {
        assert!(Ty::Unknown.accepts(Ty::Int));
        assert!(Ty::Int.accepts(Ty::Unknown));
        assert!(!Ty::Int.accepts(Ty::String));
        assert_eq!(Ty::from_annotation("Character"), Some(Ty::Character));
        assert_eq!(Ty::from_annotation("Void"), None);
    }
}
