//! `.zir` binary image of a `StoryIR`.
//!
//! ```text
//! header  := "ZEIR" version:u16 flags:u16 payload_len:u32 sha256(payload):[u8; 32]
//! payload := metadata phases strings assets functions globals:u32 code lines
//! str     := len:u32 utf8-bytes
//! ```
//!
//! All integers are little endian. Decoding rejects anything that does not
//! round-trip to a program passing `StoryIR::validate`.

use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::{Locale, ProjectMetadata};
use crate::processor::builtins::{AssetKind, Position};
use crate::processor::ir::{
    ArithOp, AssetRef, ChoiceOption, FORMAT_VERSION, FunctionInfo, Instruction, SourceLoc,
    StoryIR,
};

pub const MAGIC: &[u8; 4] = b"ZEIR";
const HEADER_LEN: usize = 4 + 2 + 2 + 4 + 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a story image (bad magic)")]
    BadMagic,
    #[error("unsupported format version {0} (expected {FORMAT_VERSION})")]
    UnsupportedVersion(u16),
    #[error("image is truncated")]
    Truncated,
    #[error("payload checksum mismatch")]
    ChecksumMismatch,
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown opcode {opcode:#04x} at instruction {index}")]
    UnknownOpcode { opcode: u8, index: usize },
    #[error("invalid {0} tag")]
    InvalidTag(&'static str),
    #[error("malformed program: {0}")]
    Malformed(String),
}

impl From<io::Error> for DecodeError {
    fn from(_: io::Error) -> Self {
        DecodeError::Truncated
    }
}

// ── encoding ────────────────────────────────────────────────────────────

pub fn encode(ir: &StoryIR) -> Vec<u8> {
    let mut payload = Vec::new();
    // A Vec sink never fails.
    let _ = write_payload(ir, &mut payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&Sha256::digest(&payload));
    out.extend_from_slice(&payload);
    out
}

/// Writes the encoded image to `path`, creating parent directories.
pub fn emit(ir: &StoryIR, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, encode(ir))
}

fn write_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_u32::<LE>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn write_payload<W: Write>(ir: &StoryIR, w: &mut W) -> io::Result<()> {
    let meta = &ir.metadata;
    w.write_u8(meta.locale.to_byte())?;
    write_str(w, &meta.project_name)?;
    write_str(w, &meta.author)?;
    write_str(w, &meta.description)?;

    w.write_u32::<LE>(ir.phases.len() as u32)?;
    for phase in &ir.phases {
        write_str(w, phase)?;
    }

    w.write_u32::<LE>(ir.strings.len() as u32)?;
    for s in &ir.strings {
        write_str(w, s)?;
    }

    w.write_u32::<LE>(ir.assets.len() as u32)?;
    for asset in &ir.assets {
        w.write_u8(asset.kind.to_byte())?;
        write_str(w, &asset.path)?;
    }

    w.write_u32::<LE>(ir.functions.len() as u32)?;
    for f in &ir.functions {
        write_str(w, &f.name)?;
        w.write_u32::<LE>(f.entry)?;
        w.write_u8(f.arity)?;
        w.write_u32::<LE>(f.locals)?;
    }

    w.write_u32::<LE>(ir.globals)?;

    w.write_u32::<LE>(ir.code.len() as u32)?;
    for ins in &ir.code {
        write_instruction(w, ins)?;
    }
    for loc in &ir.lines {
        w.write_u16::<LE>(loc.phase)?;
        w.write_u32::<LE>(loc.line)?;
    }
    Ok(())
}

fn write_instruction<W: Write>(w: &mut W, ins: &Instruction) -> io::Result<()> {
    use Instruction as I;
    w.write_u8(opcode(ins))?;
    match ins {
        I::PushInt(v) => w.write_i64::<LE>(*v),
        I::PushBool(b) => w.write_u8(*b as u8),
        I::PushPosition(p) => w.write_u8(p.to_byte()),
        I::Arith(op) => w.write_u8(op.to_byte()),
        I::PushString(x)
        | I::PushAsset(x)
        | I::LoadGlobal(x)
        | I::StoreGlobal(x)
        | I::LoadLocal(x)
        | I::StoreLocal(x)
        | I::Jump(x)
        | I::JumpUnless(x) => w.write_u32::<LE>(*x),
        I::Call { function, argc } => {
            w.write_u32::<LE>(*function)?;
            w.write_u8(*argc)
        }
        I::Choice(options) => {
            w.write_u32::<LE>(options.len() as u32)?;
            for o in options {
                w.write_u32::<LE>(o.label)?;
                w.write_u32::<LE>(o.target)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn opcode(ins: &Instruction) -> u8 {
    use Instruction as I;
    match ins {
        I::PushInt(_) => 0x00,
        I::PushBool(_) => 0x01,
        I::PushString(_) => 0x02,
        I::PushAsset(_) => 0x03,
        I::PushPosition(_) => 0x04,
        I::PushUnit => 0x05,
        I::LoadGlobal(_) => 0x06,
        I::StoreGlobal(_) => 0x07,
        I::LoadLocal(_) => 0x08,
        I::StoreLocal(_) => 0x09,
        I::Pop => 0x0A,
        I::Neg => 0x0B,
        I::Not => 0x0C,
        I::Arith(_) => 0x0D,
        I::Jump(_) => 0x0E,
        I::JumpUnless(_) => 0x0F,
        I::Call { .. } => 0x10,
        I::Return => 0x11,
        I::MakeCharacter => 0x12,
        I::Narrator => 0x13,
        I::Say => 0x14,
        I::Narrate => 0x15,
        I::Background => 0x16,
        I::Music => 0x17,
        I::Wait => 0x18,
        I::Show => 0x19,
        I::Hide => 0x1A,
        I::Motion => 0x1B,
        I::Expression => 0x1C,
        I::Choice(_) => 0x1D,
        I::Halt => 0x1E,
    }
}

// ── decoding ────────────────────────────────────────────────────────────

pub fn decode(bytes: &[u8]) -> Result<StoryIR, DecodeError> {
    if bytes.len() < 4 || &bytes[..4] != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::Truncated);
    }
    let mut header = Cursor::new(&bytes[4..HEADER_LEN]);
    let version = header.read_u16::<LE>()?;
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let _flags = header.read_u16::<LE>()?;
    let payload_len = header.read_u32::<LE>()? as usize;
    let mut checksum = [0u8; 32];
    header.read_exact(&mut checksum)?;

    let rest = &bytes[HEADER_LEN..];
    if rest.len() < payload_len {
        return Err(DecodeError::Truncated);
    }
    if rest.len() > payload_len {
        return Err(DecodeError::TrailingBytes(rest.len() - payload_len));
    }
    if Sha256::digest(rest).as_slice() != &checksum[..] {
        return Err(DecodeError::ChecksumMismatch);
    }

    let mut r = Cursor::new(rest);
    let ir = read_payload(&mut r)?;
    let consumed = r.position() as usize;
    if consumed != rest.len() {
        return Err(DecodeError::TrailingBytes(rest.len() - consumed));
    }
    ir.validate().map_err(DecodeError::Malformed)?;
    Ok(ir)
}

/// Reads the file at `path` and decodes it.
pub fn load(path: &Path) -> anyhow::Result<StoryIR> {
    use anyhow::Context;
    let bytes = fs::read(path).with_context(|| format!("Reading {}", path.display()))?;
    decode(&bytes).with_context(|| format!("Decoding {}", path.display()))
}

type Reader<'a> = Cursor<&'a [u8]>;

fn remaining(r: &Reader<'_>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

/// Reads an element count, refusing counts the remaining bytes cannot hold.
fn read_count(r: &mut Reader<'_>, min_item_len: usize) -> Result<usize, DecodeError> {
    let count = r.read_u32::<LE>()? as usize;
    if count.saturating_mul(min_item_len) > remaining(r) {
        return Err(DecodeError::Truncated);
    }
    Ok(count)
}

fn read_str(r: &mut Reader<'_>) -> Result<String, DecodeError> {
    let len = read_count(r, 1)?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| DecodeError::InvalidUtf8)
}

fn read_payload(r: &mut Reader<'_>) -> Result<StoryIR, DecodeError> {
    let locale = Locale::from_byte(r.read_u8()?).ok_or(DecodeError::InvalidTag("locale"))?;
    let metadata = ProjectMetadata {
        locale,
        project_name: read_str(r)?,
        author: read_str(r)?,
        description: read_str(r)?,
    };

    let phases = (0..read_count(r, 4)?)
        .map(|_| read_str(r))
        .collect::<Result<Vec<_>, _>>()?;
    let strings = (0..read_count(r, 4)?)
        .map(|_| read_str(r))
        .collect::<Result<Vec<_>, _>>()?;

    let asset_count = read_count(r, 5)?;
    let mut assets = Vec::with_capacity(asset_count);
    for _ in 0..asset_count {
        let kind = AssetKind::from_byte(r.read_u8()?).ok_or(DecodeError::InvalidTag("asset kind"))?;
        assets.push(AssetRef {
            kind,
            path: read_str(r)?,
        });
    }

    let function_count = read_count(r, 13)?;
    let mut functions = Vec::with_capacity(function_count);
    for _ in 0..function_count {
        functions.push(FunctionInfo {
            name: read_str(r)?,
            entry: r.read_u32::<LE>()?,
            arity: r.read_u8()?,
            locals: r.read_u32::<LE>()?,
        });
    }

    let globals = r.read_u32::<LE>()?;

    let code_len = read_count(r, 1 + 6)?;
    let mut code = Vec::with_capacity(code_len);
    for index in 0..code_len {
        code.push(read_instruction(r, index)?);
    }
    let mut lines = Vec::with_capacity(code_len);
    for _ in 0..code_len {
        lines.push(SourceLoc {
            phase: r.read_u16::<LE>()?,
            line: r.read_u32::<LE>()?,
        });
    }

    Ok(StoryIR {
        metadata,
        phases,
        strings,
        assets,
        functions,
        globals,
        code,
        lines,
    })
}

fn read_instruction(r: &mut Reader<'_>, index: usize) -> Result<Instruction, DecodeError> {
    use Instruction as I;
    let opcode = r.read_u8()?;
    let ins = match opcode {
        0x00 => I::PushInt(r.read_i64::<LE>()?),
        0x01 => match r.read_u8()? {
            0 => I::PushBool(false),
            1 => I::PushBool(true),
            _ => return Err(DecodeError::InvalidTag("bool")),
        },
        0x02 => I::PushString(r.read_u32::<LE>()?),
        0x03 => I::PushAsset(r.read_u32::<LE>()?),
        0x04 => I::PushPosition(
            Position::from_byte(r.read_u8()?).ok_or(DecodeError::InvalidTag("position"))?,
        ),
        0x05 => I::PushUnit,
        0x06 => I::LoadGlobal(r.read_u32::<LE>()?),
        0x07 => I::StoreGlobal(r.read_u32::<LE>()?),
        0x08 => I::LoadLocal(r.read_u32::<LE>()?),
        0x09 => I::StoreLocal(r.read_u32::<LE>()?),
        0x0A => I::Pop,
        0x0B => I::Neg,
        0x0C => I::Not,
        0x0D => I::Arith(ArithOp::from_byte(r.read_u8()?).ok_or(DecodeError::InvalidTag("operator"))?),
        0x0E => I::Jump(r.read_u32::<LE>()?),
        0x0F => I::JumpUnless(r.read_u32::<LE>()?),
        0x10 => I::Call {
            function: r.read_u32::<LE>()?,
            argc: r.read_u8()?,
        },
        0x11 => I::Return,
        0x12 => I::MakeCharacter,
        0x13 => I::Narrator,
        0x14 => I::Say,
        0x15 => I::Narrate,
        0x16 => I::Background,
        0x17 => I::Music,
        0x18 => I::Wait,
        0x19 => I::Show,
        0x1A => I::Hide,
        0x1B => I::Motion,
        0x1C => I::Expression,
        0x1D => {
            let count = read_count(r, 8)?;
            let mut options = Vec::with_capacity(count);
            for _ in 0..count {
                options.push(ChoiceOption {
                    label: r.read_u32::<LE>()?,
                    target: r.read_u32::<LE>()?,
                });
            }
            I::Choice(options)
        }
        0x1E => I::Halt,
        opcode => return Err(DecodeError::UnknownOpcode { opcode, index }),
    };
    Ok(ins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiagnosticSet;
    use crate::processor::{BuildOptions, Phase, build_ir};

    fn sample() -> StoryIR {
        let src = "\
let kasumi = Character(\"Kasumi\", \"live2d/kasumi\")
background(\"bg/park.png\")
func cheer(times: Int) {
    var n = 0
    while n < times {
        kasumi.say(\"Go!\")
        n = n + 1
    }
}
choice {
    \"Cheer\" {
        cheer(3)
    }
    \"Leave\" {
        kasumi.hide()
    }
}
";
        let mut diags = DiagnosticSet::new();
        let mut options = BuildOptions::for_locale(Locale::En);
        options.metadata.project_name = "Poppin".into();
        build_ir(&[Phase::new("Main.zeile", src)], &options, &mut diags)
            .unwrap_or_else(|| panic!("{diags:?}"))
    }

    #[test]
    fn test_round_trip_preserves_program() {
        let ir = sample();
        let bytes = encode(&ir);
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(decode(&bytes), Ok(ir.clone()));
        assert_eq!(StoryIR::from_binary(&bytes), Some(ir));
    }

    #[test]
    fn test_rejects_damaged_images() {
        let bytes = encode(&sample());

        let test_cases: Vec<(Vec<u8>, DecodeError)> = vec![
            (b"PK\x03\x04".to_vec(), DecodeError::BadMagic),
            (bytes[..20].to_vec(), DecodeError::Truncated),
            (bytes[..bytes.len() - 1].to_vec(), DecodeError::Truncated),
            (
                [bytes.as_slice(), &[0u8, 0]].concat(),
                DecodeError::TrailingBytes(2),
            ),
            (
                {
                    let mut b = bytes.clone();
                    let last = b.len() - 1;
                    b[last] ^= 0xFF;
                    b
                },
                DecodeError::ChecksumMismatch,
            ),
            (
                {
                    let mut b = bytes.clone();
                    b[4] = 99;
                    b
                },
                DecodeError::UnsupportedVersion(99),
            ),
        ];

        for (input, expected) in test_cases {
            assert_eq!(decode(&input), Err(expected));
        }
    }

    #[test]
    fn test_rejects_out_of_range_operands() {
        let mut ir = sample();
        ir.code[0] = Instruction::PushString(10_000);
        let err = decode(&encode(&ir)).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)), "{err}");
    }

    #[test]
    fn test_rejects_oversized_slot_counts() {
        let mut ir = sample();
        ir.globals = u32::MAX;
        let err = decode(&encode(&ir)).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(ref m) if m.contains("global")), "{err}");

        let mut ir = sample();
        ir.functions[0].locals = u32::MAX;
        let err = decode(&encode(&ir)).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(ref m) if m.contains("local")), "{err}");

        let mut ir = sample();
        ir.globals = ir.code.len() as u32 + 1;
        assert!(decode(&encode(&ir)).is_err());
    }

    #[test]
    fn test_emit_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Build/Story.zir");
        let ir = sample();
        emit(&ir, &path).unwrap();
        assert_eq!(load(&path).unwrap(), ir);
    }
}
