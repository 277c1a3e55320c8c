//! `.sar` story archives: a built `Story.zir` bundled with its `Assets/` tree.
//!
//! ```text
//! archive := "ZSAR" version:u16 count:u32 entry* sha256(everything before):[u8; 32]
//! entry   := kind:u8 path_len:u16 path:utf8 data_len:u64 data
//! ```
//!
//! `kind` is 0 for files and 1 for directories (whose data is empty). Paths
//! are relative and `/`-separated. Extraction checks the whole archive before
//! it writes a single file.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use byteorder::{LE, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

pub const MAGIC: &[u8; 4] = b"ZSAR";
pub const ARCHIVE_VERSION: u16 = 1;
pub const STORY_ENTRY: &str = "Story.zir";
pub const ASSETS_DIR: &str = "Assets";

const DIGEST_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not a story archive (bad magic)")]
    BadMagic,
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u16),
    #[error("archive is truncated")]
    Truncated,
    #[error("archive checksum mismatch")]
    ChecksumMismatch,
    #[error("{0} trailing bytes after the last entry")]
    TrailingBytes(usize),
    #[error("unknown entry kind {0}")]
    UnknownEntryKind(u8),
    #[error("unsafe entry path `{0}`")]
    UnsafePath(String),
    #[error("duplicate entry `{0}`")]
    DuplicateEntry(String),
    #[error("archive has no `{STORY_ENTRY}`")]
    MissingStory,
    #[error("path `{0}` cannot be stored in an archive")]
    UnsupportedPath(PathBuf),
    #[error("extraction target {0} is not empty")]
    TargetNotEmpty(PathBuf),
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Directory(String),
    File(String, Vec<u8>),
}

impl Entry {
    pub fn path(&self) -> &str {
        match self {
            Entry::Directory(p) | Entry::File(p, _) => p,
        }
    }
}

// ── packing ─────────────────────────────────────────────────────────────

/// Bundles `story` (an encoded `.zir`) with every file below `asset_dir`.
pub fn pack(story: &[u8], asset_dir: Option<&Path>) -> Result<Vec<u8>, ArchiveError> {
    let mut entries = vec![Entry::File(STORY_ENTRY.to_string(), story.to_vec())];

    if let Some(dir) = asset_dir {
        entries.push(Entry::Directory(ASSETS_DIR.to_string()));
        for item in WalkDir::new(dir)
            .min_depth(1)
            .sort_by_file_name()
        {
            let item = item?;
            let relative = item
                .path()
                .strip_prefix(dir)
                .map_err(|_| ArchiveError::UnsupportedPath(item.path().to_path_buf()))?;
            let name = archive_path(relative)?;
            let path = format!("{ASSETS_DIR}/{name}");
            if item.file_type().is_dir() {
                entries.push(Entry::Directory(path));
            } else if item.file_type().is_file() {
                entries.push(Entry::File(path, fs::read(item.path())?));
            } else {
                debug!(path = %item.path().display(), "skipping non-regular file");
            }
        }
    }

    let bytes = encode_entries(&entries)?;
    info!(entries = entries.len(), bytes = bytes.len(), "packed story archive");
    Ok(bytes)
}

fn archive_path(relative: &Path) -> Result<String, ArchiveError> {
    let mut parts = Vec::new();
    for c in relative.components() {
        match c {
            Component::Normal(part) => match part.to_str() {
                Some(s) if is_safe_component(s) => parts.push(s),
                _ => return Err(ArchiveError::UnsupportedPath(relative.to_path_buf())),
            },
            _ => return Err(ArchiveError::UnsupportedPath(relative.to_path_buf())),
        }
    }
    Ok(parts.join("/"))
}

fn encode_entries(entries: &[Entry]) -> Result<Vec<u8>, ArchiveError> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.write_u16::<LE>(ARCHIVE_VERSION)?;
    out.write_u32::<LE>(entries.len() as u32)?;
    for entry in entries {
        let (kind, path, data): (u8, &str, &[u8]) = match entry {
            Entry::File(p, data) => (0, p.as_str(), data.as_slice()),
            Entry::Directory(p) => (1, p.as_str(), &[][..]),
        };
        let path_len = u16::try_from(path.len())
            .map_err(|_| ArchiveError::UnsupportedPath(PathBuf::from(path)))?;
        out.write_u8(kind)?;
        out.write_u16::<LE>(path_len)?;
        out.extend_from_slice(path.as_bytes());
        out.write_u64::<LE>(data.len() as u64)?;
        out.extend_from_slice(data);
    }
    let digest = Sha256::digest(&out);
    out.extend_from_slice(&digest);
    Ok(out)
}

// ── reading ─────────────────────────────────────────────────────────────

fn is_safe_component(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && !part.contains(['\\', ':', '\0'])
}

fn is_safe_path(path: &str) -> bool {
    !path.starts_with('/') && path.split('/').all(is_safe_component)
}

/// Decodes and checks every entry without touching the filesystem.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<Entry>, ArchiveError> {
    if bytes.len() < 4 || &bytes[..4] != MAGIC {
        return Err(ArchiveError::BadMagic);
    }
    if bytes.len() < 4 + 2 + 4 + DIGEST_LEN {
        return Err(ArchiveError::Truncated);
    }
    let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);

    let mut r = Cursor::new(&body[4..]);
    let version = r.read_u16::<LE>().map_err(|_| ArchiveError::Truncated)?;
    if version != ARCHIVE_VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    if Sha256::digest(body).as_slice() != digest {
        return Err(ArchiveError::ChecksumMismatch);
    }

    let count = r.read_u32::<LE>().map_err(|_| ArchiveError::Truncated)?;
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    for _ in 0..count {
        let entry = read_entry(&mut r)?;
        if !is_safe_path(entry.path()) {
            return Err(ArchiveError::UnsafePath(entry.path().to_string()));
        }
        if !seen.insert(entry.path().to_string()) {
            return Err(ArchiveError::DuplicateEntry(entry.path().to_string()));
        }
        entries.push(entry);
    }
    let left = r.get_ref().len() - r.position() as usize;
    if left != 0 {
        return Err(ArchiveError::TrailingBytes(left));
    }
    if !entries
        .iter()
        .any(|e| matches!(e, Entry::File(p, _) if p == STORY_ENTRY))
    {
        return Err(ArchiveError::MissingStory);
    }
    Ok(entries)
}

fn read_entry(r: &mut Cursor<&[u8]>) -> Result<Entry, ArchiveError> {
    let truncated = |_: io::Error| ArchiveError::Truncated;
    let kind = r.read_u8().map_err(truncated)?;
    let path_len = r.read_u16::<LE>().map_err(truncated)? as usize;
    let mut path = vec![0u8; path_len];
    r.read_exact(&mut path).map_err(truncated)?;
    let path = String::from_utf8(path)
        .map_err(|e| ArchiveError::UnsafePath(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
    let data_len = r.read_u64::<LE>().map_err(truncated)?;
    let left = (r.get_ref().len() as u64).saturating_sub(r.position());
    if data_len > left {
        return Err(ArchiveError::Truncated);
    }
    let mut data = vec![0u8; data_len as usize];
    r.read_exact(&mut data).map_err(truncated)?;
    match kind {
        0 => Ok(Entry::File(path, data)),
        1 if data.is_empty() => Ok(Entry::Directory(path)),
        1 => Err(ArchiveError::Truncated),
        other => Err(ArchiveError::UnknownEntryKind(other)),
    }
}

/// The `Story.zir` bytes of an archive.
pub fn story_bytes(bytes: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    read_entries(bytes)?
        .into_iter()
        .find_map(|e| match e {
            Entry::File(p, data) if p == STORY_ENTRY => Some(data),
            _ => None,
        })
        .ok_or(ArchiveError::MissingStory)
}

// ── extraction ──────────────────────────────────────────────────────────

/// Unpacks the archive into `target`, which must be empty or absent.
///
/// Nothing is written unless the whole archive is valid; if writing fails
/// halfway, `target` is removed again.
pub fn extract(bytes: &[u8], target: &Path) -> Result<(), ArchiveError> {
    let entries = read_entries(bytes)?;

    let existed = target.exists();
    if existed && fs::read_dir(target)?.next().is_some() {
        return Err(ArchiveError::TargetNotEmpty(target.to_path_buf()));
    }
    fs::create_dir_all(target)?;

    if let Err(e) = write_entries(&entries, target) {
        let _ = fs::remove_dir_all(target);
        if existed {
            let _ = fs::create_dir_all(target);
        }
        return Err(e.into());
    }
    info!(dir = %target.display(), entries = entries.len(), "extracted story archive");
    Ok(())
}

fn write_entries(entries: &[Entry], target: &Path) -> io::Result<()> {
    for entry in entries {
        let path = entry
            .path()
            .split('/')
            .fold(target.to_path_buf(), |acc, part| acc.join(part));
        match entry {
            Entry::Directory(_) => fs::create_dir_all(&path)?,
            Entry::File(_, data) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, data)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bg")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("bg/park.png"), b"\x89PNG").unwrap();
        fs::write(dir.path().join("theme.ogg"), b"OggS").unwrap();
        dir
    }

    #[test]
    fn test_pack_and_extract() {
        let src = assets();
        let bytes = pack(b"ZEIR-story", Some(src.path())).unwrap();

        let paths: Vec<String> = read_entries(&bytes)
            .unwrap()
            .iter()
            .map(|e| e.path().to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "Story.zir",
                "Assets",
                "Assets/bg",
                "Assets/bg/park.png",
                "Assets/empty",
                "Assets/theme.ogg",
            ]
        );

        let out = tempfile::tempdir().unwrap();
        let target = out.path().join("session");
        extract(&bytes, &target).unwrap();
        assert_eq!(fs::read(target.join("Story.zir")).unwrap(), b"ZEIR-story");
        assert_eq!(fs::read(target.join("Assets/bg/park.png")).unwrap(), b"\x89PNG");
        assert!(target.join("Assets/empty").is_dir());
        assert_eq!(story_bytes(&bytes).unwrap(), b"ZEIR-story");
    }

    #[test]
    fn test_rejects_before_writing() {
        let bytes = pack(b"story", None).unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut corrupt = bytes.clone();
        corrupt[12] ^= 0x55;
        let target = out.path().join("corrupt");
        assert!(matches!(
            extract(&corrupt, &target),
            Err(ArchiveError::ChecksumMismatch)
        ));
        assert!(!target.exists());

        let target = out.path().join("truncated");
        assert!(extract(&bytes[..bytes.len() - 3], &target).is_err());
        assert!(!target.exists());

        assert!(matches!(
            extract(b"not an archive", &out.path().join("x")),
            Err(ArchiveError::BadMagic)
        ));
    }

    #[test]
    fn test_rejects_unsafe_paths() {
        let test_cases = vec![
            "../escape",
            "/etc/passwd",
            "Assets/../../x",
            "a//b",
            "C:\\evil",
            "",
        ];
        for path in test_cases {
            let entries = vec![
                Entry::File(STORY_ENTRY.into(), b"s".to_vec()),
                Entry::File(path.into(), b"x".to_vec()),
            ];
            let bytes = encode_entries(&entries).unwrap();
            assert!(
                matches!(read_entries(&bytes), Err(ArchiveError::UnsafePath(_))),
                "{path:?} was accepted"
            );
        }
    }

    #[test]
    fn test_requires_story_and_empty_target() {
        let entries = vec![Entry::Directory(ASSETS_DIR.into())];
        let bytes = encode_entries(&entries).unwrap();
        assert!(matches!(read_entries(&bytes), Err(ArchiveError::MissingStory)));

        let bytes = pack(b"story", None).unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(out.path().join("leftover"), b"").unwrap();
        assert!(matches!(
            extract(&bytes, out.path()),
            Err(ArchiveError::TargetNotEmpty(_))
        ));
        assert!(out.path().join("leftover").exists());
    }
}
