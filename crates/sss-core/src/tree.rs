//! Whole-tree helpers: fingerprint, latest mtime, regular-file listing.
//!
//! The fingerprint is SHA-256 over every regular file in ascending
//! relative-path order (`/` separators). Each file contributes its relative
//! path, a NUL, its length as u64 LE, then its bytes. An empty tree hashes
//! the empty input.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{IoContext, Result};

#[derive(Debug, Clone)]
pub struct TreeFile {
    /// `/`-separated path relative to the tree root.
    pub rel: String,
    pub path: PathBuf,
}

/// Regular files under `root`, sorted by relative path. Symlinks are not followed.
pub fn regular_files(root: &Path) -> Result<Vec<TreeFile>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        out.push(TreeFile {
            rel: rel.to_string_lossy().replace('\\', "/"),
            path: path.to_path_buf(),
        });
    }
    out.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(out)
}

/// True when `root` holds at least one regular file at any depth.
pub fn has_regular_files(root: &Path) -> bool {
    WalkDir::new(root)
        .into_iter()
        .flatten()
        .any(|e| e.file_type().is_file())
}

fn feed(hasher: &mut Sha256, rel: &str, content: &[u8]) {
    hasher.update(rel.as_bytes());
    hasher.update([0u8]);
    hasher.update((content.len() as u64).to_le_bytes());
    hasher.update(content);
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Fingerprint of an in-memory file set; input order does not matter.
pub fn fingerprint_entries<I, S, B>(entries: I) -> String
where
    I: IntoIterator<Item = (S, B)>,
    S: AsRef<str>,
    B: AsRef<[u8]>,
{
    let mut sorted: Vec<(S, B)> = entries.into_iter().collect();
    sorted.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));
    let mut hasher = Sha256::new();
    for (rel, content) in &sorted {
        feed(&mut hasher, rel.as_ref(), content.as_ref());
    }
    to_hex(&hasher.finalize())
}

pub fn fingerprint_tree(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for f in regular_files(root)? {
        let data = fs::read(&f.path).at(&f.path)?;
        feed(&mut hasher, &f.rel, &data);
    }
    Ok(to_hex(&hasher.finalize()))
}

/// Newest mtime among regular files; the Unix epoch for an empty tree.
pub fn latest_modified(root: &Path) -> Result<DateTime<Utc>> {
    let mut latest = DateTime::<Utc>::from(UNIX_EPOCH);
    for f in regular_files(root)? {
        let modified = fs::metadata(&f.path)
            .and_then(|m| m.modified())
            .at(&f.path)?;
        latest = latest.max(DateTime::<Utc>::from(modified));
    }
    Ok(latest)
}
