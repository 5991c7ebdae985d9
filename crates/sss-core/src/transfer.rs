//! Full-tree save replacement, always preceded by a backup of the target.
//!
//! The copy is not atomic: if it fails after the old tree was removed, the
//! destination is left incomplete and the backup taken first is the way back.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{IoContext, Result, SyncError};
use crate::model::{Destination, SaveUnit};
use crate::tree;
use crate::vault::BackupVault;

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub backup: Option<std::path::PathBuf>,
    pub files_copied: usize,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferEngine {
    vault: BackupVault,
    verify: bool,
}

impl TransferEngine {
    pub fn new(vault: BackupVault) -> Self {
        Self {
            vault,
            verify: false,
        }
    }

    /// Recompute the destination fingerprint after each copy.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn vault(&self) -> &BackupVault {
        &self.vault
    }

    /// Back up `dest` if it holds anything, then replace it with `source`.
    pub fn transfer(&self, source: &SaveUnit, dest: &Destination) -> Result<TransferReport> {
        info!(
            title_id = %source.title_id,
            name = %source.name,
            from = %source.origin,
            to = %dest.origin,
            "sync"
        );
        let backup = if tree::has_regular_files(&dest.path) {
            Some(self.vault.backup(&dest.title_id, &dest.name, &dest.path)?)
        } else {
            None
        };

        let files_copied = replace_tree(&source.path, &dest.path)?;
        info!(dest = %dest.path.display(), files_copied, "save copied");

        let fingerprint = if self.verify {
            let actual = tree::fingerprint_tree(&dest.path)?;
            if actual != source.fingerprint {
                return Err(SyncError::VerificationFailed {
                    path: dest.path.clone(),
                    expected: source.fingerprint.clone(),
                    actual,
                });
            }
            Some(actual)
        } else {
            None
        };

        Ok(TransferReport {
            backup,
            files_copied,
            fingerprint,
        })
    }
}

/// Remove `dst` if present and copy `src` into its place, keeping file mtimes.
pub fn replace_tree(src: &Path, dst: &Path) -> Result<usize> {
    if !src.is_dir() {
        return Err(SyncError::io(
            src,
            std::io::Error::new(std::io::ErrorKind::NotFound, "source save folder is missing"),
        ));
    }
    if dst.exists() {
        fs::remove_dir_all(dst).at(dst)?;
    }
    fs::create_dir_all(dst).at(dst)?;

    let mut copied = 0;
    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).at(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).at(&target)?;
            let modified = entry.metadata()?.modified().at(entry.path())?;
            fs::File::options()
                .write(true)
                .open(&target)
                .and_then(|f| f.set_modified(modified))
                .at(&target)?;
            copied += 1;
        }
    }
    Ok(copied)
}
