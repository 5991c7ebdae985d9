//! Zip backups taken before a save is overwritten.
//!
//! Layout: `<backup dir>/<TITLEID>-<safe name>/saveBackup_<YYYYmmdd-HHMMSS>.zip`.
//! Two backups of the same title within one second share a file name and
//! the later one wins.

use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::error::{IoContext, Result, SyncError};
use crate::model::TitleId;
use crate::tree::{self, TreeFile};

const ARCHIVE_PREFIX: &str = "saveBackup_";
const ARCHIVE_EXT: &str = "zip";

/// Replace characters that are not allowed in file names on common platforms.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '™' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BackupArchive {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl BackupArchive {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct BackupVault {
    root: PathBuf,
    max_backups: usize,
}

impl BackupVault {
    pub fn new(root: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            root: root.into(),
            max_backups: max_backups.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    pub fn title_dir(&self, title_id: &TitleId, name: &str) -> PathBuf {
        self.root
            .join(format!("{}-{}", title_id, sanitize_filename(name)))
    }

    /// Archive `content` for the title, then prune old archives.
    pub fn backup(&self, title_id: &TitleId, name: &str, content: &Path) -> Result<PathBuf> {
        self.backup_at(title_id, name, content, Local::now())
    }

    /// Same as [`backup`](Self::backup) with an explicit timestamp for the archive name.
    pub fn backup_at(
        &self,
        title_id: &TitleId,
        name: &str,
        content: &Path,
        at: DateTime<Local>,
    ) -> Result<PathBuf> {
        if !content.is_dir() {
            return Err(SyncError::io(
                content,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }
        let dir = self.title_dir(title_id, name);
        fs::create_dir_all(&dir).at(&dir)?;
        let dest = dir.join(format!(
            "{}{}.{}",
            ARCHIVE_PREFIX,
            at.format("%Y%m%d-%H%M%S"),
            ARCHIVE_EXT
        ));

        write_zip(&tree::regular_files(content)?, &dest)?;
        info!(%title_id, archive = %dest.display(), "backup written");

        self.enforce_retention(&dir)?;
        Ok(dest)
    }

    /// Archives for one title folder, newest first.
    pub fn list_in(&self, dir: &Path) -> Result<Vec<BackupArchive>> {
        let rd = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::io(dir, e)),
        };
        let mut out = Vec::new();
        for e in rd {
            let path = e.at(dir)?.path();
            let is_archive = path.is_file()
                && path.extension().and_then(|s| s.to_str()) == Some(ARCHIVE_EXT)
                && path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .is_some_and(|n| n.starts_with(ARCHIVE_PREFIX));
            if !is_archive {
                continue;
            }
            let modified = fs::metadata(&path).and_then(|m| m.modified()).at(&path)?;
            out.push(BackupArchive { path, modified });
        }
        // Equal mtimes fall back to the timestamp in the name.
        out.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(out)
    }

    /// Archives for a title across every folder named after it, newest first.
    pub fn list(&self, title_id: &TitleId) -> Result<Vec<BackupArchive>> {
        let prefix = format!("{title_id}-");
        let rd = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SyncError::io(&self.root, e)),
        };
        let mut out = Vec::new();
        for e in rd {
            let e = e.at(&self.root)?;
            let matches = e
                .file_name()
                .to_str()
                .is_some_and(|n| n.to_ascii_uppercase().starts_with(&prefix));
            if matches && e.path().is_dir() {
                out.extend(self.list_in(&e.path())?);
            }
        }
        out.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(out)
    }

    /// Delete everything past the newest `max_backups` archives. Returns how many were removed.
    pub fn enforce_retention(&self, dir: &Path) -> Result<usize> {
        let archives = self.list_in(dir)?;
        let mut removed = 0;
        for old in archives.iter().skip(self.max_backups) {
            fs::remove_file(&old.path).at(&old.path)?;
            debug!(archive = %old.path.display(), "pruned backup");
            removed += 1;
        }
        Ok(removed)
    }
}

/// Written as `<dest>.tmp` and renamed once complete. Listing ignores the temp name.
fn write_zip(files: &[TreeFile], dest: &Path) -> Result<()> {
    let tmp = dest.with_extension(format!("{ARCHIVE_EXT}.tmp"));
    let res = write_zip_files(files, &tmp).and_then(|()| fs::rename(&tmp, dest).at(dest));
    if res.is_err()
        && tmp.exists()
        && let Err(e) = fs::remove_file(&tmp)
    {
        warn!(path = %tmp.display(), error = %e, "could not remove partial backup");
    }
    res
}

fn write_zip_files(files: &[TreeFile], out: &Path) -> Result<()> {
    let file = fs::File::create(out).at(out)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    for f in files {
        zip.start_file(f.rel.as_str(), options)?;
        let data = fs::read(&f.path).at(&f.path)?;
        zip.write_all(&data).at(out)?;
    }
    zip.finish()?;
    Ok(())
}

/// Replace `dest` with the contents of a zip archive.
pub fn extract_archive<R: Read + Seek>(archive: R, dest: &Path) -> Result<usize> {
    let mut zip = zip::ZipArchive::new(archive)?;
    if dest.exists() {
        fs::remove_dir_all(dest).at(dest)?;
    }
    fs::create_dir_all(dest).at(dest)?;
    let count = zip.len();
    zip.extract(dest)?;
    Ok(count)
}
