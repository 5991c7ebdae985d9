//! Save discovery for both emulator layouts.
//!
//! Ryujinx: `<save root>/<folder id>/{ExtraData0, 0/}`; the title id is
//! the first 8 bytes of `ExtraData0`, little-endian.
//! Citron: `<container>/<profile>/<TITLEID>/`; the folder name is the id.
//!
//! A unit that cannot be read is skipped and reported; the scan goes on.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::MetadataLookup;
use crate::config::{RYUJINX_CONTENT_DIR, RYUJINX_EXTRA_DATA};
use crate::error::{IoContext, Result, SyncError};
use crate::identity::{IdentityMap, citron_key};
use crate::model::{Origin, SaveUnit, TitleId};
use crate::tree;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedUnit {
    pub origin: Origin,
    pub folder: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Discovered {
    pub units: Vec<SaveUnit>,
    pub skipped: Vec<SkippedUnit>,
}

impl Discovered {
    fn skip(&mut self, origin: Origin, folder: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%origin, folder, %reason, "skipping save");
        self.skipped.push(SkippedUnit {
            origin,
            folder: folder.to_string(),
            reason,
        });
    }
}

/// Immediate sub-directories of `root`, sorted. A missing root is empty.
pub fn list_folders(root: &Path) -> Result<Vec<PathBuf>> {
    let rd = match fs::read_dir(root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(root = %root.display(), "save root does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(SyncError::io(root, e)),
    };
    let mut out = Vec::new();
    for e in rd {
        let p = e.at(root)?.path();
        if p.is_dir() {
            out.push(p);
        }
    }
    out.sort();
    Ok(out)
}

fn folder_name(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_title_id(extra_data: &Path) -> std::result::Result<TitleId, String> {
    let bytes = fs::read(extra_data).map_err(|e| format!("unreadable {RYUJINX_EXTRA_DATA}: {e}"))?;
    TitleId::from_extra_data(&bytes)
        .ok_or_else(|| format!("{RYUJINX_EXTRA_DATA} is only {} bytes", bytes.len()))
}

/// Fingerprint and mtime of a content tree, as a skip reason on failure.
fn measure(content: &Path) -> std::result::Result<(String, chrono::DateTime<chrono::Utc>), String> {
    let fingerprint = tree::fingerprint_tree(content).map_err(|e| e.to_string())?;
    let modified = tree::latest_modified(content).map_err(|e| e.to_string())?;
    Ok((fingerprint, modified))
}

pub fn scan_ryujinx(
    save_root: &Path,
    identity: &mut IdentityMap,
    catalog: &dyn MetadataLookup,
) -> Result<Discovered> {
    let mut found = Discovered::default();
    for dir in list_folders(save_root)? {
        let folder = folder_name(&dir);
        let extra_data = dir.join(RYUJINX_EXTRA_DATA);
        let content = dir.join(RYUJINX_CONTENT_DIR);
        if !extra_data.is_file() || !content.is_dir() {
            debug!(folder = %folder, "not a save folder");
            continue;
        }
        if !tree::has_regular_files(&content) {
            debug!(folder = %folder, "save folder is empty");
            continue;
        }
        let title_id = match read_title_id(&extra_data) {
            Ok(id) => id,
            Err(reason) => {
                found.skip(Origin::Ryujinx, &folder, reason);
                continue;
            }
        };
        identity.register(&folder, &title_id)?;

        let (fingerprint, modified) = match measure(&content) {
            Ok(m) => m,
            Err(reason) => {
                found.skip(Origin::Ryujinx, &folder, reason);
                continue;
            }
        };
        found.units.push(SaveUnit {
            name: catalog.display_name(&title_id),
            title_id,
            origin: Origin::Ryujinx,
            folder_id: folder,
            path: content,
            modified,
            fingerprint,
        });
    }
    info!(
        saves = found.units.len(),
        skipped = found.skipped.len(),
        "scanned Ryujinx"
    );
    Ok(found)
}

/// Scan one Citron profile folder under `container`.
pub fn scan_citron(
    container: &Path,
    profile: &str,
    identity: &mut IdentityMap,
    catalog: &dyn MetadataLookup,
) -> Result<Discovered> {
    let mut found = Discovered::default();
    let dirs = match list_folders(&container.join(profile)) {
        Ok(dirs) => dirs,
        Err(e) => {
            found.skip(Origin::Citron, profile, e.to_string());
            return Ok(found);
        }
    };
    for dir in dirs {
        let folder = folder_name(&dir);
        let title_id = match TitleId::parse(&folder) {
            Ok(id) => id,
            Err(e) => {
                found.skip(Origin::Citron, &folder, e.to_string());
                continue;
            }
        };
        if !tree::has_regular_files(&dir) {
            debug!(folder = %folder, "save folder is empty");
            continue;
        }
        identity.register(&citron_key(profile, &title_id), &title_id)?;

        let (fingerprint, modified) = match measure(&dir) {
            Ok(m) => m,
            Err(reason) => {
                found.skip(Origin::Citron, &folder, reason);
                continue;
            }
        };
        found.units.push(SaveUnit {
            name: catalog.display_name(&title_id),
            title_id,
            origin: Origin::Citron,
            folder_id: profile.to_string(),
            path: dir,
            modified,
            fingerprint,
        });
    }
    info!(
        profile,
        saves = found.units.len(),
        skipped = found.skipped.len(),
        "scanned Citron"
    );
    Ok(found)
}
