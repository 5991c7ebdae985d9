//! Persistent folder id → title id table.
//!
//! Ryujinx names save folders with opaque per-install ids, so the only way
//! to find the folder for a title is to remember what each folder held the
//! last time it was scanned. Citron entries use a composite key
//! (`citron::<profile>::<TITLEID>`) so the same title under two profiles
//! never collides, and so they can be told apart from Ryujinx folder ids.
//!
//! The table is a flat JSON object. It is loaded whole and rewritten whole
//! on every change; entries are never removed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{IoContext, Result};
use crate::model::TitleId;

const CITRON_KEY_PREFIX: &str = "citron::";

pub fn citron_key(profile: &str, title_id: &TitleId) -> String {
    format!("{CITRON_KEY_PREFIX}{profile}::{title_id}")
}

pub fn is_citron_key(key: &str) -> bool {
    key.starts_with(CITRON_KEY_PREFIX)
}

#[derive(Debug, Clone)]
pub struct IdentityMap {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl IdentityMap {
    /// Load the table at `path`. A missing or unreadable file gives an empty table.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<BTreeMap<String, String>>(&data) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "identity table is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn lookup(&self, folder_id: &str) -> Option<TitleId> {
        self.entries
            .get(folder_id)
            .and_then(|v| TitleId::parse(v).ok())
    }

    /// First Ryujinx folder id mapped to `title_id`. Citron composite keys
    /// are skipped since they do not name a Ryujinx folder.
    pub fn reverse_lookup(&self, title_id: &TitleId) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| !is_citron_key(k))
            .find(|(_, v)| v.eq_ignore_ascii_case(title_id.as_str()))
            .map(|(k, _)| k.as_str())
    }

    /// First key of any kind mapped to `title_id`.
    pub fn reverse_lookup_any(&self, title_id: &TitleId) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| v.eq_ignore_ascii_case(title_id.as_str()))
            .map(|(k, _)| k.as_str())
    }

    /// Upsert and persist. Returns whether the table changed; an unchanged
    /// entry does not touch the file.
    pub fn register(&mut self, folder_id: &str, title_id: &TitleId) -> Result<bool> {
        if self.entries.get(folder_id).map(String::as_str) == Some(title_id.as_str()) {
            return Ok(false);
        }
        self.entries
            .insert(folder_id.to_string(), title_id.to_string());
        debug!(folder_id, %title_id, "registered identity");
        self.save()?;
        Ok(true)
    }

    /// Every title id the table knows about.
    pub fn title_ids(&self) -> BTreeSet<TitleId> {
        self.entries
            .values()
            .filter_map(|v| TitleId::parse(v).ok())
            .collect()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).at(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).at(&tmp)?;
        fs::rename(&tmp, &self.path).at(&self.path)
    }
}
