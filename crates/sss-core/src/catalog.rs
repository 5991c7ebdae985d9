//! Title metadata (names, publishers, regions) keyed by title id.
//!
//! The catalog is a titledb-style JSON file: an object whose values each
//! describe one release. A local copy is used when present and parsable,
//! otherwise it is downloaded once.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{IoContext, Result, SyncError};
use crate::model::{GameInfo, TitleId};

pub trait MetadataLookup {
    fn game_info(&self, title_id: &TitleId) -> Option<GameInfo>;
    fn known_ids(&self) -> BTreeSet<TitleId>;

    /// Display name, or `"Unknown"` when the title is not catalogued.
    fn display_name(&self, title_id: &TitleId) -> String {
        self.game_info(title_id)
            .unwrap_or_else(|| GameInfo::unknown(title_id.clone()))
            .name
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    region: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TitleCatalog {
    games: HashMap<TitleId, GameInfo>,
}

impl TitleCatalog {
    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn insert(&mut self, info: GameInfo) {
        self.games.insert(info.title_id.clone(), info);
    }

    /// Entries without an id or name, or with an id that is not a title id, are dropped.
    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(data)?;
        let mut catalog = Self::default();
        for value in raw.into_values() {
            let Ok(entry) = serde_json::from_value::<RawEntry>(value) else {
                continue;
            };
            let (Some(id), Some(name)) = (entry.id, entry.name) else {
                continue;
            };
            let Ok(title_id) = TitleId::parse(&id) else {
                continue;
            };
            catalog.insert(GameInfo {
                title_id,
                name: name.trim().to_string(),
                publisher: entry.publisher,
                region: entry.region,
            });
        }
        Ok(catalog)
    }

    /// Parse the local file only.
    pub fn load_local(path: &Path) -> Result<Self> {
        let data = fs::read(path).at(path)?;
        Self::from_json_slice(&data)
    }

    /// Use the local copy if it parses, otherwise download it to `path` first.
    pub fn load_or_fetch(path: &Path, url: &str) -> Result<Self> {
        match Self::load_local(path) {
            Ok(c) => return Ok(c),
            Err(e) => warn!(path = %path.display(), error = %e, "catalog missing or invalid"),
        }
        Self::fetch(path, url)?;
        Self::load_local(path)
    }

    /// Download the catalog to `path`, replacing any existing copy.
    pub fn fetch(path: &Path, url: &str) -> Result<()> {
        info!(url, "downloading title catalog");
        let res = download(url).and_then(|body| {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).at(parent)?;
            }
            fs::write(path, body).at(path)
        });
        if res.is_err() && path.exists() {
            let _ = fs::remove_file(path);
        }
        res
    }
}

fn download(url: &str) -> Result<Vec<u8>> {
    let resp = reqwest::blocking::get(url)?.error_for_status()?;
    let body = resp.bytes()?;
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(SyncError::Catalog(format!("downloaded file from {url} is empty")));
    }
    Ok(body.to_vec())
}

impl MetadataLookup for TitleCatalog {
    fn game_info(&self, title_id: &TitleId) -> Option<GameInfo> {
        self.games.get(title_id).cloned()
    }

    fn known_ids(&self) -> BTreeSet<TitleId> {
        self.games.keys().cloned().collect()
    }
}
