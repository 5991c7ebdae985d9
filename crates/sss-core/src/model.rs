use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const TITLE_ID_LEN: usize = 16;

/// Canonical game identifier: 16 uppercase hex digits, e.g. `0100ABCD00000000`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TitleId(String);

impl TitleId {
    /// Case-insensitive parse; anything but exactly 16 hex digits is rejected.
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        let s = s.trim();
        if s.len() != TITLE_ID_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SyncError::InvalidTitleId(s.to_string()));
        }
        Ok(TitleId(s.to_ascii_uppercase()))
    }

    /// Ryujinx `ExtraData0`: the first 8 bytes are the title id, little-endian.
    pub fn from_extra_data(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
        Some(TitleId(format!("{:016X}", u64::from_le_bytes(raw))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for TitleId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TitleId::parse(s)
    }
}

impl TryFrom<String> for TitleId {
    type Error = SyncError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        TitleId::parse(&s)
    }
}

impl From<TitleId> for String {
    fn from(id: TitleId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Ryujinx,
    Citron,
}

impl Origin {
    pub fn other(self) -> Origin {
        match self {
            Origin::Ryujinx => Origin::Citron,
            Origin::Citron => Origin::Ryujinx,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Origin::Ryujinx => "Ryujinx",
            Origin::Citron => "Citron",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub title_id: TitleId,
    pub name: String,
    pub publisher: Option<String>,
    pub region: Option<String>,
}

impl GameInfo {
    pub fn unknown(title_id: TitleId) -> Self {
        Self {
            title_id,
            name: "Unknown".into(),
            publisher: None,
            region: None,
        }
    }
}

/// One save as found on disk during a scan. Rebuilt from scratch on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveUnit {
    pub title_id: TitleId,
    pub name: String,
    pub origin: Origin,
    /// Ryujinx: the save folder name. Citron: the active profile folder.
    pub folder_id: String,
    /// Root of the save content (Ryujinx `<id>/0`, Citron `<profile>/<TITLEID>`).
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub fingerprint: String,
}

/// Where a transfer writes to. The path may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub title_id: TitleId,
    pub name: String,
    pub origin: Origin,
    pub path: PathBuf,
}

impl From<&SaveUnit> for Destination {
    fn from(unit: &SaveUnit) -> Self {
        Self {
            title_id: unit.title_id.clone(),
            name: unit.name.clone(),
            origin: unit.origin,
            path: unit.path.clone(),
        }
    }
}
