use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoContext, Result, SyncError};

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/blawar/titledb/master/US.en.json";

/// Relative to the Ryujinx base directory (portable layout).
pub const RYUJINX_SAVE_ROOT: &str = "portable/bis/user/save";
/// Relative to the Citron base directory; holds one folder per user profile.
pub const CITRON_PROFILE_CONTAINER: &str = "user/nand/user/save/0000000000000000";

pub const RYUJINX_EXTRA_DATA: &str = "ExtraData0";
pub const RYUJINX_CONTENT_DIR: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub ryujinx_base: PathBuf,
    pub citron_base: PathBuf,
    pub backup_dir: PathBuf,
    pub mapping_path: PathBuf,
    pub catalog_path: PathBuf,
    pub catalog_url: String,
    pub max_backups: usize,
    pub verify_transfers: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ryujinx_base: PathBuf::new(),
            citron_base: PathBuf::new(),
            backup_dir: PathBuf::from("backupHistory"),
            mapping_path: PathBuf::from("folder_mapping.json"),
            catalog_path: PathBuf::from("US.en.json"),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            max_backups: 10,
            verify_transfers: false,
        }
    }
}

impl SyncConfig {
    /// Missing file yields defaults; a present but malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SyncError::io(path, e)),
        };
        serde_json::from_slice(&data)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let s = serde_json::to_string_pretty(self)?;
        fs::write(path, s).at(path)
    }

    /// Both emulator roots must be set before anything can be scanned.
    pub fn validate(&self) -> Result<()> {
        if self.ryujinx_base.as_os_str().is_empty() {
            return Err(SyncError::Config("Ryujinx base directory is not set".into()));
        }
        if self.citron_base.as_os_str().is_empty() {
            return Err(SyncError::Config("Citron base directory is not set".into()));
        }
        Ok(())
    }

    pub fn ryujinx_save_root(&self) -> PathBuf {
        self.ryujinx_base.join(RYUJINX_SAVE_ROOT)
    }

    pub fn citron_profile_container(&self) -> PathBuf {
        self.citron_base.join(CITRON_PROFILE_CONTAINER)
    }

    pub fn retention(&self) -> usize {
        self.max_backups.max(1)
    }
}
