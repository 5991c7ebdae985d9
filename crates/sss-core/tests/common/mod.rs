#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sss_core::config::{CITRON_PROFILE_CONTAINER, RYUJINX_SAVE_ROOT};
use sss_core::{GameInfo, SyncConfig, TitleCatalog, TitleId};

pub const GAME_A: &str = "0100ABCD00000000";
pub const GAME_B: &str = "01006F8002326000";

pub fn tid(s: &str) -> TitleId {
    TitleId::parse(s).unwrap()
}

pub fn write_file(path: &Path, data: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

/// Set mtime to `secs` after the Unix epoch.
pub fn set_mtime(path: &Path, secs: u64) {
    let t = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(t)
        .unwrap();
}

/// Ryujinx save folder `<folder>` for `title` with the given files under `0/`.
pub fn ryujinx_save(base: &Path, folder: &str, title: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let dir = base.join(RYUJINX_SAVE_ROOT).join(folder);
    let raw = u64::from_str_radix(title, 16).unwrap().to_le_bytes();
    let mut extra = raw.to_vec();
    extra.extend_from_slice(&[0u8; 56]);
    write_file(&dir.join("ExtraData0"), &extra);
    fs::create_dir_all(dir.join("0")).unwrap();
    for (rel, data) in files {
        write_file(&dir.join("0").join(rel), data);
    }
    dir.join("0")
}

/// Citron save for `title` under `profile` with the given files.
pub fn citron_save(base: &Path, profile: &str, title: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let dir = base.join(CITRON_PROFILE_CONTAINER).join(profile).join(title);
    fs::create_dir_all(&dir).unwrap();
    for (rel, data) in files {
        write_file(&dir.join(rel), data);
    }
    dir
}

pub fn catalog() -> TitleCatalog {
    let mut c = TitleCatalog::default();
    c.insert(GameInfo {
        title_id: tid(GAME_A),
        name: "Alpha: Quest?".into(),
        publisher: Some("Pub".into()),
        region: Some("US".into()),
    });
    c.insert(GameInfo {
        title_id: tid(GAME_B),
        name: "Beta".into(),
        publisher: None,
        region: None,
    });
    c
}

pub fn config(root: &Path) -> SyncConfig {
    SyncConfig {
        ryujinx_base: root.join("ryujinx"),
        citron_base: root.join("citron"),
        backup_dir: root.join("backups"),
        mapping_path: root.join("folder_mapping.json"),
        catalog_path: root.join("US.en.json"),
        max_backups: 3,
        verify_transfers: true,
        ..SyncConfig::default()
    }
}
