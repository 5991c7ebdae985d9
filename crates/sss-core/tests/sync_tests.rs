mod common;

use std::fs;
use std::io::Read;

use chrono::{Local, TimeZone};
use sss_core::discovery;
use sss_core::{
    BackupVault, Direction, IdentityMap, PresetChoice, SyncError, SyncSession, SyncState,
    TitleCatalog,
};

use common::{GAME_A, GAME_B, catalog, citron_save, config, ryujinx_save, set_mtime, tid, write_file};

fn session(root: &std::path::Path) -> SyncSession {
    SyncSession::new(config(root), Box::new(catalog()), None)
}

fn zip_contents(path: &std::path::Path) -> Vec<(String, Vec<u8>)> {
    let mut zip = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut out = Vec::new();
    for i in 0..zip.len() {
        let mut f = zip.by_index(i).unwrap();
        let mut data = Vec::new();
        f.read_to_end(&mut data).unwrap();
        out.push((f.name().to_string(), data));
    }
    out.sort();
    out
}

#[test]
fn scan_discovers_both_sides_and_registers_identities() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"a")]);
    citron_save(&cfg.citron_base, "PROFILE1", GAME_B, &[("save.dat", b"b")]);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    assert_eq!(scan.ryujinx.len(), 1);
    assert_eq!(scan.citron.len(), 1);
    assert!(scan.profile_error.is_none());
    assert_eq!(scan.ryujinx[0].name, "Alpha: Quest?");
    assert_eq!(scan.ryujinx[0].folder_id, "0000000000000001");
    assert_eq!(scan.citron[0].folder_id, "PROFILE1");
    assert_eq!(s.active_profile(), Some("PROFILE1"));

    assert_eq!(s.identity().lookup("0000000000000001"), Some(tid(GAME_A)));
    assert_eq!(
        s.identity().lookup(&format!("citron::PROFILE1::{GAME_B}")),
        Some(tid(GAME_B))
    );
}

#[test]
fn unreadable_or_empty_units_are_skipped_not_fatal() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"a")]);

    // Short ExtraData0.
    let short = ryujinx_save(&cfg.ryujinx_base, "0000000000000002", GAME_B, &[("x", b"x")]);
    fs::write(short.parent().unwrap().join("ExtraData0"), [1u8, 2, 3]).unwrap();
    // Empty content folder: uninitialized, silently ignored.
    ryujinx_save(&cfg.ryujinx_base, "0000000000000003", GAME_B, &[]);
    // Not a save folder at all.
    fs::create_dir_all(cfg.ryujinx_save_root().join("junk")).unwrap();

    citron_save(&cfg.citron_base, "PROFILE1", GAME_A, &[("save.dat", b"a")]);
    citron_save(&cfg.citron_base, "PROFILE1", "notatitle", &[("x", b"x")]);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    assert_eq!(scan.ryujinx.len(), 1);
    assert_eq!(scan.citron.len(), 1);
    let skipped: Vec<&str> = scan.skipped.iter().map(|u| u.folder.as_str()).collect();
    assert_eq!(skipped, vec!["0000000000000002", "notatitle"]);
    assert!(s.identity().lookup("0000000000000002").is_none());
}

#[test]
fn ambiguous_profile_leaves_citron_empty_until_chosen() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"a")]);
    citron_save(&cfg.citron_base, "P1", GAME_A, &[("save.dat", b"a")]);
    citron_save(&cfg.citron_base, "P2", GAME_B, &[("save.dat", b"b")]);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    assert!(scan.citron.is_empty());
    assert_eq!(scan.ryujinx.len(), 1);
    assert!(matches!(
        scan.profile_error,
        Some(SyncError::AmbiguousProfile { .. })
    ));

    s.set_disambiguator(Box::new(PresetChoice("P2".into())));
    let scan = s.scan().unwrap();
    assert_eq!(scan.citron.len(), 1);
    assert_eq!(scan.citron[0].title_id, tid(GAME_B));
}

#[test]
fn identity_table_alone_lets_profile_resolve_without_catalog() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"a")]);
    citron_save(&cfg.citron_base, "P1", GAME_A, &[("save.dat", b"a")]);

    let mut s = SyncSession::new(cfg, Box::new(TitleCatalog::default()), None);
    let scan = s.scan().unwrap();
    assert_eq!(scan.citron.len(), 1);
    assert_eq!(scan.citron[0].name, "Unknown");
    assert_eq!(s.plan(&scan).entries[0].state, SyncState::Match);
}

#[test]
fn matching_saves_cause_no_transfer_and_no_backup() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("a/b.dat", b"same")]);
    citron_save(&cfg.citron_base, "P1", GAME_A, &[("a/b.dat", b"same")]);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    assert_eq!(plan.entries.len(), 1);
    assert_eq!(plan.entries[0].state, SyncState::Match);

    let report = s.sync_all(&plan);
    assert!(report.transferred.is_empty());
    assert!(report.failed.is_empty());
    assert!(!cfg.backup_dir.exists());
}

#[test]
fn overwrite_is_preceded_by_backup_of_destination() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    let r = ryujinx_save(
        &cfg.ryujinx_base,
        "0000000000000001",
        GAME_A,
        &[("save.dat", b"new progress"), ("sub/extra.bin", b"\x00\x01")],
    );
    let c = citron_save(&cfg.citron_base, "P1", GAME_A, &[("save.dat", b"old progress")]);
    set_mtime(&c.join("save.dat"), 1_000);
    set_mtime(&r.join("save.dat"), 2_000);
    set_mtime(&r.join("sub/extra.bin"), 1_500);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    let entry = plan.get(&tid(GAME_A)).unwrap();
    assert_eq!(entry.state, SyncState::RyujinxNewer);
    let source_fp = entry.ryujinx.as_ref().unwrap().fingerprint.clone();

    let start = Local::now();
    let report = s.sync_entry(entry).unwrap().unwrap();
    let archive = report.backup.expect("destination was backed up");
    assert_eq!(
        archive.parent().unwrap(),
        s.vault().title_dir(&tid(GAME_A), "Alpha: Quest?")
    );
    assert!(archive.starts_with(cfg.backup_dir.join(format!("{GAME_A}-Alpha_ Quest_"))));
    let end = Local::now();
    let stamp = archive.file_stem().unwrap().to_string_lossy().replace("saveBackup_", "");
    assert!(stamp >= start.format("%Y%m%d-%H%M%S").to_string());
    assert!(stamp <= end.format("%Y%m%d-%H%M%S").to_string());
    assert_eq!(
        zip_contents(&archive),
        vec![("save.dat".to_string(), b"old progress".to_vec())]
    );
    assert_eq!(report.files_copied, 2);
    assert_eq!(report.fingerprint.as_deref(), Some(source_fp.as_str()));

    // Round trip: rescanning shows both sides identical, with matching mtimes.
    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    let entry = plan.get(&tid(GAME_A)).unwrap();
    assert_eq!(entry.state, SyncState::Match);
    assert_eq!(entry.citron.as_ref().unwrap().fingerprint, source_fp);
    assert_eq!(entry.citron.as_ref().unwrap().modified.timestamp(), 2_000);
}

#[test]
fn citron_only_save_needs_ryujinx_folder_then_syncs_to_match() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    citron_save(&cfg.citron_base, "P1", GAME_A, &[("save.dat", b"citron data")]);
    // The game has been launched in Ryujinx, but under another title, so
    // nothing maps GAME_A to a Ryujinx folder yet.
    ryujinx_save(&cfg.ryujinx_base, "0000000000000009", GAME_B, &[("x", b"x")]);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    let entry = plan.get(&tid(GAME_A)).unwrap();
    assert_eq!(entry.state, SyncState::NeedsInitialization);
    assert!(s.sync_entry(entry).unwrap().is_none());
    assert!(matches!(
        s.transfer(entry, Direction::CitronToRyujinx),
        Err(SyncError::MissingDestination(_))
    ));

    // Ryujinx creates the save folder; once scanned, the mapping exists.
    let r = ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"blank")]);
    s.scan().unwrap();
    assert_eq!(s.identity().reverse_lookup(&tid(GAME_A)), Some("0000000000000001"));
    // The fresh save is discarded by the emulator, leaving the folder empty.
    fs::remove_file(r.join("save.dat")).unwrap();

    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    let entry = plan.get(&tid(GAME_A)).unwrap();
    assert_eq!(entry.state, SyncState::OnlyInCitron);
    let report = s.sync_entry(entry).unwrap().unwrap();
    assert!(report.backup.is_none());

    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    assert_eq!(plan.get(&tid(GAME_A)).unwrap().state, SyncState::Match);
    assert_eq!(fs::read(r.join("save.dat")).unwrap(), b"citron data");
}

#[test]
fn ryujinx_only_save_is_created_under_active_profile() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"a")]);
    ryujinx_save(&cfg.ryujinx_base, "0000000000000002", GAME_B, &[("save.dat", b"b")]);
    citron_save(&cfg.citron_base, "P1", GAME_A, &[("save.dat", b"a")]);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    assert_eq!(plan.get(&tid(GAME_B)).unwrap().state, SyncState::OnlyInRyujinx);

    let report = s.sync_all(&plan);
    assert_eq!(report.transferred.len(), 1);
    assert_eq!(report.transferred[0].0, tid(GAME_B));
    assert!(report.transferred[0].1.backup.is_none());
    let dest = cfg.citron_profile_container().join("P1").join(GAME_B);
    assert_eq!(fs::read(dest.join("save.dat")).unwrap(), b"b");
}

#[test]
fn retention_keeps_newest_archives() {
    let d = tempfile::tempdir().unwrap();
    let content = d.path().join("content");
    write_file(&content.join("save.dat"), b"data");
    let vault = BackupVault::new(d.path().join("backups"), 3);

    let mut written = Vec::new();
    for i in 0..5 {
        let at = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, i).unwrap();
        written.push(vault.backup_at(&tid(GAME_A), "Alpha", &content, at).unwrap());
    }
    let left = vault.list(&tid(GAME_A)).unwrap();
    let names: Vec<String> = left.iter().map(|a| a.file_name()).collect();
    assert_eq!(
        names,
        vec![
            "saveBackup_20240101-120004.zip",
            "saveBackup_20240101-120003.zip",
            "saveBackup_20240101-120002.zip",
        ]
    );
    assert!(!written[0].exists());
    assert!(!written[1].exists());
}

#[test]
fn same_second_backups_overwrite() {
    let d = tempfile::tempdir().unwrap();
    let content = d.path().join("content");
    write_file(&content.join("save.dat"), b"one");
    let vault = BackupVault::new(d.path().join("backups"), 10);
    let at = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    vault.backup_at(&tid(GAME_A), "A/B", &content, at).unwrap();
    write_file(&content.join("save.dat"), b"two");
    let p = vault.backup_at(&tid(GAME_A), "A/B", &content, at).unwrap();

    assert_eq!(vault.list(&tid(GAME_A)).unwrap().len(), 1);
    assert!(p.parent().unwrap().ends_with(format!("{GAME_A}-A_B")));
    assert_eq!(zip_contents(&p), vec![("save.dat".to_string(), b"two".to_vec())]);
}

#[test]
fn restore_puts_archive_back_and_backs_up_current_state() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    let r = ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"v1")]);
    citron_save(&cfg.citron_base, "P1", GAME_A, &[("save.dat", b"v2")]);
    set_mtime(&r.join("save.dat"), 1_000);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    let entry = plan.get(&tid(GAME_A)).unwrap();
    assert_eq!(entry.state, SyncState::CitronNewer);
    let archive = s.sync_entry(entry).unwrap().unwrap().backup.unwrap();
    assert_eq!(fs::read(r.join("save.dat")).unwrap(), b"v2");

    let dest = s.destination(entry, Direction::CitronToRyujinx).unwrap();
    s.restore(&archive, &dest).unwrap();
    assert_eq!(fs::read(r.join("save.dat")).unwrap(), b"v1");
    assert!(!s.backups(&tid(GAME_A)).unwrap().is_empty());
}

#[test]
fn failed_backup_leaves_destination_untouched() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    let r = ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"new")]);
    let c = citron_save(&cfg.citron_base, "P1", GAME_A, &[("save.dat", b"old")]);
    set_mtime(&c.join("save.dat"), 1_000);
    set_mtime(&r.join("save.dat"), 2_000);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    let entry = plan.get(&tid(GAME_A)).unwrap();
    assert_eq!(entry.state, SyncState::RyujinxNewer);

    // The backup directory cannot be created over a regular file.
    fs::write(&cfg.backup_dir, b"not a dir").unwrap();
    assert!(s.sync_entry(entry).is_err());
    assert_eq!(fs::read(c.join("save.dat")).unwrap(), b"old");
}

#[test]
fn source_changed_after_scan_fails_verification() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    let r = ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"v1")]);
    citron_save(&cfg.citron_base, "P1", GAME_B, &[("save.dat", b"b")]);

    let mut s = session(d.path());
    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    let entry = plan.get(&tid(GAME_A)).unwrap();
    assert_eq!(entry.state, SyncState::OnlyInRyujinx);

    fs::write(r.join("save.dat"), b"v2, written after the scan").unwrap();
    match s.sync_entry(entry) {
        Err(SyncError::VerificationFailed { expected, actual, .. }) => {
            assert_eq!(expected, entry.ryujinx.as_ref().unwrap().fingerprint);
            assert_ne!(expected, actual);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn deleted_ryujinx_folder_is_not_recreated() {
    let d = tempfile::tempdir().unwrap();
    let cfg = config(d.path());
    let r = ryujinx_save(&cfg.ryujinx_base, "0000000000000001", GAME_A, &[("save.dat", b"a")]);
    citron_save(&cfg.citron_base, "P1", GAME_A, &[("save.dat", b"a")]);

    let mut s = session(d.path());
    s.scan().unwrap();
    let folder = r.parent().unwrap().to_path_buf();
    fs::remove_dir_all(&folder).unwrap();

    let scan = s.scan().unwrap();
    let plan = s.plan(&scan);
    let entry = plan.get(&tid(GAME_A)).unwrap();
    assert_eq!(entry.state, SyncState::OnlyInCitron);

    let report = s.sync_all(&plan);
    assert!(report.transferred.is_empty());
    assert!(matches!(
        report.failed.as_slice(),
        [(_, SyncError::MissingDestination(_))]
    ));
    assert!(!folder.exists());
    assert!(!cfg.backup_dir.exists());
}

#[test]
fn unreadable_profile_folder_is_skipped() {
    let d = tempfile::tempdir().unwrap();
    let container = d.path().join("container");
    write_file(&container.join("P1"), b"a file, not a profile folder");
    let mut identity = IdentityMap::load(d.path().join("map.json"));

    let found = discovery::scan_citron(&container, "P1", &mut identity, &catalog()).unwrap();
    assert!(found.units.is_empty());
    assert_eq!(found.skipped.len(), 1);
    assert_eq!(found.skipped[0].folder, "P1");
}

#[test]
fn leftover_partial_backup_is_not_listed_or_counted() {
    let d = tempfile::tempdir().unwrap();
    let content = d.path().join("content");
    write_file(&content.join("save.dat"), b"data");
    let vault = BackupVault::new(d.path().join("backups"), 1);
    let partial = vault
        .title_dir(&tid(GAME_A), "Alpha")
        .join("saveBackup_20990101-000000.zip.tmp");
    write_file(&partial, b"truncated");

    let at = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let p = vault.backup_at(&tid(GAME_A), "Alpha", &content, at).unwrap();
    let left = vault.list(&tid(GAME_A)).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].path, p);
    assert!(!p.with_extension("zip.tmp").exists());
}
