use std::collections::BTreeSet;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::catalog::MetadataLookup;
use crate::config::{RYUJINX_CONTENT_DIR, RYUJINX_EXTRA_DATA, SyncConfig};
use crate::discovery::{self, SkippedUnit};
use crate::error::{IoContext, Result, SyncError};
use crate::identity::IdentityMap;
use crate::model::{Destination, Origin, SaveUnit, TitleId};
use crate::planner::{Direction, PlanEntry, SyncPlan};
use crate::profile::{Disambiguator, ProfileResolver};
use crate::transfer::{TransferEngine, TransferReport};
use crate::vault::{self, BackupArchive, BackupVault};

#[derive(Debug, Default)]
pub struct ScanReport {
    pub ryujinx: Vec<SaveUnit>,
    pub citron: Vec<SaveUnit>,
    pub skipped: Vec<SkippedUnit>,
    /// Set when the Citron profile could not be resolved; `citron` is empty then.
    pub profile_error: Option<SyncError>,
}

#[derive(Debug, Default, Serialize)]
pub struct SyncAllReport {
    pub transferred: Vec<(TitleId, TransferReport)>,
    #[serde(serialize_with = "serialize_failures")]
    pub failed: Vec<(TitleId, SyncError)>,
}

fn serialize_failures<S: serde::Serializer>(
    failed: &[(TitleId, SyncError)],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(failed.iter().map(|(id, e)| (id, e.to_string())))
}

/// One run of the tool: config, identity table, catalog, resolved profile.
pub struct SyncSession {
    config: SyncConfig,
    identity: IdentityMap,
    catalog: Box<dyn MetadataLookup>,
    resolver: ProfileResolver,
    engine: TransferEngine,
}

impl SyncSession {
    pub fn new(
        config: SyncConfig,
        catalog: Box<dyn MetadataLookup>,
        disambiguator: Option<Box<dyn Disambiguator>>,
    ) -> Self {
        let identity = IdentityMap::load(&config.mapping_path);
        let vault = BackupVault::new(&config.backup_dir, config.retention());
        let engine = TransferEngine::new(vault).with_verify(config.verify_transfers);
        Self {
            config,
            identity,
            catalog,
            resolver: ProfileResolver::new(disambiguator),
            engine,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    pub fn catalog(&self) -> &dyn MetadataLookup {
        self.catalog.as_ref()
    }

    pub fn vault(&self) -> &BackupVault {
        self.engine.vault()
    }

    pub fn set_disambiguator(&mut self, disambiguator: Box<dyn Disambiguator>) {
        self.resolver.set_disambiguator(disambiguator);
    }

    pub fn active_profile(&self) -> Option<&str> {
        self.resolver.cached()
    }

    /// Catalog ids plus every id the identity table has seen.
    fn known_ids(&self) -> BTreeSet<TitleId> {
        let mut ids = self.catalog.known_ids();
        ids.extend(self.identity.title_ids());
        ids
    }

    fn resolve_profile(&mut self) -> Result<String> {
        let known = self.known_ids();
        self.resolver
            .resolve(&self.config.citron_profile_container(), &known)
    }

    /// Walk both trees. Ryujinx goes first so its identities count as known
    /// when picking the Citron profile.
    pub fn scan(&mut self) -> Result<ScanReport> {
        self.config.validate()?;
        let mut report = ScanReport::default();

        let ryujinx = discovery::scan_ryujinx(
            &self.config.ryujinx_save_root(),
            &mut self.identity,
            self.catalog.as_ref(),
        )?;
        report.ryujinx = ryujinx.units;
        report.skipped = ryujinx.skipped;

        match self.resolve_profile() {
            Ok(profile) => {
                let citron = discovery::scan_citron(
                    &self.config.citron_profile_container(),
                    &profile,
                    &mut self.identity,
                    self.catalog.as_ref(),
                )?;
                report.citron = citron.units;
                report.skipped.extend(citron.skipped);
            }
            Err(e) => {
                warn!(error = %e, "Citron saves unavailable");
                report.profile_error = Some(e);
            }
        }
        Ok(report)
    }

    pub fn plan(&self, scan: &ScanReport) -> SyncPlan {
        SyncPlan::build(&scan.ryujinx, &scan.citron, &self.identity)
    }

    /// Where a transfer for `entry` in `direction` would write.
    pub fn destination(&mut self, entry: &PlanEntry, direction: Direction) -> Result<Destination> {
        let path = match direction.target() {
            Origin::Citron => match &entry.citron {
                Some(unit) => unit.path.clone(),
                None => {
                    let profile = self.resolve_profile()?;
                    self.config
                        .citron_profile_container()
                        .join(profile)
                        .join(entry.title_id.as_str())
                }
            },
            Origin::Ryujinx => match &entry.ryujinx {
                Some(unit) => unit.path.clone(),
                None => {
                    let folder = self
                        .identity
                        .reverse_lookup(&entry.title_id)
                        .ok_or_else(|| SyncError::MissingDestination(entry.title_id.clone()))?;
                    let dir = self.config.ryujinx_save_root().join(folder);
                    // Without ExtraData0 the copied save would never be rediscovered.
                    if !dir.join(RYUJINX_EXTRA_DATA).is_file() {
                        warn!(
                            title_id = %entry.title_id,
                            folder,
                            "mapped Ryujinx save folder is gone; launch the game in Ryujinx first"
                        );
                        return Err(SyncError::MissingDestination(entry.title_id.clone()));
                    }
                    dir.join(RYUJINX_CONTENT_DIR)
                }
            },
        };
        Ok(Destination {
            title_id: entry.title_id.clone(),
            name: entry.name.clone(),
            origin: direction.target(),
            path,
        })
    }

    /// Copy in `direction`, regardless of the entry's state.
    pub fn transfer(&mut self, entry: &PlanEntry, direction: Direction) -> Result<TransferReport> {
        let source = entry
            .unit(direction.source())
            .ok_or_else(|| SyncError::NothingToTransfer(entry.title_id.clone()))?;
        let dest = self.destination(entry, direction)?;
        self.engine.transfer(source, &dest)
    }

    /// Apply the entry's own direction. `None` when there is nothing to do.
    pub fn sync_entry(&mut self, entry: &PlanEntry) -> Result<Option<TransferReport>> {
        match entry.direction() {
            Some(d) => self.transfer(entry, d).map(Some),
            None => Ok(None),
        }
    }

    /// Sync every pending entry in title order. Failures are collected, not fatal.
    pub fn sync_all(&mut self, plan: &SyncPlan) -> SyncAllReport {
        let mut report = SyncAllReport::default();
        for entry in plan.pending() {
            match self.sync_entry(entry) {
                Ok(Some(r)) => report.transferred.push((entry.title_id.clone(), r)),
                Ok(None) => {}
                Err(e) => {
                    error!(title_id = %entry.title_id, error = %e, "sync failed");
                    report.failed.push((entry.title_id.clone(), e));
                }
            }
        }
        info!(
            transferred = report.transferred.len(),
            failed = report.failed.len(),
            "sync all finished"
        );
        report
    }

    pub fn backups(&self, title_id: &TitleId) -> Result<Vec<BackupArchive>> {
        self.vault().list(title_id)
    }

    /// Back up `dest` (when non-empty) and replace it with the archive contents.
    pub fn restore(&self, archive: &Path, dest: &Destination) -> Result<usize> {
        // Read first: the pre-restore backup may prune `archive` itself.
        let data = fs::read(archive).at(archive)?;
        if crate::tree::has_regular_files(&dest.path) {
            self.vault()
                .backup(&dest.title_id, &dest.name, &dest.path)?;
        }
        let n = vault::extract_archive(Cursor::new(data), &dest.path)?;
        info!(archive = %archive.display(), dest = %dest.path.display(), entries = n, "backup restored");
        Ok(n)
    }
}
