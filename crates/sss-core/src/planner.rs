//! Pairs Ryujinx and Citron saves by title id and classifies each pair.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::identity::IdentityMap;
use crate::model::{Origin, SaveUnit, TitleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncState {
    Match,
    RyujinxNewer,
    /// Also chosen when both mtimes are equal but contents differ.
    CitronNewer,
    OnlyInRyujinx,
    OnlyInCitron,
    /// Only in Citron and no Ryujinx folder is known for the title yet.
    NeedsInitialization,
}

impl SyncState {
    pub const ALL: [SyncState; 6] = [
        SyncState::Match,
        SyncState::RyujinxNewer,
        SyncState::CitronNewer,
        SyncState::OnlyInRyujinx,
        SyncState::OnlyInCitron,
        SyncState::NeedsInitialization,
    ];

    pub fn direction(self) -> Option<Direction> {
        match self {
            SyncState::RyujinxNewer | SyncState::OnlyInRyujinx => Some(Direction::RyujinxToCitron),
            SyncState::CitronNewer | SyncState::OnlyInCitron => Some(Direction::CitronToRyujinx),
            SyncState::Match | SyncState::NeedsInitialization => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SyncState::Match => "Match",
            SyncState::RyujinxNewer => "Ryujinx newer",
            SyncState::CitronNewer => "Citron newer",
            SyncState::OnlyInRyujinx => "Only in Ryujinx",
            SyncState::OnlyInCitron => "Only in Citron",
            SyncState::NeedsInitialization => "Run in Ryujinx first",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    RyujinxToCitron,
    CitronToRyujinx,
}

impl Direction {
    pub fn source(self) -> Origin {
        match self {
            Direction::RyujinxToCitron => Origin::Ryujinx,
            Direction::CitronToRyujinx => Origin::Citron,
        }
    }

    pub fn target(self) -> Origin {
        self.source().other()
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Direction::RyujinxToCitron => "→",
            Direction::CitronToRyujinx => "←",
        }
    }
}

/// Which sides hold a save for one title.
#[derive(Debug, Clone, Copy)]
pub enum Presence<'a> {
    Both {
        ryujinx: &'a SaveUnit,
        citron: &'a SaveUnit,
    },
    OnlyRyujinx(&'a SaveUnit),
    OnlyCitron(&'a SaveUnit),
}

/// `has_ryujinx_folder`: whether the identity map can name a Ryujinx folder
/// for the title. Only consulted when the save exists on Citron alone.
pub fn classify(presence: Presence<'_>, has_ryujinx_folder: bool) -> SyncState {
    match presence {
        Presence::Both { ryujinx, citron } => {
            if ryujinx.fingerprint == citron.fingerprint {
                SyncState::Match
            } else if ryujinx.modified > citron.modified {
                SyncState::RyujinxNewer
            } else {
                SyncState::CitronNewer
            }
        }
        Presence::OnlyRyujinx(_) => SyncState::OnlyInRyujinx,
        Presence::OnlyCitron(_) if has_ryujinx_folder => SyncState::OnlyInCitron,
        Presence::OnlyCitron(_) => SyncState::NeedsInitialization,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub title_id: TitleId,
    pub name: String,
    pub ryujinx: Option<SaveUnit>,
    pub citron: Option<SaveUnit>,
    pub state: SyncState,
}

impl PlanEntry {
    pub fn direction(&self) -> Option<Direction> {
        self.state.direction()
    }

    pub fn unit(&self, origin: Origin) -> Option<&SaveUnit> {
        match origin {
            Origin::Ryujinx => self.ryujinx.as_ref(),
            Origin::Citron => self.citron.as_ref(),
        }
    }

    /// The unit a transfer would copy from, if any.
    pub fn source(&self) -> Option<&SaveUnit> {
        self.direction().and_then(|d| self.unit(d.source()))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncPlan {
    pub entries: Vec<PlanEntry>,
}

impl SyncPlan {
    /// One entry per title present on either side, ordered by title id.
    pub fn build(ryujinx: &[SaveUnit], citron: &[SaveUnit], identity: &IdentityMap) -> Self {
        let mut pairs: BTreeMap<&TitleId, (Option<&SaveUnit>, Option<&SaveUnit>)> = BTreeMap::new();
        for u in ryujinx {
            let slot = &mut pairs.entry(&u.title_id).or_default().0;
            if slot.is_some() {
                warn!(title_id = %u.title_id, folder = %u.folder_id, "duplicate Ryujinx save ignored");
                continue;
            }
            *slot = Some(u);
        }
        for u in citron {
            let slot = &mut pairs.entry(&u.title_id).or_default().1;
            if slot.is_some() {
                warn!(title_id = %u.title_id, "duplicate Citron save ignored");
                continue;
            }
            *slot = Some(u);
        }

        let entries = pairs
            .into_iter()
            .filter_map(|(id, sides)| {
                let presence = match sides {
                    (Some(r), Some(c)) => Presence::Both {
                        ryujinx: r,
                        citron: c,
                    },
                    (Some(r), None) => Presence::OnlyRyujinx(r),
                    (None, Some(c)) => Presence::OnlyCitron(c),
                    (None, None) => return None,
                };
                let state = classify(presence, identity.reverse_lookup(id).is_some());
                let name = sides.0.or(sides.1).map(|u| u.name.clone())?;
                Some(PlanEntry {
                    title_id: id.clone(),
                    name,
                    ryujinx: sides.0.cloned(),
                    citron: sides.1.cloned(),
                    state,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, title_id: &TitleId) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| &e.title_id == title_id)
    }

    /// Entries a bulk sync would transfer.
    pub fn pending(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.direction().is_some())
    }

    pub fn count(&self, state: SyncState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }
}
