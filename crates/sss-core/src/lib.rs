//! sss-core: keeps Ryujinx and Citron save folders in step.
//!
//! The pieces, leaves first:
//! - `identity`: persisted folder id → title id table
//! - `profile`: which Citron user folder is the active one
//! - `catalog`: title names from a titledb JSON file
//! - `discovery`: walks both save trees into `SaveUnit`s
//! - `planner`: pairs units by title id and classifies each pair
//! - `vault` / `transfer`: zip backup, then full-tree replace
//! - `session`: ties the above together for the front ends
//!
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod model;
pub mod planner;
pub mod profile;
pub mod session;
pub mod transfer;
pub mod tree;
pub mod vault;

pub use catalog::{MetadataLookup, TitleCatalog};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use identity::IdentityMap;
pub use model::{Destination, GameInfo, Origin, SaveUnit, TitleId};
pub use planner::{Direction, PlanEntry, SyncPlan, SyncState, classify};
pub use profile::{ConsolePrompt, Disambiguator, PresetChoice, ProfileResolver};
pub use session::{ScanReport, SyncAllReport, SyncSession};
pub use transfer::{TransferEngine, TransferReport};
pub use vault::{BackupArchive, BackupVault};
