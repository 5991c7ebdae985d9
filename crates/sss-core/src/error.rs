//! Error type shared by every sss-core operation.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::TitleId;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid title id: {0:?}")]
    InvalidTitleId(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no valid profile under {}", root.display())]
    NoValidProfile { root: PathBuf },

    #[error("ambiguous profile, no resolver (candidates: {})", candidates.join(", "))]
    AmbiguousProfile { candidates: Vec<String> },

    #[error("no profile selected among: {}", candidates.join(", "))]
    ProfileNotChosen { candidates: Vec<String> },

    #[error("no Ryujinx folder is mapped to {0}; launch the game in Ryujinx first")]
    MissingDestination(TitleId),

    #[error("{0} has nothing to transfer")]
    NothingToTransfer(TitleId),

    #[error("verification failed for {}: expected {expected}, found {actual}", path.display())]
    VerificationFailed {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl SyncError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        SyncError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Attach the offending path to a bare `io::Result`.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| SyncError::io(path, e))
    }
}
