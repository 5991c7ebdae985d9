//! Active Citron profile resolution.
//!
//! Citron keeps one folder per user profile under the save container and
//! nothing on disk says which one is in use. A profile qualifies when at
//! least one of its sub-folders is named after a known title id. One
//! candidate wins outright; several go to the injected [`Disambiguator`].

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{IoContext, Result, SyncError};
use crate::model::TitleId;

/// Picks one profile among several qualifying candidates.
pub trait Disambiguator {
    fn choose(&mut self, candidates: &[String]) -> Option<String>;
}

/// Numbered list on a writer, index read from a reader.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl ConsolePrompt<io::StdinLock<'static>, io::Stderr> {
    /// Menu on stderr so stdout stays clean for machine-readable output.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Disambiguator for ConsolePrompt<R, W> {
    fn choose(&mut self, candidates: &[String]) -> Option<String> {
        let _ = writeln!(self.output, "Multiple Citron user folders detected. Please choose:");
        for (i, c) in candidates.iter().enumerate() {
            let _ = writeln!(self.output, "  [{i}] {c}");
        }
        let _ = write!(self.output, "Enter the number of the correct folder: ");
        let _ = self.output.flush();

        let mut line = String::new();
        if self.input.read_line(&mut line).is_err() {
            return None;
        }
        match line.trim().parse::<usize>() {
            Ok(i) if i < candidates.len() => Some(candidates[i].clone()),
            _ => {
                warn!(input = line.trim(), "invalid profile selection");
                None
            }
        }
    }
}

/// A choice made ahead of time (CLI flag, or a GUI dialog answered earlier).
#[derive(Debug, Clone)]
pub struct PresetChoice(pub String);

impl Disambiguator for PresetChoice {
    fn choose(&mut self, candidates: &[String]) -> Option<String> {
        candidates.iter().find(|c| **c == self.0).cloned()
    }
}

/// Resolves the active profile once and remembers it for the session.
#[derive(Default)]
pub struct ProfileResolver {
    cached: Option<String>,
    disambiguator: Option<Box<dyn Disambiguator>>,
}

impl ProfileResolver {
    pub fn new(disambiguator: Option<Box<dyn Disambiguator>>) -> Self {
        Self {
            cached: None,
            disambiguator,
        }
    }

    pub fn set_disambiguator(&mut self, disambiguator: Box<dyn Disambiguator>) {
        self.disambiguator = Some(disambiguator);
    }

    pub fn cached(&self) -> Option<&str> {
        self.cached.as_deref()
    }

    pub fn clear(&mut self) {
        self.cached = None;
    }

    /// Return the cached profile, or resolve and cache it.
    pub fn resolve(&mut self, container: &Path, known: &BTreeSet<TitleId>) -> Result<String> {
        if let Some(p) = &self.cached {
            return Ok(p.clone());
        }
        let candidates = profile_candidates(container, known)?;
        let chosen = match candidates.len() {
            0 => {
                return Err(SyncError::NoValidProfile {
                    root: container.to_path_buf(),
                });
            }
            1 => candidates[0].clone(),
            _ => {
                let Some(d) = self.disambiguator.as_mut() else {
                    return Err(SyncError::AmbiguousProfile { candidates });
                };
                match d.choose(&candidates) {
                    Some(c) if candidates.contains(&c) => c,
                    _ => return Err(SyncError::ProfileNotChosen { candidates }),
                }
            }
        };
        info!(profile = %chosen, "resolved active Citron profile");
        self.cached = Some(chosen.clone());
        Ok(chosen)
    }
}

/// Profile folders holding at least one sub-folder named after a known title, sorted.
pub fn profile_candidates(container: &Path, known: &BTreeSet<TitleId>) -> Result<Vec<String>> {
    let rd = match fs::read_dir(container) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SyncError::io(container, e)),
    };
    let mut out = Vec::new();
    for entry in rd {
        let entry = entry.at(container)?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if holds_known_title(&path, known) {
            out.push(name);
        }
    }
    out.sort();
    Ok(out)
}

fn holds_known_title(profile_dir: &Path, known: &BTreeSet<TitleId>) -> bool {
    let Ok(rd) = fs::read_dir(profile_dir) else {
        return false;
    };
    rd.flatten().any(|e| {
        e.path().is_dir()
            && e.file_name()
                .to_str()
                .and_then(|n| TitleId::parse(n).ok())
                .is_some_and(|id| known.contains(&id))
    })
}
