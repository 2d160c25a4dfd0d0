//! Listing candidate library files in search directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::Serialize;
use tracing::{debug, warn};

/// A file that may be a plugin library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CandidateFile {
    /// Path to the file.
    pub path: PathBuf,
    /// Tag of the probe that accepted it; empty until probed.
    pub source_tag: String,
}

impl CandidateFile {
    /// An unprobed candidate.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source_tag: String::new(),
        }
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Lists files in `directories` whose names match `pattern`.
///
/// Files are sorted by name within each directory and directories are
/// visited in order. A file reached twice (repeated directory, symlinked
/// path) is listed once. Unreadable directories are skipped.
pub fn list_candidates(directories: &[PathBuf], pattern: &str) -> Vec<CandidateFile> {
    let pattern = match Pattern::new(pattern) {
        Ok(p) => p,
        Err(e) => {
            warn!(pattern, error = %e, "Invalid plugin filename pattern");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for dir in directories {
        for path in matching_files(dir, &pattern) {
            let key = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if seen.insert(key) {
                candidates.push(CandidateFile::new(path));
            }
        }
    }

    debug!(count = candidates.len(), "Listed plugin candidates");
    candidates
}

fn matching_files(dir: &Path, pattern: &Pattern) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Skipping unreadable plugin directory");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| pattern.matches_with(name, MATCH_OPTIONS))
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();

    files.sort();
    files
}
