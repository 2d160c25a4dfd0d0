//! Loadability pre-validation.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use annot_core::error::{AppError, ErrorKind};

use crate::error::PluginError;
use crate::loader::LibraryLoader;

/// Result of checking one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// Opened and exported the descriptor symbol.
    Loadable,
    /// The library could not be opened.
    FailedToLoadLibrary,
    /// The library opened but lacks the descriptor symbol.
    FailedToFindDescriptor,
    /// The check itself failed (crash, hang, unexpected error).
    FailedElsewhere,
    /// The check was inconclusive.
    Unknown,
}

impl LoadStatus {
    /// Whether the candidate proceeds to enumeration. Inconclusive checks
    /// pass so that a flaky probe never hides a working plugin.
    pub fn passes(&self) -> bool {
        matches!(self, Self::Loadable | Self::Unknown)
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loadable => "loadable",
            Self::FailedToLoadLibrary => "library could not be loaded",
            Self::FailedToFindDescriptor => "no plugin descriptor found",
            Self::FailedElsewhere => "checker failed",
            Self::Unknown => "unknown",
        })
    }
}

/// The verdict for one candidate path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub path: PathBuf,
    pub status: LoadStatus,
    /// Diagnostic text; empty on success.
    pub message: String,
}

/// Errors that prevent a probe from running at all.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The helper executable could not be started.
    #[error("failed to start checker '{executable}': {reason}")]
    Spawn {
        executable: PathBuf,
        reason: String,
    },
    /// The check was cut short before producing results.
    #[error("loadability check aborted: {reason}")]
    Aborted { reason: String },
}

impl From<ProbeError> for AppError {
    fn from(err: ProbeError) -> Self {
        let kind = match &err {
            ProbeError::Spawn { .. } => ErrorKind::ExternalService,
            ProbeError::Aborted { .. } => ErrorKind::Internal,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}

/// Checks candidates for loadability before enumeration.
#[async_trait]
pub trait LoadabilityProbe: Send + Sync {
    /// Tag identifying this probe (its architecture).
    fn tag(&self) -> &str;

    /// Checks each of `paths` for `symbol`, returning one result per path in
    /// input order.
    async fn probe(&self, symbol: &str, paths: &[PathBuf]) -> Result<Vec<ProbeResult>, ProbeError>;
}

/// Probe that opens candidates inside the host process.
///
/// Cheap, but a library that crashes on load takes the host down with it.
#[derive(Debug, Clone)]
pub struct InProcessProbe {
    tag: String,
    loader: Arc<dyn LibraryLoader>,
}

impl InProcessProbe {
    /// Creates a probe using `loader`.
    pub fn new(tag: impl Into<String>, loader: Arc<dyn LibraryLoader>) -> Self {
        Self {
            tag: tag.into(),
            loader,
        }
    }
}

/// Opens `path` with `loader` and looks up `symbol`, closing it afterwards.
pub fn check_library(loader: &dyn LibraryLoader, symbol: &str, path: &std::path::Path) -> ProbeResult {
    let verdict = |status, message: String| ProbeResult {
        path: path.to_path_buf(),
        status,
        message,
    };

    let library = match loader.open(path) {
        Ok(library) => library,
        Err(e) => return verdict(LoadStatus::FailedToLoadLibrary, reason_of(e)),
    };

    let found = library.symbol(symbol);
    let closed = library.close();

    match (found, closed) {
        (Err(e), _) => verdict(LoadStatus::FailedToFindDescriptor, reason_of(e)),
        (Ok(_), Err(e)) => verdict(LoadStatus::FailedElsewhere, reason_of(e)),
        (Ok(_), Ok(())) => verdict(LoadStatus::Loadable, String::new()),
    }
}

fn reason_of(err: PluginError) -> String {
    match err {
        PluginError::LoadFailure { reason, .. } | PluginError::UnloadFailure { reason, .. } => reason,
        other => other.to_string(),
    }
}

#[async_trait]
impl LoadabilityProbe for InProcessProbe {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn probe(&self, symbol: &str, paths: &[PathBuf]) -> Result<Vec<ProbeResult>, ProbeError> {
        let loader = Arc::clone(&self.loader);
        let symbol = symbol.to_string();
        let paths = paths.to_vec();
        let results: Vec<ProbeResult> = tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .map(|path| check_library(loader.as_ref(), &symbol, path))
                .collect()
        })
        .await
        .map_err(|e| ProbeError::Aborted { reason: e.to_string() })?;
        debug!(
            tag = %self.tag,
            checked = results.len(),
            passed = results.iter().filter(|r| r.status.passes()).count(),
            "In-process probe finished"
        );
        Ok(results)
    }
}
