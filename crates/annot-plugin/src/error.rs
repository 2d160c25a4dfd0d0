//! Error type for plugin loading, enumeration, and instantiation.

use std::path::PathBuf;

use annot_core::error::{AppError, ErrorKind};
use thiserror::Error;

use crate::identifier::PluginType;

/// Errors raised by the plugin subsystem.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The library could not be opened (missing, not a library, bad arch).
    #[error("failed to load library '{path}': {reason}")]
    LoadFailure {
        /// Library that failed to open.
        path: PathBuf,
        /// Platform loader message.
        reason: String,
    },

    /// The library could not be closed cleanly.
    #[error("failed to unload library '{path}': {reason}")]
    UnloadFailure {
        /// Library that failed to close.
        path: PathBuf,
        /// Platform loader message.
        reason: String,
    },

    /// An expected entry point is not exported.
    #[error("library '{path}' does not export '{symbol}'")]
    SymbolMissing {
        /// Library that was searched.
        path: PathBuf,
        /// Missing symbol name.
        symbol: String,
    },

    /// The label is not present in the library's descriptor table.
    #[error("no plugin labelled '{label}' in library '{path}'")]
    DescriptorNotFound {
        /// Library whose table was searched.
        path: PathBuf,
        /// Requested label.
        label: String,
    },

    /// The library returned the same label at two indices.
    #[error("library '{path}' returns plugin '{label}' at indices {first} and {second}")]
    DuplicateDescriptor {
        /// Offending library.
        path: PathBuf,
        /// Repeated label.
        label: String,
        /// First index the label appeared at.
        first: u32,
        /// Index of the repeat.
        second: u32,
    },

    /// The plugin's own construction call failed.
    #[error("plugin '{label}' failed to instantiate: {reason}")]
    InstantiationFailure {
        /// Plugin label.
        label: String,
        /// What went wrong.
        reason: String,
    },

    /// The call does not apply to this instance's ABI, or the plugin does
    /// not implement it.
    #[error("plugin '{label}' cannot do that: {reason}")]
    UnsupportedOperation {
        /// Plugin label.
        label: String,
        /// What was attempted.
        reason: String,
    },

    /// The identifier belongs to a different factory.
    #[error("identifier of type '{found}' given to the {expected} factory")]
    IdentifierTypeMismatch {
        /// Type the factory handles.
        expected: PluginType,
        /// Type found in the identifier.
        found: PluginType,
    },

    /// The identifier string could not be parsed.
    #[error("invalid plugin identifier: {0}")]
    InvalidIdentifier(String),

    /// The descriptor contains data that violates the ABI.
    #[error("malformed descriptor in '{path}': {reason}")]
    MalformedDescriptor {
        /// Library the descriptor came from.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        let kind = match &err {
            PluginError::InvalidIdentifier(_) | PluginError::IdentifierTypeMismatch { .. } => {
                ErrorKind::Validation
            }
            PluginError::DescriptorNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Plugin,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}
