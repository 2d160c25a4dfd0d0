//! Error type for cache export.

use annot_core::error::{AppError, ErrorKind};
use thiserror::Error;

/// Errors raised by the cache crate.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Writing an export failed.
    #[error("failed to write cache export: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        let kind = match &err {
            CacheError::Io(_) => ErrorKind::Cache,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_failure_is_cache_error() {
        let err: AppError = CacheError::Io(std::io::Error::other("disk full")).into();
        assert_eq!(err.kind, ErrorKind::Cache);
        assert!(err.message.contains("disk full"));
    }
}
