//! Dynamic library abstraction.
//!
//! [`LibraryLoader`] opens libraries and [`Library`] resolves symbols and
//! closes them. Nothing is cached at this layer; callers own each handle.
//! The production implementation wraps `libloading`; tests substitute an
//! in-process loader (see `crate::mock`).

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PluginError;

/// An open dynamic library.
pub trait Library: Send + Sync + fmt::Debug {
    /// The path the library was opened from.
    fn path(&self) -> &Path;

    /// Resolves an exported symbol to its address.
    fn symbol(&self, name: &str) -> Result<*const c_void, PluginError>;

    /// Closes the library. Any pointer obtained from it becomes invalid.
    fn close(self: Box<Self>) -> Result<(), PluginError>;
}

/// Opens dynamic libraries.
pub trait LibraryLoader: Send + Sync + fmt::Debug {
    /// Opens the library at `path`, failing cleanly for anything that is not
    /// a loadable library.
    fn open(&self, path: &Path) -> Result<Box<dyn Library>, PluginError>;
}

/// Loader backed by the platform's dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    /// Creates a native loader.
    pub fn new() -> Self {
        Self
    }
}

impl LibraryLoader for NativeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn Library>, PluginError> {
        // SAFETY: opening a library runs its initialisers. Plugin libraries
        // are untrusted; the scanner's helper-process probe exists so that
        // libraries which crash on load are excluded before reaching here.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to open library");
            PluginError::LoadFailure {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        debug!(path = %path.display(), "Opened library");

        Ok(Box::new(NativeLibrary {
            path: path.to_path_buf(),
            library,
        }))
    }
}

struct NativeLibrary {
    path: PathBuf,
    library: libloading::Library,
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish()
    }
}

impl Library for NativeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &str) -> Result<*const c_void, PluginError> {
        let missing = |reason: Option<String>| {
            if let Some(reason) = reason {
                debug!(path = %self.path.display(), symbol = name, error = %reason, "Symbol lookup failed");
            }
            PluginError::SymbolMissing {
                path: self.path.clone(),
                symbol: name.to_string(),
            }
        };

        // SAFETY: the symbol is read as an untyped address; callers cast it
        // to the ABI's function type.
        let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) }
            .map_err(|e| missing(Some(e.to_string())))?;
        let address = *symbol;

        if address.is_null() {
            return Err(missing(None));
        }
        Ok(address)
    }

    fn close(self: Box<Self>) -> Result<(), PluginError> {
        let path = self.path;
        self.library.close().map_err(|e| PluginError::UnloadFailure {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "Closed library");
        Ok(())
    }
}
