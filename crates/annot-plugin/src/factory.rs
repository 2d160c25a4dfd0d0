//! Plugin instantiation and library lifetime.
//!
//! One [`PluginFactory`] exists per plugin type. It caches open libraries by
//! resolved path and counts the live instances created from each; when the
//! last instance of a library is released the library is closed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use annot_core::types::InstanceId;
use tracing::{debug, info, warn};

use crate::error::PluginError;
use crate::identifier::{PluginIdentifier, PluginType};
use crate::instance::{PluginInstance, SharedLibrary};
use crate::loader::LibraryLoader;
use crate::table::DescriptorTable;

struct LoadedLibrary {
    library: SharedLibrary,
    /// Instances created from this library and not yet released, plus
    /// instantiations in progress.
    live: usize,
}

#[derive(Default)]
struct FactoryState {
    libraries: HashMap<PathBuf, LoadedLibrary>,
    instances: HashMap<InstanceId, PathBuf>,
}

/// What happened to a library when one of its instances was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    LibraryUnloaded,
    LibraryStillInUse,
}

/// Creates instances of one plugin type.
pub struct PluginFactory {
    plugin_type: PluginType,
    loader: Arc<dyn LibraryLoader>,
    search_path: Vec<PathBuf>,
    state: Arc<Mutex<FactoryState>>,
}

impl PluginFactory {
    /// Creates a factory resolving bare library names against `search_path`.
    pub fn new(plugin_type: PluginType, loader: Arc<dyn LibraryLoader>, search_path: Vec<PathBuf>) -> Self {
        Self {
            plugin_type,
            loader,
            search_path,
            state: Arc::new(Mutex::new(FactoryState::default())),
        }
    }

    /// The plugin type this factory handles.
    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    /// Directories searched when an identifier's library is not found as given.
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Instantiates the plugin named by `identifier` at `sample_rate`.
    ///
    /// The returned instance keeps its library open. Releasing or dropping
    /// it closes the library once no other instance needs it.
    pub fn instantiate(&self, identifier: &PluginIdentifier, sample_rate: f32) -> Result<PluginInstance, PluginError> {
        if identifier.plugin_type() != self.plugin_type {
            return Err(PluginError::IdentifierTypeMismatch {
                expected: self.plugin_type,
                found: identifier.plugin_type(),
            });
        }

        let path = self.resolve_library_path(identifier.library())?;
        let library = self.acquire(&path)?;

        let created = DescriptorTable::resolve(&**library, self.plugin_type).and_then(|table| {
            // SAFETY: `library` is open and is moved into the instance, which
            // keeps it open for as long as the descriptor is used.
            unsafe {
                let descriptor = table.find(&path, identifier.label())?;
                PluginInstance::create(identifier.clone(), descriptor, sample_rate, Arc::clone(&library))
            }
        });
        drop(library);

        let mut instance = match created {
            Ok(instance) => instance,
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Plugin instantiation failed");
                release_library(&self.state, &path);
                return Err(e);
            }
        };

        lock(&self.state).instances.insert(instance.id(), path.clone());

        let state = Arc::downgrade(&self.state);
        instance.set_release_observer(Box::new(move |id| on_instance_released(&state, id)));

        info!(
            instance = %instance.id(),
            identifier = %identifier,
            library = %path.display(),
            sample_rate,
            "Plugin instantiated"
        );
        Ok(instance)
    }

    /// Finds the file for an identifier's library.
    ///
    /// A path naming an existing file is used as is. Otherwise the file's
    /// own directory and then the search path are tried, first for the exact
    /// file name and then for any file with the same stem.
    pub fn resolve_library_path(&self, library: &str) -> Result<PathBuf, PluginError> {
        let stored = Path::new(library);
        if stored.is_file() {
            return Ok(stored.to_path_buf());
        }

        let not_found = || PluginError::LoadFailure {
            path: stored.to_path_buf(),
            reason: "library not found in search path".to_string(),
        };

        let file_name = stored.file_name().ok_or_else(not_found)?;
        let stem = stored.file_stem().ok_or_else(not_found)?;

        let mut directories: Vec<&Path> = Vec::with_capacity(self.search_path.len() + 1);
        if let Some(parent) = stored.parent().filter(|p| p.is_dir()) {
            directories.push(parent);
        }
        directories.extend(self.search_path.iter().map(PathBuf::as_path));

        for dir in &directories {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                debug!(library, resolved = %candidate.display(), "Resolved library by file name");
                return Ok(candidate);
            }
        }

        for dir in &directories {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            let mut matches: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.file_stem() == Some(stem))
                .collect();
            matches.sort();
            if let Some(candidate) = matches.into_iter().next() {
                debug!(library, resolved = %candidate.display(), "Resolved library by stem");
                return Ok(candidate);
            }
        }

        Err(not_found())
    }

    /// Instances created here and not yet released.
    pub fn live_instances(&self) -> usize {
        lock(&self.state).instances.len()
    }

    /// Libraries currently held open.
    pub fn loaded_libraries(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = lock(&self.state).libraries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Closes every cached library with no live instances, returning how
    /// many were closed.
    pub fn unload_unused_libraries(&self) -> usize {
        let unused: Vec<(PathBuf, SharedLibrary)> = {
            let mut state = lock(&self.state);
            let paths: Vec<PathBuf> = state
                .libraries
                .iter()
                .filter(|(_, l)| l.live == 0)
                .map(|(p, _)| p.clone())
                .collect();
            paths
                .into_iter()
                .filter_map(|p| state.libraries.remove(&p).map(|l| (p, l.library)))
                .collect()
        };

        let count = unused.len();
        for (path, library) in unused {
            close_library(&path, library);
        }
        count
    }

    /// Returns the cached library for `path`, opening it if needed, and
    /// reserves it for one instantiation.
    fn acquire(&self, path: &Path) -> Result<SharedLibrary, PluginError> {
        let mut state = lock(&self.state);
        if let Some(loaded) = state.libraries.get_mut(path) {
            loaded.live += 1;
            debug!(library = %path.display(), live = loaded.live, "Reusing open library");
            return Ok(Arc::clone(&loaded.library));
        }

        let library: SharedLibrary = Arc::new(self.loader.open(path)?);
        state.libraries.insert(
            path.to_path_buf(),
            LoadedLibrary {
                library: Arc::clone(&library),
                live: 1,
            },
        );
        debug!(library = %path.display(), "Opened library");
        Ok(library)
    }
}

impl std::fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFactory")
            .field("plugin_type", &self.plugin_type)
            .field("search_path", &self.search_path)
            .finish()
    }
}

impl Drop for PluginFactory {
    fn drop(&mut self) {
        let closed = self.unload_unused_libraries();
        if closed > 0 {
            debug!(plugin_type = %self.plugin_type, closed, "Factory closed unused libraries");
        }
    }
}

fn lock(state: &Mutex<FactoryState>) -> std::sync::MutexGuard<'_, FactoryState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn on_instance_released(state: &Weak<Mutex<FactoryState>>, id: InstanceId) {
    let Some(state) = state.upgrade() else {
        debug!(instance = %id, "Factory gone before instance release");
        return;
    };

    let path = lock(&state).instances.remove(&id);
    match path {
        Some(path) => {
            let outcome = release_library(&state, &path);
            debug!(instance = %id, library = %path.display(), ?outcome, "Instance released");
        }
        None => warn!(instance = %id, "Released instance was not tracked"),
    }
}

/// Drops one reservation on `path`, closing the library when none remain.
fn release_library(state: &Mutex<FactoryState>, path: &Path) -> ReleaseOutcome {
    let unloaded = {
        let mut state = lock(state);
        let Some(loaded) = state.libraries.get_mut(path) else {
            return ReleaseOutcome::LibraryUnloaded;
        };
        loaded.live = loaded.live.saturating_sub(1);
        if loaded.live > 0 {
            None
        } else {
            state.libraries.remove(path).map(|l| l.library)
        }
    };

    match unloaded {
        Some(library) => {
            close_library(path, library);
            ReleaseOutcome::LibraryUnloaded
        }
        None => ReleaseOutcome::LibraryStillInUse,
    }
}

fn close_library(path: &Path, library: SharedLibrary) {
    match Arc::try_unwrap(library) {
        Ok(library) => match library.close() {
            Ok(()) => info!(library = %path.display(), "Library unloaded"),
            Err(e) => warn!(library = %path.display(), error = %e, "Library failed to unload"),
        },
        Err(_) => warn!(library = %path.display(), "Library still referenced at unload, deferring to drop"),
    }
}
