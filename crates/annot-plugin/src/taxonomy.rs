//! Plugin categories.
//!
//! Categories come from an optional [`SemanticIndex`] first and from flat
//! `.cat` files shipped alongside plugin libraries second. Each `.cat` line
//! reads `identifier::category`, e.g.
//!
//! ```text
//! vamp:qm-vamp-plugins:qm-onsetdetector::Time > Onsets
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::descriptor::{PluginDescriptorRecord, UniqueId};
use crate::identifier::{PluginIdentifier, PluginType};
use crate::scan::list_candidates;

/// Category given to LADSPA wrappers of VST plugins that nothing else names.
pub const VST_CATEGORY: &str = "VST effects";

const CATEGORY_FILE_GLOB: &str = "*.cat";

/// External source of plugin metadata.
pub trait SemanticIndex: Send + Sync {
    /// Category for a LADSPA plugin by its numeric unique ID.
    fn category_for_unique_id(&self, unique_id: u64) -> Option<String>;

    /// Category for any plugin by identifier.
    fn category_for_identifier(&self, _identifier: &PluginIdentifier) -> Option<String> {
        None
    }

    /// Preferred default for one LADSPA port.
    fn port_default(&self, _unique_id: u64, _port: usize) -> Option<f32> {
        None
    }
}

/// Resolves identifiers to category paths like `"Effects > Delay"`.
#[derive(Default)]
pub struct TaxonomyResolver {
    index: Option<Arc<dyn SemanticIndex>>,
    fallback: HashMap<String, String>,
}

impl TaxonomyResolver {
    /// A resolver with no sources; every lookup yields `""`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consults `index` before the fallback tables.
    pub fn with_index(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Number of fallback entries loaded.
    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }

    /// Reads every `.cat` file in `directories` and in their `/share/`
    /// siblings. Entries from later files replace earlier ones. Returns the
    /// number of entries read.
    pub fn load_category_files(&mut self, plugin_type: PluginType, directories: &[PathBuf]) -> usize {
        let mut read = 0;
        for file in list_candidates(&category_directories(directories), CATEGORY_FILE_GLOB) {
            match fs::read_to_string(&file.path) {
                Ok(text) => read += self.load_category_text(plugin_type, &text),
                Err(e) => warn!(path = %file.path.display(), error = %e, "Failed to read category file"),
            }
        }
        info!(%plugin_type, entries = read, "Loaded plugin category files");
        read
    }

    /// Parses the contents of one `.cat` file.
    pub fn load_category_text(&mut self, plugin_type: PluginType, text: &str) -> usize {
        let mut read = 0;
        for line in text.lines() {
            let line = line.trim();
            let Some((key, category)) = line.split_once("::") else {
                continue;
            };
            let category = category.trim();
            if key.is_empty() || category.is_empty() {
                continue;
            }

            let key = match plugin_type {
                PluginType::Vamp => PluginIdentifier::parse(key)
                    .map(|id| id.canonical().to_string())
                    .unwrap_or_else(|_| key.to_string()),
                PluginType::Ladspa => key.to_string(),
            };
            self.fallback.insert(key, category.to_string());
            read += 1;
        }
        read
    }

    /// The category for `record`, or `""` when no source names one.
    pub fn category_for(&self, record: &PluginDescriptorRecord) -> String {
        self.from_index(record)
            .or_else(|| self.from_fallback(&record.identifier))
            .or_else(|| {
                (record.plugin_type() == PluginType::Ladspa && record.name.ends_with(" VST"))
                    .then(|| VST_CATEGORY.to_string())
            })
            .unwrap_or_default()
    }

    /// Fills in `record`'s category and any port default overrides.
    pub fn apply(&self, record: &mut PluginDescriptorRecord) {
        record.category = self.category_for(record);

        let (Some(index), UniqueId::Numeric(unique_id)) = (&self.index, &record.unique_id) else {
            return;
        };
        if record.plugin_type() != PluginType::Ladspa {
            return;
        }
        for port in record.ports.iter_mut().filter(|p| p.is_parameter()) {
            if let Some(value) = index.port_default(*unique_id, port.index) {
                debug!(identifier = %record.identifier, port = port.index, value, "Port default from semantic index");
                port.default_override = Some(value);
            }
        }
    }

    fn from_index(&self, record: &PluginDescriptorRecord) -> Option<String> {
        let index = self.index.as_ref()?;
        let by_id = match (record.plugin_type(), &record.unique_id) {
            (PluginType::Ladspa, UniqueId::Numeric(id)) => index.category_for_unique_id(*id),
            _ => None,
        };
        by_id
            .or_else(|| index.category_for_identifier(&record.identifier))
            .filter(|c| !c.is_empty())
    }

    fn from_fallback(&self, identifier: &PluginIdentifier) -> Option<String> {
        let canonical = identifier.canonical().to_string();
        match identifier.plugin_type() {
            PluginType::Ladspa => self
                .fallback
                .get(&identifier.to_string())
                .or_else(|| self.fallback.get(&canonical)),
            PluginType::Vamp => self.fallback.get(&canonical),
        }
        .cloned()
    }
}

impl std::fmt::Debug for TaxonomyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxonomyResolver")
            .field("index", &self.index.is_some())
            .field("fallback", &self.fallback.len())
            .finish()
    }
}

/// Search directories plus, for any under a `/lib/` tree, the matching
/// `/share/` directory.
fn category_directories(directories: &[PathBuf]) -> Vec<PathBuf> {
    let mut all = Vec::with_capacity(directories.len() * 2);
    for dir in directories {
        all.push(dir.clone());
        if let Some(shared) = share_sibling(dir) {
            all.push(shared);
        }
    }
    all
}

fn share_sibling(dir: &Path) -> Option<PathBuf> {
    let text = dir.to_str()?;
    text.contains("/lib/")
        .then(|| PathBuf::from(text.replacen("/lib/", "/share/", 1)))
}
