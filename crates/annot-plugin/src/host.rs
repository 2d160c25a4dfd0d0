//! The plugin host: one scanner, one factory per plugin type, and the
//! registry of what each scan found.

use std::collections::HashMap;
use std::sync::Arc;

use annot_core::config::plugin::PluginConfig;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::descriptor::PluginDescriptorRecord;
use crate::enumerate::enumerate;
use crate::error::PluginError;
use crate::factory::PluginFactory;
use crate::identifier::{PluginIdentifier, PluginType};
use crate::instance::PluginInstance;
use crate::loader::{LibraryLoader, NativeLoader};
use crate::scan::{EnvLookup, ScanReport, Scanner, system_env};
use crate::taxonomy::{SemanticIndex, TaxonomyResolver};

/// Scan progress for one plugin type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanState {
    Unscanned,
    Scanning,
    Scanned { count: usize },
    ScanFailed { reason: String },
}

#[derive(Debug)]
struct TypeRegistry {
    state: ScanState,
    identifiers: Vec<PluginIdentifier>,
    records: HashMap<PluginIdentifier, PluginDescriptorRecord>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self {
            state: ScanState::Unscanned,
            identifiers: Vec::new(),
            records: HashMap::new(),
        }
    }
}

/// Owns plugin discovery and instantiation for the application.
pub struct PluginHost {
    loader: Arc<dyn LibraryLoader>,
    scanner: Scanner,
    ladspa: PluginFactory,
    vamp: PluginFactory,
    index: Option<Arc<dyn SemanticIndex>>,
    registries: RwLock<HashMap<PluginType, TypeRegistry>>,
    last_report: RwLock<Option<ScanReport>>,
}

impl PluginHost {
    /// Creates a host using the platform loader and process environment.
    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(config, Arc::new(NativeLoader::new()), system_env())
    }

    /// Creates a host with an explicit loader and environment lookup.
    pub fn new(config: &PluginConfig, loader: Arc<dyn LibraryLoader>, env: EnvLookup) -> Self {
        let scanner = Scanner::from_config(config, Arc::clone(&loader), env);
        Self::with_scanner(scanner, loader)
    }

    /// Creates a host around an already-built scanner.
    pub fn with_scanner(scanner: Scanner, loader: Arc<dyn LibraryLoader>) -> Self {
        let factory = |plugin_type| {
            PluginFactory::new(
                plugin_type,
                Arc::clone(&loader),
                scanner.search_paths().directories(plugin_type),
            )
        };
        let ladspa = factory(PluginType::Ladspa);
        let vamp = factory(PluginType::Vamp);

        Self {
            loader,
            scanner,
            ladspa,
            vamp,
            index: None,
            registries: RwLock::new(HashMap::new()),
            last_report: RwLock::new(None),
        }
    }

    /// Consults `index` for categories and port defaults on later scans.
    pub fn with_semantic_index(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Scans every plugin type and replaces the registry with the result.
    pub async fn scan(&self) -> ScanReport {
        let mut report = ScanReport::begin();
        info!("Scanning for plugins");

        for plugin_type in PluginType::ALL {
            self.set_state(plugin_type, ScanState::Scanning).await;

            let candidates = self.scanner.scan(plugin_type).await;
            report.succeeded |= candidates.probed;
            for failure in candidates.failures {
                report.push_failure(failure);
            }

            if !self.scanner.has_probes() {
                let reason = "no plugin checker available".to_string();
                warn!(%plugin_type, %reason, "Plugin scan failed");
                self.set_state(plugin_type, ScanState::ScanFailed { reason }).await;
                report.found.push((plugin_type, 0));
                continue;
            }

            let loader = Arc::clone(&self.loader);
            let list = candidates.candidates;
            let enumeration =
                match tokio::task::spawn_blocking(move || enumerate(loader.as_ref(), plugin_type, &list)).await {
                    Ok(enumeration) => enumeration,
                    Err(e) => {
                        error!(%plugin_type, error = %e, "Plugin enumeration aborted");
                        self.set_state(plugin_type, ScanState::ScanFailed { reason: e.to_string() })
                            .await;
                        report.found.push((plugin_type, 0));
                        continue;
                    }
                };

            for failure in enumeration.failures {
                report.push_failure(failure);
            }

            let taxonomy = self.taxonomy_for(plugin_type);
            let mut records = HashMap::with_capacity(enumeration.records.len());
            for mut record in enumeration.records {
                taxonomy.apply(&mut record);
                records.insert(record.identifier.clone(), record);
            }

            let count = enumeration.identifiers.len();
            info!(%plugin_type, count, "Plugin scan finished");
            report.found.push((plugin_type, count));

            let mut registries = self.registries.write().await;
            registries.insert(
                plugin_type,
                TypeRegistry {
                    state: ScanState::Scanned { count },
                    identifiers: enumeration.identifiers,
                    records,
                },
            );
        }

        report.finish();
        if let Some(text) = report.failure_report() {
            warn!(failures = report.failures.len(), "{text}");
        }
        *self.last_report.write().await = Some(report.clone());
        report
    }

    /// Scan state for `plugin_type`.
    pub async fn state(&self, plugin_type: PluginType) -> ScanState {
        self.registries
            .read()
            .await
            .get(&plugin_type)
            .map(|r| r.state.clone())
            .unwrap_or(ScanState::Unscanned)
    }

    /// Identifiers found by the last scan, in discovery order.
    pub async fn identifiers(&self, plugin_type: PluginType) -> Vec<PluginIdentifier> {
        self.registries
            .read()
            .await
            .get(&plugin_type)
            .map(|r| r.identifiers.clone())
            .unwrap_or_default()
    }

    /// Descriptor records found by the last scan, in discovery order.
    pub async fn descriptors(&self, plugin_type: PluginType) -> Vec<PluginDescriptorRecord> {
        let registries = self.registries.read().await;
        let Some(registry) = registries.get(&plugin_type) else {
            return Vec::new();
        };
        registry
            .identifiers
            .iter()
            .filter_map(|id| registry.records.get(id).cloned())
            .collect()
    }

    /// The descriptor for `identifier`, if the last scan found it.
    pub async fn descriptor(&self, identifier: &PluginIdentifier) -> Option<PluginDescriptorRecord> {
        self.registries
            .read()
            .await
            .get(&identifier.plugin_type())
            .and_then(|r| r.records.get(identifier).cloned())
    }

    /// Category path for `identifier`; empty when unknown.
    pub async fn category(&self, identifier: &PluginIdentifier) -> String {
        self.descriptor(identifier)
            .await
            .map(|r| r.category)
            .unwrap_or_default()
    }

    /// Instantiates `identifier` through its type's factory.
    pub fn instantiate(&self, identifier: &PluginIdentifier, sample_rate: f32) -> Result<PluginInstance, PluginError> {
        self.factory(identifier.plugin_type()).instantiate(identifier, sample_rate)
    }

    /// The factory for `plugin_type`.
    pub fn factory(&self, plugin_type: PluginType) -> &PluginFactory {
        match plugin_type {
            PluginType::Ladspa => &self.ladspa,
            PluginType::Vamp => &self.vamp,
        }
    }

    /// The scanner.
    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Report from the most recent scan.
    pub async fn last_report(&self) -> Option<ScanReport> {
        self.last_report.read().await.clone()
    }

    /// Human-readable failures from the most recent scan.
    pub async fn failure_report(&self) -> Option<String> {
        self.last_report
            .read()
            .await
            .as_ref()
            .and_then(ScanReport::failure_report)
    }

    async fn set_state(&self, plugin_type: PluginType, state: ScanState) {
        self.registries
            .write()
            .await
            .entry(plugin_type)
            .or_default()
            .state = state;
    }

    fn taxonomy_for(&self, plugin_type: PluginType) -> TaxonomyResolver {
        let mut taxonomy = match &self.index {
            Some(index) => TaxonomyResolver::new().with_index(Arc::clone(index)),
            None => TaxonomyResolver::new(),
        };
        taxonomy.load_category_files(plugin_type, &self.scanner.search_paths().directories(plugin_type));
        taxonomy
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("scanner", &self.scanner)
            .field("ladspa", &self.ladspa)
            .field("vamp", &self.vamp)
            .field("semantic_index", &self.index.is_some())
            .finish()
    }
}
