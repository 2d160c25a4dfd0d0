//! Candidate discovery and pre-validation.
//!
//! A scan lists files matching the type's glob in each search directory,
//! then asks the configured probes whether each can be loaded. Candidates
//! that fail a probe are excluded and reported; inconclusive (`Unknown`)
//! results are kept.

pub mod candidates;
pub mod helper;
pub mod paths;
pub mod probe;
pub mod protocol;
pub mod report;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use annot_core::config::plugin::PluginConfig;
use tracing::{debug, info, warn};

pub use self::candidates::{CandidateFile, list_candidates};
pub use self::helper::HelperProcessProbe;
pub use self::paths::{EnvLookup, SearchPaths, system_env};
pub use self::probe::{InProcessProbe, LoadStatus, LoadabilityProbe, ProbeError, ProbeResult, check_library};
pub use self::protocol::{HelperResponse, parse_request, request_line};
pub use self::report::{ScanFailure, ScanReport};

use crate::identifier::PluginType;
use crate::loader::LibraryLoader;

/// Candidates that survived pre-validation for one plugin type.
#[derive(Debug, Clone, Default)]
pub struct CandidateScan {
    /// Candidates to enumerate, tagged by the probe that accepted them.
    pub candidates: Vec<CandidateFile>,
    /// Candidates excluded by a probe.
    pub failures: Vec<ScanFailure>,
    /// Whether at least one probe ran to completion.
    pub probed: bool,
}

/// Lists and pre-validates plugin candidates.
pub struct Scanner {
    paths: SearchPaths,
    probes: Vec<Arc<dyn LoadabilityProbe>>,
}

impl Scanner {
    /// Creates a scanner over explicit probes.
    pub fn new(paths: SearchPaths, probes: Vec<Arc<dyn LoadabilityProbe>>) -> Self {
        let mut tags = HashSet::new();
        let probes = probes
            .into_iter()
            .filter(|p| {
                let fresh = tags.insert(p.tag().to_string());
                if !fresh {
                    warn!(tag = p.tag(), "Duplicate probe tag, skipping");
                }
                fresh
            })
            .collect();
        Self { paths, probes }
    }

    /// Builds the probes named by configuration: one in-process probe when
    /// `run_in_process` is set, otherwise one helper probe per checker.
    pub fn from_config(config: &PluginConfig, loader: Arc<dyn LibraryLoader>, env: EnvLookup) -> Self {
        let probes: Vec<Arc<dyn LoadabilityProbe>> = if config.run_in_process {
            vec![Arc::new(InProcessProbe::new("native", loader))]
        } else {
            helper::resolve_helpers(config)
                .iter()
                .map(|h| {
                    info!(tag = %h.tag, executable = %h.executable.display(), "Using plugin checker");
                    Arc::new(HelperProcessProbe::from_config(h, config.helper_timeout_seconds))
                        as Arc<dyn LoadabilityProbe>
                })
                .collect()
        };

        if probes.is_empty() {
            warn!("No plugin checker available; plugin scans will find nothing");
        }

        Self::new(SearchPaths::new(config.clone(), env), probes)
    }

    /// The search path resolver.
    pub fn search_paths(&self) -> &SearchPaths {
        &self.paths
    }

    /// Whether any probe is configured.
    pub fn has_probes(&self) -> bool {
        !self.probes.is_empty()
    }

    /// Lists and pre-validates candidates for `plugin_type`.
    ///
    /// Vamp candidates are offered to every probe, since Vamp plugins of
    /// other architectures can be hosted out of process. Other types only
    /// go to the first probe, which must match the host architecture.
    pub async fn scan(&self, plugin_type: PluginType) -> CandidateScan {
        let directories = self.paths.directories(plugin_type);
        let files: Vec<PathBuf> = list_candidates(&directories, self.paths.glob(plugin_type))
            .into_iter()
            .map(|c| c.path)
            .collect();

        let probes: &[Arc<dyn LoadabilityProbe>] = match plugin_type {
            PluginType::Vamp => &self.probes,
            PluginType::Ladspa => &self.probes[..self.probes.len().min(1)],
        };

        let mut scan = CandidateScan::default();
        if files.is_empty() || probes.is_empty() {
            scan.probed = !probes.is_empty();
            return scan;
        }

        let symbol = plugin_type.descriptor_symbol();
        let mut accepted: HashMap<PathBuf, String> = HashMap::new();
        let mut rejected: Vec<(String, ProbeResult)> = Vec::new();

        for probe in probes {
            let results = match probe.probe(symbol, &files).await {
                Ok(results) => {
                    scan.probed = true;
                    results
                }
                Err(e) => {
                    warn!(tag = probe.tag(), error = %e, "Plugin checker could not run; treating candidates as unknown");
                    files
                        .iter()
                        .map(|path| ProbeResult {
                            path: path.clone(),
                            status: LoadStatus::Unknown,
                            message: e.to_string(),
                        })
                        .collect()
                }
            };

            let passed = results.iter().filter(|r| r.status.passes()).count();
            info!(tag = probe.tag(), %plugin_type, passed, total = results.len(), "Checker accepted libraries");

            for result in results {
                if result.status.passes() {
                    accepted
                        .entry(result.path)
                        .or_insert_with(|| probe.tag().to_string());
                } else {
                    rejected.push((probe.tag().to_string(), result));
                }
            }
        }

        for path in &files {
            if let Some(tag) = accepted.remove(path) {
                scan.candidates.push(CandidateFile {
                    path: path.clone(),
                    source_tag: tag,
                });
            }
        }

        let accepted_paths: HashSet<&PathBuf> = scan.candidates.iter().map(|c| &c.path).collect();
        for (tag, result) in rejected {
            if accepted_paths.contains(&result.path) {
                debug!(tag, path = %result.path.display(), "Library rejected by one checker but accepted by another");
                continue;
            }
            warn!(tag, path = %result.path.display(), status = %result.status, message = %result.message, "Excluding plugin library");
            scan.failures.push(ScanFailure {
                plugin_type,
                path: result.path,
                tag,
                status: result.status,
                message: result.message,
            });
        }

        scan
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("paths", &self.paths)
            .field("probes", &self.probes.iter().map(|p| p.tag().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;

    use super::*;
    use crate::mock::{MockFixture, MockLoader};

    struct FixedProbe {
        tag: &'static str,
        verdict: fn(&Path) -> LoadStatus,
    }

    #[async_trait]
    impl LoadabilityProbe for FixedProbe {
        fn tag(&self) -> &str {
            self.tag
        }

        async fn probe(&self, _symbol: &str, paths: &[PathBuf]) -> Result<Vec<ProbeResult>, ProbeError> {
            Ok(paths
                .iter()
                .map(|p| ProbeResult {
                    path: p.clone(),
                    status: (self.verdict)(p),
                    message: String::new(),
                })
                .collect())
        }
    }

    struct BrokenProbe;

    #[async_trait]
    impl LoadabilityProbe for BrokenProbe {
        fn tag(&self) -> &str {
            "broken"
        }

        async fn probe(&self, _symbol: &str, _paths: &[PathBuf]) -> Result<Vec<ProbeResult>, ProbeError> {
            Err(ProbeError::Spawn {
                executable: PathBuf::from("/nowhere"),
                reason: "not found".to_string(),
            })
        }
    }

    fn plugin_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in names {
            std::fs::write(dir.path().join(name), b"").expect("write");
        }
        dir
    }

    fn paths_for(dir: &Path) -> SearchPaths {
        let config = PluginConfig {
            ladspa_path: Some(vec![dir.display().to_string()]),
            vamp_path: Some(vec![dir.display().to_string()]),
            ladspa_glob: "*.so".to_string(),
            vamp_glob: "*.so".to_string(),
            ..PluginConfig::default()
        };
        SearchPaths::new(config, Arc::new(|_| None))
    }

    #[tokio::test]
    async fn test_in_process_scan_excludes_bad_libraries() {
        let dir = plugin_dir(&["amp.so", "empty.so", "junk.so"]);
        let loader = Arc::new(MockLoader::new());
        loader.register(dir.path().join("amp.so"), MockFixture::LadspaAmp);
        loader.register(dir.path().join("empty.so"), MockFixture::NoEntryPoint);

        let scanner = Scanner::new(
            paths_for(dir.path()),
            vec![Arc::new(InProcessProbe::new("native", loader))],
        );
        let scan = scanner.scan(PluginType::Ladspa).await;

        assert!(scan.probed);
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.candidates[0].path, dir.path().join("amp.so"));
        assert_eq!(scan.candidates[0].source_tag, "native");
        assert_eq!(scan.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_status_is_included() {
        let dir = plugin_dir(&["maybe.so"]);
        let scanner = Scanner::new(
            paths_for(dir.path()),
            vec![Arc::new(FixedProbe {
                tag: "native",
                verdict: |_| LoadStatus::Unknown,
            })],
        );
        let scan = scanner.scan(PluginType::Vamp).await;
        assert_eq!(scan.candidates.len(), 1);
        assert!(scan.failures.is_empty());
    }

    #[tokio::test]
    async fn test_vamp_queries_every_probe_ladspa_only_first() {
        let dir = plugin_dir(&["a.so", "b.so"]);
        let probes: Vec<Arc<dyn LoadabilityProbe>> = vec![
            Arc::new(FixedProbe {
                tag: "64",
                verdict: |p| {
                    if p.ends_with("a.so") {
                        LoadStatus::Loadable
                    } else {
                        LoadStatus::FailedToLoadLibrary
                    }
                },
            }),
            Arc::new(FixedProbe {
                tag: "32",
                verdict: |_| LoadStatus::Loadable,
            }),
        ];
        let scanner = Scanner::new(paths_for(dir.path()), probes);

        let vamp = scanner.scan(PluginType::Vamp).await;
        let tags: Vec<&str> = vamp.candidates.iter().map(|c| c.source_tag.as_str()).collect();
        assert_eq!(tags, vec!["64", "32"]);
        assert!(vamp.failures.is_empty());

        let ladspa = scanner.scan(PluginType::Ladspa).await;
        assert_eq!(ladspa.candidates.len(), 1);
        assert_eq!(ladspa.failures.len(), 1);
        assert_eq!(ladspa.failures[0].tag, "64");
    }

    #[tokio::test]
    async fn test_probe_that_cannot_start_yields_unknown() {
        let dir = plugin_dir(&["a.so"]);
        let scanner = Scanner::new(paths_for(dir.path()), vec![Arc::new(BrokenProbe)]);
        let scan = scanner.scan(PluginType::Ladspa).await;
        assert!(!scan.probed);
        assert_eq!(scan.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_no_probes_finds_nothing() {
        let dir = plugin_dir(&["a.so"]);
        let scanner = Scanner::new(paths_for(dir.path()), Vec::new());
        assert!(!scanner.has_probes());
        let scan = scanner.scan(PluginType::Vamp).await;
        assert!(!scan.probed);
        assert!(scan.candidates.is_empty());
    }

    #[test]
    fn test_duplicate_probe_tags_dropped() {
        let dir = plugin_dir(&[]);
        let scanner = Scanner::new(
            paths_for(dir.path()),
            vec![
                Arc::new(BrokenProbe) as Arc<dyn LoadabilityProbe>,
                Arc::new(BrokenProbe),
            ],
        );
        assert_eq!(scanner.probes.len(), 1);
    }
}
