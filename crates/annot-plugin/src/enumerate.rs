//! Descriptor enumeration over pre-validated candidates.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::descriptor::PluginDescriptorRecord;
use crate::error::PluginError;
use crate::identifier::{PluginIdentifier, PluginType};
use crate::loader::LibraryLoader;
use crate::scan::{CandidateFile, LoadStatus, ScanFailure};
use crate::table::DescriptorTable;

/// Everything found while enumerating one plugin type.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Identifiers in discovery order.
    pub identifiers: Vec<PluginIdentifier>,
    pub records: Vec<PluginDescriptorRecord>,
    /// Candidates whose contributions were skipped.
    pub failures: Vec<ScanFailure>,
}

/// Opens each candidate, reads its descriptor table and closes it again.
///
/// Failures are per candidate: the candidate is skipped, a failure is
/// recorded and enumeration moves on. A library that returns the same label
/// twice contributes nothing.
pub fn enumerate(loader: &dyn LibraryLoader, plugin_type: PluginType, candidates: &[CandidateFile]) -> Enumeration {
    let mut found = Enumeration::default();

    for candidate in candidates {
        match enumerate_library(loader, plugin_type, &candidate.path) {
            Ok(records) => {
                debug!(path = %candidate.path.display(), tag = %candidate.source_tag, plugins = records.len(), "Enumerated library");
                for record in records {
                    found.identifiers.push(record.identifier.clone());
                    found.records.push(record);
                }
            }
            Err(e) => {
                warn!(path = %candidate.path.display(), error = %e, "Skipping plugin library");
                found.failures.push(ScanFailure {
                    plugin_type,
                    path: candidate.path.clone(),
                    tag: candidate.source_tag.clone(),
                    status: status_for(&e),
                    message: e.to_string(),
                });
            }
        }
    }

    info!(%plugin_type, plugins = found.identifiers.len(), skipped = found.failures.len(), "Enumeration finished");
    found
}

fn status_for(err: &PluginError) -> LoadStatus {
    match err {
        PluginError::LoadFailure { .. } => LoadStatus::FailedToLoadLibrary,
        PluginError::SymbolMissing { .. } => LoadStatus::FailedToFindDescriptor,
        _ => LoadStatus::FailedElsewhere,
    }
}

fn enumerate_library(
    loader: &dyn LibraryLoader,
    plugin_type: PluginType,
    path: &Path,
) -> Result<Vec<PluginDescriptorRecord>, PluginError> {
    let library = loader.open(path)?;
    let result = read_table(library.as_ref(), plugin_type, path);
    if let Err(e) = library.close() {
        warn!(path = %path.display(), error = %e, "Failed to close library after enumeration");
    }
    result
}

fn read_table(
    library: &dyn crate::loader::Library,
    plugin_type: PluginType,
    path: &Path,
) -> Result<Vec<PluginDescriptorRecord>, PluginError> {
    let table = DescriptorTable::resolve(library, plugin_type)?;
    let library_name = path.to_string_lossy();

    // SAFETY: `library` stays open until the caller closes it, after every
    // descriptor below has been copied into an owned record.
    let descriptors = unsafe { table.entries(path) };

    let mut seen: HashMap<String, u32> = HashMap::new();
    let mut records = Vec::with_capacity(descriptors.len());
    for (index, descriptor) in descriptors.iter().enumerate() {
        let index = index as u32;
        let label = unsafe { descriptor.label() };
        if let Some(&first) = seen.get(&label) {
            return Err(PluginError::DuplicateDescriptor {
                path: path.to_path_buf(),
                label,
                first,
                second: index,
            });
        }
        seen.insert(label, index);
        records.push(unsafe { descriptor.to_record(&library_name) }?);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::mock::{MockFixture, MockLoader};

    fn candidate(path: &str) -> CandidateFile {
        CandidateFile {
            path: PathBuf::from(path),
            source_tag: "native".to_string(),
        }
    }

    #[test]
    fn test_enumerates_all_descriptors() {
        let loader = MockLoader::new();
        loader.register("/l/amp.so", MockFixture::LadspaAmp);

        let found = enumerate(&loader, PluginType::Ladspa, &[candidate("/l/amp.so")]);

        let ids: Vec<String> = found.identifiers.iter().map(|i| i.to_string()).collect();
        assert_eq!(ids, vec!["ladspa:/l/amp.so:amp_mono", "ladspa:/l/amp.so:amp_stereo"]);
        assert_eq!(found.records.len(), 2);
        assert!(found.failures.is_empty());
        assert_eq!(loader.open_handles("/l/amp.so"), 0);
    }

    #[test]
    fn test_duplicate_label_discards_library() {
        let loader = MockLoader::new();
        loader.register("/l/amp.so", MockFixture::LadspaAmp);
        loader.register("/l/delay.so", MockFixture::LadspaDuplicate);

        let found = enumerate(
            &loader,
            PluginType::Ladspa,
            &[candidate("/l/delay.so"), candidate("/l/amp.so")],
        );

        assert_eq!(found.identifiers.len(), 2);
        assert!(found.identifiers.iter().all(|i| i.library() == "/l/amp.so"));
        assert_eq!(found.failures.len(), 1);
        assert_eq!(found.failures[0].path, PathBuf::from("/l/delay.so"));
        assert!(found.failures[0].message.contains("'delay'"));
        assert_eq!(loader.open_handles("/l/delay.so"), 0);
    }

    #[test]
    fn test_vamp_duplicate_discards_library() {
        let loader = MockLoader::new();
        loader.register("/v/dup.so", MockFixture::VampDuplicate);
        let found = enumerate(&loader, PluginType::Vamp, &[candidate("/v/dup.so")]);
        assert!(found.identifiers.is_empty());
        assert_eq!(found.failures.len(), 1);
    }

    #[test]
    fn test_bad_candidates_are_skipped() {
        let loader = MockLoader::new();
        loader.register("/v/onsets.so", MockFixture::VampOnsets);
        loader.register("/v/empty.so", MockFixture::NoEntryPoint);

        let found = enumerate(
            &loader,
            PluginType::Vamp,
            &[candidate("/v/missing.so"), candidate("/v/empty.so"), candidate("/v/onsets.so")],
        );

        let labels: Vec<&str> = found.identifiers.iter().map(|i| i.label()).collect();
        assert_eq!(labels, vec!["onsetdetector", "tempo", "broken"]);
        let statuses: Vec<LoadStatus> = found.failures.iter().map(|f| f.status).collect();
        assert_eq!(
            statuses,
            vec![LoadStatus::FailedToLoadLibrary, LoadStatus::FailedToFindDescriptor]
        );
        assert_eq!(loader.open_handles("/v/empty.so"), 0);
        assert_eq!(loader.open_handles("/v/onsets.so"), 0);
    }
}
