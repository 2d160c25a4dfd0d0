//! Shared test helpers for integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use annot_core::config::plugin::PluginConfig;
use annot_plugin::PluginHost;
use annot_plugin::mock::{MockFixture, MockLoader};

/// Plugin directories on disk backed by an in-process mock loader
pub struct TestPlugins {
    pub ladspa_dir: tempfile::TempDir,
    pub vamp_dir: tempfile::TempDir,
    pub loader: Arc<MockLoader>,
}

impl TestPlugins {
    pub fn new() -> Self {
        Self {
            ladspa_dir: tempfile::tempdir().expect("Failed to create LADSPA dir"),
            vamp_dir: tempfile::tempdir().expect("Failed to create Vamp dir"),
            loader: Arc::new(MockLoader::new()),
        }
    }

    /// Places an empty file named `name` in `dir` and binds it to `fixture`
    pub fn install(&self, dir: &Path, name: &str, fixture: MockFixture) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"").expect("Failed to write library file");
        self.loader.register(&path, fixture);
        path
    }

    /// Configuration pointing only at the temporary directories
    pub fn config(&self, run_in_process: bool) -> PluginConfig {
        PluginConfig {
            ladspa_path: Some(vec![self.ladspa_dir.path().display().to_string()]),
            vamp_path: Some(vec![self.vamp_dir.path().display().to_string()]),
            ladspa_glob: "*.so".to_string(),
            vamp_glob: "*.so".to_string(),
            run_in_process,
            ..PluginConfig::default()
        }
    }

    /// A host probing in-process through the mock loader
    pub fn host(&self) -> PluginHost {
        PluginHost::new(&self.config(true), self.loader.clone(), Arc::new(|_| None))
    }

    /// The standard set: amplifiers, a duplicate-label library, an
    /// unloadable file and the onset analysers
    pub fn install_standard_set(&self) {
        self.install(self.ladspa_dir.path(), "amp.so", MockFixture::LadspaAmp);
        self.install(self.ladspa_dir.path(), "delay.so", MockFixture::LadspaDuplicate);
        self.install(self.ladspa_dir.path(), "junk.so", MockFixture::Unloadable);
        self.install(self.vamp_dir.path(), "onsets.so", MockFixture::VampOnsets);
        self.install(self.vamp_dir.path(), "nosym.so", MockFixture::NoEntryPoint);
    }
}
