//! Plugin hosting configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Plugin discovery and hosting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Explicit LADSPA search path. When unset, `LADSPA_PATH` or the
    /// platform defaults are used.
    #[serde(default)]
    pub ladspa_path: Option<Vec<String>>,
    /// Explicit Vamp search path. When unset, `VAMP_PATH` or the platform
    /// defaults are used.
    #[serde(default)]
    pub vamp_path: Option<Vec<String>>,
    /// Filename glob for LADSPA libraries.
    #[serde(default = "default_library_glob")]
    pub ladspa_glob: String,
    /// Filename glob for Vamp libraries.
    #[serde(default = "default_library_glob")]
    pub vamp_glob: String,
    /// Out-of-process loadability checkers, one per architecture.
    #[serde(default)]
    pub helpers: Vec<HelperConfig>,
    /// Seconds a helper may spend on a single candidate before it is
    /// considered hung.
    #[serde(default = "default_helper_timeout")]
    pub helper_timeout_seconds: u64,
    /// Check candidates inside the host process instead of via helpers.
    #[serde(default)]
    pub run_in_process: bool,
    /// Sample rate used to resolve sample-rate-relative port ranges in
    /// descriptor listings.
    #[serde(default = "default_reference_sample_rate")]
    pub reference_sample_rate: f32,
}

/// One out-of-process plugin checker executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperConfig {
    /// Architecture tag reported with each candidate this helper accepts.
    pub tag: String,
    /// Path to the checker executable.
    pub executable: PathBuf,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            ladspa_path: None,
            vamp_path: None,
            ladspa_glob: default_library_glob(),
            vamp_glob: default_library_glob(),
            helpers: Vec::new(),
            helper_timeout_seconds: default_helper_timeout(),
            run_in_process: false,
            reference_sample_rate: default_reference_sample_rate(),
        }
    }
}

fn default_library_glob() -> String {
    if cfg!(target_os = "windows") {
        "*.dll".to_string()
    } else if cfg!(target_os = "macos") {
        "*.dylib".to_string()
    } else {
        "*.so".to_string()
    }
}

fn default_helper_timeout() -> u64 {
    15
}

fn default_reference_sample_rate() -> f32 {
    48000.0
}
