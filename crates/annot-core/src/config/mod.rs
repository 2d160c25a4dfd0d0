//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! optional TOML files plus `ANNOT__`-prefixed environment variables. Every
//! field has a default, so an empty configuration is valid.

pub mod cache;
pub mod logging;
pub mod plugin;

use serde::{Deserialize, Serialize};

use self::cache::CacheConfig;
use self::logging::LoggingConfig;
use self::plugin::PluginConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Plugin discovery and hosting settings.
    #[serde(default)]
    pub plugins: PluginConfig,
    /// Time-series cache defaults.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration for the given environment name.
    ///
    /// Merges `config/default.toml`, then `config/{env}.toml`, then
    /// environment variables prefixed with `ANNOT` (e.g.
    /// `ANNOT__PLUGINS__RUN_IN_PROCESS=true`). Missing files are skipped.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from("config", env)
    }

    /// Load configuration from an explicit directory.
    pub fn load_from(dir: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(&format!("{dir}/default")).required(false))
            .add_source(config::File::with_name(&format!("{dir}/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("ANNOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config =
            AppConfig::load_from(dir.path().to_str().expect("utf8"), "test").expect("load");
        assert!(config.plugins.ladspa_path.is_none());
        assert!(config.plugins.helpers.is_empty());
        assert_eq!(config.plugins.helper_timeout_seconds, 15);
        assert_eq!(config.cache.default_resolution, 512);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_environment_overlay_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("default.toml"),
            "[plugins]\nrun_in_process = false\nladspa_path = [\"/opt/ladspa\"]\n\n[logging]\nlevel = \"warn\"\n",
        )
        .expect("write default");
        std::fs::write(
            dir.path().join("studio.toml"),
            "[plugins]\nrun_in_process = true\n\n[[plugins.helpers]]\ntag = \"64\"\nexecutable = \"/usr/libexec/checker\"\n",
        )
        .expect("write overlay");

        let config =
            AppConfig::load_from(dir.path().to_str().expect("utf8"), "studio").expect("load");
        assert!(config.plugins.run_in_process);
        assert_eq!(
            config.plugins.ladspa_path,
            Some(vec!["/opt/ladspa".to_string()])
        );
        assert_eq!(config.plugins.helpers.len(), 1);
        assert_eq!(config.plugins.helpers[0].tag, "64");
        assert_eq!(config.logging.level, "warn");
    }
}
