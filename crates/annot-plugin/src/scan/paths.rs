//! Plugin search paths.
//!
//! Precedence: explicit configuration, then `LADSPA_PATH` / `VAMP_PATH`,
//! then the platform defaults. `$HOME` in defaults comes from the same
//! environment lookup, so tests can inject both.

use std::path::PathBuf;
use std::sync::Arc;

use annot_core::config::plugin::PluginConfig;

use crate::identifier::PluginType;

/// Environment variable lookup.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup backed by the process environment.
pub fn system_env() -> EnvLookup {
    Arc::new(|name| std::env::var(name).ok())
}

/// Separator between entries of a path variable.
pub const PATH_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Resolves search paths per plugin type.
#[derive(Clone)]
pub struct SearchPaths {
    config: PluginConfig,
    env: EnvLookup,
}

impl SearchPaths {
    /// Creates a resolver over `config` and the given environment.
    pub fn new(config: PluginConfig, env: EnvLookup) -> Self {
        Self { config, env }
    }

    /// Ordered directories to search for `plugin_type`. Duplicates are kept;
    /// candidate listing removes repeated files.
    pub fn directories(&self, plugin_type: PluginType) -> Vec<PathBuf> {
        let configured = match plugin_type {
            PluginType::Ladspa => self.config.ladspa_path.as_ref(),
            PluginType::Vamp => self.config.vamp_path.as_ref(),
        };

        if let Some(entries) = configured {
            return entries
                .iter()
                .filter(|e| !e.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        let variable = match plugin_type {
            PluginType::Ladspa => "LADSPA_PATH",
            PluginType::Vamp => "VAMP_PATH",
        };

        let raw = (self.env)(variable).unwrap_or_else(|| self.defaults(plugin_type));
        split_path(&raw)
    }

    /// Filename glob for `plugin_type`.
    pub fn glob(&self, plugin_type: PluginType) -> &str {
        match plugin_type {
            PluginType::Ladspa => &self.config.ladspa_glob,
            PluginType::Vamp => &self.config.vamp_glob,
        }
    }

    fn defaults(&self, plugin_type: PluginType) -> String {
        let home = (self.env)("HOME").or_else(|| (self.env)("USERPROFILE"));
        let program_files = (self.env)("ProgramFiles").unwrap_or_else(|| "C:\\Program Files".to_string());

        let under_home = |suffix: &str| home.as_ref().map(|home| format!("{home}/{suffix}"));
        let mut entries: Vec<String> = Vec::new();

        match plugin_type {
            PluginType::Ladspa if cfg!(windows) => {
                entries.push(format!("{program_files}\\LADSPA Plugins"));
                entries.push(format!("{program_files}\\Audacity\\Plug-Ins"));
            }
            PluginType::Ladspa if cfg!(target_os = "macos") => {
                entries.extend(under_home("Library/Audio/Plug-Ins/LADSPA"));
                entries.extend(under_home(".ladspa"));
                entries.push("/Library/Audio/Plug-Ins/LADSPA".to_string());
            }
            PluginType::Ladspa => {
                entries.extend(under_home(".ladspa"));
                entries.push("/usr/local/lib/ladspa".to_string());
                entries.push("/usr/lib/ladspa".to_string());
            }
            PluginType::Vamp if cfg!(windows) => {
                entries.push(format!("{program_files}\\Vamp Plugins"));
            }
            PluginType::Vamp if cfg!(target_os = "macos") => {
                entries.extend(under_home("Library/Audio/Plug-Ins/Vamp"));
                entries.push("/Library/Audio/Plug-Ins/Vamp".to_string());
            }
            PluginType::Vamp => {
                entries.extend(under_home("vamp"));
                entries.extend(under_home(".vamp"));
                entries.push("/usr/local/lib/vamp".to_string());
                entries.push("/usr/lib/vamp".to_string());
            }
        }

        entries.join(&PATH_SEPARATOR.to_string())
    }
}

impl std::fmt::Debug for SearchPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchPaths")
            .field("ladspa", &self.directories(PluginType::Ladspa))
            .field("vamp", &self.directories(PluginType::Vamp))
            .finish()
    }
}

/// Splits a path variable, dropping empty entries.
pub fn split_path(raw: &str) -> Vec<PathBuf> {
    raw.split(PATH_SEPARATOR)
        .filter(|e| !e.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> EnvLookup {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |name| vars.get(name).cloned())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_defaults_use_home() {
        let paths = SearchPaths::new(PluginConfig::default(), env(&[("HOME", "/home/ann")]));
        assert_eq!(
            paths.directories(PluginType::Vamp),
            vec![
                PathBuf::from("/home/ann/vamp"),
                PathBuf::from("/home/ann/.vamp"),
                PathBuf::from("/usr/local/lib/vamp"),
                PathBuf::from("/usr/lib/vamp"),
            ]
        );
        assert_eq!(
            paths.directories(PluginType::Ladspa),
            vec![
                PathBuf::from("/home/ann/.ladspa"),
                PathBuf::from("/usr/local/lib/ladspa"),
                PathBuf::from("/usr/lib/ladspa"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_environment_variable_overrides_defaults() {
        let paths = SearchPaths::new(
            PluginConfig::default(),
            env(&[("HOME", "/home/ann"), ("LADSPA_PATH", "/opt/a::/opt/b:/opt/a")]),
        );
        assert_eq!(
            paths.directories(PluginType::Ladspa),
            vec![
                PathBuf::from("/opt/a"),
                PathBuf::from("/opt/b"),
                PathBuf::from("/opt/a"),
            ]
        );
    }

    #[test]
    fn test_configuration_overrides_environment() {
        let config = PluginConfig {
            vamp_path: Some(vec!["/cfg/vamp".to_string(), String::new()]),
            ..PluginConfig::default()
        };
        let paths = SearchPaths::new(config, env(&[("VAMP_PATH", "/env/vamp")]));
        assert_eq!(paths.directories(PluginType::Vamp), vec![PathBuf::from("/cfg/vamp")]);
    }

    #[test]
    fn test_glob_per_type() {
        let config = PluginConfig {
            ladspa_glob: "*.ladspa".to_string(),
            ..PluginConfig::default()
        };
        let paths = SearchPaths::new(config, env(&[]));
        assert_eq!(paths.glob(PluginType::Ladspa), "*.ladspa");
    }
}
