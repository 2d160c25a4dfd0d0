//! `paths`: effective search directories.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use annot_core::config::AppConfig;
use annot_core::error::AppError;
use annot_plugin::scan::{SearchPaths, system_env};

use super::TypeArg;
use crate::output::{self, OutputFormat};

/// Arguments for the paths command
#[derive(Debug, Args)]
pub struct PathsArgs {
    /// Only show directories for this type
    #[arg(short = 't', long = "type", value_enum)]
    pub plugin_type: Option<TypeArg>,
}

/// Directory display row
#[derive(Debug, Serialize, Tabled)]
struct PathRow {
    #[tabled(rename = "type")]
    plugin_type: String,
    directory: String,
    glob: String,
    exists: bool,
}

/// Execute the paths command
pub async fn execute(args: &PathsArgs, config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let paths = SearchPaths::new(config.plugins.clone(), system_env());

    let rows: Vec<PathRow> = super::selected_types(args.plugin_type)
        .into_iter()
        .flat_map(|plugin_type| {
            let glob = paths.glob(plugin_type).to_string();
            paths
                .directories(plugin_type)
                .into_iter()
                .map(move |dir| PathRow {
                    plugin_type: plugin_type.to_string(),
                    exists: dir.is_dir(),
                    directory: dir.display().to_string(),
                    glob: glob.clone(),
                })
        })
        .collect();

    output::print_list(&rows, format);
    Ok(())
}
