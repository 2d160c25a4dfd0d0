//! `list`: discovered plugins.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use annot_core::config::AppConfig;
use annot_core::error::AppError;

use super::TypeArg;
use crate::output::{self, OutputFormat};

/// Arguments for the list command
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only list plugins of this type
    #[arg(short = 't', long = "type", value_enum)]
    pub plugin_type: Option<TypeArg>,
}

/// Plugin display row
#[derive(Debug, Serialize, Tabled)]
struct PluginRow {
    identifier: String,
    name: String,
    maker: String,
    category: String,
    parameters: usize,
}

/// Execute the list command
pub async fn execute(args: &ListArgs, config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let host = super::scanned_host(config).await;

    let mut rows = Vec::new();
    for plugin_type in super::selected_types(args.plugin_type) {
        for record in host.descriptors(plugin_type).await {
            rows.push(PluginRow {
                identifier: record.identifier.to_string(),
                parameters: record.parameter_count(),
                name: record.name,
                maker: record.maker,
                category: record.category,
            });
        }
    }

    output::print_list(&rows, format);
    Ok(())
}
