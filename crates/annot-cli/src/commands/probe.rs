//! `probe`: check libraries for loadability without a helper process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use annot_core::config::AppConfig;
use annot_core::error::AppError;
use annot_plugin::scan::{InProcessProbe, LoadabilityProbe};
use annot_plugin::{NativeLoader, PluginType};

use super::TypeArg;
use crate::output::{self, OutputFormat};

/// Arguments for the probe command
#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Plugin type whose descriptor symbol to look for
    #[arg(short = 't', long = "type", value_enum)]
    pub plugin_type: TypeArg,

    /// Library files to check
    #[arg(required = true)]
    pub libraries: Vec<PathBuf>,
}

/// Probe display row
#[derive(Debug, Serialize, Tabled)]
struct ProbeRow {
    library: String,
    status: String,
    message: String,
}

/// Execute the probe command
pub async fn execute(args: &ProbeArgs, _config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let plugin_type = PluginType::from(args.plugin_type);
    let symbol = plugin_type.descriptor_symbol();
    let checker = InProcessProbe::new("native", Arc::new(NativeLoader::new()));
    let results = checker.probe(symbol, &args.libraries).await?;

    let rows: Vec<ProbeRow> = results
        .into_iter()
        .map(|r| ProbeRow {
            library: r.path.display().to_string(),
            status: r.status.to_string(),
            message: r.message,
        })
        .collect();

    output::print_list(&rows, format);
    Ok(())
}
