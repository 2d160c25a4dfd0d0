//! `scan`: run discovery and report what was found and what failed.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use annot_core::config::AppConfig;
use annot_core::error::AppError;
use annot_plugin::{PluginHost, PluginType, ScanState};

use crate::output::{self, OutputFormat};

/// Arguments for the scan command
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Also list each rejected library
    #[arg(long)]
    pub failures: bool,
}

/// One row per plugin type
#[derive(Debug, Serialize, Tabled)]
struct ScanRow {
    #[tabled(rename = "type")]
    plugin_type: String,
    state: String,
    plugins: usize,
    rejected: usize,
}

/// One row per rejected library
#[derive(Debug, Serialize, Tabled)]
struct FailureRow {
    #[tabled(rename = "type")]
    plugin_type: String,
    library: String,
    reason: String,
    checker: String,
}

/// Execute the scan command
pub async fn execute(args: &ScanArgs, config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let host = PluginHost::from_config(&config.plugins);
    let report = host.scan().await;

    let mut rows = Vec::with_capacity(PluginType::ALL.len());
    for plugin_type in PluginType::ALL {
        let state = match host.state(plugin_type).await {
            ScanState::Unscanned => "unscanned".to_string(),
            ScanState::Scanning => "scanning".to_string(),
            ScanState::Scanned { .. } => "scanned".to_string(),
            ScanState::ScanFailed { reason } => format!("failed: {reason}"),
        };
        rows.push(ScanRow {
            plugin_type: plugin_type.to_string(),
            state,
            plugins: report.found_for(plugin_type),
            rejected: report.failures.iter().filter(|f| f.plugin_type == plugin_type).count(),
        });
    }

    if format == OutputFormat::Json {
        output::print_json(&report);
        return Ok(());
    }

    output::print_list(&rows, format);

    if args.failures {
        let failures: Vec<FailureRow> = report
            .failures
            .iter()
            .map(|f| FailureRow {
                plugin_type: f.plugin_type.to_string(),
                library: f.path.display().to_string(),
                reason: if f.message.is_empty() {
                    f.status.to_string()
                } else {
                    format!("{}: {}", f.status, f.message)
                },
                checker: f.tag.clone(),
            })
            .collect();
        if !failures.is_empty() {
            output::print_list(&failures, format);
        }
    } else if let Some(problems) = report.failure_report() {
        output::print_warning(&problems);
    }

    Ok(())
}
