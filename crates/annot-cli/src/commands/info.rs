//! `info`: one plugin's descriptor.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use annot_core::config::AppConfig;
use annot_core::error::AppError;
use annot_plugin::PluginIdentifier;

use crate::output::{self, OutputFormat};

/// Arguments for the info command
#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Plugin identifier, `type:library:label`
    pub identifier: String,

    /// Sample rate used to resolve rate-relative ranges
    #[arg(long)]
    pub sample_rate: Option<f32>,
}

/// Port display row
#[derive(Debug, Serialize, Tabled)]
struct PortRow {
    index: usize,
    name: String,
    direction: String,
    kind: String,
    minimum: f32,
    maximum: f32,
    default: f32,
    step: f32,
}

/// Execute the info command
pub async fn execute(args: &InfoArgs, config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let identifier = PluginIdentifier::parse(&args.identifier)?;
    let host = super::scanned_host(config).await;

    let record = match host.descriptor(&identifier).await {
        Some(record) => record,
        None => host
            .descriptor(&identifier.canonical())
            .await
            .ok_or_else(|| AppError::not_found(format!("No plugin '{identifier}' was found")))?,
    };

    if format == OutputFormat::Json {
        output::print_json(&record);
        return Ok(());
    }

    let sample_rate = args
        .sample_rate
        .unwrap_or(config.plugins.reference_sample_rate);

    output::print_heading(&record.identifier.to_string());
    output::print_kv("Name", &record.name);
    output::print_kv("Maker", &record.maker);
    output::print_kv("Copyright", &record.copyright);
    output::print_kv("Unique ID", &record.unique_id.to_string());
    output::print_kv("Category", &record.category);
    if !record.description.is_empty() {
        output::print_kv("Description", &record.description);
    }
    if let Some(version) = record.version {
        output::print_kv("Version", &version.to_string());
    }
    output::print_kv("Audio inputs", &record.audio_input_count().to_string());
    output::print_kv("Audio outputs", &record.audio_output_count().to_string());
    output::print_kv("Control outputs", &record.control_output_names().join(", "));

    let ports: Vec<PortRow> = record
        .ports
        .iter()
        .map(|p| PortRow {
            index: p.index,
            name: p.name.clone(),
            direction: format!("{:?}", p.direction).to_lowercase(),
            kind: format!("{:?}", p.kind).to_lowercase(),
            minimum: p.minimum(sample_rate),
            maximum: p.maximum(sample_rate),
            default: p.default_value(sample_rate),
            step: p.quantization(sample_rate),
        })
        .collect();
    println!();
    output::print_list(&ports, format);

    Ok(())
}
