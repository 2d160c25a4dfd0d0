//! CLI command definitions and dispatch.

pub mod info;
pub mod list;
pub mod paths;
pub mod probe;
pub mod scan;

use clap::{Parser, Subcommand, ValueEnum};

use annot_core::config::AppConfig;
use annot_core::error::AppError;
use annot_plugin::{PluginHost, PluginType};

use crate::output::OutputFormat;

/// Annot: inspect native LADSPA and Vamp plugins
#[derive(Debug, Parser)]
#[command(name = "annot", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding `default.toml` and per-environment overlays
    #[arg(short, long, default_value = "config")]
    pub config_dir: String,

    /// Environment overlay to apply on top of the defaults
    #[arg(short, long, env = "ANNOT_ENV", default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for plugins and summarise the result
    Scan(scan::ScanArgs),
    /// List discovered plugins
    List(list::ListArgs),
    /// Show one plugin's descriptor and ports
    Info(info::InfoArgs),
    /// Check libraries for loadability in this process
    Probe(probe::ProbeArgs),
    /// Show the directories searched for each plugin type
    Paths(paths::PathsArgs),
}

/// Plugin type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    Ladspa,
    Vamp,
}

impl From<TypeArg> for PluginType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Ladspa => PluginType::Ladspa,
            TypeArg::Vamp => PluginType::Vamp,
        }
    }
}

/// The selected type, or every type when none is given.
pub fn selected_types(arg: Option<TypeArg>) -> Vec<PluginType> {
    match arg {
        Some(t) => vec![t.into()],
        None => PluginType::ALL.to_vec(),
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = self.load_config()?;
        match &self.command {
            Commands::Scan(args) => scan::execute(args, &config, self.format).await,
            Commands::List(args) => list::execute(args, &config, self.format).await,
            Commands::Info(args) => info::execute(args, &config, self.format).await,
            Commands::Probe(args) => probe::execute(args, &config, self.format).await,
            Commands::Paths(args) => paths::execute(args, &config, self.format).await,
        }
    }

    fn load_config(&self) -> Result<AppConfig, AppError> {
        AppConfig::load_from(&self.config_dir, &self.env)
    }
}

/// Helper: build a host from configuration and run one scan
pub async fn scanned_host(config: &AppConfig) -> PluginHost {
    let host = PluginHost::from_config(&config.plugins);
    let report = host.scan().await;
    if let Some(problems) = report.failure_report() {
        crate::output::print_warning(&problems);
    }
    host
}
