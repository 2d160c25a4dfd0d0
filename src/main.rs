//! Annot host start-up: load configuration, initialise logging, discover
//! plugins and surface any libraries that had to be ignored.

use tracing_subscriber::{EnvFilter, fmt};

use annot_core::config::AppConfig;
use annot_core::error::AppError;
use annot_plugin::{PluginHost, PluginType, ScanState};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Host start-up failed");
        std::process::exit(1);
    }
}

/// Load configuration from `ANNOT_CONFIG_DIR` (default `config`) for the
/// environment named by `ANNOT_ENV`
fn load_configuration() -> Result<AppConfig, AppError> {
    let dir = std::env::var("ANNOT_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let env = std::env::var("ANNOT_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load_from(&dir, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Annot host v{}", env!("CARGO_PKG_VERSION"));

    let host = PluginHost::from_config(&config.plugins);
    let report = host.scan().await;

    if let Some(problems) = report.failure_report() {
        tracing::warn!("{problems}");
    }

    let mut failed = 0;
    for plugin_type in PluginType::ALL {
        match host.state(plugin_type).await {
            ScanState::Scanned { count } => {
                tracing::info!(plugin_type = %plugin_type, count, "Plugins available");
            }
            ScanState::ScanFailed { reason } => {
                tracing::error!(plugin_type = %plugin_type, reason = %reason, "Plugin scan failed");
                failed += 1;
            }
            other => tracing::debug!(plugin_type = %plugin_type, state = ?other, "Plugin scan incomplete"),
        }
    }

    if failed == PluginType::ALL.len() {
        return Err(AppError::plugin("No plugin type could be scanned"));
    }

    tracing::info!(
        ladspa = report.found_for(PluginType::Ladspa),
        vamp = report.found_for(PluginType::Vamp),
        rejected = report.failures.len(),
        "Host ready"
    );
    Ok(())
}
