//! Aggregated scan failure reporting.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::probe::LoadStatus;
use crate::identifier::PluginType;

/// One library excluded from a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub plugin_type: PluginType,
    pub path: PathBuf,
    /// Tag of the probe that rejected it; empty for enumeration failures.
    pub tag: String,
    pub status: LoadStatus,
    pub message: String,
}

/// Outcome of scanning every plugin type once.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether at least one probe could run.
    pub succeeded: bool,
    /// Identifiers found per type.
    pub found: Vec<(PluginType, usize)>,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    /// An empty report stamped with the current time.
    pub fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            succeeded: false,
            found: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Stamps the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Records a library that was excluded.
    pub fn push_failure(&mut self, failure: ScanFailure) {
        self.failures.push(failure);
    }

    /// Plugins found for `plugin_type`.
    pub fn found_for(&self, plugin_type: PluginType) -> usize {
        self.found
            .iter()
            .filter(|(t, _)| *t == plugin_type)
            .map(|(_, n)| n)
            .sum()
    }

    /// A single human-readable summary of everything that went wrong, or
    /// `None` if nothing did.
    pub fn failure_report(&self) -> Option<String> {
        if !self.succeeded {
            return Some(
                "Failed to scan for plugins: no plugin checker could be run. \
                 Possibly the checker was not installed alongside the host, or \
                 none is configured."
                    .to_string(),
            );
        }

        if self.failures.is_empty() {
            return None;
        }

        let mut report = String::from("Failed to load one or more plugin libraries:\n");
        for failure in &self.failures {
            let _ = write!(report, "  {} ({}): {}", failure.path.display(), failure.plugin_type, failure.status);
            if !failure.message.is_empty() {
                let _ = write!(report, " - {}", failure.message);
            }
            if !failure.tag.is_empty() {
                let _ = write!(report, " [{}]", failure.tag);
            }
            report.push('\n');
        }
        report.push_str("These libraries may be incompatible with the system and will be ignored.");
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_failures_no_report() {
        let mut report = ScanReport::begin();
        report.succeeded = true;
        report.finish();
        assert!(report.failure_report().is_none());
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn test_unsuccessful_scan_reports() {
        let report = ScanReport::begin();
        let text = report.failure_report().expect("report");
        assert!(text.starts_with("Failed to scan for plugins"));
    }

    #[test]
    fn test_failures_are_aggregated() {
        let mut report = ScanReport::begin();
        report.succeeded = true;
        report.push_failure(ScanFailure {
            plugin_type: PluginType::Vamp,
            path: PathBuf::from("/v/broken.so"),
            tag: "64".to_string(),
            status: LoadStatus::FailedToLoadLibrary,
            message: "wrong ELF class".to_string(),
        });
        report.push_failure(ScanFailure {
            plugin_type: PluginType::Ladspa,
            path: PathBuf::from("/l/dup.so"),
            tag: String::new(),
            status: LoadStatus::FailedElsewhere,
            message: "duplicate plugin 'delay'".to_string(),
        });

        let text = report.failure_report().expect("report");
        assert!(text.contains("/v/broken.so (vamp): library could not be loaded - wrong ELF class [64]"));
        assert!(text.contains("/l/dup.so (ladspa)"));
        assert_eq!(text.lines().count(), 4);
    }
}
