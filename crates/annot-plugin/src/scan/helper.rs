//! Out-of-process loadability checking.
//!
//! Candidates are handed to a checker executable so that a library which
//! crashes or hangs while loading takes down the checker, not the host.
//! See [`super::protocol`] for the wire format.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use annot_core::config::plugin::{HelperConfig, PluginConfig};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::probe::{LoadStatus, LoadabilityProbe, ProbeError, ProbeResult};
use super::protocol::{HelperResponse, request_line};

/// File name of the bundled checker executable.
pub const CHECKER_NAME: &str = if cfg!(windows) {
    "annot-plugin-checker.exe"
} else {
    "annot-plugin-checker"
};

/// Probe that delegates each candidate to a checker subprocess.
#[derive(Debug, Clone)]
pub struct HelperProcessProbe {
    tag: String,
    executable: PathBuf,
    timeout: Duration,
}

impl HelperProcessProbe {
    /// Creates a probe running `executable` with a per-candidate `timeout`.
    pub fn new(tag: impl Into<String>, executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tag: tag.into(),
            executable: executable.into(),
            timeout,
        }
    }

    /// Creates a probe from configuration.
    pub fn from_config(helper: &HelperConfig, timeout_seconds: u64) -> Self {
        Self::new(
            helper.tag.clone(),
            helper.executable.clone(),
            Duration::from_secs(timeout_seconds),
        )
    }

    /// Path of the checker executable.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn spawn(&self, symbol: &str) -> std::io::Result<Child> {
        Command::new(&self.executable)
            .arg(symbol)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }

    /// Runs one checker process over `pending`, popping each candidate it
    /// answers. Returns when the queue is drained or the checker stops
    /// responding, in which case the candidate at the front is blamed.
    async fn run_once(&self, mut child: Child, pending: &mut VecDeque<PathBuf>, results: &mut Vec<ProbeResult>) {
        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            blame_front(pending, results, "checker has no stdio pipes");
            return;
        };

        let requests: Vec<String> = pending.iter().map(|p| request_line(p)).collect();
        let writer = tokio::spawn(async move {
            for line in requests {
                if stdin.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                    break;
                }
            }
            let _ = stdin.shutdown().await;
        });

        let failure = self.read_responses(stdout, pending, results).await;
        writer.abort();

        match failure {
            None => {
                let _ = child.wait().await;
            }
            Some(reason) => {
                let _ = child.kill().await;
                blame_front(pending, results, &reason);
            }
        }
    }

    /// Reads answers until `pending` is empty (`None`) or the checker dies or
    /// stalls (`Some(reason)`).
    async fn read_responses(
        &self,
        stdout: ChildStdout,
        pending: &mut VecDeque<PathBuf>,
        results: &mut Vec<ProbeResult>,
    ) -> Option<String> {
        let mut lines = BufReader::new(stdout).lines();

        while let Some(front) = pending.front() {
            let line = match tokio::time::timeout(self.timeout, lines.next_line()).await {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return Some("checker exited while loading this library".to_string()),
                Ok(Err(e)) => return Some(format!("failed to read checker output: {e}")),
                Err(_) => {
                    return Some(format!(
                        "checker timed out after {}s while loading this library",
                        self.timeout.as_secs()
                    ));
                }
            };

            match HelperResponse::parse(&line) {
                Some(response) if response.path == *front => {
                    debug!(tag = %self.tag, path = %front.display(), status = ?response.status, "Checker verdict");
                    results.push(ProbeResult {
                        path: response.path,
                        status: response.status,
                        message: response.message,
                    });
                    pending.pop_front();
                }
                Some(response) => {
                    warn!(
                        tag = %self.tag,
                        expected = %front.display(),
                        got = %response.path.display(),
                        "Checker answered out of order, ignoring line"
                    );
                }
                None => {
                    debug!(tag = %self.tag, line = %line, "Ignoring unrecognised checker output");
                }
            }
        }

        None
    }
}

fn blame_front(pending: &mut VecDeque<PathBuf>, results: &mut Vec<ProbeResult>, reason: &str) {
    if let Some(path) = pending.pop_front() {
        warn!(path = %path.display(), reason, "Plugin library failed in checker");
        results.push(ProbeResult {
            path,
            status: LoadStatus::FailedElsewhere,
            message: reason.to_string(),
        });
    }
}

#[async_trait]
impl LoadabilityProbe for HelperProcessProbe {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn probe(&self, symbol: &str, paths: &[PathBuf]) -> Result<Vec<ProbeResult>, ProbeError> {
        let mut pending: VecDeque<PathBuf> = paths.iter().cloned().collect();
        let mut results = Vec::with_capacity(paths.len());
        let mut started = false;

        while !pending.is_empty() {
            let child = match self.spawn(symbol) {
                Ok(child) => child,
                Err(e) if !started => {
                    return Err(ProbeError::Spawn {
                        executable: self.executable.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(tag = %self.tag, error = %e, remaining = pending.len(), "Checker could not be restarted");
                    results.extend(pending.drain(..).map(|path| ProbeResult {
                        path,
                        status: LoadStatus::Unknown,
                        message: format!("checker could not be restarted: {e}"),
                    }));
                    break;
                }
            };

            if started {
                info!(tag = %self.tag, remaining = pending.len(), "Restarted plugin checker");
            }
            started = true;
            self.run_once(child, &mut pending, &mut results).await;
        }

        Ok(results)
    }
}

/// Helpers to use: the configured list, or the bundled checker next to the
/// running executable. Repeated tags keep the first entry.
pub fn resolve_helpers(config: &PluginConfig) -> Vec<HelperConfig> {
    let configured = if config.helpers.is_empty() {
        bundled_checker().into_iter().collect()
    } else {
        config.helpers.clone()
    };

    let mut helpers: Vec<HelperConfig> = Vec::with_capacity(configured.len());
    for helper in configured {
        if helpers.iter().any(|h| h.tag == helper.tag) {
            warn!(tag = %helper.tag, executable = %helper.executable.display(), "Duplicate checker tag, skipping");
            continue;
        }
        helpers.push(helper);
    }
    helpers
}

fn bundled_checker() -> Option<HelperConfig> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(CHECKER_NAME);
    if candidate.is_file() {
        Some(HelperConfig {
            tag: "native".to_string(),
            executable: candidate,
        })
    } else {
        warn!(expected = %candidate.display(), "No plugin checker found alongside executable");
        None
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    #[tokio::test]
    async fn test_helper_reports_each_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checker = script(
            dir.path(),
            "checker",
            r#"while read -r p; do
  case "$p" in
    *bad*) echo "FAILURE|$p|load|cannot open" ;;
    *) echo "SUCCESS|$p|" ;;
  esac
done"#,
        );

        let probe = HelperProcessProbe::new("native", checker, Duration::from_secs(10));
        let paths = vec![PathBuf::from("/x/good.so"), PathBuf::from("/x/bad.so")];
        let results = probe.probe("ladspa_descriptor", &paths).await.expect("probe");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, LoadStatus::Loadable);
        assert_eq!(results[1].status, LoadStatus::FailedToLoadLibrary);
        assert_eq!(results[1].message, "cannot open");
    }

    #[tokio::test]
    async fn test_paths_with_separators_and_spaces_match_their_answers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executable = script(
            dir.path(),
            "checker",
            r#"while IFS= read -r p; do
  echo "SUCCESS|$p|"
done"#,
        );

        let checker = HelperProcessProbe::new("native", executable, Duration::from_secs(10));
        let paths = vec![
            PathBuf::from("/x/my|plug.so"),
            PathBuf::from(" /x/padded.so "),
            PathBuf::from("/x/ok.so"),
        ];
        let results = checker.probe("ladspa_descriptor", &paths).await.expect("check");

        assert_eq!(results.len(), 3);
        for (result, path) in results.iter().zip(&paths) {
            assert_eq!(&result.path, path);
            assert_eq!(result.status, LoadStatus::Loadable, "{}", path.display());
        }
    }

    #[tokio::test]
    async fn test_crash_blames_current_candidate_and_restarts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checker = script(
            dir.path(),
            "checker",
            r#"while read -r p; do
  case "$p" in
    *crash*) exit 139 ;;
    *) echo "SUCCESS|$p|" ;;
  esac
done"#,
        );

        let probe = HelperProcessProbe::new("native", checker, Duration::from_secs(10));
        let paths = vec![
            PathBuf::from("/x/a.so"),
            PathBuf::from("/x/crash.so"),
            PathBuf::from("/x/c.so"),
        ];
        let results = probe.probe("ladspa_descriptor", &paths).await.expect("probe");

        let statuses: Vec<LoadStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![LoadStatus::Loadable, LoadStatus::FailedElsewhere, LoadStatus::Loadable]
        );
        assert_eq!(results[1].path, PathBuf::from("/x/crash.so"));
    }

    #[tokio::test]
    async fn test_hang_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checker = script(
            dir.path(),
            "checker",
            r#"while read -r p; do
  case "$p" in
    *hang*) sleep 30 ;;
    *) echo "SUCCESS|$p|" ;;
  esac
done"#,
        );

        let probe = HelperProcessProbe::new("native", checker, Duration::from_secs(1));
        let paths = vec![PathBuf::from("/x/hang.so"), PathBuf::from("/x/ok.so")];
        let results = probe.probe("vampGetPluginDescriptor", &paths).await.expect("probe");

        assert_eq!(results[0].status, LoadStatus::FailedElsewhere);
        assert!(results[0].message.contains("timed out"));
        assert_eq!(results[1].status, LoadStatus::Loadable);
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let probe = HelperProcessProbe::new("native", "/no/such/checker", Duration::from_secs(1));
        let err = probe
            .probe("ladspa_descriptor", &[PathBuf::from("/x/a.so")])
            .await
            .expect_err("spawn must fail");
        assert!(matches!(err, ProbeError::Spawn { .. }));
    }

    #[test]
    fn test_duplicate_helper_tags_are_skipped() {
        let config = PluginConfig {
            helpers: vec![
                HelperConfig {
                    tag: "64".to_string(),
                    executable: PathBuf::from("/a"),
                },
                HelperConfig {
                    tag: "32".to_string(),
                    executable: PathBuf::from("/b"),
                },
                HelperConfig {
                    tag: "64".to_string(),
                    executable: PathBuf::from("/c"),
                },
            ],
            ..PluginConfig::default()
        };
        let helpers = resolve_helpers(&config);
        let executables: Vec<&Path> = helpers.iter().map(|h| h.executable.as_path()).collect();
        assert_eq!(executables, vec![Path::new("/a"), Path::new("/b")]);
    }
}
