//! Out-of-process plugin loadability checker.
//!
//! Started by the host with a descriptor symbol as its only argument. Reads
//! one library path per line from stdin and answers each on stdout before
//! reading the next, so a library that crashes this process on load is
//! attributable to the last unanswered path.

use std::io::{self, BufRead, Write};
use annot_plugin::scan::{HelperResponse, LoadStatus, check_library, parse_request};
use annot_plugin::NativeLoader;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")))
        .with_writer(io::stderr)
        .init();

    let Some(symbol) = std::env::args().nth(1) else {
        eprintln!("usage: annot-plugin-checker <descriptor-symbol>");
        std::process::exit(2);
    };

    if let Err(e) = run(&symbol) {
        error!(error = %e, "Checker I/O failed");
        std::process::exit(1);
    }
}

fn run(symbol: &str) -> io::Result<()> {
    let loader = NativeLoader::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let path = parse_request(&line);
        let result = check_library(&loader, symbol, &path);
        debug!(path = %path.display(), status = %result.status, "Checked library");

        let response = match result.status {
            LoadStatus::Loadable => HelperResponse::success(result.path),
            status => HelperResponse::failure(result.path, status, result.message),
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }

    Ok(())
}
