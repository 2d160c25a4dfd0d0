//! Line protocol spoken by the plugin checker helper.
//!
//! The helper is started with the descriptor symbol as its only argument,
//! reads one candidate path per line on stdin and answers each with one
//! line on stdout:
//!
//! ```text
//! SUCCESS|/usr/lib/vamp/qm-vamp-plugins.so|
//! FAILURE|/usr/lib/vamp/broken.so|load|cannot open shared object file
//! ```
//!
//! Paths travel percent-encoded in both directions (`%`, `|`, CR and LF
//! only), so any file name survives the round trip unchanged.

use std::fmt;
use std::path::{Path, PathBuf};

use super::probe::LoadStatus;

/// One helper answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperResponse {
    pub path: PathBuf,
    pub status: LoadStatus,
    pub message: String,
}

impl HelperResponse {
    /// A successful check.
    pub fn success(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            status: LoadStatus::Loadable,
            message: String::new(),
        }
    }

    /// A failed check with a diagnostic.
    pub fn failure(path: impl Into<PathBuf>, status: LoadStatus, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status,
            message: message.into(),
        }
    }

    /// Parses one output line; `None` for anything malformed.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(4, '|');
        let verdict = parts.next()?;
        let path = parts.next().filter(|p| !p.is_empty()).map(decode_path)?;

        match verdict {
            "SUCCESS" => Some(Self::success(path)),
            "FAILURE" => {
                let status = match parts.next()? {
                    "load" => LoadStatus::FailedToLoadLibrary,
                    "descriptor" => LoadStatus::FailedToFindDescriptor,
                    _ => LoadStatus::FailedElsewhere,
                };
                let message = parts.next().unwrap_or_default();
                Some(Self::failure(path, status, message))
            }
            _ => None,
        }
    }
}

impl fmt::Display for HelperResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = encode_path(&self.path);
        match self.status {
            LoadStatus::Loadable | LoadStatus::Unknown => write!(f, "SUCCESS|{path}|"),
            LoadStatus::FailedToLoadLibrary => write!(f, "FAILURE|{path}|load|{}", single_line(&self.message)),
            LoadStatus::FailedToFindDescriptor => {
                write!(f, "FAILURE|{path}|descriptor|{}", single_line(&self.message))
            }
            LoadStatus::FailedElsewhere => write!(f, "FAILURE|{path}|other|{}", single_line(&self.message)),
        }
    }
}

fn single_line(message: &str) -> String {
    message.replace(['\r', '\n'], " ")
}

/// Renders a path as one protocol input line (without the newline).
pub fn request_line(path: &Path) -> String {
    encode_path(path)
}

/// Recovers the path carried by one input line (without the newline).
pub fn parse_request(line: &str) -> PathBuf {
    decode_path(line)
}

fn encode_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '|' => out.push_str("%7C"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            c => out.push(c),
        }
    }
    out
}

/// Unknown escapes are kept literally.
fn decode_path(field: &str) -> PathBuf {
    let mut out = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(at) = rest.find('%') {
        out.push_str(&rest[..at]);
        let decoded = match rest.get(at + 1..at + 3) {
            Some("25") => Some('%'),
            Some("7C" | "7c") => Some('|'),
            Some("0A" | "0a") => Some('\n'),
            Some("0D" | "0d") => Some('\r'),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[at + 3..];
            }
            None => {
                out.push('%');
                rest = &rest[at + 1..];
            }
        }
    }
    out.push_str(rest);
    PathBuf::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let r = HelperResponse::parse("SUCCESS|/usr/lib/vamp/qm.so|\n").expect("parse");
        assert_eq!(r, HelperResponse::success("/usr/lib/vamp/qm.so"));
    }

    #[test]
    fn test_parse_failure_codes() {
        let r = HelperResponse::parse("FAILURE|/a.so|load|no such file").expect("parse");
        assert_eq!(r.status, LoadStatus::FailedToLoadLibrary);
        assert_eq!(r.message, "no such file");

        let r = HelperResponse::parse("FAILURE|/a.so|descriptor|missing symbol").expect("parse");
        assert_eq!(r.status, LoadStatus::FailedToFindDescriptor);

        let r = HelperResponse::parse("FAILURE|/a.so|weird|x|y").expect("parse");
        assert_eq!(r.status, LoadStatus::FailedElsewhere);
        assert_eq!(r.message, "x|y");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(HelperResponse::parse("").is_none());
        assert!(HelperResponse::parse("hello").is_none());
        assert!(HelperResponse::parse("SUCCESS||").is_none());
        assert!(HelperResponse::parse("MAYBE|/a.so|").is_none());
    }

    #[test]
    fn test_display_is_parseable() {
        let r = HelperResponse::failure("/a.so", LoadStatus::FailedToFindDescriptor, "line one\nline two");
        let line = r.to_string();
        assert_eq!(line, "FAILURE|/a.so|descriptor|line one line two");
        let back = HelperResponse::parse(&line).expect("parse");
        assert_eq!(back.status, LoadStatus::FailedToFindDescriptor);
    }

    #[test]
    fn test_awkward_paths_survive_round_trip() {
        for path in ["/x/my|plug.so", "/x/100%.so", " /x/lead and trail.so ", "/x/new\nline.so", "/x/%7C.so"] {
            let line = HelperResponse::failure(path, LoadStatus::FailedToLoadLibrary, "bad|thing").to_string();
            assert_eq!(line.matches('|').count(), 4, "{line}");
            let back = HelperResponse::parse(&line).expect("parse");
            assert_eq!(back.path, PathBuf::from(path));
            assert_eq!(back.message, "bad|thing");

            let back = HelperResponse::parse(&HelperResponse::success(path).to_string()).expect("parse");
            assert_eq!(back.path, PathBuf::from(path));

            let request = request_line(Path::new(path));
            assert!(!request.contains(['\n', '|']));
            assert_eq!(parse_request(&request), PathBuf::from(path));
        }
    }

    #[test]
    fn test_unknown_escape_kept_literally() {
        assert_eq!(parse_request("/x/50%off%zz.so"), PathBuf::from("/x/50%off%zz.so"));
    }
}
