//! Reduces a simulator log to a verdict.
//!
//! Only lines after the `--- UVM Report Summary ---` marker count. Each severity line
//! there carries its occurrence count in the third whitespace-separated token, e.g.
//! `UVM_ERROR :    3`.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub const REPORT_SUMMARY_MARKER: &str = "--- UVM Report Summary ---";
pub const SEVERITY_PREFIXES: &[&str] = &["UVM_WARNING", "UVM_ERROR", "UVM_FATAL"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    FailedWithIssues { count: u64 },
    Missing,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Passed => "pass",
            Verdict::FailedWithIssues { .. } => "fail",
            Verdict::Missing => "missing",
        }
    }

    pub fn is_pass(self) -> bool {
        matches!(self, Verdict::Passed)
    }

    pub fn issue_count(self) -> u64 {
        match self {
            Verdict::FailedWithIssues { count } => count,
            _ => 0,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Passed => f.write_str("PASSED"),
            Verdict::FailedWithIssues { count } => write!(f, "FAILED with {count} issues."),
            Verdict::Missing => f.write_str("FAILED...log missing"),
        }
    }
}

/// A severity line whose count could not be read: the report format changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFormatError {
    pub path: Option<PathBuf>,
    pub line_no: usize,
    pub line: String,
    pub why: &'static str,
}

impl std::fmt::Display for LogFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}:{}: ", path.display(), self.line_no)?,
            None => write!(f, "line {}: ", self.line_no)?,
        }
        write!(f, "{}: {:?}", self.why, self.line)
    }
}

impl std::error::Error for LogFormatError {}

#[derive(Debug)]
pub enum ClassifyError {
    Io { path: PathBuf, source: std::io::Error },
    Format(LogFormatError),
}

impl std::fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifyError::Io { path, source } => {
                write!(f, "read log {}: {source}", path.display())
            }
            ClassifyError::Format(err) => write!(f, "malformed report summary: {err}"),
        }
    }
}

impl std::error::Error for ClassifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClassifyError::Io { source, .. } => Some(source),
            ClassifyError::Format(err) => Some(err),
        }
    }
}

/// Classifies the log at `path`. A missing file is `Verdict::Missing`, not an error.
pub fn classify_log(path: &Path) -> Result<Verdict, ClassifyError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Verdict::Missing),
        Err(source) => {
            return Err(ClassifyError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    classify_reader(std::io::BufReader::new(file)).map_err(|err| match err {
        ClassifyError::Format(mut e) => {
            e.path = Some(path.to_path_buf());
            ClassifyError::Format(e)
        }
        ClassifyError::Io { source, .. } => ClassifyError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

pub fn classify_reader<R: BufRead>(mut reader: R) -> Result<Verdict, ClassifyError> {
    let mut total: u64 = 0;
    let mut in_summary = false;
    let mut raw = Vec::new();
    let mut line_no = 0usize;

    loop {
        raw.clear();
        let n = reader
            .read_until(b'\n', &mut raw)
            .map_err(|source| ClassifyError::Io {
                path: PathBuf::new(),
                source,
            })?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\n', '\r']);

        if !in_summary {
            in_summary = line.trim() == REPORT_SUMMARY_MARKER;
            continue;
        }

        if SEVERITY_PREFIXES.iter().any(|p| line.starts_with(p)) {
            let count = severity_count(line).map_err(|why| {
                ClassifyError::Format(LogFormatError {
                    path: None,
                    line_no,
                    line: line.to_string(),
                    why,
                })
            })?;
            total = total.saturating_add(count);
        }
    }

    Ok(if total == 0 {
        Verdict::Passed
    } else {
        Verdict::FailedWithIssues { count: total }
    })
}

fn severity_count(line: &str) -> Result<u64, &'static str> {
    let token = line
        .split_whitespace()
        .nth(2)
        .ok_or("severity line has no count field")?;
    token
        .parse::<u64>()
        .map_err(|_| "severity count is not a non-negative integer")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Result<Verdict, ClassifyError> {
        classify_reader(text.as_bytes())
    }

    #[test]
    fn warnings_and_errors_add_up() {
        let log = "\
UVM_INFO @ 0: reporter [RNTST] Running test x_test_c...
--- UVM Report Summary ---

** Report counts by severity
UVM_INFO :   12
UVM_WARNING x 2
UVM_ERROR y 3
UVM_FATAL :    0
";
        assert_eq!(classify(log).unwrap(), Verdict::FailedWithIssues { count: 5 });
    }

    #[test]
    fn marker_with_no_severity_lines_passes() {
        let log = "header\n--- UVM Report Summary ---\n** Report counts by id\n[RNTST]     1\n";
        assert_eq!(classify(log).unwrap(), Verdict::Passed);
    }

    #[test]
    fn zero_counts_pass() {
        let log = "--- UVM Report Summary ---\nUVM_WARNING :    0\nUVM_ERROR :    0\nUVM_FATAL :    0\n";
        assert_eq!(classify(log).unwrap(), Verdict::Passed);
    }

    #[test]
    fn lines_before_marker_are_ignored() {
        let log = "UVM_ERROR top.sv(10) @ 5: boom\nUVM_FATAL garbage\n  --- UVM Report Summary ---  \n";
        assert_eq!(classify(log).unwrap(), Verdict::Passed);
    }

    #[test]
    fn no_marker_passes_vacuously() {
        assert_eq!(classify("UVM_ERROR : 4\n").unwrap(), Verdict::Passed);
        assert_eq!(classify("").unwrap(), Verdict::Passed);
    }

    #[test]
    fn indented_severity_lines_do_not_count() {
        let log = "--- UVM Report Summary ---\n  UVM_ERROR : 4\n";
        assert_eq!(classify(log).unwrap(), Verdict::Passed);
    }

    #[test]
    fn missing_count_is_format_error() {
        let log = "a\n--- UVM Report Summary ---\nUVM_ERROR :\n";
        match classify(log) {
            Err(ClassifyError::Format(e)) => {
                assert_eq!(e.line_no, 3);
                assert_eq!(e.line, "UVM_ERROR :");
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_count_is_format_error() {
        let log = "--- UVM Report Summary ---\nUVM_WARNING : many\n";
        assert!(matches!(classify(log), Err(ClassifyError::Format(_))));
    }

    #[test]
    fn crlf_and_invalid_utf8_are_tolerated() {
        let mut bytes = b"\xff\xfe noise\r\n--- UVM Report Summary ---\r\n".to_vec();
        bytes.extend_from_slice(b"UVM_FATAL : 1\r\n\xc3");
        assert_eq!(
            classify_reader(bytes.as_slice()).unwrap(),
            Verdict::FailedWithIssues { count: 1 }
        );
    }

    #[test]
    fn missing_file_is_missing_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim/none/logfile");
        assert_eq!(classify_log(&path).unwrap(), Verdict::Missing);
    }

    #[test]
    fn file_format_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logfile");
        std::fs::write(&path, "--- UVM Report Summary ---\nUVM_ERROR x y\n").unwrap();
        let err = classify_log(&path).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("logfile:2"), "{msg}");
    }

    #[test]
    fn verdict_display_matches_progress_lines() {
        assert_eq!(Verdict::Passed.to_string(), "PASSED");
        assert_eq!(
            Verdict::FailedWithIssues { count: 7 }.to_string(),
            "FAILED with 7 issues."
        );
        assert_eq!(Verdict::FailedWithIssues { count: 7 }.issue_count(), 7);
    }
}
