//! Regex-based fact extraction from text artifacts.
//!
//! Statistics artifacts are line-oriented: one metric per line, matched with
//! single-line patterns carrying at least one capturing group. Extraction
//! scans top to bottom and takes the capture from the first matching line;
//! first match wins is the documented tie-break, so repeated extraction over
//! the same artifact is deterministic. Independent extractions may match
//! overlapping or identical lines.

use std::path::Path;

use regex::Regex;
use tracing::debug;

use vreg_error::{HarnessError, Result};

/// Expected value for a captured fact.
///
/// Numeric expectations compare after parsing the capture, so `007` matches
/// `7`; a capture that fails to parse is an ERROR-class outcome (broken
/// pattern or artifact), not a FAIL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    /// Exact string equality against the captured substring.
    Text(String),
    /// Numeric equality after parsing the capture as a signed integer.
    Int(i64),
}

impl From<i64> for Expected {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Expected {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Expected {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Expected {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Expected {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl std::fmt::Display for Expected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

/// A compiled extraction check: pattern plus capture index.
///
/// Building the pattern up front (rather than per call) lets a suite declare
/// its checks once and reuse them across test cases.
#[derive(Debug, Clone)]
pub struct FactPattern {
    regex: Regex,
    capture: usize,
}

impl FactPattern {
    /// Compile a pattern whose group `capture` holds the asserted value.
    ///
    /// Group 0 is the whole match, so the common single-group case is
    /// `capture == 1`.
    pub fn new(pattern: &str, capture: usize) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|err| HarnessError::BadPattern {
            pattern: pattern.to_owned(),
            detail: err.to_string(),
        })?;
        if capture > regex.captures_len().saturating_sub(1) {
            return Err(HarnessError::BadPattern {
                pattern: pattern.to_owned(),
                detail: format!(
                    "capture group {capture} out of range ({} groups)",
                    regex.captures_len() - 1
                ),
            });
        }
        Ok(Self { regex, capture })
    }

    /// The pattern source text, for diagnostics.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Capture from the first matching line, or `None`.
    #[must_use]
    pub fn extract<'t>(&self, text: &'t str) -> Option<&'t str> {
        text.lines()
            .find_map(|line| self.regex.captures(line))
            .and_then(|caps| caps.get(self.capture))
            .map(|m| m.as_str())
    }
}

/// Extract the first matching capture from a file.
///
/// `PatternNotFound` (a FAIL-class outcome) when no line matches.
pub fn extract_file(path: &Path, pattern: &FactPattern) -> Result<String> {
    let text = read_artifact(path)?;
    match pattern.extract(&text) {
        Some(capture) => {
            debug!(
                path = %path.display(),
                pattern = pattern.pattern(),
                capture,
                "fact extracted"
            );
            Ok(capture.to_owned())
        }
        None => Err(HarnessError::PatternNotFound {
            pattern: pattern.pattern().to_owned(),
            path: path.to_path_buf(),
        }),
    }
}

/// Extract a capture from a file and compare it against the expectation.
pub fn assert_capture(path: &Path, pattern: &FactPattern, expected: &Expected) -> Result<()> {
    let capture = extract_file(path, pattern)?;
    match expected {
        Expected::Text(want) => {
            if &capture == want {
                return Ok(());
            }
        }
        Expected::Int(want) => {
            let got: i64 = capture
                .trim()
                .parse()
                .map_err(|_| HarnessError::CaptureParse {
                    pattern: pattern.pattern().to_owned(),
                    capture: capture.clone(),
                })?;
            if got == *want {
                return Ok(());
            }
        }
    }
    Err(HarnessError::ValueMismatch {
        pattern: pattern.pattern().to_owned(),
        path: path.to_path_buf(),
        expected: expected.to_string(),
        actual: capture,
    })
}

/// Require that no line of the file matches the pattern.
pub fn assert_absent(path: &Path, pattern: &FactPattern) -> Result<()> {
    let text = read_artifact(path)?;
    for (idx, line) in text.lines().enumerate() {
        if pattern.regex.is_match(line) {
            return Err(HarnessError::PatternFound {
                pattern: pattern.pattern().to_owned(),
                path: path.to_path_buf(),
                line: idx + 1,
                text: line.to_owned(),
            });
        }
    }
    Ok(())
}

fn read_artifact(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(HarnessError::MissingArtifact {
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::read_to_string(path)?)
}
