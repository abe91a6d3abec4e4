//! Golden text comparison.
//!
//! Comparison is byte-for-byte after a fixed, documented normalization:
//! line endings collapse to `\n` and trailing whitespace is stripped from
//! each line. Nothing else — no semantic reinterpretation of the text.
//! On mismatch the diagnostic renders only the first divergent line, which
//! is enough to locate the regression without drowning the report.

use std::path::Path;

use tracing::debug;

use vreg_error::{HarnessError, Result};

/// Normalize text for comparison: `\r\n` → `\n`, trailing whitespace
/// stripped per line. A trailing newline on the final line is not
/// significant.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut lines: Vec<&str> = text.split('\n').map(|l| l.trim_end()).collect();
    while lines.last() == Some(&"") {
        let _ = lines.pop();
    }
    lines.join("\n")
}

/// First line where two normalized texts diverge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// 1-based line number of the divergence.
    pub line: usize,
    /// Golden line, or `None` when the produced text has extra lines.
    pub expected: Option<String>,
    /// Produced line, or `None` when the produced text is truncated.
    pub actual: Option<String>,
}

impl std::fmt::Display for Divergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "first divergence at line {}: ", self.line)?;
        match (&self.expected, &self.actual) {
            (Some(exp), Some(act)) => write!(f, "expected {exp:?}, got {act:?}"),
            (Some(exp), None) => write!(f, "expected {exp:?}, but produced output ends"),
            (None, Some(act)) => write!(f, "golden ends, but produced output has {act:?}"),
            (None, None) => write!(f, "no divergence"),
        }
    }
}

/// Compare two normalized texts line by line; `None` means equal.
#[must_use]
pub fn first_divergence(golden: &str, produced: &str) -> Option<Divergence> {
    let golden = normalize(golden);
    let produced = normalize(produced);
    if golden == produced {
        return None;
    }
    let mut golden_lines = golden.lines();
    let mut produced_lines = produced.lines();
    let mut line = 0;
    loop {
        line += 1;
        match (golden_lines.next(), produced_lines.next()) {
            (Some(exp), Some(act)) if exp == act => {}
            (None, None) => return None,
            (exp, act) => {
                return Some(Divergence {
                    line,
                    expected: exp.map(str::to_owned),
                    actual: act.map(str::to_owned),
                });
            }
        }
    }
}

/// Compare a produced text file against its golden reference.
///
/// Missing golden is ERROR (harness misconfiguration), missing produced
/// file is ERROR (broken invocation), content mismatch is FAIL.
pub fn compare_text(produced: &Path, golden: &Path) -> Result<()> {
    if !produced.is_file() {
        return Err(HarnessError::MissingArtifact {
            path: produced.to_path_buf(),
        });
    }
    let produced_text = std::fs::read_to_string(produced)?;
    compare_text_content(&produced_text, produced, golden)
}

/// Compare already-captured text (e.g. compiler output) against a golden
/// file. `produced_label` names the text's origin in diagnostics.
pub fn compare_text_content(
    produced_text: &str,
    produced_label: &Path,
    golden: &Path,
) -> Result<()> {
    if !golden.is_file() {
        return Err(HarnessError::MissingGolden {
            path: golden.to_path_buf(),
        });
    }
    let golden_text = std::fs::read_to_string(golden)?;
    match first_divergence(&golden_text, produced_text) {
        None => {
            debug!(
                produced = %produced_label.display(),
                golden = %golden.display(),
                "text artifacts identical after normalization"
            );
            Ok(())
        }
        Some(divergence) => Err(HarnessError::ArtifactMismatch {
            produced: produced_label.to_path_buf(),
            golden: golden.to_path_buf(),
            diagnostic: divergence.to_string(),
        }),
    }
}
