//! Structural comparison of SAIF activity traces.
//!
//! SAIF (Switching Activity Interchange Format) is an s-expression format:
//! a `SAIFILE` form holding header metadata, a `DURATION`, and a tree of
//! `INSTANCE` forms whose `NET` entries carry per-signal activity counters
//! (`T0`, `T1`, `TX`, `TZ`, `TB`, `TC`, `IG`).
//!
//! Comparison decodes both files into an ordered sequence of
//! (hierarchical signal path, counter map) records and requires exact
//! equality of the decoded sequence plus the duration and timescale. This
//! is stricter than a text diff yet tolerant of everything the toolchain is
//! allowed to vary between runs: header metadata (`DATE`, `VENDOR`,
//! `PROGRAM_NAME`, `VERSION`, `DIVIDER`), counter ordering within a net,
//! numeric padding, and whitespace never participate.
//!
//! On mismatch only the first divergent record is rendered.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use vreg_error::{HarnessError, Result};

// ---------------------------------------------------------------------------
// Decoded model
// ---------------------------------------------------------------------------

/// Activity counters of one signal over the trace duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalActivity {
    /// Hierarchical path: instance names from the root, then the signal.
    pub path: Vec<String>,
    /// Counter name → value. The map is ordered, so incidental counter
    /// ordering in the file cannot affect equality.
    pub counters: BTreeMap<String, u64>,
}

impl std::fmt::Display for SignalActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {{", self.path.join("."))?;
        let mut first = true;
        for (name, value) in &self.counters {
            if !first {
                write!(f, ",")?;
            }
            write!(f, " {name} {value}")?;
            first = false;
        }
        write!(f, " }}")
    }
}

/// A decoded SAIF trace: duration context plus ordered signal records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaifTrace {
    /// Trace duration in timescale units.
    pub duration: u64,
    /// Timescale as written (e.g. `1 ps`), when present.
    pub timescale: Option<String>,
    /// Signal records in file traversal order.
    pub records: Vec<SignalActivity>,
}

// ---------------------------------------------------------------------------
// S-expression reader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

impl SExpr {
    fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(s) => Some(s.as_str()),
            Self::List(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Atom(String),
}

fn tokenize(text: &str, path: &Path) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1_usize;
    while let Some(ch) = chars.next() {
        match ch {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '"' => {
                // Quoted string: header metadata values. Kept as one atom.
                let mut atom = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(escaped) = chars.next() {
                                atom.push(escaped);
                            }
                        }
                        Some('\n') => {
                            line += 1;
                            atom.push('\n');
                        }
                        Some(c) => atom.push(c),
                        None => {
                            return Err(HarnessError::TraceParse {
                                path: path.to_path_buf(),
                                detail: format!("unterminated string at line {line}"),
                            });
                        }
                    }
                }
                tokens.push(Token::Atom(atom));
            }
            c => {
                let mut atom = String::new();
                atom.push(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == '(' || next == ')' {
                        break;
                    }
                    atom.push(next);
                    let _ = chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }
    Ok(tokens)
}

fn parse_sexpr(tokens: &[Token], pos: &mut usize, path: &Path) -> Result<SExpr> {
    match tokens.get(*pos) {
        Some(Token::Atom(atom)) => {
            *pos += 1;
            Ok(SExpr::Atom(atom.clone()))
        }
        Some(Token::Open) => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                match tokens.get(*pos) {
                    Some(Token::Close) => {
                        *pos += 1;
                        return Ok(SExpr::List(items));
                    }
                    Some(_) => items.push(parse_sexpr(tokens, pos, path)?),
                    None => {
                        return Err(HarnessError::TraceParse {
                            path: path.to_path_buf(),
                            detail: "unbalanced parentheses".to_owned(),
                        });
                    }
                }
            }
        }
        Some(Token::Close) | None => Err(HarnessError::TraceParse {
            path: path.to_path_buf(),
            detail: "expected expression".to_owned(),
        }),
    }
}

// ---------------------------------------------------------------------------
// SAIF walk
// ---------------------------------------------------------------------------

/// Decode SAIF text into its structural model.
pub fn parse_saif(text: &str, path: &Path) -> Result<SaifTrace> {
    let tokens = tokenize(text, path)?;
    let mut pos = 0;
    let root = parse_sexpr(&tokens, &mut pos, path)?;
    let SExpr::List(items) = root else {
        return Err(malformed(path, "top-level form is not a list"));
    };
    if items.first().and_then(SExpr::as_atom) != Some("SAIFILE") {
        return Err(malformed(path, "missing SAIFILE header"));
    }

    let mut duration = None;
    let mut timescale = None;
    let mut records = Vec::new();
    let mut scope = Vec::new();

    for item in &items[1..] {
        let SExpr::List(form) = item else { continue };
        match form.first().and_then(SExpr::as_atom) {
            Some("DURATION") => {
                let value = form
                    .get(1)
                    .and_then(SExpr::as_atom)
                    .ok_or_else(|| malformed(path, "DURATION without a value"))?;
                duration = Some(parse_count(value, path)?);
            }
            Some("TIMESCALE") => {
                let units: Vec<&str> =
                    form[1..].iter().filter_map(SExpr::as_atom).collect();
                timescale = Some(units.join(" "));
            }
            Some("INSTANCE") => walk_instance(form, &mut scope, &mut records, path)?,
            // DATE, VENDOR, PROGRAM_NAME, VERSION, DIVIDER, DIRECTION,
            // SAIFVERSION, DESIGN: metadata the toolchain may vary freely.
            _ => {}
        }
    }

    let duration = duration.ok_or_else(|| malformed(path, "missing DURATION"))?;
    Ok(SaifTrace {
        duration,
        timescale,
        records,
    })
}

fn walk_instance(
    form: &[SExpr],
    scope: &mut Vec<String>,
    records: &mut Vec<SignalActivity>,
    path: &Path,
) -> Result<()> {
    let name = form
        .get(1)
        .and_then(SExpr::as_atom)
        .ok_or_else(|| malformed(path, "INSTANCE without a name"))?;
    scope.push(name.to_owned());

    for item in &form[2..] {
        let SExpr::List(child) = item else { continue };
        match child.first().and_then(SExpr::as_atom) {
            Some("NET" | "PORT") => {
                for entry in &child[1..] {
                    let SExpr::List(signal) = entry else { continue };
                    records.push(decode_signal(signal, scope, path)?);
                }
            }
            Some("INSTANCE") => walk_instance(child, scope, records, path)?,
            _ => {}
        }
    }

    let _ = scope.pop();
    Ok(())
}

fn decode_signal(
    signal: &[SExpr],
    scope: &[String],
    path: &Path,
) -> Result<SignalActivity> {
    let name = signal
        .first()
        .and_then(SExpr::as_atom)
        .ok_or_else(|| malformed(path, "NET entry without a signal name"))?;
    let mut counters = BTreeMap::new();
    for item in &signal[1..] {
        let SExpr::List(counter) = item else { continue };
        let (Some(key), Some(value)) = (
            counter.first().and_then(SExpr::as_atom),
            counter.get(1).and_then(SExpr::as_atom),
        ) else {
            return Err(malformed(path, "malformed counter entry"));
        };
        let _ = counters.insert(key.to_owned(), parse_count(value, path)?);
    }
    let mut full_path = scope.to_vec();
    full_path.push(name.to_owned());
    Ok(SignalActivity {
        path: full_path,
        counters,
    })
}

fn parse_count(value: &str, path: &Path) -> Result<u64> {
    value.parse().map_err(|_| {
        malformed(path, &format!("expected a number, got '{value}'"))
    })
}

fn malformed(path: &Path, detail: &str) -> HarnessError {
    HarnessError::TraceParse {
        path: path.to_path_buf(),
        detail: detail.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Load and decode a SAIF trace file.
pub fn load_saif(path: &Path) -> Result<SaifTrace> {
    let text = std::fs::read_to_string(path)?;
    parse_saif(&text, path)
}

/// Compare a produced SAIF trace against its golden reference structurally.
pub fn compare_trace(produced: &Path, golden: &Path) -> Result<()> {
    if !produced.is_file() {
        return Err(HarnessError::MissingArtifact {
            path: produced.to_path_buf(),
        });
    }
    if !golden.is_file() {
        return Err(HarnessError::MissingGolden {
            path: golden.to_path_buf(),
        });
    }
    let produced_trace = load_saif(produced)?;
    let golden_trace = load_saif(golden)?;

    if let Some(diagnostic) = trace_divergence(&golden_trace, &produced_trace) {
        return Err(HarnessError::ArtifactMismatch {
            produced: produced.to_path_buf(),
            golden: golden.to_path_buf(),
            diagnostic,
        });
    }
    debug!(
        produced = %produced.display(),
        golden = %golden.display(),
        records = produced_trace.records.len(),
        "traces structurally identical"
    );
    Ok(())
}

/// First semantic divergence between two decoded traces, rendered for the
/// failure diagnostic; `None` when identical.
#[must_use]
pub fn trace_divergence(golden: &SaifTrace, produced: &SaifTrace) -> Option<String> {
    if golden.duration != produced.duration {
        return Some(format!(
            "duration: expected {}, got {}",
            golden.duration, produced.duration
        ));
    }
    if golden.timescale != produced.timescale {
        return Some(format!(
            "timescale: expected {:?}, got {:?}",
            golden.timescale, produced.timescale
        ));
    }
    for (idx, (exp, act)) in golden.records.iter().zip(&produced.records).enumerate() {
        if exp != act {
            return Some(format!(
                "record {idx}: expected {exp}, got {act}"
            ));
        }
    }
    if golden.records.len() != produced.records.len() {
        let idx = golden.records.len().min(produced.records.len());
        let detail = golden
            .records
            .get(idx)
            .map(|r| format!("golden has {r}"))
            .or_else(|| produced.records.get(idx).map(|r| format!("produced has {r}")))
            .unwrap_or_default();
        return Some(format!(
            "record count: expected {}, got {}; at record {idx} {detail}",
            golden.records.len(),
            produced.records.len()
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = r#"(SAIFILE
  (SAIFVERSION "2.0")
  (DIRECTION "backward")
  (DESIGN )
  (DATE "Tue Aug 12 10:00:00 2025")
  (VENDOR "Toolchain")
  (PROGRAM_NAME "sim")
  (VERSION "5.0")
  (DIVIDER / )
  (TIMESCALE 1 ps)
  (DURATION 1000)
  (INSTANCE top
    (INSTANCE t
      (NET
        (clk
          (T0 500) (T1 500) (TX 0) (TC 10) (IG 0)
        )
        (rst
          (T0 900) (T1 100) (TX 0) (TC 2) (IG 0)
        )
      )
    )
  )
)
"#;

    fn write_trace(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn decodes_hierarchy_and_counters() {
        let trace = parse_saif(TRACE, Path::new("simx.saif")).unwrap();
        assert_eq!(trace.duration, 1000);
        assert_eq!(trace.timescale.as_deref(), Some("1 ps"));
        assert_eq!(trace.records.len(), 2);
        assert_eq!(trace.records[0].path, ["top", "t", "clk"]);
        assert_eq!(trace.records[0].counters["TC"], 10);
        assert_eq!(trace.records[1].path, ["top", "t", "rst"]);
    }

    #[test]
    fn comparison_is_reflexive() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_trace(dir.path(), "a.saif", TRACE);
        let b = write_trace(dir.path(), "b.saif", TRACE);
        compare_trace(&a, &b).unwrap();
    }

    #[test]
    fn cosmetic_differences_are_tolerated() {
        // Same semantic content: different date/vendor, reordered counters,
        // numeric padding, collapsed whitespace.
        let cosmetic = r#"(SAIFILE (SAIFVERSION "2.0") (DIRECTION "backward")
  (DATE "Wed Aug 13 11:30:00 2025") (VENDOR "Other Vendor 0007")
  (PROGRAM_NAME "sim-rc2") (VERSION "5.1") (DIVIDER / )
  (TIMESCALE 1 ps) (DURATION 01000)
  (INSTANCE top (INSTANCE t (NET
    (clk (TC 10) (IG 0) (T1 0500) (T0 500) (TX 0))
    (rst (IG 0) (TC 2) (TX 0) (T0 900) (T1 100))))))
"#;
        let dir = tempfile::tempdir().unwrap();
        let produced = write_trace(dir.path(), "produced.saif", cosmetic);
        let golden = write_trace(dir.path(), "golden.saif", TRACE);
        compare_trace(&produced, &golden).unwrap();
    }

    #[test]
    fn differing_activity_is_fail_with_first_divergent_record() {
        let changed = TRACE.replace("(TC 10)", "(TC 11)");
        let dir = tempfile::tempdir().unwrap();
        let produced = write_trace(dir.path(), "produced.saif", &changed);
        let golden = write_trace(dir.path(), "golden.saif", TRACE);
        let err = compare_trace(&produced, &golden).unwrap_err();
        assert_eq!(err.verdict_class(), vreg_error::VerdictClass::Fail);
        let msg = err.to_string();
        assert!(msg.contains("top.t.clk"), "diagnostic: {msg}");
        assert!(msg.contains("TC 10"), "diagnostic: {msg}");
        assert!(msg.contains("TC 11"), "diagnostic: {msg}");
        // Only the first divergence is rendered; rst never appears.
        assert!(!msg.contains("rst"), "diagnostic: {msg}");
    }

    #[test]
    fn differing_duration_is_reported_before_records() {
        let changed = TRACE.replace("(DURATION 1000)", "(DURATION 2000)");
        let golden = parse_saif(TRACE, Path::new("g")).unwrap();
        let produced = parse_saif(&changed, Path::new("p")).unwrap();
        let diag = trace_divergence(&golden, &produced).unwrap();
        assert!(diag.contains("duration"));
    }

    #[test]
    fn missing_record_is_reported_with_count() {
        let truncated = TRACE.replace(
            "(rst\n          (T0 900) (T1 100) (TX 0) (TC 2) (IG 0)\n        )",
            "",
        );
        let golden = parse_saif(TRACE, Path::new("g")).unwrap();
        let produced = parse_saif(&truncated, Path::new("p")).unwrap();
        let diag = trace_divergence(&golden, &produced).unwrap();
        assert!(diag.contains("record count: expected 2, got 1"), "{diag}");
        assert!(diag.contains("rst"), "{diag}");
    }

    #[test]
    fn malformed_trace_is_error_class() {
        let dir = tempfile::tempdir().unwrap();
        let produced = write_trace(dir.path(), "bad.saif", "(SAIFILE (DURATION");
        let golden = write_trace(dir.path(), "golden.saif", TRACE);
        let err = compare_trace(&produced, &golden).unwrap_err();
        assert!(matches!(err, HarnessError::TraceParse { .. }));
        assert_eq!(err.verdict_class(), vreg_error::VerdictClass::Error);
    }

    #[test]
    fn missing_golden_is_error_class() {
        let dir = tempfile::tempdir().unwrap();
        let produced = write_trace(dir.path(), "produced.saif", TRACE);
        let err = compare_trace(&produced, &dir.path().join("absent.saif")).unwrap_err();
        assert!(matches!(err, HarnessError::MissingGolden { .. }));
    }

    #[test]
    fn duration_without_saifile_header_is_rejected() {
        let err = parse_saif("(NOTSAIF (DURATION 5))", Path::new("x")).unwrap_err();
        assert!(err.to_string().contains("SAIFILE"));
    }
}
