//! Verdict resolution for one test case, and suite-wide tallying.
//!
//! State machine: `Pending → Running → {Pass, Fail, Error}`, terminal once
//! reached. An explicit pass signal is required; absence of failures is not
//! sufficient, so a truncated test script that records assertions but never
//! signals completion finalizes as ERROR rather than silently passing.
//!
//! The aggregator is fail-fast: the first failing outcome fixes the verdict
//! and its diagnostic, and later outcomes are ignored, which makes the
//! first failure the attributable one.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, info};

use vreg_error::{HarnessError, VerdictClass};

/// Terminal classification of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// All evaluated assertions held and the case signalled completion.
    Pass,
    /// An assertion mismatch: the toolchain ran but produced wrong facts.
    Fail,
    /// The case could not be evaluated (configuration, execution, or
    /// harness-integration problem), or never signalled completion.
    Error,
}

impl Verdict {
    /// Stable uppercase name for reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        }
    }
}

impl From<VerdictClass> for Verdict {
    fn from(class: VerdictClass) -> Self {
        match class {
            VerdictClass::Fail => Self::Fail,
            VerdictClass::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Pending,
    Running,
    Terminal(Verdict),
}

/// Collects assertion outcomes for one test case and resolves its verdict.
#[derive(Debug)]
pub struct VerdictAggregator {
    case: String,
    state: State,
    assertions: u64,
    diagnostic: Option<String>,
}

impl VerdictAggregator {
    /// Fresh aggregator in `Pending` for the named case.
    #[must_use]
    pub fn new(case: &str) -> Self {
        Self {
            case: case.to_owned(),
            state: State::Pending,
            assertions: 0,
            diagnostic: None,
        }
    }

    /// Mark the case as running (first invocation issued).
    pub fn begin(&mut self) {
        if self.state == State::Pending {
            self.state = State::Running;
        }
    }

    /// Whether a terminal verdict has been reached.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, State::Terminal(_))
    }

    /// Record a passed assertion. Ignored once terminal.
    pub fn record_ok(&mut self) {
        if !self.is_terminal() {
            self.assertions += 1;
        }
    }

    /// Record a failed assertion; the first failing outcome fixes verdict
    /// and diagnostic.
    pub fn record_failure(&mut self, err: &HarnessError) {
        if self.is_terminal() {
            debug!(case = %self.case, error = %err, "outcome after terminal verdict ignored");
            return;
        }
        self.assertions += 1;
        self.diagnostic = Some(err.to_string());
        self.state = State::Terminal(err.verdict_class().into());
    }

    /// Record a failure that is not an assertion (spawn, timeout, missing
    /// input). Fixes verdict and diagnostic like [`Self::record_failure`]
    /// but leaves the assertion count alone, so reports only count
    /// evaluated checks.
    pub fn record_run_failure(&mut self, err: &HarnessError) {
        if self.is_terminal() {
            debug!(case = %self.case, error = %err, "outcome after terminal verdict ignored");
            return;
        }
        self.diagnostic = Some(err.to_string());
        self.state = State::Terminal(err.verdict_class().into());
    }

    /// Explicit terminal pass declaration. Ignored once terminal, so a
    /// trailing `passes()` cannot overwrite an earlier failure.
    pub fn signal_pass(&mut self) {
        if !self.is_terminal() {
            self.state = State::Terminal(Verdict::Pass);
        }
    }

    /// Resolve the verdict. A case still `Pending`/`Running` here never
    /// signalled completion and resolves to ERROR.
    #[must_use]
    pub fn finalize(self) -> CaseReport {
        let (verdict, diagnostic) = match self.state {
            State::Terminal(verdict) => (verdict, self.diagnostic),
            State::Pending | State::Running => (
                Verdict::Error,
                Some(
                    HarnessError::NeverCompleted {
                        case: self.case.clone(),
                    }
                    .to_string(),
                ),
            ),
        };
        info!(
            case = %self.case,
            verdict = verdict.name(),
            assertions = self.assertions,
            "test case finalized"
        );
        CaseReport {
            case: self.case,
            verdict,
            diagnostic,
            assertions: self.assertions,
        }
    }
}

/// Machine-readable terminal report for one test case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    /// Test case name.
    pub case: String,
    /// Resolved verdict.
    pub verdict: Verdict,
    /// Diagnostic of the first failure, when not PASS.
    pub diagnostic: Option<String>,
    /// Assertions evaluated before the verdict became terminal.
    pub assertions: u64,
}

impl CaseReport {
    /// JSON rendering for suite-runner persistence.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Suite tally
// ---------------------------------------------------------------------------

/// Thread-safe pass/fail/error accumulator.
///
/// Concurrent test cases finalize independently and asynchronously; this is
/// the only cross-case shared state the engine provides.
#[derive(Debug, Default)]
pub struct SuiteTally {
    passed: AtomicU64,
    failed: AtomicU64,
    errored: AtomicU64,
}

impl SuiteTally {
    /// Empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finalized verdict.
    pub fn record(&self, verdict: Verdict) {
        let counter = match verdict {
            Verdict::Pass => &self.passed,
            Verdict::Fail => &self.failed,
            Verdict::Error => &self.errored,
        };
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough snapshot for reporting.
    #[must_use]
    pub fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            passed: self.passed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a [`SuiteTally`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TallySnapshot {
    /// Cases resolved PASS.
    pub passed: u64,
    /// Cases resolved FAIL.
    pub failed: u64,
    /// Cases resolved ERROR.
    pub errored: u64,
}

impl TallySnapshot {
    /// Total cases recorded.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.passed + self.failed + self.errored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn fail_err() -> HarnessError {
        HarnessError::PatternNotFound {
            pattern: "x".into(),
            path: PathBuf::from("stats.txt"),
        }
    }

    fn error_err() -> HarnessError {
        HarnessError::Timeout {
            program: "verilator".into(),
            timeout_secs: 1,
        }
    }

    #[test]
    fn explicit_pass_is_required() {
        let mut agg = VerdictAggregator::new("t_case");
        agg.begin();
        agg.record_ok();
        agg.record_ok();
        // No signal_pass: truncated script.
        let report = agg.finalize();
        assert_eq!(report.verdict, Verdict::Error);
        assert!(report.diagnostic.unwrap().contains("without signalling"));
    }

    #[test]
    fn zero_assertions_with_pass_signal_is_pass() {
        let mut agg = VerdictAggregator::new("t_case");
        agg.signal_pass();
        let report = agg.finalize();
        assert_eq!(report.verdict, Verdict::Pass);
        assert_eq!(report.assertions, 0);
        assert!(report.diagnostic.is_none());
    }

    #[test]
    fn first_failure_is_attributable_and_sticky() {
        let mut agg = VerdictAggregator::new("t_case");
        agg.begin();
        agg.record_ok();
        agg.record_failure(&fail_err());
        // Later outcomes, including a pass signal, cannot overwrite it.
        agg.record_failure(&error_err());
        agg.signal_pass();
        let report = agg.finalize();
        assert_eq!(report.verdict, Verdict::Fail);
        assert!(report.diagnostic.unwrap().contains("pattern 'x'"));
    }

    #[test]
    fn run_failures_do_not_count_as_assertions() {
        let mut agg = VerdictAggregator::new("t_case");
        agg.begin();
        agg.record_ok();
        agg.record_run_failure(&error_err());
        let report = agg.finalize();
        assert_eq!(report.verdict, Verdict::Error);
        // Only the evaluated check counts; the timeout itself does not.
        assert_eq!(report.assertions, 1);
        assert!(report.diagnostic.unwrap().contains("timed out"));
    }

    #[test]
    fn error_class_failures_resolve_error() {
        let mut agg = VerdictAggregator::new("t_case");
        agg.begin();
        agg.record_failure(&error_err());
        let report = agg.finalize();
        assert_eq!(report.verdict, Verdict::Error);
    }

    #[test]
    fn report_serializes_uppercase_verdict() {
        let mut agg = VerdictAggregator::new("t_case");
        agg.signal_pass();
        let json = serde_json::to_string(&agg.finalize()).unwrap();
        assert!(json.contains("\"PASS\""));
    }

    #[test]
    fn tally_accumulates_across_threads() {
        let tally = Arc::new(SuiteTally::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let tally = Arc::clone(&tally);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let verdict = match i % 3 {
                        0 => Verdict::Pass,
                        1 => Verdict::Fail,
                        _ => Verdict::Error,
                    };
                    tally.record(verdict);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = tally.snapshot();
        assert_eq!(snapshot.total(), 800);
        assert_eq!(snapshot.passed, 300);
        assert_eq!(snapshot.failed, 300);
        assert_eq!(snapshot.errored, 200);
    }
}
