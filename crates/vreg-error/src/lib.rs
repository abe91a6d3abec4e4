//! Error taxonomy for the vreg regression harness.
//!
//! Every failure mode the engine can hit maps onto exactly one of two
//! verdict classes:
//!
//! - [`VerdictClass::Fail`] — a semantic regression: the toolchain ran, but
//!   what it produced does not match expectations (missing pattern, wrong
//!   captured value, divergent artifact).
//! - [`VerdictClass::Error`] — a harness or integration problem: the test
//!   could not be evaluated at all (bad configuration, spawn failure,
//!   timeout, missing artifact or golden file).
//!
//! The distinction matters downstream: FAIL means "investigate the design
//! or the toolchain change", ERROR means "investigate the test setup".

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`HarnessError`] into the verdict it forces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerdictClass {
    /// Assertion mismatch: the run completed but its facts were wrong.
    Fail,
    /// The test could not be evaluated (configuration, execution, or
    /// harness-integration problem).
    Error,
}

/// Primary error type for harness operations.
#[derive(Error, Debug)]
pub enum HarnessError {
    // === Configuration ===
    /// A test case composed an invocation for a scenario it never declared.
    #[error("scenario '{scenario}' not declared by test case '{case}'")]
    UndeclaredScenario { case: String, scenario: String },

    /// A required input file reference does not exist.
    #[error("missing required input file: '{path}'")]
    MissingInput { path: PathBuf },

    /// A fact pattern failed to compile.
    #[error("invalid pattern '{pattern}': {detail}")]
    BadPattern { pattern: String, detail: String },

    /// An assertion was issued before any invocation completed.
    #[error("test case '{case}' asserted against artifacts before running any invocation")]
    AssertionBeforeInvocation { case: String },

    // === Execution ===
    /// The child process could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child process outlived its deadline and was killed.
    #[error("'{program}' exceeded the {timeout_secs}s timeout and was killed")]
    Timeout { program: String, timeout_secs: u64 },

    /// The run was cancelled from outside (suite abort) and the child killed.
    #[error("run of '{program}' cancelled by suite abort")]
    Cancelled { program: String },

    /// The toolchain exited non-zero where success was required.
    #[error("'{program}' exited with status {exit_code}: {stderr_tail}")]
    ToolchainFailed {
        program: String,
        exit_code: i32,
        stderr_tail: String,
    },

    /// The toolchain succeeded where the test declared failure was expected.
    #[error("'{program}' exited successfully but the test case expects failure")]
    UnexpectedSuccess { program: String },

    /// An output artifact the invocation was required to produce is absent.
    #[error("expected output artifact missing after run: '{path}'")]
    MissingArtifact { path: PathBuf },

    /// The checked-in reference file for a comparison is absent.
    #[error("golden file missing: '{path}'")]
    MissingGolden { path: PathBuf },

    // === Verification ===
    /// No line of the scanned artifact matched the pattern.
    #[error("pattern '{pattern}' matched no line of '{path}'")]
    PatternNotFound { pattern: String, path: PathBuf },

    /// A line matched where the test requires the pattern to be absent.
    #[error("forbidden pattern '{pattern}' matched line {line} of '{path}': {text}")]
    PatternFound {
        pattern: String,
        path: PathBuf,
        line: usize,
        text: String,
    },

    /// A capture could not be parsed as the expected numeric type.
    #[error("capture '{capture}' from pattern '{pattern}' is not numeric")]
    CaptureParse { pattern: String, capture: String },

    /// A captured value did not equal the expected value.
    #[error("pattern '{pattern}' in '{path}': expected {expected}, got {actual}")]
    ValueMismatch {
        pattern: String,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Produced and golden artifacts diverge; the diagnostic renders the
    /// first divergence only.
    #[error("artifact mismatch between '{produced}' and '{golden}': {diagnostic}")]
    ArtifactMismatch {
        produced: PathBuf,
        golden: PathBuf,
        diagnostic: String,
    },

    /// A trace file could not be decoded.
    #[error("malformed trace file '{path}': {detail}")]
    TraceParse { path: PathBuf, detail: String },

    // === Lifecycle ===
    /// The test case body ended without an explicit pass signal.
    #[error("test case '{case}' finished without signalling completion")]
    NeverCompleted { case: String },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// The verdict this error forces on the owning test case.
    ///
    /// Only genuine assertion mismatches classify as FAIL; everything that
    /// prevents evaluation is ERROR.
    #[must_use]
    pub fn verdict_class(&self) -> VerdictClass {
        match self {
            Self::PatternNotFound { .. }
            | Self::PatternFound { .. }
            | Self::ValueMismatch { .. }
            | Self::ArtifactMismatch { .. }
            | Self::UnexpectedSuccess { .. } => VerdictClass::Fail,
            Self::UndeclaredScenario { .. }
            | Self::MissingInput { .. }
            | Self::BadPattern { .. }
            | Self::AssertionBeforeInvocation { .. }
            | Self::Spawn { .. }
            | Self::Timeout { .. }
            | Self::Cancelled { .. }
            | Self::ToolchainFailed { .. }
            | Self::MissingArtifact { .. }
            | Self::MissingGolden { .. }
            | Self::CaptureParse { .. }
            | Self::TraceParse { .. }
            | Self::NeverCompleted { .. }
            | Self::Io(..) => VerdictClass::Error,
        }
    }
}

/// Result alias used throughout the harness crates.
pub type Result<T> = std::result::Result<T, HarnessError>;
