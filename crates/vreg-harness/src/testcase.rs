//! Test-case declaration and lifecycle.
//!
//! A [`TestCase`] is declared once per test file, immutable in its
//! configuration after [`TestCaseBuilder::build`], and driven imperatively:
//! invocations first (`lint`, `compile`, `execute`), then assertions against
//! the artifacts those invocations produced (`file_grep`,
//! `files_identical`, `saif_identical`), then the explicit `passes` signal.
//!
//! Every operation records its outcome with the case's verdict aggregator
//! and returns it, so a body can `?`-propagate. Once the verdict is
//! terminal, further operations short-circuit to `Ok` without evaluating
//! anything; the first failure stays the attributable one either way.
//!
//! The process runner is injected at construction, not reached through
//! shared process state, so a suite runner can wire one cancellation token
//! through every case it schedules.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use vreg_error::{HarnessError, Result};

use crate::compare;
use crate::extract::{self, Expected, FactPattern};
use crate::invocation::Invocation;
use crate::runner::{ProcessRunner, DEFAULT_TIMEOUT};
use crate::saif;
use crate::scenario::Scenario;
use crate::verdict::{CaseReport, VerdictAggregator};

/// Label used in diagnostics when comparing captured toolchain output
/// rather than a file on disk.
const CAPTURED_OUTPUT_LABEL: &str = "(captured output)";

/// One declared regression test case.
#[derive(Debug)]
pub struct TestCase {
    name: String,
    scenarios: Vec<Scenario>,
    flags: Vec<String>,
    toolchain: PathBuf,
    top_filename: PathBuf,
    golden_filename: PathBuf,
    stats_filename: PathBuf,
    trace_filename: PathBuf,
    model_filename: PathBuf,
    work_dir: PathBuf,
    timeout: Duration,
    expect_failure: bool,
    compare_lint_output: bool,
    runner: ProcessRunner,
    aggregator: VerdictAggregator,
    completed_invocations: u32,
    last_output: Option<String>,
}

impl TestCase {
    /// Start declaring a test case for the given top-level source file.
    ///
    /// The case name derives from the file stem; artifact paths derive from
    /// the name unless overridden on the builder.
    pub fn builder(top_filename: impl AsRef<Path>) -> TestCaseBuilder {
        TestCaseBuilder::new(top_filename.as_ref())
    }

    /// Test case name (top-level file stem).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared scenarios.
    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Working directory owned exclusively by this case.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone()
    }

    /// Expected statistics artifact path.
    #[must_use]
    pub fn stats_path(&self) -> PathBuf {
        self.stats_filename.clone()
    }

    /// Expected trace artifact path.
    #[must_use]
    pub fn trace_path(&self) -> PathBuf {
        self.trace_filename.clone()
    }

    /// Golden reference path.
    #[must_use]
    pub fn golden_path(&self) -> PathBuf {
        self.golden_filename.clone()
    }

    /// Built model executable path.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.model_filename.clone()
    }

    /// Compose the toolchain invocation for a scenario without running it.
    ///
    /// Pure: no side effects. `UndeclaredScenario` when the case did not
    /// declare the scenario.
    pub fn compose(&self, scenario: Scenario, extra_flags: &[&str]) -> Result<Invocation> {
        if !self.scenarios.contains(&scenario) {
            return Err(HarnessError::UndeclaredScenario {
                case: self.name.clone(),
                scenario: scenario.name().to_owned(),
            });
        }
        Ok(Invocation::compose(
            &self.toolchain,
            &self.work_dir,
            self.timeout,
            scenario,
            &self.flags,
            extra_flags,
            &self.top_filename,
            &self.stats_filename,
        ))
    }

    /// Run the lint pipeline.
    ///
    /// When the builder enabled golden comparison, the captured toolchain
    /// output (stdout then stderr, normalized) is compared against the
    /// golden file after the run.
    pub fn lint(&mut self, extra_flags: &[&str]) -> Result<()> {
        self.run_scenario(Scenario::Lint, extra_flags)?;
        if self.compare_lint_output {
            self.assert_with(|case| {
                let output = case.last_output.clone().unwrap_or_default();
                compare::compare_text_content(
                    &output,
                    Path::new(CAPTURED_OUTPUT_LABEL),
                    &case.golden_filename,
                )
            })?;
        }
        Ok(())
    }

    /// Run the compile stage of the simulate pipeline.
    pub fn compile(&mut self, extra_flags: &[&str]) -> Result<()> {
        self.run_scenario(Scenario::Simulate, extra_flags)
    }

    /// Run the built model executable.
    pub fn execute(&mut self) -> Result<()> {
        if self.aggregator.is_terminal() {
            return Ok(());
        }
        self.aggregator.begin();
        let outcome = self.execute_inner();
        self.record_run(outcome)
    }

    fn execute_inner(&mut self) -> Result<()> {
        // Only a simulate case builds a model worth executing.
        if !self.scenarios.contains(&Scenario::Simulate) {
            return Err(HarnessError::UndeclaredScenario {
                case: self.name.clone(),
                scenario: Scenario::Simulate.name().to_owned(),
            });
        }
        if !self.model_filename.is_file() {
            return Err(HarnessError::MissingArtifact {
                path: self.model_filename.clone(),
            });
        }
        let invocation = Invocation::bare(&self.model_filename, &self.work_dir, self.timeout);
        let result = self.runner.run(&invocation)?;
        result.require_success(&self.model_filename.display().to_string())?;
        self.completed_invocations += 1;
        self.last_output = Some(result.combined_output());
        info!(case = %self.name, wall_ms = result.wall.as_millis() as u64, "model executed");
        Ok(())
    }

    /// Assert that the first line of `path` matching `pattern` captures a
    /// value equal to `expected` (capture group 1).
    pub fn file_grep(
        &mut self,
        path: impl AsRef<Path>,
        pattern: &str,
        expected: impl Into<Expected>,
    ) -> Result<()> {
        self.file_grep_capture(path, pattern, 1, expected)
    }

    /// [`Self::file_grep`] with an explicit capture group index.
    pub fn file_grep_capture(
        &mut self,
        path: impl AsRef<Path>,
        pattern: &str,
        capture: usize,
        expected: impl Into<Expected>,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let expected = expected.into();
        self.assert_with(|_| {
            let compiled = FactPattern::new(pattern, capture)?;
            extract::assert_capture(&path, &compiled, &expected)
        })
    }

    /// Assert that no line of `path` matches `pattern`.
    pub fn file_grep_not(&mut self, path: impl AsRef<Path>, pattern: &str) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        self.assert_with(|_| {
            let compiled = FactPattern::new(pattern, 0)?;
            extract::assert_absent(&path, &compiled)
        })
    }

    /// Assert that a produced text artifact equals its golden reference
    /// after normalization.
    pub fn files_identical(
        &mut self,
        produced: impl AsRef<Path>,
        golden: impl AsRef<Path>,
    ) -> Result<()> {
        let produced = produced.as_ref().to_path_buf();
        let golden = golden.as_ref().to_path_buf();
        self.assert_with(|_| compare::compare_text(&produced, &golden))
    }

    /// Assert that a produced SAIF trace equals its golden reference
    /// structurally.
    pub fn saif_identical(
        &mut self,
        produced: impl AsRef<Path>,
        golden: impl AsRef<Path>,
    ) -> Result<()> {
        let produced = produced.as_ref().to_path_buf();
        let golden = golden.as_ref().to_path_buf();
        self.assert_with(|_| saif::compare_trace(&produced, &golden))
    }

    /// Explicit terminal pass declaration. Without it the case finalizes
    /// ERROR even when every assertion held.
    pub fn passes(&mut self) {
        self.aggregator.signal_pass();
    }

    /// Resolve this case's verdict.
    #[must_use]
    pub fn finalize(self) -> CaseReport {
        self.aggregator.finalize()
    }

    /// Run a test body and resolve the verdict, isolating its failure to
    /// this case.
    ///
    /// The body may `?`-propagate; the error is already recorded by the
    /// operation that produced it, so the verdict and its first-failure
    /// diagnostic survive the early return.
    #[must_use]
    pub fn drive<F>(mut self, body: F) -> CaseReport
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if let Err(err) = body(&mut self) {
            // No-op when the failing operation already recorded it.
            self.aggregator.record_run_failure(&err);
        }
        self.finalize()
    }

    fn run_scenario(&mut self, scenario: Scenario, extra_flags: &[&str]) -> Result<()> {
        if self.aggregator.is_terminal() {
            return Ok(());
        }
        self.aggregator.begin();
        let outcome = self.run_scenario_inner(scenario, extra_flags);
        self.record_run(outcome)
    }

    fn run_scenario_inner(&mut self, scenario: Scenario, extra_flags: &[&str]) -> Result<()> {
        let invocation = self.compose(scenario, extra_flags)?;
        debug!(
            case = %self.name,
            scenario = scenario.name(),
            command = %invocation.command_line(),
            "running scenario"
        );
        let result = self.runner.run(&invocation)?;
        if self.expect_failure {
            result.require_failure(&self.toolchain.display().to_string())?;
        } else {
            result.require_success(&self.toolchain.display().to_string())?;
        }
        self.completed_invocations += 1;
        self.last_output = Some(result.combined_output());
        info!(
            case = %self.name,
            scenario = scenario.name(),
            exit_code = result.exit_code,
            wall_ms = result.wall.as_millis() as u64,
            "scenario completed"
        );
        Ok(())
    }

    /// Evaluate one assertion: short-circuit when terminal, guard the
    /// completed-invocation invariant, record the outcome.
    fn assert_with<F>(&mut self, check: F) -> Result<()>
    where
        F: FnOnce(&Self) -> Result<()>,
    {
        if self.aggregator.is_terminal() {
            return Ok(());
        }
        if self.completed_invocations == 0 {
            let err = HarnessError::AssertionBeforeInvocation {
                case: self.name.clone(),
            };
            self.aggregator.record_failure(&err);
            return Err(err);
        }
        let outcome = check(self);
        self.record_assertion(outcome)
    }

    fn record_assertion(&mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.aggregator.record_ok();
                Ok(())
            }
            Err(err) => {
                self.aggregator.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Record an invocation outcome. A successful run is not an assertion,
    /// and neither is its failure; only the verdict and diagnostic move.
    fn record_run(&mut self, outcome: Result<()>) -> Result<()> {
        if let Err(err) = outcome {
            self.aggregator.record_run_failure(&err);
            return Err(err);
        }
        Ok(())
    }
}

/// Builder for [`TestCase`]. Configuration is immutable after `build`.
#[derive(Debug)]
pub struct TestCaseBuilder {
    top_filename: PathBuf,
    scenarios: Vec<Scenario>,
    flags: Vec<String>,
    toolchain: PathBuf,
    work_dir: Option<PathBuf>,
    golden_filename: Option<PathBuf>,
    stats_filename: Option<PathBuf>,
    trace_filename: Option<PathBuf>,
    model_filename: Option<PathBuf>,
    timeout: Duration,
    expect_failure: bool,
    compare_lint_output: bool,
    runner: Option<ProcessRunner>,
}

impl TestCaseBuilder {
    fn new(top_filename: &Path) -> Self {
        Self {
            top_filename: top_filename.to_path_buf(),
            scenarios: Vec::new(),
            flags: Vec::new(),
            toolchain: PathBuf::from("verilator"),
            work_dir: None,
            golden_filename: None,
            stats_filename: None,
            trace_filename: None,
            model_filename: None,
            timeout: DEFAULT_TIMEOUT,
            expect_failure: false,
            compare_lint_output: false,
            runner: None,
        }
    }

    /// Declare one supported scenario.
    #[must_use]
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Declare the supported scenarios.
    #[must_use]
    pub fn scenarios(mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    /// Base flag fragments, applied to every invocation of this case.
    #[must_use]
    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Path of the toolchain binary (default `verilator` on `PATH`).
    #[must_use]
    pub fn toolchain(mut self, path: impl AsRef<Path>) -> Self {
        self.toolchain = path.as_ref().to_path_buf();
        self
    }

    /// Working/output directory (default `obj_dir/<name>` beside the top
    /// file).
    #[must_use]
    pub fn work_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.work_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Golden reference path (default `<top stem>.out` beside the top file).
    #[must_use]
    pub fn golden_filename(mut self, path: impl AsRef<Path>) -> Self {
        self.golden_filename = Some(path.as_ref().to_path_buf());
        self
    }

    /// Statistics artifact path (default `V<name>__stats.txt` in the work
    /// dir).
    #[must_use]
    pub fn stats_filename(mut self, path: impl AsRef<Path>) -> Self {
        self.stats_filename = Some(path.as_ref().to_path_buf());
        self
    }

    /// Trace artifact path (default `simx.saif` in the work dir).
    #[must_use]
    pub fn trace_filename(mut self, path: impl AsRef<Path>) -> Self {
        self.trace_filename = Some(path.as_ref().to_path_buf());
        self
    }

    /// Built model executable path (default `V<name>` in the work dir).
    #[must_use]
    pub fn model_filename(mut self, path: impl AsRef<Path>) -> Self {
        self.model_filename = Some(path.as_ref().to_path_buf());
        self
    }

    /// Per-invocation timeout (default sized for simulation workloads).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Declare that toolchain invocations are expected to exit non-zero.
    #[must_use]
    pub fn expect_failure(mut self) -> Self {
        self.expect_failure = true;
        self
    }

    /// Compare captured lint output against the golden file after `lint`.
    #[must_use]
    pub fn expect_golden(mut self) -> Self {
        self.compare_lint_output = true;
        self
    }

    /// Inject the process runner (suite-level cancellation wiring).
    #[must_use]
    pub fn runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Validate the declaration and construct the case.
    ///
    /// Configuration problems surface here, before anything runs: a missing
    /// top file or an empty scenario set is rejected immediately.
    pub fn build(self) -> Result<TestCase> {
        if !self.top_filename.is_file() {
            return Err(HarnessError::MissingInput {
                path: self.top_filename,
            });
        }
        let name = self
            .top_filename
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.scenarios.is_empty() {
            return Err(HarnessError::UndeclaredScenario {
                case: name,
                scenario: "(none declared)".to_owned(),
            });
        }

        let top_dir = self
            .top_filename
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let work_dir = self
            .work_dir
            .unwrap_or_else(|| top_dir.join("obj_dir").join(&name));
        let golden_filename = self
            .golden_filename
            .unwrap_or_else(|| top_dir.join(format!("{name}.out")));
        let stats_filename = self
            .stats_filename
            .unwrap_or_else(|| work_dir.join(format!("V{name}__stats.txt")));
        let trace_filename = self
            .trace_filename
            .unwrap_or_else(|| work_dir.join("simx.saif"));
        let model_filename = self
            .model_filename
            .unwrap_or_else(|| work_dir.join(format!("V{name}")));

        let aggregator = VerdictAggregator::new(&name);
        Ok(TestCase {
            name,
            scenarios: self.scenarios,
            flags: self.flags,
            toolchain: self.toolchain,
            top_filename: self.top_filename,
            golden_filename,
            stats_filename,
            trace_filename,
            model_filename,
            work_dir,
            timeout: self.timeout,
            expect_failure: self.expect_failure,
            compare_lint_output: self.compare_lint_output,
            runner: self.runner.unwrap_or_default(),
            aggregator,
            completed_invocations: 0,
            last_output: None,
        })
    }
}
