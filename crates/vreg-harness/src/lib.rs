//! Test-case execution and verification engine for HDL-toolchain
//! regressions.
//!
//! The engine drives an external compiler/simulator through declared
//! scenarios, captures its output, extracts structured facts from it, and
//! verifies those facts against golden expectations, resolving exactly one
//! PASS/FAIL/ERROR verdict per test case. Suite-level concerns (test
//! discovery, scheduling, CLI) live outside; the engine consumes one
//! scheduling slot per case and reports one verdict per slot.
//!
//! A lint-only case asserting toolchain statistics:
//!
//! ```no_run
//! use vreg_harness::{Scenario, TestCase};
//!
//! # fn main() -> vreg_error::Result<()> {
//! let report = TestCase::builder("t/t_dfg_true_cycle_bad.v")
//!     .scenario(Scenario::Lint)
//!     .flags(["--stats", "-Wno-fatal", "--no-skip-identical"])
//!     .expect_golden()
//!     .build()?
//!     .drive(|t| {
//!         t.lint(&[])?;
//!         t.file_grep(t.stats_path(), r"DFG pre inline BreakCycles, true cycle\s+(\d+)", 1)?;
//!         t.file_grep(t.stats_path(), r"DFG post inline BreakCycles, true cycle\s+(\d+)", 1)?;
//!         t.file_grep(t.stats_path(), r"DFG scoped BreakCycles, true cycle\s+(\d+)", 1)?;
//!         t.passes();
//!         Ok(())
//!     });
//! println!("{}", report.verdict.name());
//! # Ok(())
//! # }
//! ```
//!
//! A compile-and-simulate case comparing a SAIF trace against its golden:
//!
//! ```no_run
//! use vreg_harness::{Scenario, TestCase};
//!
//! # fn main() -> vreg_error::Result<()> {
//! let report = TestCase::builder("t/t_interface_ref_trace.v")
//!     .scenario(Scenario::Simulate)
//!     .golden_filename("t/t_interface_ref_trace_saif.out")
//!     .build()?
//!     .drive(|t| {
//!         t.compile(&["--trace-structs", "--trace-saif"])?;
//!         t.execute()?;
//!         t.saif_identical(t.trace_path(), t.golden_path())?;
//!         t.passes();
//!         Ok(())
//!     });
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod extract;
pub mod invocation;
pub mod runner;
pub mod saif;
pub mod scenario;
pub mod testcase;
pub mod verdict;

pub use extract::{Expected, FactPattern};
pub use invocation::Invocation;
pub use runner::{CancelToken, ExecutionResult, ProcessRunner};
pub use scenario::Scenario;
pub use testcase::{TestCase, TestCaseBuilder};
pub use verdict::{CaseReport, SuiteTally, Verdict, VerdictAggregator};
