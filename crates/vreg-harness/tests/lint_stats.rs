//! End-to-end lint pipeline: stats extraction and golden output checks
//! against a scripted stand-in toolchain.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vreg_harness::{Scenario, SuiteTally, TestCase, Verdict};

fn write_executable(path: &Path, script: &str) {
    fs::write(path, script).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// A stand-in toolchain that writes the stats artifact the harness expects
/// (it runs with the work dir as cwd) and lints to stderr.
fn fake_lint_toolchain(dir: &Path, scoped_cycles: u32) -> PathBuf {
    let path = dir.join("fake-verilator");
    let script = format!(
        "#!/bin/sh\n\
         cat > Vt_case__stats.txt <<'EOF'\n\
         Optimizations, DFG pre inline BreakCycles, true cycle          1\n\
         Optimizations, DFG post inline BreakCycles, true cycle         1\n\
         Optimizations, DFG scoped BreakCycles, true cycle              {scoped_cycles}\n\
         EOF\n\
         echo '%Warning-UNOPTFLAT: example' >&2\n\
         exit 0\n"
    );
    write_executable(&path, &script);
    path
}

fn write_top(dir: &Path) -> PathBuf {
    let top = dir.join("t_case.v");
    fs::write(&top, "module t; endmodule\n").unwrap();
    top
}

fn lint_case(dir: &Path, toolchain: &Path) -> TestCase {
    TestCase::builder(write_top(dir))
        .scenario(Scenario::Lint)
        .flags(["--stats", "-Wno-fatal", "--no-skip-identical"])
        .toolchain(toolchain)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

#[test]
fn lint_with_matching_stats_and_golden_passes() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = fake_lint_toolchain(dir.path(), 1);
    fs::write(dir.path().join("t_case.out"), "%Warning-UNOPTFLAT: example\n").unwrap();

    let case = TestCase::builder(write_top(dir.path()))
        .scenario(Scenario::Lint)
        .flags(["--stats", "-Wno-fatal", "--no-skip-identical"])
        .toolchain(&toolchain)
        .expect_golden()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();

    let report = case.drive(|t| {
        t.lint(&[])?;
        t.file_grep(
            t.stats_path(),
            r"DFG pre inline BreakCycles, true cycle\s+(\d+)",
            1,
        )?;
        t.file_grep(
            t.stats_path(),
            r"DFG post inline BreakCycles, true cycle\s+(\d+)",
            1,
        )?;
        t.file_grep(
            t.stats_path(),
            r"DFG scoped BreakCycles, true cycle\s+(\d+)",
            1,
        )?;
        t.passes();
        Ok(())
    });

    assert_eq!(report.verdict, Verdict::Pass, "{:?}", report.diagnostic);
    // Golden compare + three extractions; the lint run itself is not an
    // assertion.
    assert_eq!(report.assertions, 4);
}

#[test]
fn wrong_stats_value_fails_naming_the_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = fake_lint_toolchain(dir.path(), 0);

    let report = lint_case(dir.path(), &toolchain).drive(|t| {
        t.lint(&[])?;
        t.file_grep(
            t.stats_path(),
            r"DFG scoped BreakCycles, true cycle\s+(\d+)",
            1,
        )?;
        t.passes();
        Ok(())
    });

    assert_eq!(report.verdict, Verdict::Fail);
    let diag = report.diagnostic.unwrap();
    assert!(diag.contains("scoped BreakCycles"), "{diag}");
    assert!(diag.contains("expected 1"), "{diag}");
    assert!(diag.contains("got 0"), "{diag}");
}

#[test]
fn requested_stats_artifact_missing_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = dir.path().join("fake-verilator");
    write_executable(&toolchain, "#!/bin/sh\nexit 0\n");

    let report = lint_case(dir.path(), &toolchain).drive(|t| {
        t.lint(&[])?;
        t.passes();
        Ok(())
    });

    assert_eq!(report.verdict, Verdict::Error);
    assert!(report.diagnostic.unwrap().contains("stats"));
}

#[test]
fn nonzero_exit_is_error_regardless_of_later_assertions() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = dir.path().join("fake-verilator");
    write_executable(
        &toolchain,
        "#!/bin/sh\necho '%Error: t_case.v:1: syntax error' >&2\nexit 2\n",
    );

    let report = lint_case(dir.path(), &toolchain).drive(|t| {
        t.lint(&[])?;
        // Never reached; the verdict is already fixed by the failed run.
        t.file_grep(t.stats_path(), r"true cycle\s+(\d+)", 1)?;
        t.passes();
        Ok(())
    });

    assert_eq!(report.verdict, Verdict::Error);
    let diag = report.diagnostic.unwrap();
    assert!(diag.contains("status 2"), "{diag}");
    assert!(diag.contains("syntax error"), "{diag}");
}

#[test]
fn hung_toolchain_is_error_not_fail() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = dir.path().join("fake-verilator");
    write_executable(&toolchain, "#!/bin/sh\nsleep 30\n");

    let case = TestCase::builder(write_top(dir.path()))
        .scenario(Scenario::Lint)
        .toolchain(&toolchain)
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();

    let report = case.drive(|t| {
        t.lint(&[])?;
        t.passes();
        Ok(())
    });

    assert_eq!(report.verdict, Verdict::Error);
    assert!(report.diagnostic.unwrap().contains("timeout"));
}

#[test]
fn expected_failure_with_golden_diagnostics_passes() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = dir.path().join("fake-verilator");
    write_executable(
        &toolchain,
        "#!/bin/sh\necho '%Error: t_case.v:1: Cannot find file' >&2\nexit 1\n",
    );
    fs::write(
        dir.path().join("t_case.out"),
        "%Error: t_case.v:1: Cannot find file\n",
    )
    .unwrap();

    let case = TestCase::builder(write_top(dir.path()))
        .scenario(Scenario::Lint)
        .toolchain(&toolchain)
        .expect_failure()
        .expect_golden()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();

    let report = case.drive(|t| {
        t.lint(&[])?;
        t.passes();
        Ok(())
    });

    assert_eq!(report.verdict, Verdict::Pass, "{:?}", report.diagnostic);
}

#[test]
fn undeclared_scenario_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = fake_lint_toolchain(dir.path(), 1);

    let report = lint_case(dir.path(), &toolchain).drive(|t| {
        // The case declared lint only.
        t.compile(&[])?;
        t.passes();
        Ok(())
    });

    assert_eq!(report.verdict, Verdict::Error);
    assert!(report.diagnostic.unwrap().contains("not declared"));
}

#[test]
fn suite_tally_collects_verdicts_from_independent_cases() {
    let dir = tempfile::tempdir().unwrap();
    let tally = SuiteTally::new();

    let passing = fake_lint_toolchain(dir.path(), 1);
    let report = lint_case(dir.path(), &passing).drive(|t| {
        t.lint(&[])?;
        t.passes();
        Ok(())
    });
    tally.record(report.verdict);

    let failing = fake_lint_toolchain(dir.path(), 0);
    let report = lint_case(dir.path(), &failing).drive(|t| {
        t.lint(&[])?;
        t.file_grep(
            t.stats_path(),
            r"DFG scoped BreakCycles, true cycle\s+(\d+)",
            1,
        )?;
        t.passes();
        Ok(())
    });
    tally.record(report.verdict);

    let snapshot = tally.snapshot();
    assert_eq!(snapshot.passed, 1);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.total(), 2);
}
