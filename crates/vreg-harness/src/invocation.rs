//! Composition of concrete toolchain command lines.
//!
//! An [`Invocation`] is a fully resolved, scenario-specific command: program,
//! ordered arguments, working directory, and timeout. It is ephemeral (one
//! per execution) and has no side effects until handed to the process
//! runner.
//!
//! Argument order is scenario defaults, then test-case base flags, then
//! per-call extra flags, then the top-level source file. Extra flags come
//! last so they can override base behavior; this layer never resolves flag
//! precedence itself, the external tool owns it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::scenario::Scenario;

/// Flag fragment that asks the toolchain to emit its statistics artifact.
pub const STATS_FLAG: &str = "--stats";

/// A resolved, ready-to-run toolchain command.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    /// Program to execute (toolchain binary or a built model executable).
    pub program: PathBuf,
    /// Ordered argument list.
    pub args: Vec<String>,
    /// Working directory for the child; output artifacts land here.
    pub work_dir: PathBuf,
    /// Wall-clock deadline for the child process.
    #[serde(skip)]
    pub timeout: Duration,
    /// Statistics artifact the runner must verify after a successful exit,
    /// when the composed flags request one.
    pub expected_stats: Option<PathBuf>,
}

impl Invocation {
    /// Compose a toolchain invocation from its parts.
    ///
    /// `stats_path` is only attached as a post-exit obligation when the
    /// merged flags actually contain [`STATS_FLAG`].
    #[must_use]
    pub fn compose(
        program: &Path,
        work_dir: &Path,
        timeout: Duration,
        scenario: Scenario,
        base_flags: &[String],
        extra_flags: &[&str],
        top_filename: &Path,
        stats_path: &Path,
    ) -> Self {
        let mut args: Vec<String> = Vec::new();
        args.extend(scenario.default_flags().iter().map(|&f| f.to_owned()));
        args.extend(base_flags.iter().cloned());
        args.extend(extra_flags.iter().map(|&f| f.to_owned()));
        args.push(top_filename.display().to_string());

        let expected_stats = args
            .iter()
            .any(|a| a == STATS_FLAG)
            .then(|| stats_path.to_path_buf());

        Self {
            program: program.to_path_buf(),
            args,
            work_dir: work_dir.to_path_buf(),
            timeout,
            expected_stats,
        }
    }

    /// A bare invocation of an already-built executable (no flag merging).
    #[must_use]
    pub fn bare(program: &Path, work_dir: &Path, timeout: Duration) -> Self {
        Self {
            program: program.to_path_buf(),
            args: Vec::new(),
            work_dir: work_dir.to_path_buf(),
            timeout,
            expected_stats: None,
        }
    }

    /// Rendering of the full command line for diagnostics.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}
