//! Blocking execution of composed invocations.
//!
//! The runner owns the only blocking point in a test case's lifecycle: it
//! spawns the child with piped stdio, drains stdout/stderr on reader
//! threads, and polls `try_wait` until exit, deadline, or cancellation.
//!
//! The child is placed in its own process group at spawn; on deadline or
//! cancellation the whole group is signalled and the direct child reaped,
//! so grandchildren the toolchain forks (make, compilers, the built model)
//! do not survive the harness either.
//!
//! A timeout is always an ERROR-class outcome, never FAIL: the toolchain
//! integration is broken, not the design under test. Likewise a missing
//! statistics artifact after a successful exit that requested one.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use vreg_error::{HarnessError, Result};

use crate::invocation::Invocation;

/// Default per-invocation deadline, sized for simulation workloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Interval between `try_wait` polls.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cooperative cancellation handle shared between the suite runner and any
/// in-flight child process.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; any running invocation is killed at its next
    /// poll tick.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Fingerprint of an artifact an invocation produced, for report
/// traceability.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRecord {
    /// Path of the produced file.
    pub path: std::path::PathBuf,
    /// SHA-256 of the file contents, lowercase hex.
    pub sha256: String,
}

/// Outcome of one completed invocation. Read-only to downstream components.
#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    /// Child exit code (`-1` when terminated by signal).
    pub exit_code: i32,
    /// Complete captured stdout.
    pub stdout: String,
    /// Complete captured stderr.
    pub stderr: String,
    /// Wall time from spawn to reap.
    #[serde(skip)]
    pub wall: Duration,
    /// Fingerprints of required artifacts verified after exit.
    pub artifacts: Vec<ArtifactRecord>,
}

impl ExecutionResult {
    /// Captured output as the golden-comparison surface: stdout followed by
    /// stderr (toolchain diagnostics land on stderr).
    #[must_use]
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }

    /// Error unless the child exited zero.
    pub fn require_success(&self, program: &str) -> Result<()> {
        if self.exit_code == 0 {
            return Ok(());
        }
        Err(HarnessError::ToolchainFailed {
            program: program.to_owned(),
            exit_code: self.exit_code,
            stderr_tail: stderr_tail(&self.stderr),
        })
    }

    /// Error unless the child exited non-zero (expect-failure declarations).
    pub fn require_failure(&self, program: &str) -> Result<()> {
        if self.exit_code != 0 {
            return Ok(());
        }
        Err(HarnessError::UnexpectedSuccess {
            program: program.to_owned(),
        })
    }
}

/// Executes invocations with a deadline and cooperative cancellation.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    cancel: CancelToken,
}

impl ProcessRunner {
    /// Runner with a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner observing an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// The runner's cancellation token, for suite-level abort wiring.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the invocation to completion and capture its output.
    ///
    /// Blocking; bounded by `invocation.timeout`. The working directory is
    /// created if absent so the toolchain can write artifacts into it.
    pub fn run(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        let program = invocation.program.display().to_string();
        std::fs::create_dir_all(&invocation.work_dir)?;

        debug!(
            program = %program,
            work_dir = %invocation.work_dir.display(),
            command = %invocation.command_line(),
            "spawning toolchain invocation"
        );

        let start = Instant::now();
        let mut command = Command::new(&invocation.program);
        let _ = command
            .args(&invocation.args)
            .current_dir(&invocation.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            // Own process group, so a timeout kill reaches grandchildren too.
            use std::os::unix::process::CommandExt as _;
            let _ = command.process_group(0);
        }
        let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout_reader = child.stdout.take().map(spawn_drain);
        let stderr_reader = child.stderr.take().map(spawn_drain);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if self.cancel.is_cancelled() {
                reap(&mut child);
                warn!(program = %program, "invocation cancelled by suite abort");
                return Err(HarnessError::Cancelled { program });
            }
            if start.elapsed() >= invocation.timeout {
                reap(&mut child);
                warn!(
                    program = %program,
                    timeout_secs = invocation.timeout.as_secs(),
                    "invocation killed on timeout"
                );
                return Err(HarnessError::Timeout {
                    program,
                    timeout_secs: invocation.timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let wall = start.elapsed();
        let stdout = join_drain(stdout_reader);
        let stderr = join_drain(stderr_reader);
        let exit_code = status.code().unwrap_or(-1);

        info!(
            program = %program,
            exit_code,
            wall_ms = wall.as_millis() as u64,
            "invocation completed"
        );

        let mut artifacts = Vec::new();
        if let Some(stats) = &invocation.expected_stats {
            if exit_code == 0 {
                if !stats.is_file() {
                    return Err(HarnessError::MissingArtifact {
                        path: stats.clone(),
                    });
                }
                artifacts.push(fingerprint(stats)?);
            }
        }

        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            wall,
            artifacts,
        })
    }
}

/// SHA-256 fingerprint of a file, for report traceability.
pub fn fingerprint(path: &std::path::Path) -> Result<ArtifactRecord> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    let mut sha256 = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(sha256, "{byte:02x}");
    }
    Ok(ArtifactRecord {
        path: path.to_path_buf(),
        sha256,
    })
}

fn spawn_drain<R: Read + Send + 'static>(mut source: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = source.read_to_end(&mut buf);
        buf
    })
}

fn join_drain(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> String {
    let bytes = handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Kill the child's whole process group, then reap the direct child.
fn reap(child: &mut std::process::Child) {
    #[cfg(unix)]
    {
        // The child leads its own group (`process_group(0)` at spawn);
        // a negative pid signals every process in it.
        let pgid = child.id() as i32;
        // SAFETY: plain syscall with no pointer arguments.
        unsafe {
            let _ = libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Last few stderr lines for a compact failure diagnostic.
fn stderr_tail(stderr: &str) -> String {
    const TAIL_LINES: usize = 5;
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join("\n")
}
