//! Test harness: discovery, dispatch, outcome classification and reporting.
//!
//! The harness sits after the runner in the pipeline: `Discovery → Runner →
//! Comparison → Report`. Each test is fully resolved before the next one is
//! discovered; nothing runs concurrently.

mod capture;
pub mod diff;
mod report;

pub use capture::{CaptureBuffer, Captured, CapturedTest};
pub use diff::unified_diff;
pub use report::{Reporter, Verbosity};

use crate::core::error::{Error, Result};
use crate::runner::RunnerRegistry;
use std::path::{Path, PathBuf};
use termcolor::{ColorChoice, StandardStream, WriteColor};
use walkdir::WalkDir;

/// Extension of reference output files unless configured otherwise.
pub const DEFAULT_REFERENCE_EXTENSION: &str = "txt";

/// Classification of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Output matched the reference exactly.
    Passed,
    /// Output was compared and differed.
    Failed,
    /// No comparison happened: the runner failed or the reference is missing.
    Errored,
}

/// A discovered test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub path: PathBuf,
    /// Registered extension (no leading dot) that selected the runner.
    pub extension: String,
}

impl TestCase {
    pub fn new(path: PathBuf, extension: impl Into<String>) -> Self {
        Self {
            path,
            extension: extension.into(),
        }
    }

    /// Sibling file holding the expected output: same stem, `extension`.
    pub fn reference_path(&self, extension: &str) -> PathBuf {
        self.path.with_extension(extension)
    }
}

/// Outcome counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
    pub errored: usize,
    pub total: usize,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Passed => self.succeeded += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Errored => self.errored += 1,
        }
    }

    /// No test failed or errored.
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    /// Process exit status for this tally.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() { 0 } else { 1 }
    }
}

/// Outcome of one executed test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub tally: Tally,
    /// Executed tests, in execution order.
    pub tests: Vec<TestReport>,
    /// Diagnostic output retained for failed and errored tests.
    pub captured: CaptureBuffer,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        self.tally.exit_code()
    }

    /// Outcome recorded for `path`, if it ran.
    pub fn outcome_of(&self, path: &Path) -> Option<Outcome> {
        self.tests
            .iter()
            .find(|t| t.path == path)
            .map(|t| t.outcome)
    }
}

/// Discovers tests under a root, runs them, and compares their output with
/// reference files.
pub struct DiffHarness {
    registry: RunnerRegistry,
    reference_extension: String,
    verbosity: Verbosity,
    color: ColorChoice,
}

impl DiffHarness {
    /// Create a harness dispatching through `registry`.
    pub fn new(registry: RunnerRegistry, verbosity: Verbosity) -> Self {
        Self {
            registry,
            reference_extension: DEFAULT_REFERENCE_EXTENSION.to_string(),
            verbosity,
            color: ColorChoice::Never,
        }
    }

    /// Use `extension` for reference files.
    pub fn with_reference_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.reference_extension = extension
            .strip_prefix('.')
            .map(String::from)
            .unwrap_or(extension);
        self
    }

    /// Color policy for [`run`](Self::run).
    pub fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    pub fn reference_extension(&self) -> &str {
        &self.reference_extension
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// List the tests under `root` in execution order.
    pub fn discover(&self, root: &Path) -> Result<Vec<TestCase>> {
        self.walk(root).collect()
    }

    /// Run every test under `root`, reporting to stderr.
    pub fn run(&self, root: &Path) -> Result<RunSummary> {
        self.run_with(root, StandardStream::stderr(self.color))
    }

    /// Run every test under `root`, reporting to `out`.
    pub fn run_with<W: WriteColor>(&self, root: &Path, out: W) -> Result<RunSummary> {
        let mut reporter = Reporter::new(out, self.verbosity);
        let mut captured = CaptureBuffer::new(self.verbosity.captures_output());
        let mut tally = Tally::default();
        let mut tests = Vec::new();

        tracing::debug!(
            root = %root.display(),
            extensions = ?self.registry.extensions(),
            "starting test run"
        );

        for test in self.walk(root) {
            let test = test?;
            reporter.test_started(&test)?;
            let outcome = self.run_test(&test, &mut captured);
            captured.finish(&test, outcome);
            tally.record(outcome);
            reporter.test_finished(outcome)?;
            tracing::debug!(path = %test.path.display(), ?outcome, "test finished");
            tests.push(TestReport {
                path: test.path,
                outcome,
            });
        }

        reporter.finish(&tally, &captured)?;

        Ok(RunSummary {
            tally,
            tests,
            captured,
        })
    }

    /// Run one test and classify it, capturing diagnostics into `captured`.
    pub fn run_test(&self, test: &TestCase, captured: &mut CaptureBuffer) -> Outcome {
        let Some(runner) = self.registry.get(&test.extension) else {
            captured.capture(
                test,
                Captured::message(format!("no runner registered for .{}", test.extension)),
            );
            return Outcome::Errored;
        };

        tracing::debug!(path = %test.path.display(), runner = runner.name(), "running test");

        let output = match runner.run(&test.path) {
            Ok(output) => output,
            Err(err) => {
                if let Some(partial) = err.output() {
                    if !partial.stdout.is_empty() {
                        captured.capture(test, Captured::stdout(partial.stdout.clone()));
                    }
                    if !partial.stderr.is_empty() {
                        captured.capture(test, Captured::stderr(partial.stderr.clone()));
                    }
                }
                captured.capture(test, Captured::message(err.to_string()));
                captured.capture(
                    test,
                    Captured::message("Could not perform diff due to error(s) above."),
                );
                return Outcome::Errored;
            }
        };

        if !output.stderr.is_empty() {
            captured.capture(test, Captured::stderr(output.stderr));
        }

        let reference_path = test.reference_path(&self.reference_extension);
        let reference = match std::fs::read(&reference_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                captured.capture(
                    test,
                    Captured::message(Error::FileNotFound(reference_path).to_string()),
                );
                return Outcome::Errored;
            }
            Err(e) => {
                captured.capture(
                    test,
                    Captured::message(format!(
                        "could not read {}: {}",
                        reference_path.display(),
                        e
                    )),
                );
                return Outcome::Errored;
            }
        };

        if output.stdout == reference {
            Outcome::Passed
        } else {
            captured.capture(test, Captured::Diff(unified_diff(&reference, &output.stdout)));
            Outcome::Failed
        }
    }

    /// Walk `root` in file-name order, yielding files with a registered extension.
    ///
    /// Failing to read the root itself is fatal; unreadable entries below it
    /// are skipped.
    fn walk<'a>(&'a self, root: &'a Path) -> impl Iterator<Item = Result<TestCase>> + 'a {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    let path = entry.path();
                    let extension = self.registry.extension_of(path)?.to_string();
                    if !path.is_file() {
                        return None;
                    }
                    Some(Ok(TestCase::new(path.to_path_buf(), extension)))
                }
                Err(source) if source.depth() == 0 => Some(Err(Error::Discovery {
                    root: root.to_path_buf(),
                    source,
                })),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    None
                }
            })
    }
}
