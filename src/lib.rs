//! diff-test-runner: a recursive test discovery and diff harness.
//!
//! Walks a directory tree, runs every file whose extension has a registered
//! runner, and compares the captured standard output byte-for-byte with a
//! sibling reference file (`hello.lua` → `hello.txt`). Each test is classified
//! as passed, failed (output differs; a unified diff is recorded) or errored
//! (the runner failed, timed out, or the reference is missing).
//!
//! # Quick Start
//!
//! ```no_run
//! use diff_test_runner::builder;
//! use std::time::Duration;
//!
//! # fn main() -> diff_test_runner::Result<()> {
//! let harness = builder()
//!     .script_runner("lua", "/usr/bin/lua")
//!     .timeout(Duration::from_secs(5))
//!     .verbosity(2)
//!     .build()?;
//!
//! let summary = harness.run("tests".as_ref())?;
//! std::process::exit(summary.exit_code());
//! # }
//! ```
//!
//! ## Configuration file
//!
//! ```toml
//! verbosity = 2
//! color = "auto"
//!
//! [test]
//! timeout = 15
//! reference-extension = "txt"
//!
//! [runners.lua]
//! interpreter = "bin/exe"
//! ```
//!
//! # Architecture
//!
//! - [`Runner`](runner::Runner): executes one test file and captures its output
//! - [`RunnerRegistry`](runner::RunnerRegistry): maps file extensions to runners
//! - [`DiffHarness`](harness::DiffHarness): discovery, comparison and reporting
//!
//! # Features
//!
//! - `default` - Enables `cli`
//! - `cli` - The `diff-test-runner` binary

pub mod config;
pub mod core;
pub mod harness;
pub mod runner;

// Re-export commonly used types
pub use crate::core::{Error, HarnessBuilder, Result};
pub use config::{ColorMode, Config};
pub use harness::{DiffHarness, Outcome, RunSummary, Tally};
pub use runner::{RunOutput, Runner, RunnerError, RunnerRegistry, ScriptRunner};

/// Create a new harness builder.
///
/// This is the main entry point for the fluent API.
pub fn builder() -> HarnessBuilder {
    HarnessBuilder::new()
}
