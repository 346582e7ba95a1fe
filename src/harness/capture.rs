//! Per-test buffer of diagnostic output, kept only for tests that did not pass.

use super::{Outcome, TestCase};
use std::path::{Path, PathBuf};

/// One captured diagnostic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// A dump of one of the test process's streams (`STDOUT`, `STDERR`).
    Stream { name: &'static str, text: String },
    /// A unified diff of reference against actual output.
    Diff(String),
    /// A plain diagnostic message.
    Message(String),
}

impl Captured {
    pub fn stdout(text: impl Into<String>) -> Self {
        Captured::Stream {
            name: "STDOUT",
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Captured::Stream {
            name: "STDERR",
            text: text.into(),
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Captured::Message(text.into())
    }
}

/// Captured entries of a single test, in capture order.
#[derive(Debug, Clone)]
pub struct CapturedTest {
    pub path: PathBuf,
    pub entries: Vec<Captured>,
}

/// Diagnostic output grouped by test, in the order tests first captured
/// something.
///
/// A disabled buffer ignores every capture, so verbosity below the dump
/// threshold costs nothing.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    enabled: bool,
    tests: Vec<CapturedTest>,
}

impl CaptureBuffer {
    /// Create a buffer; captures are dropped unless `enabled`.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tests: Vec::new(),
        }
    }

    /// Whether captures are recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append an entry to `test`'s block.
    pub fn capture(&mut self, test: &TestCase, entry: Captured) {
        if !self.enabled {
            return;
        }
        // Tests run one at a time, so the active block is almost always last.
        match self.tests.iter_mut().rev().find(|t| t.path == test.path) {
            Some(block) => block.entries.push(entry),
            None => self.tests.push(CapturedTest {
                path: test.path.clone(),
                entries: vec![entry],
            }),
        }
    }

    /// Close `test`'s capture window; a passing test's entries are discarded.
    pub fn finish(&mut self, test: &TestCase, outcome: Outcome) {
        if outcome == Outcome::Passed {
            self.tests.retain(|t| t.path != test.path);
        }
    }

    /// Entries captured for `path`.
    pub fn get(&self, path: &Path) -> Option<&[Captured]> {
        self.tests
            .iter()
            .find(|t| t.path == path)
            .map(|t| t.entries.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedTest> {
        self.tests.iter()
    }

    /// Number of tests with retained entries.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
