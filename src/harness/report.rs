//! Terminal output formatting for harness results.

use super::capture::{CaptureBuffer, Captured};
use super::{Outcome, Tally, TestCase};
use std::io;
use termcolor::{Color, ColorSpec, WriteColor};

/// How much the harness prints. Each level includes the ones below it.
///
/// - `1`: one progress character per test and the final verdict
/// - `2`: the numeric summary line
/// - `3`: a status word per test, preceded by the test path (replaces the
///   progress characters)
/// - `4`: diagnostic output of failed and errored tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verbosity(pub u8);

impl Verbosity {
    pub fn shows_progress(self) -> bool {
        self.0 >= 1
    }

    pub fn shows_summary(self) -> bool {
        self.0 >= 2
    }

    pub fn shows_status(self) -> bool {
        self.0 >= 3
    }

    pub fn captures_output(self) -> bool {
        self.0 >= 4
    }
}

impl From<u8> for Verbosity {
    fn from(level: u8) -> Self {
        Verbosity(level)
    }
}

const CAPTURED_HEADING: &str = "Captured output from tests that failed or had errors:";

/// Writes harness progress and results to a color-capable sink.
pub struct Reporter<W> {
    out: W,
    verbosity: Verbosity,
}

impl<W: WriteColor> Reporter<W> {
    /// Create a reporter writing to `out`.
    pub fn new(out: W, verbosity: Verbosity) -> Self {
        Self { out, verbosity }
    }

    /// Give back the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Announce a test before it runs.
    pub fn test_started(&mut self, test: &TestCase) -> io::Result<()> {
        if self.verbosity.shows_status() {
            write!(self.out, "{}: ", test.path.display())?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// Print the outcome of the test announced last.
    pub fn test_finished(&mut self, outcome: Outcome) -> io::Result<()> {
        if self.verbosity.shows_status() {
            let word = match outcome {
                Outcome::Passed => "PASSED",
                Outcome::Failed => "FAILED",
                Outcome::Errored => "ERROR",
            };
            self.styled(word, &outcome_spec(outcome))?;
            writeln!(self.out)?;
        } else if self.verbosity.shows_progress() {
            let mark = match outcome {
                Outcome::Passed => ".",
                Outcome::Failed => "F",
                Outcome::Errored => "E",
            };
            self.styled(mark, &outcome_spec(outcome))?;
        }
        self.out.flush()
    }

    /// Print everything that follows the last test: captured output, summary and verdict.
    pub fn finish(&mut self, tally: &Tally, captured: &CaptureBuffer) -> io::Result<()> {
        if self.verbosity.shows_progress() {
            writeln!(self.out)?;
        }
        self.print_captured(captured)?;
        self.print_summary(tally)?;
        self.print_verdict(tally)?;
        self.out.flush()
    }

    fn print_captured(&mut self, captured: &CaptureBuffer) -> io::Result<()> {
        if !self.verbosity.captures_output() || captured.is_empty() {
            return Ok(());
        }

        writeln!(self.out, "{CAPTURED_HEADING}")?;
        for test in captured.iter() {
            writeln!(self.out, "{}", test.path.display())?;
            let last = test.entries.len().saturating_sub(1);
            for (i, entry) in test.entries.iter().enumerate() {
                self.print_block(entry, i == 0, i == last)?;
            }
        }
        Ok(())
    }

    /// Print one captured entry inside START/END borders.
    fn print_block(&mut self, entry: &Captured, first: bool, last: bool) -> io::Result<()> {
        let border = color(Color::Blue);
        if first {
            self.styled(&format!("{0} START {0}", "=".repeat(20)), &border)?;
            writeln!(self.out)?;
        }

        let ends_with_newline = match entry {
            Captured::Stream { name, text } => {
                self.styled(&format!("{name}:\n"), &color(Color::Magenta))?;
                write!(self.out, "{text}")?;
                text.is_empty() || text.ends_with('\n')
            }
            Captured::Diff(diff) => {
                self.print_diff(diff)?;
                diff.ends_with('\n')
            }
            Captured::Message(text) => {
                write!(self.out, "{text}")?;
                text.ends_with('\n')
            }
        };
        if !ends_with_newline {
            writeln!(self.out)?;
        }

        if last {
            self.styled(&format!("{0} END {0}", "=".repeat(21)), &border)?;
        } else {
            self.styled(&"-".repeat(47), &border)?;
        }
        writeln!(self.out)
    }

    fn print_diff(&mut self, diff: &str) -> io::Result<()> {
        for (i, line) in diff.split('\n').enumerate() {
            if i > 0 {
                writeln!(self.out)?;
            }
            let spec = match line.chars().next() {
                Some('-') => color(Color::Red),
                Some('+') => color(Color::Green),
                Some('@') => color(Color::Cyan),
                _ => ColorSpec::new(),
            };
            self.styled(line, &spec)?;
        }
        Ok(())
    }

    fn print_summary(&mut self, tally: &Tally) -> io::Result<()> {
        if self.verbosity.shows_summary() {
            writeln!(
                self.out,
                "{} success + {} failure + {} error = {} tests",
                tally.succeeded, tally.failed, tally.errored, tally.total
            )?;
        }
        Ok(())
    }

    fn print_verdict(&mut self, tally: &Tally) -> io::Result<()> {
        if !self.verbosity.shows_progress() {
            return Ok(());
        }
        if tally.all_passed() {
            self.styled("PASSED", &color(Color::Green))?;
        } else {
            self.styled("FAILED", &color(Color::Red))?;
        }
        writeln!(self.out)
    }

    fn styled(&mut self, text: &str, spec: &ColorSpec) -> io::Result<()> {
        self.out.set_color(spec)?;
        write!(self.out, "{text}")?;
        self.out.reset()
    }
}

fn color(fg: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(fg));
    spec
}

fn outcome_spec(outcome: Outcome) -> ColorSpec {
    match outcome {
        Outcome::Passed => color(Color::Green),
        Outcome::Failed => color(Color::Red),
        Outcome::Errored => {
            let mut spec = color(Color::Red);
            spec.set_bold(true);
            spec
        }
    }
}
