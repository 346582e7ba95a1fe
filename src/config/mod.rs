//! Configuration types and loading from a standalone `diff-test-runner.toml`.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use termcolor::ColorChoice;

pub mod env;
mod loader;
pub use loader::ConfigLoader;

/// Conventional config file name looked up next to the executable.
pub const CONFIG_FILE_NAME: &str = "diff-test-runner.toml";

/// Complete configuration for a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Report verbosity (0-4).
    #[serde(default)]
    pub verbosity: u8,

    /// When to color the report.
    #[serde(default)]
    pub color: ColorMode,

    /// Per-test settings.
    #[serde(default)]
    pub test: TestConfig,

    /// Interpreter bindings keyed by test file extension.
    #[serde(default = "default_runners")]
    pub runners: BTreeMap<String, ScriptConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbosity: 0,
            color: ColorMode::default(),
            test: TestConfig::default(),
            runners: default_runners(),
        }
    }
}

fn default_runners() -> BTreeMap<String, ScriptConfig> {
    let mut runners = BTreeMap::new();
    runners.insert(
        "lua".to_string(),
        ScriptConfig {
            interpreter: PathBuf::from("bin/exe"),
            timeout: None,
        },
    );
    runners
}

/// Color policy for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Color only when stderr is a terminal.
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// Resolve to a concrete choice for a stderr stream.
    pub fn choice(self) -> ColorChoice {
        match self {
            ColorMode::Always => ColorChoice::Always,
            ColorMode::Never => ColorChoice::Never,
            ColorMode::Auto if std::io::stderr().is_terminal() => ColorChoice::Auto,
            ColorMode::Auto => ColorChoice::Never,
        }
    }
}

impl std::str::FromStr for ColorMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorMode::Auto),
            "always" => Ok(ColorMode::Always),
            "never" => Ok(ColorMode::Never),
            other => Err(Error::config(format!(
                "invalid color mode '{}' (expected auto, always or never)",
                other
            ))),
        }
    }
}

/// Settings shared by every test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Wall-clock limit per test, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Extension of reference output files.
    #[serde(default = "default_reference_extension", rename = "reference-extension")]
    pub reference_extension: String,

    /// Marker introducing interpreter options on a test's first line.
    #[serde(default = "default_header_delimiter", rename = "header-delimiter")]
    pub header_delimiter: char,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            reference_extension: default_reference_extension(),
            header_delimiter: default_header_delimiter(),
        }
    }
}

fn default_timeout() -> u64 {
    15
}

fn default_reference_extension() -> String {
    "txt".to_string()
}

fn default_header_delimiter() -> char {
    '!'
}

/// An interpreter bound to one extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Interpreter executable; relative paths resolve against the base directory.
    pub interpreter: PathBuf,

    /// Overrides `test.timeout` for this extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Timeout for tests with `extension`.
    pub fn timeout_for(&self, extension: &str) -> Duration {
        let secs = self
            .runners
            .get(extension)
            .and_then(|r| r.timeout)
            .unwrap_or(self.test.timeout);
        Duration::from_secs(secs)
    }

    /// Check the configuration for values that cannot produce a usable run.
    pub fn validate(&self) -> Result<()> {
        if self.test.timeout == 0 {
            return Err(Error::config("test.timeout must be greater than zero"));
        }

        let reference = self.test.reference_extension.trim_start_matches('.');
        if reference.is_empty() {
            return Err(Error::config("test.reference-extension must not be empty"));
        }

        for (ext, runner) in &self.runners {
            let ext = ext.trim_start_matches('.');
            if ext.is_empty() {
                return Err(Error::config("runner extension must not be empty"));
            }
            if ext == reference {
                return Err(Error::config(format!(
                    "runner for '.{}' conflicts with the reference extension",
                    ext
                )));
            }
            if runner.interpreter.as_os_str().is_empty() {
                return Err(Error::config(format!(
                    "runner for '.{}' has an empty interpreter",
                    ext
                )));
            }
            if runner.timeout == Some(0) {
                return Err(Error::config(format!(
                    "runner for '.{}' has a zero timeout",
                    ext
                )));
            }
        }

        Ok(())
    }
}
