//! Environment variable processing for runtime configuration overrides.
//!
//! Env var prefix: `DIFF_TEST_RUNNER_`
//!
//! - `DIFF_TEST_RUNNER_TIMEOUT`: per-test timeout in seconds
//! - `DIFF_TEST_RUNNER_VERBOSITY`: report verbosity (0-4)
//! - `DIFF_TEST_RUNNER_COLOR`: `auto`, `always` or `never`
//! - `DIFF_TEST_RUNNER_REFERENCE_EXTENSION`: extension of reference files
//! - `DIFF_TEST_RUNNER_INTERPRETER`: interpreter for every configured binding

use super::{ColorMode, Config};
use std::path::PathBuf;

const PREFIX: &str = "DIFF_TEST_RUNNER_";

const KEYS: [&str; 5] = [
    "TIMEOUT",
    "VERBOSITY",
    "COLOR",
    "REFERENCE_EXTENSION",
    "INTERPRETER",
];

/// Apply individual env var overrides to a config.
///
/// Each override is applied only if the env var is set and parses correctly.
/// Invalid values are ignored.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(val) = env_parse::<u64>("TIMEOUT") {
        config.test.timeout = val;
    }

    if let Some(val) = env_parse::<u8>("VERBOSITY") {
        config.verbosity = val;
    }

    if let Some(val) = env_parse::<ColorMode>("COLOR") {
        config.color = val;
    }

    if let Some(val) = env_str("REFERENCE_EXTENSION") {
        config.test.reference_extension = val;
    }

    if let Some(val) = env_str("INTERPRETER") {
        let interpreter = PathBuf::from(val);
        for runner in config.runners.values_mut() {
            runner.interpreter = interpreter.clone();
        }
    }
}

/// Summarize which env var overrides are currently active.
///
/// Returns a list of `(env_var_name, value)` pairs.
pub fn detect_active_overrides() -> Vec<(String, String)> {
    let mut active = Vec::new();
    for key in KEYS {
        let full = format!("{PREFIX}{key}");
        if let Ok(val) = std::env::var(&full) {
            if !val.is_empty() {
                active.push((full, val));
            }
        }
    }
    active
}

// --- helpers ---

fn env_str(suffix: &str) -> Option<String> {
    std::env::var(format!("{PREFIX}{suffix}"))
        .ok()
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(suffix: &str) -> Option<T> {
    env_str(suffix).and_then(|s| s.trim().parse().ok())
}
