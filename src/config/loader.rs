use super::{CONFIG_FILE_NAME, Config};
use crate::core::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Configuration loader that supports multiple sources.
pub struct ConfigLoader {
    /// Directory holding the tool; default base for relative paths.
    tool_dir: Option<PathBuf>,
    /// Path to standalone config file.
    config_file: Option<PathBuf>,
    /// Whether to apply `DIFF_TEST_RUNNER_*` overrides.
    use_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    pub fn new() -> Self {
        Self {
            tool_dir: None,
            config_file: None,
            use_env: true,
        }
    }

    /// Set the tool directory.
    pub fn tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dir = Some(dir.into());
        self
    }

    /// Set a standalone configuration file path.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Ignore environment overrides.
    pub fn no_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Load configuration from all enabled sources.
    ///
    /// Priority (later sources override earlier):
    /// 1. Default values
    /// 2. Standalone TOML file (explicit, or `diff-test-runner.toml` in the tool directory)
    /// 3. Individual env var overrides (`DIFF_TEST_RUNNER_*`)
    ///
    /// Returns the configuration and the base directory that relative
    /// interpreter paths resolve against: the config file's directory when a
    /// file was read, otherwise the tool directory.
    pub fn load(self) -> Result<(Config, PathBuf)> {
        let config_file = match self.config_file {
            Some(path) => Some(path),
            None => self
                .tool_dir
                .as_ref()
                .map(|dir| dir.join(CONFIG_FILE_NAME))
                .filter(|path| path.is_file()),
        };

        let (mut config, base_dir) = match config_file {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                let config = Config::from_toml_file(&path)?;
                (config, Self::parent_dir(&path))
            }
            None => {
                let dir = self
                    .tool_dir
                    .ok_or_else(|| Error::config("tool directory not specified"))?;
                (Config::default(), dir)
            }
        };

        if self.use_env {
            for (key, value) in super::env::detect_active_overrides() {
                tracing::debug!(%key, %value, "applying env override");
            }
            super::env::apply_env_overrides(&mut config);
        }

        config.validate()?;
        Ok((config, base_dir))
    }

    fn parent_dir(path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
