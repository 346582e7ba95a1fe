use crate::config::{ColorMode, Config, ConfigLoader, ScriptConfig};
use crate::core::error::{Error, Result};
use crate::harness::{DiffHarness, Verbosity};
use crate::runner::{Runner, RunnerRegistry, ScriptRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Builder for a configured [`DiffHarness`].
///
/// Values set directly on the builder take precedence over the loaded
/// [`Config`]; runners registered with [`runner`](Self::runner) replace any
/// configured binding for the same extension.
pub struct HarnessBuilder {
    config: Option<Config>,
    base_dir: Option<PathBuf>,
    verbosity: Option<u8>,
    reference_extension: Option<String>,
    color: Option<ColorMode>,
    timeout: Option<Duration>,
    interpreter: Option<PathBuf>,
    runners: Vec<(String, Arc<dyn Runner>)>,
}

impl HarnessBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: None,
            base_dir: None,
            verbosity: None,
            reference_extension: None,
            color: None,
            timeout: None,
            interpreter: None,
            runners: Vec::new(),
        }
    }

    /// Set the configuration directly.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from a standalone TOML file.
    pub fn from_config_file(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let (config, base_dir) = ConfigLoader::new().config_file(path).load()?;
        self.config = Some(config);
        self.base_dir = Some(base_dir);
        Ok(self)
    }

    /// Set the directory relative interpreter paths resolve against.
    pub fn base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(path.into());
        self
    }

    /// Set the report verbosity.
    pub fn verbosity(mut self, level: u8) -> Self {
        self.verbosity = Some(level);
        self
    }

    /// Set the extension of reference output files.
    pub fn reference_extension(mut self, extension: impl Into<String>) -> Self {
        self.reference_extension = Some(extension.into());
        self
    }

    /// Set the color policy.
    pub fn color(mut self, mode: ColorMode) -> Self {
        self.color = Some(mode);
        self
    }

    /// Set the timeout for every configured binding, overriding per-runner values.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use `path` as the interpreter for every configured binding.
    pub fn interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(path.into());
        self
    }

    // --- Runner Configuration ---

    /// Register a custom runner for `extension`.
    pub fn runner<R: Runner + 'static>(mut self, extension: impl Into<String>, runner: R) -> Self {
        self.runners.push((extension.into(), Arc::new(runner)));
        self
    }

    /// Bind `extension` to an interpreter, using the configured timeout and
    /// header delimiter.
    ///
    /// Without a loaded config, explicit bindings replace the default `lua`
    /// binding instead of adding to it.
    pub fn script_runner(mut self, extension: impl Into<String>, interpreter: impl Into<PathBuf>) -> Self {
        let config = self.config.get_or_insert_with(|| {
            let mut config = Config::default();
            config.runners.clear();
            config
        });
        config.runners.insert(
            extension.into(),
            ScriptConfig {
                interpreter: interpreter.into(),
                timeout: None,
            },
        );
        self
    }

    /// Build the harness.
    pub fn build(self) -> Result<DiffHarness> {
        let mut config = self.config.unwrap_or_default();
        let base_dir = self.base_dir.unwrap_or_else(|| PathBuf::from("."));

        if let Some(level) = self.verbosity {
            config.verbosity = level;
        }
        if let Some(mode) = self.color {
            config.color = mode;
        }
        if let Some(extension) = self.reference_extension {
            config.test.reference_extension = extension;
        }
        if let Some(interpreter) = self.interpreter {
            for runner in config.runners.values_mut() {
                runner.interpreter = interpreter.clone();
            }
        }
        config.validate()?;
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::config("timeout must be greater than zero"));
        }

        let reference_extension = config.test.reference_extension.trim_start_matches('.');
        let mut registry = RunnerRegistry::new();

        for (extension, script) in &config.runners {
            let interpreter = resolve_interpreter(&base_dir, &script.interpreter);
            let runner = ScriptRunner::new(interpreter)
                .with_timeout(self.timeout.unwrap_or_else(|| config.timeout_for(extension)))
                .with_header_delimiter(config.test.header_delimiter);
            if !runner.is_available() {
                tracing::warn!(
                    extension = %extension,
                    interpreter = %runner.interpreter().display(),
                    "interpreter not found; its tests will error"
                );
            }
            registry.register(extension, Arc::new(runner));
        }

        for (extension, runner) in self.runners {
            if extension.trim_start_matches('.') == reference_extension {
                return Err(Error::config(format!(
                    "runner for '.{}' conflicts with the reference extension",
                    extension.trim_start_matches('.')
                )));
            }
            registry.register(&extension, runner);
        }

        if registry.is_empty() {
            return Err(Error::NoRunners);
        }

        tracing::debug!(registry = ?registry, "harness configured");

        Ok(DiffHarness::new(registry, Verbosity(config.verbosity))
            .with_reference_extension(reference_extension)
            .with_color(config.color.choice()))
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a relative interpreter path with a directory part against `base`.
///
/// Bare names such as `lua` are left alone so they are looked up on `PATH`.
fn resolve_interpreter(base: &Path, interpreter: &Path) -> PathBuf {
    if interpreter.is_absolute() || interpreter.components().count() < 2 {
        interpreter.to_path_buf()
    } else {
        base.join(interpreter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{RunOutput, RunnerError};

    struct Noop;

    impl Runner for Noop {
        fn run(&self, _path: &Path) -> std::result::Result<RunOutput, RunnerError> {
            Ok(RunOutput::default())
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    fn empty_config() -> Config {
        let mut config = Config::default();
        config.runners.clear();
        config
    }

    #[test]
    fn test_builder_default_binding() {
        let harness = HarnessBuilder::new().base_dir("/opt/tool").build().unwrap();
        assert_eq!(harness.registry().extensions(), vec!["lua"]);
        assert_eq!(harness.reference_extension(), "txt");
        assert_eq!(harness.verbosity(), Verbosity(0));
        assert_eq!(harness.registry().get("lua").unwrap().name(), "exe");
    }

    #[test]
    fn test_builder_error_no_runners() {
        let result = HarnessBuilder::new().with_config(empty_config()).build();
        assert!(matches!(result, Err(Error::NoRunners)));
    }

    #[test]
    fn test_builder_explicit_runner_only() {
        let harness = HarnessBuilder::new()
            .with_config(empty_config())
            .runner(".t", Noop)
            .verbosity(3)
            .build()
            .unwrap();
        assert_eq!(harness.registry().extensions(), vec!["t"]);
        assert_eq!(harness.verbosity(), Verbosity(3));
    }

    #[test]
    fn test_builder_explicit_runner_replaces_binding() {
        let harness = HarnessBuilder::new().runner("lua", Noop).build().unwrap();
        assert_eq!(harness.registry().get("lua").unwrap().name(), "noop");
    }

    #[test]
    fn test_builder_rejects_runner_on_reference_extension() {
        let result = HarnessBuilder::new()
            .reference_extension("out")
            .runner("out", Noop)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_interpreter_override() {
        let harness = HarnessBuilder::new()
            .script_runner("sh", "dash")
            .interpreter("/bin/sh")
            .build()
            .unwrap();
        assert_eq!(harness.registry().extensions(), vec!["sh"]);
        assert_eq!(harness.registry().get("sh").unwrap().name(), "sh");
    }

    #[test]
    fn test_builder_script_runner_adds_to_loaded_config() {
        let harness = HarnessBuilder::new()
            .with_config(Config::default())
            .script_runner("sh", "/bin/sh")
            .build()
            .unwrap();
        assert_eq!(harness.registry().extensions(), vec!["lua", "sh"]);
    }

    #[test]
    fn test_builder_zero_timeout_rejected() {
        let result = HarnessBuilder::new().timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(
            HarnessBuilder::new()
                .timeout(Duration::from_millis(200))
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_resolve_interpreter() {
        let base = Path::new("/opt/tool");
        assert_eq!(
            resolve_interpreter(base, Path::new("bin/exe")),
            PathBuf::from("/opt/tool/bin/exe")
        );
        assert_eq!(
            resolve_interpreter(base, Path::new("/usr/bin/lua")),
            PathBuf::from("/usr/bin/lua")
        );
        assert_eq!(resolve_interpreter(base, Path::new("lua")), PathBuf::from("lua"));
    }
}
