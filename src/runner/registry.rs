use super::Runner;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Maps file extensions to the runner that executes them.
///
/// Extensions are stored without a leading dot, so `".lua"` and `"lua"`
/// name the same binding. One runner may serve several extensions.
#[derive(Default, Clone)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn Runner>>,
}

impl RunnerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `extension` to `runner`, replacing any previous binding.
    pub fn register(&mut self, extension: &str, runner: Arc<dyn Runner>) {
        self.runners.insert(normalize(extension).to_string(), runner);
    }

    /// Check whether a runner is bound to `extension`.
    pub fn has_runner(&self, extension: &str) -> bool {
        self.runners.contains_key(normalize(extension))
    }

    /// Get the runner bound to `extension`.
    pub fn get(&self, extension: &str) -> Option<Arc<dyn Runner>> {
        self.runners.get(normalize(extension)).cloned()
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.runners.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }

    /// Number of bound extensions.
    pub fn len(&self) -> usize {
        self.runners.len()
    }

    /// Whether no extension is bound.
    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// The registered extension of `path`, if it has one.
    pub fn extension_of<'p>(&self, path: &'p Path) -> Option<&'p str> {
        let ext = path.extension()?.to_str()?;
        self.has_runner(ext).then_some(ext)
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for ext in self.extensions() {
            if let Some(runner) = self.runners.get(ext) {
                map.entry(&ext, &runner.name());
            }
        }
        map.finish()
    }
}

fn normalize(extension: &str) -> &str {
    extension.strip_prefix('.').unwrap_or(extension)
}
