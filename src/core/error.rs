use std::path::PathBuf;

/// Result type alias for diff-test-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for diff-test-runner.
///
/// Per-test failures never surface here; they are classified into an
/// [`Outcome`](crate::harness::Outcome). These are the conditions that stop a
/// run before or while it starts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The test root could not be enumerated.
    #[error("Could not walk {}: {source}", .root.display())]
    Discovery {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// File not found.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The harness has nothing to dispatch to.
    #[error("No runners registered. Bind at least one extension to an interpreter.")]
    NoRunners,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML parsing error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
