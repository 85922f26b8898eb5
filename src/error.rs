//! Error types for Capsule
//!
//! All fallible operations return `CapsuleResult<T>`. Discovery and benchmark
//! failures are not raised: they degrade to "unknown" values or are recorded
//! inside a `BenchmarkResult`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Capsule operations
pub type CapsuleResult<T> = Result<T, CapsuleError>;

/// All errors that can occur in Capsule
#[derive(Error, Debug)]
pub enum CapsuleError {
    // Runtime errors
    #[error("No container runtime found on PATH")]
    NoRuntimeAvailable,

    #[error("Benchmarking is disabled by CAPSULE_NO_BENCHMARK or configuration")]
    BenchmarkDisabled,

    // Capsule errors
    #[error("Failed to inspect image {tag}: {reason}")]
    ImageInspect { tag: String, reason: String },

    #[error("Digest mismatch for {tag}: no repo digest contains {expected}")]
    DigestMismatch { tag: String, expected: String },

    // Lock errors
    #[error("Timed out after {waited_secs}s waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited_secs: u64 },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CapsuleError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error (process could not be spawned)
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error (process ran and exited non-zero)
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NoRuntimeAvailable => {
                Some("Install Docker, Podman, nerdctl or Finch and make sure it is on PATH")
            }
            Self::BenchmarkDisabled => Some("Unset CAPSULE_NO_BENCHMARK to allow benchmarking"),
            Self::LockTimeout { .. } => {
                Some("Another capsule process is benchmarking. Retry once it finishes")
            }
            Self::CommandFailed { .. } => Some("Run: capsule runtimes"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CapsuleError::ImageInspect {
            tag: "capsule-abc".to_string(),
            reason: "empty output".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to inspect image capsule-abc: empty output"
        );
    }

    #[test]
    fn error_hint() {
        assert!(CapsuleError::NoRuntimeAvailable
            .hint()
            .unwrap()
            .contains("PATH"));
        assert_eq!(
            CapsuleError::BenchmarkDisabled.hint(),
            Some("Unset CAPSULE_NO_BENCHMARK to allow benchmarking")
        );
        assert_eq!(CapsuleError::Internal("x".to_string()).hint(), None);
    }

    #[test]
    fn command_exec_keeps_stderr() {
        let err = CapsuleError::command_exec("docker images", "daemon not running");
        assert!(err.to_string().contains("daemon not running"));
    }
}
