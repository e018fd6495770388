//! Error taxonomy for suite orchestration.
//!
//! Only usage and programmer errors live here. Expected outcomes (a build
//! that failed, a gate that blocked, a publish the registry rejected) are
//! returned as values by the component that produced them.

use std::path::PathBuf;

use suite_registry::RegistryError;
use suite_toolchain::ToolchainError;

/// Errors produced while resolving a package and its dependency graph.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("package not found: {0}")]
    NotFound(String),

    #[error("dependency cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Errors produced by version arithmetic and the publish step.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("invalid semantic version: {0:?}")]
    InvalidVersion(String),

    #[error("invalid change type: {0:?} (expected major, minor or patch)")]
    InvalidChangeType(String),

    #[error("timed out waiting for workspace lock {}", path.display())]
    LockTimeout { path: PathBuf },
}

/// Suite orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    #[error("resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("manifest error in {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("implementation generation failed for {package}: {message}")]
    Implementation { package: String, message: String },

    #[error("publish transport error: {0}")]
    Transport(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SuiteError {
    pub fn manifest(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for suite operations.
pub type Result<T> = std::result::Result<T, SuiteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_lists_path() {
        let err = ResolveError::Cycle {
            path: vec!["@suite/a".into(), "@suite/b".into(), "@suite/a".into()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: @suite/a -> @suite/b -> @suite/a"
        );
    }

    #[test]
    fn test_nested_errors_convert() {
        let err: SuiteError = PublishError::InvalidVersion("not-a-version".into()).into();
        assert!(err.to_string().contains("invalid semantic version"));

        let err: SuiteError = ResolveError::NotFound("@suite/x".into()).into();
        assert!(matches!(err, SuiteError::Resolve(ResolveError::NotFound(_))));
    }

    #[test]
    fn test_manifest_error_display() {
        let err = SuiteError::manifest("/ws/packages/a/package.json", "expected object");
        assert!(err.to_string().contains("/ws/packages/a/package.json"));
        assert!(err.to_string().contains("expected object"));
    }
}
