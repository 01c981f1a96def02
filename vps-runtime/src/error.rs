//! Error types for container runtime operations.
//!
//! Adapters never swallow engine failures. Every failure is classified so the
//! orchestrator can tell a missing object from a transient fault from a fatal
//! one.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Image build failed for '{image}': {detail}")]
    BuildFailed { image: String, detail: String },

    #[error("Container create failed for '{name}': {detail}")]
    CreateFailed { name: String, detail: String },

    #[error("Container name already in use: {0}")]
    NameConflict(String),

    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Container runtime unreachable: {0}")]
    Unreachable(String),

    #[error("Exec failed in '{target}': {detail}")]
    ExecFailed { target: String, detail: String },

    #[error("Runtime command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid resource limits: {0}")]
    InvalidLimits(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Transient faults may succeed if the caller retries later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// What the failed command was doing. Selects the fallback variant when the
/// engine output matches none of the known patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureContext {
    Build,
    Create,
    Exec,
    Lifecycle,
}

/// Classify an engine failure from its diagnostic output.
///
/// `target` is the image tag, container name or handle the command acted on.
pub fn classify_failure(context: FailureContext, target: &str, stderr: &str) -> RuntimeError {
    let detail = stderr.trim().to_string();
    let lower = detail.to_lowercase();

    if lower.contains("no such container") || lower.contains("no such object") {
        return RuntimeError::NotFound(target.to_string());
    }

    if lower.contains("is already in use") {
        return RuntimeError::NameConflict(target.to_string());
    }

    const UNREACHABLE_MARKERS: &[&str] = &[
        "cannot connect to the docker daemon",
        "error during connect",
        "connection refused",
        "i/o timeout",
        "context deadline exceeded",
        "is the docker daemon running",
    ];
    if UNREACHABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        return RuntimeError::Unreachable(detail);
    }

    match context {
        FailureContext::Build => RuntimeError::BuildFailed {
            image: target.to_string(),
            detail,
        },
        FailureContext::Create => RuntimeError::CreateFailed {
            name: target.to_string(),
            detail,
        },
        FailureContext::Exec => RuntimeError::ExecFailed {
            target: target.to_string(),
            detail,
        },
        FailureContext::Lifecycle => RuntimeError::CommandFailed(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = classify_failure(
            FailureContext::Lifecycle,
            "3f2a",
            "Error response from daemon: No such container: 3f2a",
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_classify_name_conflict() {
        let err = classify_failure(
            FailureContext::Create,
            "alpha",
            "Error response from daemon: Conflict. The container name \"/alpha\" is already in use by container \"9d1c\".",
        );
        assert!(matches!(err, RuntimeError::NameConflict(name) if name == "alpha"));
    }

    #[test]
    fn test_classify_daemon_down_is_transient() {
        let err = classify_failure(
            FailureContext::Lifecycle,
            "alpha",
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?",
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_classify_fallback_uses_context() {
        let err = classify_failure(FailureContext::Build, "img:latest", "step 3 failed\n");
        match err {
            RuntimeError::BuildFailed { image, detail } => {
                assert_eq!(image, "img:latest");
                assert_eq!(detail, "step 3 failed");
            }
            other => panic!("unexpected classification: {other:?}"),
        }

        let err = classify_failure(FailureContext::Exec, "alpha", "container is not running");
        assert!(matches!(err, RuntimeError::ExecFailed { .. }));
        assert!(!err.is_transient());
    }
}
