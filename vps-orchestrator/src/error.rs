use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use vps_runtime::RuntimeError;

pub type Result<T> = std::result::Result<T, VpsError>;

#[derive(Error, Debug)]
pub enum VpsError {
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The record is absent, or the principal may not see it. Both render
    /// identically.
    #[error("VPS not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Container runtime unreachable: {0}")]
    RuntimeUnreachable(String),

    #[error("Container runtime error: {0}")]
    RuntimeFatal(String),

    #[error("Reinstall of '{name}' failed after its previous instance was removed: {detail}")]
    PartialFailure { name: String, detail: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RuntimeError> for VpsError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::NameConflict(name) => {
                VpsError::Validation(format!("name '{name}' is already used by another container"))
            }
            RuntimeError::Unreachable(msg) => VpsError::RuntimeUnreachable(msg),
            other => VpsError::RuntimeFatal(other.to_string()),
        }
    }
}

/// Stable, serializable classification of a [`VpsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    InvalidState,
    RuntimeUnreachable,
    RuntimeFatal,
    PartialFailure,
    Internal,
}

impl VpsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::RuntimeUnreachable(_) => ErrorKind::RuntimeUnreachable,
            Self::RuntimeFatal(_) => ErrorKind::RuntimeFatal,
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
            Self::Database(_) | Self::Migration(_) | Self::Io(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Detail safe to show to callers. Store and I/O diagnostics stay in the logs.
    pub fn public_detail(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_classification() {
        let err: VpsError = RuntimeError::Unreachable("daemon down".into()).into();
        assert_eq!(err.kind(), ErrorKind::RuntimeUnreachable);

        let err: VpsError = RuntimeError::NameConflict("alpha".into()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: VpsError = RuntimeError::NotFound("3f2a".into()).into();
        assert_eq!(err.kind(), ErrorKind::RuntimeFatal);
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = VpsError::Internal("pool timed out at db.rs:42".into());
        assert_eq!(err.public_detail(), "internal error");

        let err = VpsError::NotFound("alpha".into());
        assert_eq!(err.public_detail(), "VPS not found: alpha");
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::RuntimeUnreachable).unwrap();
        assert_eq!(json, "\"runtime_unreachable\"");
    }
}
