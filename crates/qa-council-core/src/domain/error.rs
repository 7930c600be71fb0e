//! Domain-level error taxonomy for QA Council.

use serde::{Deserialize, Serialize};

use crate::domain::stage::{FailureKind, StageName};

/// Why a workspace could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionKind {
    /// Source unreachable, DNS failure or the checkout timed out.
    Network,
    /// Credentials missing or rejected by the remote.
    Auth,
    /// Source or branch does not exist.
    NotFound,
    /// Local storage could not be written.
    StorageUnwritable,
}

impl AcquisitionKind {
    /// Map onto the bounded stage failure taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AcquisitionKind::Network => FailureKind::Network,
            AcquisitionKind::Auth => FailureKind::Auth,
            AcquisitionKind::NotFound => FailureKind::SourceNotFound,
            AcquisitionKind::StorageUnwritable => FailureKind::StorageUnwritable,
        }
    }
}

impl std::fmt::Display for AcquisitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AcquisitionKind::Network => "network",
            AcquisitionKind::Auth => "auth",
            AcquisitionKind::NotFound => "not_found",
            AcquisitionKind::StorageUnwritable => "storage_unwritable",
        };
        f.write_str(s)
    }
}

/// QA Council domain errors.
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error("acquisition failed ({kind}): {message}")]
    Acquisition {
        kind: AcquisitionKind,
        message: String,
    },

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("workspace lease is for {held}, not {requested}")]
    LeaseMismatch { held: String, requested: String },

    #[error("stage out of order: expected {expected}, got {actual}")]
    StageOrder {
        expected: StageName,
        actual: StageName,
    },

    #[error("pipeline run already has all stages recorded")]
    RunComplete,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl QaError {
    pub fn acquisition(kind: AcquisitionKind, message: impl Into<String>) -> Self {
        QaError::Acquisition {
            kind,
            message: message.into(),
        }
    }
}

/// Result type for QA Council domain operations.
pub type Result<T> = std::result::Result<T, QaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_error_display() {
        let err = QaError::acquisition(AcquisitionKind::Auth, "bad credentials");
        let msg = err.to_string();
        assert!(msg.contains("acquisition failed"));
        assert!(msg.contains("auth"));
        assert!(msg.contains("bad credentials"));
    }

    #[test]
    fn test_acquisition_kind_maps_to_failure_kind() {
        assert_eq!(AcquisitionKind::Network.failure_kind(), FailureKind::Network);
        assert_eq!(AcquisitionKind::Auth.failure_kind(), FailureKind::Auth);
        assert_eq!(
            AcquisitionKind::NotFound.failure_kind(),
            FailureKind::SourceNotFound
        );
        assert_eq!(
            AcquisitionKind::StorageUnwritable.failure_kind(),
            FailureKind::StorageUnwritable
        );
    }

    #[test]
    fn test_stage_order_error() {
        let err = QaError::StageOrder {
            expected: StageName::Inspect,
            actual: StageName::Run,
        };
        let msg = err.to_string();
        assert!(msg.contains("inspect"));
        assert!(msg.contains("run"));
    }
}
