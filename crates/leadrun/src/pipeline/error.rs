use thiserror::Error;

use crate::db::DatabaseError;
use crate::providers::{ProviderError, ProviderErrorKind};
use crate::supervisor::StopReason;

use super::stage::Stage;

/// Failure of a stage, classified by how the job should end.
#[derive(Error, Debug)]
pub enum StageError {
    /// Retrying later may succeed; the job becomes resumable.
    #[error("{stage} failed: {message}")]
    Transient { stage: Stage, message: String },

    /// Retrying will not help; the job fails.
    #[error("{stage} failed: {message}")]
    Permanent { stage: Stage, message: String },

    /// The checkpoint cannot be trusted for this job any more.
    #[error("resume unsafe: {message}")]
    DataIntegrity { stage: Option<Stage>, message: String },

    /// Storage failed mid-stage. Treated as transient.
    #[error("{stage} failed: storage error: {source}")]
    Storage {
        stage: Stage,
        #[source]
        source: DatabaseError,
    },
}

impl StageError {
    pub fn from_provider(stage: Stage, err: ProviderError) -> Self {
        match err.kind {
            ProviderErrorKind::Transient => StageError::Transient {
                stage,
                message: err.message,
            },
            // A malformed error that escapes the per-item handling means
            // the provider could not produce a usable stream at all.
            ProviderErrorKind::Permanent | ProviderErrorKind::Malformed => {
                StageError::Permanent {
                    stage,
                    message: err.message,
                }
            }
        }
    }

    pub fn storage(stage: Stage, source: DatabaseError) -> Self {
        StageError::Storage { stage, source }
    }

    pub fn data_integrity(stage: Option<Stage>, message: impl Into<String>) -> Self {
        StageError::DataIntegrity {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageError::Transient { stage, .. }
            | StageError::Permanent { stage, .. }
            | StageError::Storage { stage, .. } => Some(*stage),
            StageError::DataIntegrity { stage, .. } => *stage,
        }
    }

    pub fn is_resumable(&self) -> bool {
        matches!(self, StageError::Transient { .. } | StageError::Storage { .. })
    }
}

/// How a stage handler returned control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Stopped(StopReason),
}
