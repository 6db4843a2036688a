//! Error taxonomy for the loop driver's collaborators.
//!
//! | Kind            | Effect on the loop                         |
//! |-----------------|--------------------------------------------|
//! | JudgeFailure    | judge counted missing in the verdict batch |
//! | JudgeTimeout    | judge counted missing in the verdict batch |
//! | PatchFailure    | patch recorded as failed, no edit counted  |
//! | Quorum          | session aborted                            |
//! | Session         | session aborted                            |

use thiserror::Error;

use refinement::{AgreementError, RefinementError};

/// Failure reported by a judge or patch executor.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Judge {judge} failed: {reason}")]
    JudgeFailure { judge: String, reason: String },

    #[error("Judge {judge} timed out after {timeout_ms}ms")]
    JudgeTimeout { judge: String, timeout_ms: u64 },

    #[error("Patch of section {section} failed: {reason}")]
    PatchFailure { section: String, reason: String },
}

impl CollaboratorError {
    pub fn judge(judge: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JudgeFailure {
            judge: judge.into(),
            reason: reason.into(),
        }
    }

    pub fn patch(section: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PatchFailure {
            section: section.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal loop errors; the session is abandoned.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Judge quorum not met: {0}")]
    Quorum(#[from] AgreementError),

    #[error(transparent)]
    Session(#[from] RefinementError),
}
