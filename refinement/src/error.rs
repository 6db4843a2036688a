//! Crate-level error type.

use crate::arbiter::AgreementError;
use crate::best_effort::SelectionError;
use crate::config::ConfigError;
use crate::controller::StateError;
use crate::cost::CostError;
use crate::criteria::ScoreError;

/// Any failure surfaced by a refinement session.
#[derive(Debug, thiserror::Error)]
pub enum RefinementError {
    #[error(transparent)]
    Cost(#[from] CostError),

    #[error(transparent)]
    Agreement(#[from] AgreementError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Session already finished with {0}")]
    SessionFinished(String),
}

/// Result type for session operations
pub type RefinementResult<T> = Result<T, RefinementError>;
