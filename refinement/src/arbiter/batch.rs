//! Verdict batches and judge quorum policy.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::agreement::{AgreementError, AgreementResult};
use crate::criteria::{CriteriaScores, Issue, JudgeVerdict};

/// How many of the expected judges must answer before the arbiter runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeQuorum {
    #[default]
    RequireAll,
    AtLeast(usize),
}

/// Verdicts collected for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerdictBatch {
    /// Judges that were asked to score
    pub expected_judges: Vec<String>,
    /// Verdicts that arrived
    pub verdicts: Vec<JudgeVerdict>,
}

impl VerdictBatch {
    pub fn new(expected_judges: Vec<String>) -> Self {
        Self {
            expected_judges,
            verdicts: Vec::new(),
        }
    }

    /// Batch where every listed verdict was expected.
    pub fn complete(verdicts: Vec<JudgeVerdict>) -> Self {
        Self {
            expected_judges: verdicts.iter().map(|v| v.judge.clone()).collect(),
            verdicts,
        }
    }

    pub fn push(&mut self, verdict: JudgeVerdict) {
        self.verdicts.push(verdict);
    }

    /// Expected judges with no verdict in the batch.
    pub fn missing(&self) -> Vec<String> {
        self.expected_judges
            .iter()
            .filter(|judge| !self.verdicts.iter().any(|v| &v.judge == *judge))
            .cloned()
            .collect()
    }

    pub fn satisfies(&self, quorum: JudgeQuorum) -> bool {
        match quorum {
            JudgeQuorum::RequireAll => self.missing().is_empty() && !self.verdicts.is_empty(),
            JudgeQuorum::AtLeast(n) => self.verdicts.len() >= n.max(1),
        }
    }

    /// Release the verdicts if the quorum is met.
    pub fn into_verdicts(self, quorum: JudgeQuorum) -> AgreementResult<Vec<JudgeVerdict>> {
        if self.verdicts.is_empty() {
            return Err(AgreementError::EmptyInput);
        }
        if !self.satisfies(quorum) {
            let missing = self.missing();
            warn!(
                expected = self.expected_judges.len(),
                received = self.verdicts.len(),
                missing = ?missing,
                "Verdict batch below quorum"
            );
            return Err(AgreementError::IncompleteBatch {
                expected: self.expected_judges.len(),
                received: self.verdicts.len(),
                missing,
            });
        }
        Ok(self.verdicts)
    }

    pub fn scores(&self) -> Vec<CriteriaScores> {
        self.verdicts.iter().map(|v| v.scores.clone()).collect()
    }

    /// All issues from all judges, in arrival order.
    pub fn pooled_issues(&self) -> Vec<Issue> {
        self.verdicts
            .iter()
            .flat_map(|v| v.issues.iter().cloned())
            .collect()
    }
}
