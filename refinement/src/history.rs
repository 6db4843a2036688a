//! Iteration history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::{CriteriaScores, Issue};

/// Outcome of one refinement cycle. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    /// 0 is the initial generation
    pub iteration: u32,
    /// Scalar rollup of `scores`
    pub score: f64,
    #[serde(default)]
    pub scores: CriteriaScores,
    pub content: String,
    #[serde(default)]
    pub remaining_issues: Vec<Issue>,
    pub created_at: DateTime<Utc>,
}

impl IterationResult {
    pub fn new(iteration: u32, score: f64, content: impl Into<String>) -> Self {
        Self {
            iteration,
            score,
            scores: CriteriaScores::new(),
            content: content.into(),
            remaining_issues: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Build from a merged score snapshot; `score` is its rollup.
    pub fn from_scores(iteration: u32, scores: CriteriaScores, content: impl Into<String>) -> Self {
        let mut result = Self::new(iteration, scores.overall(), content);
        result.scores = scores;
        result
    }

    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.remaining_issues = issues;
        self
    }
}
