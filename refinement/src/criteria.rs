//! Criterion model: the closed set of quality dimensions judges score.
//!
//! Every scoring event maps each present criterion to exactly one value in
//! `[0, 1]`. The criterion set is shared across judges and is not extensible
//! at runtime.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Error type for score construction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("Score for {criterion} out of range: {value} (expected 0.0..=1.0)")]
    ScoreOutOfRange { criterion: Criterion, value: f64 },

    #[error("Unknown criterion: {0}")]
    UnknownCriterion(String),
}

/// Result type for score construction
pub type ScoreResult<T> = Result<T, ScoreError>;

/// Independently scored quality dimension of a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    FactualAccuracy,
    LearningObjectiveAlignment,
    PedagogicalStructure,
    ClarityReadability,
    EngagementExamples,
    Completeness,
}

impl Criterion {
    /// Conflict-resolution priority, highest first.
    pub const PRIORITY: [Criterion; 6] = [
        Criterion::FactualAccuracy,
        Criterion::LearningObjectiveAlignment,
        Criterion::PedagogicalStructure,
        Criterion::ClarityReadability,
        Criterion::EngagementExamples,
        Criterion::Completeness,
    ];

    /// Index in [`Criterion::PRIORITY`]; lower wins.
    pub fn priority(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|c| c == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    /// Wire name (`factual_accuracy`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FactualAccuracy => "factual_accuracy",
            Self::LearningObjectiveAlignment => "learning_objective_alignment",
            Self::PedagogicalStructure => "pedagogical_structure",
            Self::ClarityReadability => "clarity_readability",
            Self::EngagementExamples => "engagement_examples",
            Self::Completeness => "completeness",
        }
    }

    /// Human label with underscores replaced by spaces (`factual accuracy`).
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Criterion {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PRIORITY
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| ScoreError::UnknownCriterion(s.to_string()))
    }
}

/// Issue severity, ordered `minor < major < critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Per-criterion score snapshot from one scoring event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<Criterion, f64>",
    into = "BTreeMap<Criterion, f64>"
)]
pub struct CriteriaScores(BTreeMap<Criterion, f64>);

impl TryFrom<BTreeMap<Criterion, f64>> for CriteriaScores {
    type Error = ScoreError;

    fn try_from(map: BTreeMap<Criterion, f64>) -> Result<Self, Self::Error> {
        Self::from_pairs(map)
    }
}

impl From<CriteriaScores> for BTreeMap<Criterion, f64> {
    fn from(scores: CriteriaScores) -> Self {
        scores.0
    }
}

impl CriteriaScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(criterion, score)` pairs, validating every score.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Criterion, f64)>,
    ) -> ScoreResult<Self> {
        let mut scores = Self::new();
        for (criterion, value) in pairs {
            scores.set(criterion, value)?;
        }
        Ok(scores)
    }

    /// Builder-style insert, validating the score.
    pub fn with(mut self, criterion: Criterion, value: f64) -> ScoreResult<Self> {
        self.set(criterion, value)?;
        Ok(self)
    }

    /// Set a criterion score. Later writes replace earlier ones.
    pub fn set(&mut self, criterion: Criterion, value: f64) -> ScoreResult<()> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ScoreError::ScoreOutOfRange { criterion, value });
        }
        self.0.insert(criterion, value);
        Ok(())
    }

    pub fn get(&self, criterion: Criterion) -> Option<f64> {
        self.0.get(&criterion).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Criterion, f64)> + '_ {
        self.0.iter().map(|(c, v)| (*c, *v))
    }

    pub fn criteria(&self) -> impl Iterator<Item = Criterion> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scalar rollup: mean of present criteria, 0.0 when empty.
    pub fn overall(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.values().sum::<f64>() / self.0.len() as f64
    }

    /// Merge judge verdicts into one snapshot.
    ///
    /// Each criterion gets the mean of the judges that scored it.
    pub fn mean_of(verdicts: &[CriteriaScores]) -> Self {
        let mut sums: BTreeMap<Criterion, (f64, usize)> = BTreeMap::new();
        for verdict in verdicts {
            for (criterion, value) in verdict.iter() {
                let entry = sums.entry(criterion).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
        Self(
            sums.into_iter()
                .map(|(c, (sum, n))| (c, sum / n as f64))
                .collect(),
        )
    }
}

/// A quality finding reported by a judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub criterion: Criterion,
    pub severity: Severity,
    /// Free text; normalized to a section key for grouping.
    pub location: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl Issue {
    pub fn new(
        criterion: Criterion,
        severity: Severity,
        location: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            criterion,
            severity,
            location: location.into(),
            description: description.into(),
            suggested_fix: None,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

/// One judge's structured verdict: scores plus findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Judge identifier (model or rubric name)
    pub judge: String,
    pub scores: CriteriaScores,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl JudgeVerdict {
    pub fn new(judge: impl Into<String>, scores: CriteriaScores) -> Self {
        Self {
            judge: judge.into(),
            scores,
            issues: Vec::new(),
        }
    }

    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.issues = issues;
        self
    }
}
