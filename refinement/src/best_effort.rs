//! Best-effort selection when the loop stops short of the accept threshold.
//!
//! Picks the highest-scoring iteration seen so far, labels its quality for
//! the operating mode, and turns the unresolved findings into short hints
//! for whoever picks the lesson up next.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{OperatingMode, PerMode, QualityBands, RefinementConfig};
use crate::criteria::Issue;
use crate::history::IterationResult;

/// Default number of improvement hints
pub const DEFAULT_MAX_HINTS: usize = 5;

/// Error type for best-effort selection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Iteration history is empty")]
    EmptyHistory,
}

/// Result type for best-effort selection
pub type SelectionResult<T> = Result<T, SelectionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Good,
    Acceptable,
    BelowStandard,
}

impl QualityStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Acceptable => "acceptable",
            Self::BelowStandard => "below standard",
        }
    }
}

impl std::fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Final disposition surfaced to the orchestration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Accepted,
    AcceptedWarning,
    BestEffort,
    Escalated,
}

impl FinalStatus {
    pub fn from_quality(quality: QualityStatus, mode: OperatingMode) -> Self {
        match (quality, mode) {
            (QualityStatus::Good, _) => Self::Accepted,
            (QualityStatus::Acceptable, _) => Self::AcceptedWarning,
            (QualityStatus::BelowStandard, OperatingMode::FullAuto) => Self::BestEffort,
            (QualityStatus::BelowStandard, OperatingMode::SemiAuto) => Self::Escalated,
        }
    }
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::AcceptedWarning => write!(f, "accepted_warning"),
            Self::BestEffort => write!(f, "best_effort"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}

/// Outcome of best-effort selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestEffortResult {
    pub best_result: IterationResult,
    /// Index into the history
    pub selected_iteration: usize,
    pub selection_reason: String,
    pub quality_status: QualityStatus,
    pub final_status: FinalStatus,
    pub improvement_hints: Vec<String>,
    pub total_attempts: usize,
}

/// Best-effort selector with per-mode quality bands.
#[derive(Debug, Clone)]
pub struct BestEffortSelector {
    bands: PerMode<QualityBands>,
    max_hints: usize,
}

impl Default for BestEffortSelector {
    fn default() -> Self {
        Self::from_config(&RefinementConfig::default())
    }
}

impl BestEffortSelector {
    pub fn from_config(config: &RefinementConfig) -> Self {
        Self {
            bands: config.quality_bands,
            max_hints: config.max_hints,
        }
    }

    pub fn with_max_hints(mut self, max_hints: usize) -> Self {
        self.max_hints = max_hints;
        self
    }

    pub fn classify(&self, score: f64, mode: OperatingMode) -> QualityStatus {
        classify_quality(score, self.bands.get(mode))
    }

    pub fn select(
        &self,
        history: &[IterationResult],
        unresolved_issues: &[Issue],
        mode: OperatingMode,
    ) -> SelectionResult<BestEffortResult> {
        let (selected_iteration, best) = select_best_iteration(history)?;
        let quality_status = self.classify(best.score, mode);
        let final_status = FinalStatus::from_quality(quality_status, mode);
        let selection_reason = selection_reason(
            selected_iteration,
            best.score,
            quality_status,
            history.len(),
            mode,
        );
        let improvement_hints = improvement_hints(unresolved_issues, self.max_hints);

        info!(
            selected_iteration,
            score = best.score,
            quality = %quality_status,
            final_status = %final_status,
            hints = improvement_hints.len(),
            "Best-effort result selected"
        );

        Ok(BestEffortResult {
            best_result: best.clone(),
            selected_iteration,
            selection_reason,
            quality_status,
            final_status,
            improvement_hints,
            total_attempts: history.len(),
        })
    }
}

/// Index and entry with the strictly highest score; ties keep the first.
pub fn select_best_iteration(
    history: &[IterationResult],
) -> SelectionResult<(usize, &IterationResult)> {
    let mut iter = history.iter().enumerate();
    let mut best = iter.next().ok_or(SelectionError::EmptyHistory)?;
    for (idx, result) in iter {
        if result.score > best.1.score {
            best = (idx, result);
        }
    }
    Ok(best)
}

/// Label a score against inclusive lower bounds.
pub fn classify_quality(score: f64, bands: QualityBands) -> QualityStatus {
    if score >= bands.good {
        QualityStatus::Good
    } else if score >= bands.acceptable {
        QualityStatus::Acceptable
    } else {
        QualityStatus::BelowStandard
    }
}

/// Most severe findings first, rendered as `Improve <criterion>: <fix>`.
pub fn improvement_hints(issues: &[Issue], max_hints: usize) -> Vec<String> {
    let mut sorted: Vec<&Issue> = issues.iter().collect();
    // Stable: equal severities keep arrival order
    sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
    sorted
        .into_iter()
        .take(max_hints)
        .map(|issue| {
            format!(
                "Improve {}: {}",
                issue.criterion.label(),
                issue.suggested_fix.as_deref().unwrap_or(&issue.description)
            )
        })
        .collect()
}

fn selection_reason(
    index: usize,
    score: f64,
    quality: QualityStatus,
    total_attempts: usize,
    mode: OperatingMode,
) -> String {
    let which = if index == 0 {
        "initial generation (iteration 0)".to_string()
    } else {
        format!("refinement iteration {}", index)
    };
    let mut reason = format!(
        "Selected {} with score {:.1}% ({} quality)",
        which,
        score * 100.0,
        quality
    );
    if total_attempts > 1 {
        reason.push_str(&format!(" out of {} attempts", total_attempts));
    }
    reason.push('.');

    let qualifier = match (quality, mode) {
        (QualityStatus::Good, _) => " Meets the quality target.",
        (QualityStatus::Acceptable, _) => " Acceptable, but below the target threshold.",
        (QualityStatus::BelowStandard, OperatingMode::FullAuto) => {
            " Quality is below standard; this is the best available result."
        }
        (QualityStatus::BelowStandard, OperatingMode::SemiAuto) => {
            " Manual review recommended due to below-standard quality."
        }
    };
    reason.push_str(qualifier);
    reason
}
