//! Agreement scoring across judges.
//!
//! Uses Krippendorff's alpha with the interval (squared difference) metric.
//! Criteria are the units of analysis and judges are the coders. A criterion
//! scored by fewer than two judges is not pairable and is left out, which is
//! the standard missing-data treatment for alpha.
//!
//! `alpha = 1 - D_o / D_e`, where `D_o` is the observed within-criterion
//! disagreement and `D_e` the disagreement expected by chance. `D_e` is the
//! pooled-score disagreement, floored at [`SCALE_DISAGREEMENT`]: a lesson whose
//! criteria all score alike would otherwise turn small judge differences into
//! `low` agreement. The exposed score is clipped to `[0, 1]`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::criteria::{CriteriaScores, Criterion};

/// Lower bound (inclusive) for `high` agreement
pub const HIGH_AGREEMENT_THRESHOLD: f64 = 0.80;

/// Lower bound (inclusive) for `moderate` agreement
pub const MODERATE_AGREEMENT_THRESHOLD: f64 = 0.67;

/// Mean squared difference of two uniform draws on `[0, 1]`
pub const SCALE_DISAGREEMENT: f64 = 1.0 / 6.0;

/// Error type for agreement scoring
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgreementError {
    #[error("No verdicts supplied for agreement scoring")]
    EmptyInput,

    #[error("Incomplete verdict batch: got {received} of {expected}, missing {missing:?}")]
    IncompleteBatch {
        expected: usize,
        received: usize,
        missing: Vec<String>,
    },
}

/// Result type for agreement scoring
pub type AgreementResult<T> = Result<T, AgreementError>;

/// Discrete agreement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementLevel {
    Low,
    Moderate,
    High,
}

impl AgreementLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_AGREEMENT_THRESHOLD {
            Self::High
        } else if score >= MODERATE_AGREEMENT_THRESHOLD {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for AgreementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Agreement across one batch of verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    /// Clipped alpha in `[0, 1]`
    pub score: f64,
    pub level: AgreementLevel,
    pub judges: usize,
    /// Criteria scored by at least two judges
    pub pairable_criteria: usize,
}

/// Score agreement across judge verdicts.
///
/// One verdict is perfect agreement by definition. With no pairable
/// criteria there is no observable disagreement, which also scores 1.0.
pub fn agreement(verdicts: &[CriteriaScores]) -> AgreementResult<Agreement> {
    if verdicts.is_empty() {
        return Err(AgreementError::EmptyInput);
    }

    let pairable_criteria = pairable_units(verdicts).len();

    let score = if verdicts.len() == 1 {
        1.0
    } else {
        krippendorff_alpha(verdicts)
            .map(|alpha| alpha.clamp(0.0, 1.0))
            .unwrap_or(1.0)
    };
    let level = AgreementLevel::from_score(score);

    debug!(
        judges = verdicts.len(),
        pairable_criteria,
        score,
        level = %level,
        "Agreement scored"
    );

    Ok(Agreement {
        score,
        level,
        judges: verdicts.len(),
        pairable_criteria,
    })
}

/// Raw interval alpha (may be negative). `None` when nothing is pairable.
pub fn krippendorff_alpha(verdicts: &[CriteriaScores]) -> Option<f64> {
    let units = pairable_units(verdicts);
    let n: usize = units.iter().map(Vec::len).sum();
    if n < 2 {
        return None;
    }

    let observed: f64 = units
        .iter()
        .map(|values| ordered_pair_sum(values) / (values.len() - 1) as f64)
        .sum::<f64>()
        / n as f64;

    let pooled: Vec<f64> = units.iter().flatten().copied().collect();
    let expected = (ordered_pair_sum(&pooled) / (n * (n - 1)) as f64).max(SCALE_DISAGREEMENT);

    Some(1.0 - observed / expected)
}

/// Scores per criterion, keeping only criteria with two or more judges.
fn pairable_units(verdicts: &[CriteriaScores]) -> Vec<Vec<f64>> {
    Criterion::PRIORITY
        .iter()
        .map(|criterion| {
            verdicts
                .iter()
                .filter_map(|v| v.get(*criterion))
                .collect::<Vec<f64>>()
        })
        .filter(|values| values.len() >= 2)
        .collect()
}

/// Sum of squared differences over ordered pairs `i != j`.
fn ordered_pair_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (i, a) in values.iter().enumerate() {
        for b in &values[i + 1..] {
            sum += (a - b).powi(2);
        }
    }
    2.0 * sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(values: [f64; 6]) -> CriteriaScores {
        CriteriaScores::from_pairs(Criterion::PRIORITY.iter().copied().zip(values)).unwrap()
    }

    #[test]
    fn test_empty_input_fails() {
        assert_eq!(agreement(&[]), Err(AgreementError::EmptyInput));
    }

    #[test]
    fn test_single_verdict_is_high() {
        let result = agreement(&[verdict([0.1, 0.9, 0.5, 0.3, 0.7, 0.2])]).unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.level, AgreementLevel::High);
    }

    #[test]
    fn test_identical_verdicts_are_high() {
        let v = verdict([0.9, 0.5, 0.7, 0.3, 0.8, 0.6]);
        for judges in 2..=5 {
            let result = agreement(&vec![v.clone(); judges]).unwrap();
            assert!(result.score >= 0.80);
            assert_eq!(result.level, AgreementLevel::High);
        }
    }

    #[test]
    fn test_identical_flat_verdicts_are_high() {
        let v = verdict([0.8; 6]);
        let result = agreement(&[v.clone(), v]).unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.level, AgreementLevel::High);
    }

    #[test]
    fn test_near_unanimous_flat_verdicts_are_high() {
        let result = agreement(&[verdict([0.80; 6]), verdict([0.81; 6])]).unwrap();
        assert!(result.score > 0.99, "score {}", result.score);
        assert_eq!(result.level, AgreementLevel::High);

        let spread = agreement(&[verdict([0.80; 6]), verdict([0.95; 6])]).unwrap();
        assert!(spread.score < result.score);
    }

    #[test]
    fn test_opposed_judges_are_low_and_clipped() {
        let a = verdict([0.9; 6]);
        let b = verdict([0.3; 6]);
        let raw = krippendorff_alpha(&[a.clone(), b.clone()]).unwrap();
        assert!(raw < 0.0);

        let result = agreement(&[a, b]).unwrap();
        assert_eq!(result.score, 0.0);
        assert_eq!(result.level, AgreementLevel::Low);
    }

    #[test]
    fn test_score_decreases_as_disagreement_grows() {
        let base = [0.9, 0.5, 0.7, 0.3, 0.8, 0.6];
        let shifted = |d: f64| verdict(base.map(|x| (x + d).min(1.0)));

        let close = agreement(&[verdict(base), shifted(0.02)]).unwrap().score;
        let apart = agreement(&[verdict(base), shifted(0.1)]).unwrap().score;
        assert!(close > apart);
        assert!(close >= HIGH_AGREEMENT_THRESHOLD);
    }

    #[test]
    fn test_unpairable_criteria_are_skipped() {
        let a = CriteriaScores::from_pairs([
            (Criterion::FactualAccuracy, 0.8),
            (Criterion::Completeness, 0.1),
        ])
        .unwrap();
        let b = CriteriaScores::from_pairs([(Criterion::FactualAccuracy, 0.8)]).unwrap();
        let result = agreement(&[a, b]).unwrap();
        assert_eq!(result.pairable_criteria, 1);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(AgreementLevel::from_score(0.80), AgreementLevel::High);
        assert_eq!(AgreementLevel::from_score(0.7999), AgreementLevel::Moderate);
        assert_eq!(AgreementLevel::from_score(0.67), AgreementLevel::Moderate);
        assert_eq!(AgreementLevel::from_score(0.6699), AgreementLevel::Low);
    }
}
