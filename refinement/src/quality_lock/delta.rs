//! Delta verification: did a targeted patch fix its issue without regressions?

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::{check_locks, LockViolation, QualityLockMap};
use crate::criteria::{CriteriaScores, Criterion, Issue};

/// Verdict on a single targeted patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaVerdict {
    pub target_criterion: Criterion,
    /// `after - before` for the target criterion (0.0 if either is missing)
    pub improvement: f64,
    /// Target criterion strictly improved
    pub resolved: bool,
    /// Lock violations introduced by the patch
    pub regressions: Vec<LockViolation>,
    /// Resolved with no regressions
    pub accepted: bool,
}

/// Verify a patch aimed at `target` by comparing snapshots around it.
pub fn verify_delta(
    target: &Issue,
    section_id: &str,
    before: &CriteriaScores,
    after: &CriteriaScores,
    locks: &QualityLockMap,
    tolerance: f64,
) -> DeltaVerdict {
    let improvement = match (before.get(target.criterion), after.get(target.criterion)) {
        (Some(b), Some(a)) => a - b,
        _ => 0.0,
    };
    let resolved = improvement > 0.0;
    let regressions = check_locks(locks, after, section_id, tolerance).violations;
    let accepted = resolved && regressions.is_empty();

    debug!(
        criterion = %target.criterion,
        section = section_id,
        improvement,
        regressions = regressions.len(),
        accepted,
        "Delta verified"
    );

    DeltaVerdict {
        target_criterion: target.criterion,
        improvement,
        resolved,
        regressions,
        accepted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Severity;
    use crate::quality_lock::initialize_locks;

    fn scores(pairs: &[(Criterion, f64)]) -> CriteriaScores {
        CriteriaScores::from_pairs(pairs.iter().copied()).unwrap()
    }

    fn clarity_issue() -> Issue {
        Issue::new(
            Criterion::ClarityReadability,
            Severity::Major,
            "section 2",
            "Dense jargon",
        )
    }

    #[test]
    fn test_resolved_without_regression_is_accepted() {
        let before = scores(&[
            (Criterion::ClarityReadability, 0.6),
            (Criterion::FactualAccuracy, 0.9),
        ]);
        let after = scores(&[
            (Criterion::ClarityReadability, 0.8),
            (Criterion::FactualAccuracy, 0.88),
        ]);
        let locks = initialize_locks(&before, 0.75);

        let verdict = verify_delta(&clarity_issue(), "section 2", &before, &after, &locks, 0.05);
        assert!(verdict.resolved);
        assert!(verdict.accepted);
        assert!((verdict.improvement - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_fix_that_breaks_lock_is_rejected() {
        let before = scores(&[
            (Criterion::ClarityReadability, 0.6),
            (Criterion::FactualAccuracy, 0.9),
        ]);
        let after = scores(&[
            (Criterion::ClarityReadability, 0.85),
            (Criterion::FactualAccuracy, 0.7),
        ]);
        let locks = initialize_locks(&before, 0.75);

        let verdict = verify_delta(&clarity_issue(), "section 2", &before, &after, &locks, 0.05);
        assert!(verdict.resolved);
        assert!(!verdict.accepted);
        assert_eq!(verdict.regressions.len(), 1);
        assert_eq!(verdict.regressions[0].criterion, Criterion::FactualAccuracy);
    }

    #[test]
    fn test_no_change_is_not_resolved() {
        let before = scores(&[(Criterion::ClarityReadability, 0.6)]);
        let locks = initialize_locks(&before, 0.75);
        let verdict = verify_delta(&clarity_issue(), "section 2", &before, &before, &locks, 0.05);
        assert!(!verdict.resolved);
        assert!(!verdict.accepted);
    }
}
