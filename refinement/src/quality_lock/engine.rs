//! Lock capture and regression checks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::criteria::{CriteriaScores, Criterion};

/// Default pass threshold for capturing a lock
pub const DEFAULT_LOCK_THRESHOLD: f64 = 0.75;

/// Default allowed drop below a locked score (fraction of the 0–1 scale)
pub const DEFAULT_LOCK_TOLERANCE: f64 = 0.05;

/// Slack for decimal scores that are not exact in binary (0.90 - 0.85)
const SCORE_EPSILON: f64 = 1e-9;

/// Frozen baseline scores, keyed by criterion.
///
/// Captured once per session and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityLockMap {
    locks: BTreeMap<Criterion, f64>,
    /// When the snapshot was taken
    pub captured_at: Option<DateTime<Utc>>,
}

impl QualityLockMap {
    pub fn get(&self, criterion: Criterion) -> Option<f64> {
        self.locks.get(&criterion).copied()
    }

    pub fn contains(&self, criterion: Criterion) -> bool {
        self.locks.contains_key(&criterion)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Criterion, f64)> + '_ {
        self.locks.iter().map(|(c, v)| (*c, *v))
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// A locked criterion that dropped beyond tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockViolation {
    pub criterion: Criterion,
    pub locked_score: f64,
    pub new_score: f64,
    /// `new_score - locked_score` (negative)
    pub delta: f64,
    pub section_id: String,
}

impl std::fmt::Display for LockViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} regressed in {}: {:.3} -> {:.3} ({:+.3})",
            self.criterion, self.section_id, self.locked_score, self.new_score, self.delta
        )
    }
}

/// Result of checking a post-patch snapshot against the locks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockCheck {
    pub passed: bool,
    pub violations: Vec<LockViolation>,
    /// The locks the check ran against (unchanged)
    pub current_locks: QualityLockMap,
}

/// Snapshot every criterion scoring `>= threshold` into a lock map.
///
/// Criteria below the threshold are omitted, not locked at a lower bound.
pub fn initialize_locks(scores: &CriteriaScores, threshold: f64) -> QualityLockMap {
    let locks: BTreeMap<Criterion, f64> = scores
        .iter()
        .filter(|(_, score)| *score >= threshold)
        .collect();

    debug!(
        locked = locks.len(),
        total = scores.len(),
        threshold,
        "Quality locks captured"
    );

    QualityLockMap {
        locks,
        captured_at: Some(Utc::now()),
    }
}

/// Check a post-patch snapshot against the locks.
///
/// A violation occurs iff `new - locked < -tolerance`; a drop of exactly
/// `tolerance` passes, up to [`SCORE_EPSILON`] of rounding. Criteria absent
/// from `locks` are ignored, and locked criteria missing from `new_scores`
/// are not judged.
pub fn check_locks(
    locks: &QualityLockMap,
    new_scores: &CriteriaScores,
    section_id: &str,
    tolerance: f64,
) -> LockCheck {
    let violations: Vec<LockViolation> = locks
        .iter()
        .filter_map(|(criterion, locked_score)| {
            let new_score = new_scores.get(criterion)?;
            let delta = new_score - locked_score;
            (delta < -tolerance - SCORE_EPSILON).then(|| LockViolation {
                criterion,
                locked_score,
                new_score,
                delta,
                section_id: section_id.to_string(),
            })
        })
        .collect();

    for violation in &violations {
        warn!(
            criterion = %violation.criterion,
            section = section_id,
            delta = violation.delta,
            tolerance,
            "Quality lock violated"
        );
    }

    LockCheck {
        passed: violations.is_empty(),
        violations,
        current_locks: locks.clone(),
    }
}
