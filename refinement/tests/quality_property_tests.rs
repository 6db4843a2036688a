//! Quality property tests: sweeps over thresholds, tolerances and judge
//! spreads validating the core invariants.
//!
//! Tests verify:
//! - Lock violations fire strictly beyond tolerance
//! - Lock capture is inclusive at the threshold
//! - Agreement falls as judges spread apart
//! - A single verdict always agrees perfectly
//! - Cost is linear and additive for every priced model
//! - Controller stop conditions follow their fixed priority order

use chrono::{Duration, Utc};
use refinement::{
    agreement, check_locks, detect_convergence, estimate_cost, initialize_locks,
    should_continue_iteration, AgreementLevel, CriteriaScores, Criterion, DecisionReason,
    PriceTable, RefinementConfig, RefinementState,
};

fn uniform(value: f64) -> CriteriaScores {
    CriteriaScores::from_pairs(Criterion::PRIORITY.iter().map(|c| (*c, value))).unwrap()
}

/// Verdict whose criteria rise across the priority table, shifted by `offset`.
fn spread(offset: f64) -> CriteriaScores {
    CriteriaScores::from_pairs(
        Criterion::PRIORITY
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, (0.3 + 0.1 * i as f64 + offset).clamp(0.0, 1.0))),
    )
    .unwrap()
}

#[test]
fn test_lock_violation_iff_drop_exceeds_tolerance() {
    // Scores and tolerances are multiples of 1/8 so deltas are exact.
    let steps: Vec<f64> = (0..=8).map(|i| i as f64 / 8.0).collect();
    for &locked in &steps {
        let locks = initialize_locks(&uniform(locked), 0.0);
        for &new in &steps {
            for &tolerance in &[0.0, 0.125, 0.25] {
                let check = check_locks(&locks, &uniform(new), "s", tolerance);
                let expected = new - locked < -tolerance;
                assert_eq!(
                    !check.passed,
                    expected,
                    "locked={} new={} tol={}",
                    locked,
                    new,
                    tolerance
                );
                assert_eq!(check.current_locks, locks);
            }
        }
    }
}

#[test]
fn test_lock_capture_inclusive() {
    for threshold in [0.0, 0.25, 0.5, 0.75, 1.0] {
        let scores = spread(0.0);
        let locks = initialize_locks(&scores, threshold);
        for (criterion, score) in scores.iter() {
            assert_eq!(locks.contains(criterion), score >= threshold);
        }
    }
}

#[test]
fn test_single_verdict_always_high() {
    for offset in [-0.3, 0.0, 0.2, 0.5] {
        let result = agreement(&[spread(offset)]).unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.level, AgreementLevel::High);
    }
}

#[test]
fn test_agreement_decreases_with_spread() {
    let mut previous = f64::INFINITY;
    for gap in [0.0, 0.02, 0.05, 0.1, 0.2] {
        let verdicts = [spread(-gap), spread(0.0), spread(gap)];
        let score = agreement(&verdicts).unwrap().score;
        assert!(
            score <= previous,
            "agreement rose from {} to {} at gap {}",
            previous,
            score,
            gap
        );
        assert!((0.0..=1.0).contains(&score));
        previous = score;
    }
}

#[test]
fn test_identical_verdicts_agree() {
    for judges in 2..6 {
        let verdicts: Vec<CriteriaScores> = (0..judges).map(|_| spread(0.1)).collect();
        let result = agreement(&verdicts).unwrap();
        assert!(result.score >= 0.80);
        assert_eq!(result.level, AgreementLevel::High);
    }
}

#[test]
fn test_cost_linear_for_every_model() {
    for model in PriceTable::default().models() {
        for (a, b) in [(1.0, 2.0), (10_000.0, 30_000.0), (250_000.0, 750_000.0)] {
            let whole = estimate_cost(&model, a + b, 0.0).unwrap();
            let parts = estimate_cost(&model, a, 0.0).unwrap() + estimate_cost(&model, b, 0.0).unwrap();
            assert!((whole - parts).abs() < 1e-12, "model {}", model);
        }
    }
}

#[test]
fn test_convergence_needs_plateau() {
    assert!(detect_convergence(&[0.70, 0.78, 0.79, 0.79], 0.02));
    assert!(!detect_convergence(&[0.60, 0.70, 0.80], 0.02));
    assert!(!detect_convergence(&[0.79, 0.79], 0.02));
    // A single small step is not a plateau
    assert!(!detect_convergence(&[0.70, 0.75, 0.76], 0.02));
}

#[test]
fn test_stop_priority_order() {
    let config = RefinementConfig::default();
    let start = Utc::now();
    let late = start + Duration::milliseconds(config.timeout_ms as i64);

    // Every stop condition holds at once; the accept bar wins
    let mut state = RefinementState::new(["a"]).with_start_time(start);
    for _ in 0..config.max_iterations {
        state = state.record_iteration(0.80);
    }
    state = state.record_tokens(config.max_tokens);
    state = state.record_patch("a", true).unwrap();
    state = state.record_patch("a", true).unwrap();

    let expected = [
        (0.90, DecisionReason::StopScoreThresholdMet),
        (0.50, DecisionReason::StopMaxIterations),
    ];
    for (score, reason) in expected {
        assert_eq!(should_continue_iteration(&state, score, &config, late).reason, reason);
    }

    let fresh = RefinementState::new(["a"])
        .with_start_time(start)
        .record_tokens(config.max_tokens);
    assert_eq!(
        should_continue_iteration(&fresh, 0.5, &config, late).reason,
        DecisionReason::StopTokenBudget
    );

    let fresh = RefinementState::new(["a"]).with_start_time(start);
    assert_eq!(
        should_continue_iteration(&fresh, 0.5, &config, late).reason,
        DecisionReason::StopTimeout
    );
    assert_eq!(
        should_continue_iteration(&fresh, 0.5, &config, start).reason,
        DecisionReason::ContinueMoreTasks
    );
}
