//! Integration tests for the refinement session
//!
//! Drives full sessions through `start` → `advance` → disposition with
//! multi-judge verdict batches, validating the lock → arbiter → controller →
//! best-effort flow end to end.

use chrono::{DateTime, Duration, Utc};
use refinement::{
    CriteriaScores, Criterion, CycleInput, DecisionReason, FinalStatus, Issue, JudgeVerdict,
    OperatingMode, PatchReport, RefinementConfig, RefinementSession, Severity, VerdictBatch,
};

const SECTIONS: [&str; 3] = ["intro", "core", "summary"];

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Six-criterion verdict where every criterion sits at `base` except clarity.
fn verdict(judge: &str, base: f64, clarity: f64) -> JudgeVerdict {
    let scores = CriteriaScores::from_pairs([
        (Criterion::FactualAccuracy, base),
        (Criterion::LearningObjectiveAlignment, base),
        (Criterion::PedagogicalStructure, base),
        (Criterion::ClarityReadability, clarity),
        (Criterion::EngagementExamples, base),
        (Criterion::Completeness, base),
    ])
    .unwrap();
    JudgeVerdict::new(judge, scores)
}

fn three_judges(base: f64, clarity: f64, issues: Vec<Issue>) -> VerdictBatch {
    VerdictBatch::complete(vec![
        verdict("judge-a", base, clarity).with_issues(issues),
        verdict("judge-b", base, clarity),
        verdict("judge-c", base, clarity),
    ])
}

fn clarity_issue(location: &str) -> Issue {
    Issue::new(
        Criterion::ClarityReadability,
        Severity::Major,
        location,
        "Sentences run long",
    )
    .with_fix("Split the long sentences")
}

/// Test: A lesson that improves past the accept bar is accepted as-is
#[test]
fn test_improving_lesson_is_accepted() {
    let session = RefinementSession::start_at(
        RefinementConfig::default(),
        SECTIONS,
        "draft 0",
        three_judges(0.85, 0.50, vec![clarity_issue("intro")]),
        t0(),
    )
    .unwrap();
    assert!(!session.is_finished());
    assert_eq!(session.unresolved_issues().len(), 1);

    let patch = PatchReport::new("intro", true)
        .with_usage("claude-sonnet-4", 2_000, 800)
        .with_target(clarity_issue("intro"));
    let step = session
        .advance(
            CycleInput {
                patches: vec![patch],
                content: "draft 1".into(),
                batch: three_judges(0.88, 0.86, vec![]),
            },
            t0() + Duration::seconds(30),
        )
        .unwrap();

    let outcome = step.outcome.final_outcome.as_ref().unwrap();
    assert_eq!(outcome.status, FinalStatus::Accepted);
    assert_eq!(outcome.reason, DecisionReason::StopScoreThresholdMet);
    assert_eq!(outcome.content, "draft 1");
    assert!(step.outcome.deltas[0].resolved);
    assert!(step.outcome.lock_check.passed);

    let report = step.session.report();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.tokens_used, 2_800);
    // 2000 * 3/1M + 800 * 15/1M
    assert!((report.total_cost - 0.018).abs() < 1e-12);
}

/// Test: Repeated edits lock every section and the loop stops early
#[test]
fn test_all_sections_locked_stops_loop() {
    let config = RefinementConfig {
        max_iterations: 10,
        section_lock_after_edits: 1,
        ..RefinementConfig::default()
    };
    let session =
        RefinementSession::start_at(config, ["intro"], "v0", three_judges(0.60, 0.60, vec![]), t0())
            .unwrap();

    let step = session
        .advance(
            CycleInput {
                patches: vec![PatchReport::new("intro", true)],
                content: "v1".into(),
                batch: three_judges(0.62, 0.62, vec![]),
            },
            t0(),
        )
        .unwrap();

    assert_eq!(step.outcome.decision.reason, DecisionReason::StopAllSectionsLocked);
    assert_eq!(step.outcome.decision.newly_locked_sections, vec!["intro"]);
    assert!(step.session.state().is_locked("intro"));
    let outcome = step.session.final_outcome().unwrap();
    assert_eq!(outcome.status, FinalStatus::BestEffort);
    assert_eq!(outcome.content, "v1");
}

/// Test: A plateau over three cycles stops with convergence
#[test]
fn test_plateau_converges() {
    let config = RefinementConfig {
        max_iterations: 10,
        ..RefinementConfig::default()
    };
    let mut session =
        RefinementSession::start_at(config, SECTIONS, "v0", three_judges(0.70, 0.70, vec![]), t0())
            .unwrap();

    let mut reasons = Vec::new();
    for (i, score) in [0.78, 0.79, 0.79].iter().enumerate() {
        let step = session
            .advance(
                CycleInput {
                    patches: vec![],
                    content: format!("v{}", i + 1),
                    batch: three_judges(*score, *score, vec![]),
                },
                t0(),
            )
            .unwrap();
        reasons.push(step.outcome.decision.reason);
        session = step.session;
    }

    assert_eq!(
        reasons,
        vec![
            DecisionReason::ContinueMoreTasks,
            DecisionReason::ContinueMoreTasks,
            DecisionReason::StopConverged,
        ]
    );
    let outcome = session.final_outcome().unwrap();
    // 0.79 is acceptable in full-auto; the first 0.79 wins the tie
    assert_eq!(outcome.status, FinalStatus::AcceptedWarning);
    assert_eq!(outcome.content, "v2");
}

/// Test: Semi-auto token exhaustion below the good-enough bar escalates
#[test]
fn test_semi_auto_token_budget_escalates() {
    let config = RefinementConfig {
        max_tokens: 1_000,
        ..RefinementConfig::default()
    }
    .with_mode(OperatingMode::SemiAuto);
    let session =
        RefinementSession::start_at(config, SECTIONS, "v0", three_judges(0.70, 0.70, vec![]), t0())
            .unwrap();

    let patch = PatchReport::new("core", true).with_usage("gpt-4o-mini", 900, 300);
    let step = session
        .advance(
            CycleInput {
                patches: vec![patch],
                content: "v1".into(),
                batch: three_judges(0.72, 0.72, vec![clarity_issue("core")]),
            },
            t0(),
        )
        .unwrap();

    assert_eq!(step.outcome.decision.reason, DecisionReason::StopTokenBudget);
    assert!(step.outcome.decision.escalate);
    let outcome = step.session.final_outcome().unwrap();
    assert_eq!(outcome.status, FinalStatus::Escalated);
    assert_eq!(
        outcome.improvement_hints,
        vec!["Improve clarity readability: Split the long sentences"]
    );
    assert!(outcome
        .best_effort
        .as_ref()
        .unwrap()
        .selection_reason
        .contains("Manual review recommended"));
}

/// Test: Disagreeing judges drop uncorroborated findings
#[test]
fn test_low_agreement_keeps_only_critical_findings() {
    let critical = Issue::new(
        Criterion::FactualAccuracy,
        Severity::Critical,
        "core",
        "Wrong formula",
    );
    let minor = Issue::new(Criterion::Completeness, Severity::Minor, "summary", "Thin recap");
    let batch = VerdictBatch::complete(vec![
        verdict("judge-a", 0.95, 0.95).with_issues(vec![critical.clone(), minor]),
        verdict("judge-b", 0.20, 0.90),
        verdict("judge-c", 0.60, 0.10),
    ]);

    let session =
        RefinementSession::start_at(RefinementConfig::default(), SECTIONS, "v0", batch, t0())
            .unwrap();
    assert_eq!(session.unresolved_issues(), &[critical]);
}

/// Test: Near-unanimous judges over flat criteria keep their findings
#[test]
fn test_close_flat_verdicts_keep_major_findings() {
    let factual = Issue::new(
        Criterion::FactualAccuracy,
        Severity::Major,
        "core",
        "Outdated statistic",
    );
    let batch = VerdictBatch::complete(vec![
        verdict("judge-a", 0.80, 0.80).with_issues(vec![factual.clone()]),
        verdict("judge-b", 0.81, 0.81),
    ]);

    let session =
        RefinementSession::start_at(RefinementConfig::default(), SECTIONS, "v0", batch, t0())
            .unwrap();
    assert!(session.final_outcome().is_none());
    assert_eq!(session.unresolved_issues(), &[factual]);
}

/// Test: The session report serializes to JSON
#[test]
fn test_report_serializes() {
    let session = RefinementSession::start_at(
        RefinementConfig::default(),
        SECTIONS,
        "v0",
        three_judges(0.95, 0.95, vec![]),
        t0(),
    )
    .unwrap();
    let json = serde_json::to_value(session.report()).unwrap();
    assert_eq!(json["final_outcome"]["status"], "accepted");
    assert_eq!(json["iterations"], 0);
}
