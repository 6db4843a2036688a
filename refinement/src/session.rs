//! Refinement Session: one lesson's refinement cycles, snapshot by snapshot
//!
//! ```text
//!   start ──► iteration 0 scored, locks captured
//!     │
//!     ▼
//!   advance(CycleInput)
//!     1. tokens + cost          ─► CostLedger
//!     2. successful patches     ─► section edit counts
//!     3. verdict batch          ─► Agreement
//!     4. merged scores vs locks ─► rollback on violation
//!     5. pooled issues          ─► ConflictResolution
//!     6. IterationResult appended, score recorded
//!     7. IterationController    ─► decision + section locks
//!     8. stop? ─► accepted | BestEffortSelector
//! ```
//!
//! `advance` never mutates `self`; it returns the next session snapshot.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::arbiter::{agreement, resolve_conflicts, Agreement, ConflictResolution, VerdictBatch};
use crate::best_effort::{improvement_hints, BestEffortResult, BestEffortSelector, FinalStatus};
use crate::config::RefinementConfig;
use crate::controller::{
    should_continue_iteration, DecisionReason, IterationDecision, RefinementState,
};
use crate::cost::{CostCalculator, CostLedger};
use crate::criteria::{CriteriaScores, Issue};
use crate::error::{RefinementError, RefinementResult};
use crate::history::IterationResult;
use crate::quality_lock::{
    check_locks, initialize_locks, verify_delta, DeltaVerdict, LockCheck, QualityLockMap,
};

/// Section id used for lock checks when a cycle patched nothing.
const WHOLE_LESSON: &str = "lesson";

/// One patch attempt as reported by the patch executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchReport {
    pub section: String,
    pub success: bool,
    /// Priced model; `None` skips cost accounting but still counts tokens
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    /// Issue the patch was aimed at, for delta verification
    #[serde(default)]
    pub target: Option<Issue>,
}

impl PatchReport {
    pub fn new(section: impl Into<String>, success: bool) -> Self {
        Self {
            section: section.into(),
            success,
            model: None,
            input_tokens: 0,
            output_tokens: 0,
            target: None,
        }
    }

    pub fn with_usage(mut self, model: impl Into<String>, input: u64, output: u64) -> Self {
        self.model = Some(model.into());
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    pub fn with_target(mut self, target: Issue) -> Self {
        self.target = Some(target);
        self
    }

    pub fn tokens_used(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Everything one cycle produced outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleInput {
    pub patches: Vec<PatchReport>,
    /// Content after all patches were applied
    pub content: String,
    pub batch: VerdictBatch,
}

/// Terminal disposition of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutcome {
    pub status: FinalStatus,
    pub reason: DecisionReason,
    pub content: String,
    pub score: f64,
    pub escalate: bool,
    pub improvement_hints: Vec<String>,
    /// Present when the loop stopped short of the accept threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_effort: Option<BestEffortResult>,
}

/// Per-cycle report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub iteration: u32,
    pub agreement: Agreement,
    pub lock_check: LockCheck,
    pub rolled_back: bool,
    pub deltas: Vec<DeltaVerdict>,
    pub resolution: ConflictResolution,
    pub decision: IterationDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_outcome: Option<FinalOutcome>,
}

/// Next session snapshot plus what happened getting there.
#[derive(Debug, Clone)]
pub struct CycleStep {
    pub session: RefinementSession,
    pub outcome: CycleOutcome,
}

/// Serializable view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub iterations: u32,
    pub score_history: Vec<f64>,
    pub locked_sections: Vec<String>,
    pub tokens_used: u64,
    pub total_cost: f64,
    pub final_outcome: Option<FinalOutcome>,
}

/// One lesson's refinement session.
#[derive(Debug, Clone)]
pub struct RefinementSession {
    id: Uuid,
    config: RefinementConfig,
    calculator: CostCalculator,
    state: RefinementState,
    locks: QualityLockMap,
    history: Vec<IterationResult>,
    ledger: CostLedger,
    current_scores: CriteriaScores,
    unresolved_issues: Vec<Issue>,
    last_decision: IterationDecision,
    final_outcome: Option<FinalOutcome>,
}

impl RefinementSession {
    /// Score the initial generation and capture quality locks.
    pub fn start<I, S>(
        config: RefinementConfig,
        sections: I,
        initial_content: impl Into<String>,
        initial_batch: VerdictBatch,
    ) -> RefinementResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::start_at(config, sections, initial_content, initial_batch, Utc::now())
    }

    /// [`start`](Self::start) against an explicit clock.
    pub fn start_at<I, S>(
        config: RefinementConfig,
        sections: I,
        initial_content: impl Into<String>,
        initial_batch: VerdictBatch,
        now: DateTime<Utc>,
    ) -> RefinementResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        config.validate()?;
        let calculator = CostCalculator::new(config.price_table(), config.cost_ceiling);

        let verdicts = initial_batch.into_verdicts(config.judge_quorum)?;
        let batch = VerdictBatch::complete(verdicts);
        let scores = batch.scores();
        let agreement = agreement(&scores)?;
        let merged = CriteriaScores::mean_of(&scores);
        let resolution = resolve_conflicts(&batch.pooled_issues(), agreement.score, agreement.judges);

        let locks = initialize_locks(&merged, config.lock_threshold);
        let state = RefinementState::new(sections).with_start_time(now);
        let initial = IterationResult::from_scores(0, merged.clone(), initial_content)
            .with_issues(resolution.accepted.clone());
        let initial_score = initial.score;

        let id = Uuid::new_v4();
        info!(
            session = %id,
            sections = state.all_sections.len(),
            score = initial_score,
            locked_criteria = locks.len(),
            mode = %config.operation_mode,
            "Refinement session started"
        );

        let decision = should_continue_iteration(&state, initial_score, &config, now);
        let mut session = Self {
            id,
            config,
            calculator,
            state,
            locks,
            history: vec![initial],
            ledger: CostLedger::new(),
            current_scores: merged,
            unresolved_issues: resolution.accepted,
            last_decision: decision.clone(),
            final_outcome: None,
        };
        if !decision.should_continue {
            session.final_outcome = Some(session.finish(&decision)?);
        }
        Ok(session)
    }

    /// Fold one cycle's patches and verdicts into a new snapshot.
    ///
    /// Cost and verdict-batch errors abort the cycle; `self` is untouched.
    pub fn advance(&self, input: CycleInput, now: DateTime<Utc>) -> RefinementResult<CycleStep> {
        if let Some(done) = &self.final_outcome {
            return Err(RefinementError::SessionFinished(done.status.to_string()));
        }

        // 1. tokens and cost
        let (mut state, ledger) = self.account_patches(&input.patches)?;

        // 2. edit counts
        for patch in &input.patches {
            state = state.record_patch(&patch.section, patch.success)?;
        }

        // 3. agreement
        let verdicts = input.batch.into_verdicts(self.config.judge_quorum)?;
        let batch = VerdictBatch::complete(verdicts);
        let scores = batch.scores();
        let agreement = agreement(&scores)?;
        let merged = CriteriaScores::mean_of(&scores);

        // 4. quality locks
        let section_id = patched_sections(&input.patches);
        let lock_check = check_locks(&self.locks, &merged, &section_id, self.config.lock_tolerance);
        let deltas: Vec<DeltaVerdict> = input
            .patches
            .iter()
            .filter(|p| p.success)
            .filter_map(|p| {
                p.target.as_ref().map(|target| {
                    verify_delta(
                        target,
                        &p.section,
                        &self.current_scores,
                        &merged,
                        &self.locks,
                        self.config.lock_tolerance,
                    )
                })
            })
            .collect();
        let rolled_back = !lock_check.passed;

        // 5. conflicts
        let resolution =
            resolve_conflicts(&batch.pooled_issues(), agreement.score, agreement.judges);

        // 6. history
        let iteration = state.iteration + 1;
        let (result, current_scores, unresolved_issues) = if rolled_back {
            warn!(
                session = %self.id,
                iteration,
                violations = lock_check.violations.len(),
                "Patch rolled back after lock violation"
            );
            let previous = self.latest();
            let result = IterationResult::from_scores(
                iteration,
                self.current_scores.clone(),
                previous.content.clone(),
            )
            .with_issues(self.unresolved_issues.clone());
            (result, self.current_scores.clone(), self.unresolved_issues.clone())
        } else {
            let result = IterationResult::from_scores(iteration, merged.clone(), input.content)
                .with_issues(resolution.accepted.clone());
            (result, merged, resolution.accepted.clone())
        };
        let score = result.score;
        state = state.record_iteration(score);
        let mut history = self.history.clone();
        history.push(result);

        // 7. decision
        let decision = should_continue_iteration(&state, score, &self.config, now);
        state = state.with_locked_sections(&decision.newly_locked_sections);

        info!(
            session = %self.id,
            iteration,
            score,
            agreement = agreement.score,
            rolled_back,
            reason = %decision.reason,
            "Refinement cycle complete"
        );

        let mut next = Self {
            id: self.id,
            config: self.config.clone(),
            calculator: self.calculator.clone(),
            state,
            locks: self.locks.clone(),
            history,
            ledger,
            current_scores,
            unresolved_issues,
            last_decision: decision.clone(),
            final_outcome: None,
        };

        // 8. disposition
        if !decision.should_continue {
            next.final_outcome = Some(next.finish(&decision)?);
        }

        let outcome = CycleOutcome {
            iteration,
            agreement,
            lock_check,
            rolled_back,
            deltas,
            resolution,
            decision,
            final_outcome: next.final_outcome.clone(),
        };
        Ok(CycleStep {
            session: next,
            outcome,
        })
    }

    /// Evaluate the timeout condition without recording an iteration.
    ///
    /// `completed` holds the patches that finished earlier in the unfinished
    /// cycle; their tokens and cost are billed to the returned session. Returns
    /// `None` while the session still has time.
    pub fn check_timeout(
        &self,
        now: DateTime<Utc>,
        completed: &[PatchReport],
    ) -> RefinementResult<Option<Self>> {
        if self.final_outcome.is_some() || self.state.elapsed_ms(now) < self.config.timeout_ms {
            return Ok(None);
        }
        let (state, ledger) = self.account_patches(completed)?;
        let score = self.latest().score;
        let decision = should_continue_iteration(&state, score, &self.config, now);
        if decision.should_continue {
            return Ok(None);
        }
        let mut next = self.clone();
        next.state = state;
        next.ledger = ledger;
        next.final_outcome = Some(next.finish(&decision)?);
        next.last_decision = decision;
        Ok(Some(next))
    }

    /// Tokens (saturating) and priced cost of `patches`, on copies.
    fn account_patches(
        &self,
        patches: &[PatchReport],
    ) -> RefinementResult<(RefinementState, CostLedger)> {
        let mut state = self.state.clone();
        let mut ledger = self.ledger.clone();
        for patch in patches {
            state = state.record_tokens(patch.tokens_used());
            if let Some(model) = &patch.model {
                let breakdown = self.calculator.calculate_cost_breakdown(
                    model,
                    patch.input_tokens as f64,
                    patch.output_tokens as f64,
                )?;
                ledger.record(breakdown);
            }
        }
        Ok((state, ledger))
    }

    fn finish(&self, decision: &IterationDecision) -> RefinementResult<FinalOutcome> {
        let mode = self.config.operation_mode;
        if decision.reason == DecisionReason::StopScoreThresholdMet {
            let latest = self.latest();
            return Ok(FinalOutcome {
                status: FinalStatus::Accepted,
                reason: decision.reason,
                content: latest.content.clone(),
                score: latest.score,
                escalate: false,
                improvement_hints: improvement_hints(&self.unresolved_issues, self.config.max_hints),
                best_effort: None,
            });
        }

        let selection = BestEffortSelector::from_config(&self.config).select(
            &self.history,
            &self.unresolved_issues,
            mode,
        )?;
        Ok(FinalOutcome {
            status: selection.final_status,
            reason: decision.reason,
            content: selection.best_result.content.clone(),
            score: selection.best_result.score,
            escalate: decision.escalate,
            improvement_hints: selection.improvement_hints.clone(),
            best_effort: Some(selection),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    pub fn state(&self) -> &RefinementState {
        &self.state
    }

    pub fn locks(&self) -> &QualityLockMap {
        &self.locks
    }

    pub fn history(&self) -> &[IterationResult] {
        &self.history
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    /// Most recent history entry; history always holds iteration 0.
    pub fn latest(&self) -> &IterationResult {
        &self.history[self.history.len() - 1]
    }

    pub fn current_content(&self) -> &str {
        &self.latest().content
    }

    pub fn current_scores(&self) -> &CriteriaScores {
        &self.current_scores
    }

    pub fn unresolved_issues(&self) -> &[Issue] {
        &self.unresolved_issues
    }

    pub fn last_decision(&self) -> &IterationDecision {
        &self.last_decision
    }

    pub fn final_outcome(&self) -> Option<&FinalOutcome> {
        self.final_outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.final_outcome.is_some()
    }

    /// Unresolved issues in sections that may still be edited.
    pub fn actionable_issues(&self) -> Vec<&Issue> {
        let editable = self.state.editable_sections();
        self.unresolved_issues
            .iter()
            .filter(|issue| {
                editable
                    .iter()
                    .any(|section| issue_targets_section(issue, section))
            })
            .collect()
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            id: self.id,
            iterations: self.state.iteration,
            score_history: self.state.score_history.clone(),
            locked_sections: self.state.locked_sections.iter().cloned().collect(),
            tokens_used: self.state.tokens_used,
            total_cost: self.ledger.total_cost,
            final_outcome: self.final_outcome.clone(),
        }
    }
}

/// Whether an issue's normalized location names `section`.
pub fn issue_targets_section(issue: &Issue, section: &str) -> bool {
    let location = crate::arbiter::normalize_location(&issue.location);
    let section = section.to_lowercase();
    location == section || location.split_whitespace().any(|word| word == section)
}

fn patched_sections(patches: &[PatchReport]) -> String {
    if patches.is_empty() {
        return WHOLE_LESSON.to_string();
    }
    let sections: BTreeSet<&str> = patches.iter().map(|p| p.section.as_str()).collect();
    sections.into_iter().collect::<Vec<_>>().join(",")
}
