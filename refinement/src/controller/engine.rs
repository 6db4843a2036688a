//! Iteration Controller: decision function for one refinement cycle
//!
//! Consumes a `RefinementState` snapshot and the latest score to produce an
//! `IterationDecision`. All decisions are deterministic.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::state::RefinementState;
use crate::config::{OperatingMode, RefinementConfig};

/// Why the loop continues or stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    StopScoreThresholdMet,
    StopMaxIterations,
    StopTokenBudget,
    StopTimeout,
    StopConverged,
    StopAllSectionsLocked,
    ContinueMoreTasks,
}

impl DecisionReason {
    pub fn is_stop(&self) -> bool {
        !matches!(self, Self::ContinueMoreTasks)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopScoreThresholdMet => "stop_score_threshold_met",
            Self::StopMaxIterations => "stop_max_iterations",
            Self::StopTokenBudget => "stop_token_budget",
            Self::StopTimeout => "stop_timeout",
            Self::StopConverged => "stop_converged",
            Self::StopAllSectionsLocked => "stop_all_sections_locked",
            Self::ContinueMoreTasks => "continue_more_tasks",
        }
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decision produced by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationDecision {
    pub reason: DecisionReason,
    pub should_continue: bool,
    /// Sections that reached the edit limit this cycle
    pub newly_locked_sections: Vec<String>,
    /// Sections still open after applying the new locks
    pub remaining_task_count: usize,
    /// Advisory: semi-auto stop below the good-enough threshold
    pub escalate: bool,
    pub latest_score: f64,
    pub iteration: u32,
    pub message: String,
}

/// The Iteration Controller
pub struct IterationController {
    config: RefinementConfig,
}

impl Default for IterationController {
    fn default() -> Self {
        Self::new()
    }
}

impl IterationController {
    /// Create a controller with default config
    pub fn new() -> Self {
        Self {
            config: RefinementConfig::default(),
        }
    }

    /// Create with custom config
    pub fn with_config(config: RefinementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Decide against the wall clock.
    pub fn decide(&self, state: &RefinementState, latest_score: f64) -> IterationDecision {
        self.decide_at(state, latest_score, Utc::now())
    }

    /// Decide against an explicit `now`.
    pub fn decide_at(
        &self,
        state: &RefinementState,
        latest_score: f64,
        now: DateTime<Utc>,
    ) -> IterationDecision {
        should_continue_iteration(state, latest_score, &self.config, now)
    }

    /// Whether the timeout condition holds at `now`.
    pub fn timed_out(&self, state: &RefinementState, now: DateTime<Utc>) -> bool {
        state.elapsed_ms(now) >= self.config.timeout_ms
    }
}

/// Evaluate the stop conditions in fixed priority order.
pub fn should_continue_iteration(
    state: &RefinementState,
    latest_score: f64,
    config: &RefinementConfig,
    now: DateTime<Utc>,
) -> IterationDecision {
    let newly_locked: Vec<String> =
        update_section_locks(&state.section_edit_count, config.section_lock_after_edits)
            .into_iter()
            .filter(|s| state.all_sections.contains(s) && !state.locked_sections.contains(s))
            .collect();

    let locked_union: BTreeSet<&String> = state
        .locked_sections
        .iter()
        .chain(newly_locked.iter())
        .collect();
    let remaining_task_count = state
        .all_sections
        .iter()
        .filter(|s| !locked_union.contains(s))
        .count();

    let accept_threshold = config.accept_threshold();
    let elapsed_ms = state.elapsed_ms(now);

    let (reason, message) = if latest_score >= accept_threshold {
        (
            DecisionReason::StopScoreThresholdMet,
            format!(
                "Score {:.3} meets {} threshold {:.2}",
                latest_score, config.operation_mode, accept_threshold
            ),
        )
    } else if state.iteration >= config.max_iterations {
        (
            DecisionReason::StopMaxIterations,
            format!("Reached {} of {} iterations", state.iteration, config.max_iterations),
        )
    } else if state.tokens_used >= config.max_tokens {
        (
            DecisionReason::StopTokenBudget,
            format!("Used {} of {} tokens", state.tokens_used, config.max_tokens),
        )
    } else if elapsed_ms >= config.timeout_ms {
        (
            DecisionReason::StopTimeout,
            format!("Elapsed {}ms of {}ms", elapsed_ms, config.timeout_ms),
        )
    } else if detect_convergence(&state.score_history, config.convergence_threshold) {
        (
            DecisionReason::StopConverged,
            format!(
                "Scores plateaued within {:.3} over the last 3 iterations",
                config.convergence_threshold
            ),
        )
    } else if !state.all_sections.is_empty() && remaining_task_count == 0 {
        (
            DecisionReason::StopAllSectionsLocked,
            format!("All {} sections locked", state.all_sections.len()),
        )
    } else {
        (
            DecisionReason::ContinueMoreTasks,
            format!("{} section(s) still open", remaining_task_count),
        )
    };

    let escalate = config.operation_mode == OperatingMode::SemiAuto
        && reason.is_stop()
        && reason != DecisionReason::StopScoreThresholdMet
        && latest_score < config.good_enough_threshold();

    if reason.is_stop() {
        info!(
            reason = %reason,
            iteration = state.iteration,
            latest_score,
            escalate,
            "Refinement loop stopping"
        );
    } else {
        debug!(
            iteration = state.iteration,
            latest_score,
            remaining_task_count,
            newly_locked = newly_locked.len(),
            "Refinement loop continuing"
        );
    }

    IterationDecision {
        reason,
        should_continue: !reason.is_stop(),
        newly_locked_sections: newly_locked,
        remaining_task_count,
        escalate,
        latest_score,
        iteration: state.iteration,
        message,
    }
}

/// True iff the last three scores differ pairwise-consecutively by less
/// than `threshold`. Needs at least three scores.
pub fn detect_convergence(history: &[f64], threshold: f64) -> bool {
    if history.len() < 3 {
        return false;
    }
    history[history.len() - 3..]
        .windows(2)
        .all(|w| (w[1] - w[0]).abs() < threshold)
}

/// Sections whose edit count reached `max_edits`, in id order.
pub fn update_section_locks(edit_counts: &BTreeMap<String, u32>, max_edits: u32) -> Vec<String> {
    edit_counts
        .iter()
        .filter(|(_, count)| **count >= max_edits)
        .map(|(section, _)| section.clone())
        .collect()
}
