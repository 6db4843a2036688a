//! Refinement loop driver.
//!
//! ```text
//! RefinementLoop::run(initial)
//!   → judges score iteration 0           (fan-out, all awaited)
//!   → RefinementSession::start
//!   → loop until the session finishes:
//!       pick targets from unresolved issues in editable sections
//!       for each target, sequentially:
//!           select! { patch completes | interval tick → check_timeout }
//!           (a timeout bills the patches already finished this cycle)
//!       judges score the patched content
//!       session.advance(...)
//!   → LoopReport
//! ```
//!
//! The controller's timeout is declarative; the interval tick re-invokes it
//! while a patch is in flight so a hung executor cannot outlive the session.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use refinement::{
    CycleInput, CycleOutcome, FinalOutcome, Issue, PatchReport, RefinementConfig,
    RefinementSession, SessionReport,
};

use crate::config::{DriverSettings, RunnerConfig};
use crate::context::{patch_instructions, render_context, RagChunk};
use crate::errors::LoopError;
use crate::fanout::collect_verdicts;
use crate::traits::{Judge, PatchExecutor, PatchRequest};

/// Result of a complete loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopReport {
    pub session: SessionReport,
    pub cycles: Vec<CycleOutcome>,
    pub final_outcome: FinalOutcome,
}

/// Wall clock anchored to the tokio clock so paused-time tests advance it.
#[derive(Debug, Clone, Copy)]
struct LoopClock {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl LoopClock {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.started.elapsed().as_millis() as i64;
        self.started_at + chrono::Duration::milliseconds(elapsed)
    }
}

enum PatchWait {
    Done(PatchReport, Option<String>),
    TimedOut(RefinementSession),
}

/// Async driver owning the collaborators for one lesson.
pub struct RefinementLoop {
    config: RefinementConfig,
    driver: DriverSettings,
    sections: Vec<String>,
    judges: Vec<Arc<dyn Judge>>,
    patcher: Arc<dyn PatchExecutor>,
    context: Vec<RagChunk>,
}

impl RefinementLoop {
    pub fn new(
        config: RunnerConfig,
        sections: Vec<String>,
        judges: Vec<Arc<dyn Judge>>,
        patcher: Arc<dyn PatchExecutor>,
    ) -> Self {
        Self {
            config: config.refinement,
            driver: config.driver,
            sections,
            judges,
            patcher,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<RagChunk>) -> Self {
        self.context = context;
        self
    }

    /// Run to a final disposition.
    pub async fn run(&self, initial_content: &str) -> Result<LoopReport, LoopError> {
        let clock = LoopClock::start();
        let quorum = self.config.judge_quorum;

        let initial_batch = collect_verdicts(
            &self.judges,
            initial_content,
            quorum,
            self.driver.judge_timeout(),
        )
        .await?;
        let mut session = RefinementSession::start_at(
            self.config.clone(),
            self.sections.iter().cloned(),
            initial_content,
            initial_batch,
            clock.now(),
        )?;

        let mut cycles = Vec::new();
        let final_outcome = loop {
            if let Some(outcome) = session.final_outcome() {
                break outcome.clone();
            }

            let targets = self.pick_targets(&session);
            debug!(
                iteration = session.state().iteration + 1,
                targets = targets.len(),
                "Starting refinement cycle"
            );

            let mut content = session.current_content().to_string();
            let mut patches = Vec::with_capacity(targets.len());
            let mut timed_out = None;
            for (section, target) in targets {
                let wait = self
                    .apply_patch(&session, &clock, &section, target, &content, &patches)
                    .await?;
                match wait {
                    PatchWait::Done(report, patched) => {
                        if let Some(patched) = patched {
                            content = patched;
                        }
                        patches.push(report);
                    }
                    PatchWait::TimedOut(finished) => {
                        timed_out = Some(finished);
                        break;
                    }
                }
            }
            if let Some(finished) = timed_out {
                session = finished;
                continue;
            }

            let batch =
                collect_verdicts(&self.judges, &content, quorum, self.driver.judge_timeout())
                    .await?;
            let step = session.advance(
                CycleInput {
                    patches,
                    content,
                    batch,
                },
                clock.now(),
            )?;
            cycles.push(step.outcome);
            session = step.session;
        };

        let report = session.report();
        info!(
            session = %report.id,
            status = %final_outcome.status,
            reason = %final_outcome.reason,
            score = final_outcome.score,
            iterations = report.iterations,
            "Refinement loop finished"
        );
        Ok(LoopReport {
            session: report,
            cycles,
            final_outcome,
        })
    }

    /// One target per editable section, highest-priority issue first.
    fn pick_targets(&self, session: &RefinementSession) -> Vec<(String, Issue)> {
        let editable = session.state().editable_sections();
        let mut seen = BTreeSet::new();
        let mut targets = Vec::new();
        let mut issues: Vec<&Issue> = session.actionable_issues();
        issues.sort_by_key(|issue| (std::cmp::Reverse(issue.severity), issue.criterion.priority()));

        for issue in issues {
            let Some(section) = editable
                .iter()
                .find(|s| refinement::session::issue_targets_section(issue, s))
            else {
                continue;
            };
            if seen.insert(section.clone()) {
                targets.push((section.clone(), issue.clone()));
            }
            if targets.len() >= self.driver.max_patches_per_cycle {
                break;
            }
        }
        targets
    }

    async fn apply_patch(
        &self,
        session: &RefinementSession,
        clock: &LoopClock,
        section: &str,
        target: Issue,
        content: &str,
        completed: &[PatchReport],
    ) -> Result<PatchWait, LoopError> {
        let request = PatchRequest {
            section: section.to_string(),
            content: content.to_string(),
            instructions: format!(
                "{}\n\n{}",
                patch_instructions(&target),
                render_context(&self.context, self.driver.max_context_chars)
            )
            .trim_end()
            .to_string(),
            target,
            context: self.context.clone(),
        };

        let mut ticker = tokio::time::interval(self.driver.timeout_poll());
        ticker.tick().await;
        let apply = self.patcher.apply(&request);
        tokio::pin!(apply);

        let result = loop {
            tokio::select! {
                result = &mut apply => break result,
                _ = ticker.tick() => {
                    if let Some(finished) = session.check_timeout(clock.now(), completed)? {
                        warn!(section, "Session timed out while a patch was in flight");
                        return Ok(PatchWait::TimedOut(finished));
                    }
                }
            }
        };

        match result {
            Ok(outcome) => {
                if !outcome.success {
                    warn!(
                        section,
                        error = outcome.error_message.as_deref().unwrap_or("unspecified"),
                        "Patch reported failure"
                    );
                }
                let report = outcome.to_report(&request);
                let patched = outcome.success.then_some(outcome.patched_content);
                Ok(PatchWait::Done(report, patched))
            }
            Err(e) => {
                warn!(section, error = %e, "Patch executor failed");
                Ok(PatchWait::Done(PatchReport::new(section, false), None))
            }
        }
    }
}
