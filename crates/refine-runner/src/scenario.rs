//! Scenario replay: judges and a patch executor driven by a JSON script.
//!
//! ```json
//! {
//!   "sections": ["intro", "core"],
//!   "initial_content": "...",
//!   "judges": [
//!     { "name": "judge-a", "verdicts": [ { "scores": {...}, "issues": [...] } ] }
//!   ],
//!   "patches": [ { "patched_content": "...", "success": true, "model": "gpt-4o" } ]
//! }
//! ```
//!
//! Each judge replays its verdicts in order and repeats the last one once
//! the script runs out. The patcher replays its outcomes in order and
//! reports a failed patch when exhausted.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use refinement::{CriteriaScores, Issue, JudgeVerdict};

use crate::context::RagChunk;
use crate::errors::CollaboratorError;
use crate::traits::{Judge, PatchExecutor, PatchOutcome, PatchRequest};

/// Scores and findings for one scripted judging round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedVerdict {
    pub scores: CriteriaScores,
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Simulated latency
    #[serde(default)]
    pub delay_ms: u64,
    /// Simulate a judge failure for this round
    #[serde(default)]
    pub fail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeScript {
    pub name: String,
    pub verdicts: Vec<ScriptedVerdict>,
}

/// One scripted patch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedPatch {
    #[serde(flatten)]
    pub outcome: PatchOutcome,
    #[serde(default)]
    pub delay_ms: u64,
}

/// A complete replayable refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub sections: Vec<String>,
    pub initial_content: String,
    pub judges: Vec<JudgeScript>,
    #[serde(default)]
    pub patches: Vec<ScriptedPatch>,
    #[serde(default)]
    pub context: Vec<RagChunk>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(json).context("Failed to parse scenario JSON")?;
        anyhow::ensure!(!scenario.judges.is_empty(), "scenario has no judges");
        for judge in &scenario.judges {
            anyhow::ensure!(
                !judge.verdicts.is_empty(),
                "judge {} has no scripted verdicts",
                judge.name
            );
        }
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read {}", path.display()))?;
        Self::from_json(&content).context(format!("Invalid scenario {}", path.display()))
    }

    pub fn judges(&self) -> Vec<Arc<dyn Judge>> {
        self.judges
            .iter()
            .map(|script| Arc::new(ScriptedJudge::new(script.clone())) as Arc<dyn Judge>)
            .collect()
    }

    pub fn patcher(&self) -> ScriptedPatcher {
        ScriptedPatcher::new(self.patches.clone())
    }
}

/// Judge replaying a script.
#[derive(Debug)]
pub struct ScriptedJudge {
    script: JudgeScript,
    cursor: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new(script: JudgeScript) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Rounds served so far.
    pub fn rounds(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    fn name(&self) -> &str {
        &self.script.name
    }

    async fn score(&self, _content: &str) -> Result<JudgeVerdict, CollaboratorError> {
        let round = self.cursor.fetch_add(1, Ordering::SeqCst);
        let last = self.script.verdicts.len().saturating_sub(1);
        let Some(step) = self.script.verdicts.get(round.min(last)) else {
            return Err(CollaboratorError::judge(&self.script.name, "empty script"));
        };
        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }
        if step.fail {
            return Err(CollaboratorError::judge(
                &self.script.name,
                format!("scripted failure in round {}", round),
            ));
        }
        Ok(JudgeVerdict::new(&self.script.name, step.scores.clone()).with_issues(step.issues.clone()))
    }
}

/// Patch executor replaying a script.
#[derive(Debug)]
pub struct ScriptedPatcher {
    steps: Vec<ScriptedPatch>,
    cursor: AtomicUsize,
}

impl ScriptedPatcher {
    pub fn new(steps: Vec<ScriptedPatch>) -> Self {
        Self {
            steps,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn applied(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatchExecutor for ScriptedPatcher {
    async fn apply(&self, request: &PatchRequest) -> Result<PatchOutcome, CollaboratorError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(step) = self.steps.get(index) else {
            return Err(CollaboratorError::patch(
                &request.section,
                "patch script exhausted",
            ));
        };
        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }
        Ok(step.outcome.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinement::{Criterion, Severity};

    const SCENARIO: &str = r#"{
        "sections": ["intro"],
        "initial_content": "v0",
        "judges": [
            { "name": "judge-a", "verdicts": [
                { "scores": { "completeness": 0.5 } },
                { "scores": { "completeness": 0.9 }, "issues": [
                    { "criterion": "completeness", "severity": "minor",
                      "location": "intro", "description": "short" }
                ] }
            ] }
        ],
        "patches": [
            { "patched_content": "v1", "success": true, "model": "gpt-4o",
              "input_tokens": 100, "output_tokens": 40 }
        ],
        "context": ["a chunk", { "text": "another" }]
    }"#;

    fn request() -> PatchRequest {
        PatchRequest {
            section: "intro".into(),
            content: "v0".into(),
            instructions: String::new(),
            target: Issue::new(Criterion::Completeness, Severity::Minor, "intro", "short"),
            context: vec![],
        }
    }

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        assert_eq!(scenario.sections, vec!["intro"]);
        assert_eq!(scenario.patches[0].outcome.patched_content, "v1");
        assert_eq!(scenario.context.len(), 2);
    }

    #[test]
    fn test_rejects_out_of_range_scores() {
        let bad = SCENARIO.replace("0.9", "1.9");
        assert!(Scenario::from_json(&bad).is_err());
    }

    #[tokio::test]
    async fn test_judge_repeats_last_verdict() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        let judge = ScriptedJudge::new(scenario.judges[0].clone());
        let first = judge.score("x").await.unwrap();
        let second = judge.score("x").await.unwrap();
        let third = judge.score("x").await.unwrap();
        assert_eq!(first.scores.get(Criterion::Completeness), Some(0.5));
        assert_eq!(second.issues.len(), 1);
        assert_eq!(third, second);
        assert_eq!(judge.rounds(), 3);
    }

    #[tokio::test]
    async fn test_patcher_exhausts() {
        let patcher = Scenario::from_json(SCENARIO).unwrap().patcher();
        assert!(patcher.apply(&request()).await.unwrap().success);
        let err = patcher.apply(&request()).await.unwrap_err();
        assert!(err.to_string().contains("exhausted"));
        assert_eq!(patcher.applied(), 2);
    }
}
