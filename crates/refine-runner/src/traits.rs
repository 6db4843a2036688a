//! Collaborator seams: judges and the patch executor.
//!
//! Both are language-model calls in production. The loop only consumes the
//! structured results: a `JudgeVerdict` from each judge and a `PatchOutcome`
//! from the executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use refinement::{Issue, JudgeVerdict, PatchReport};

use crate::context::RagChunk;
use crate::errors::CollaboratorError;

// ── Judge ────────────────────────────────────────────────────────────────────

/// Scores content against the criteria and reports findings.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Stable identifier, used to spot missing verdicts.
    fn name(&self) -> &str;

    async fn score(&self, content: &str) -> Result<JudgeVerdict, CollaboratorError>;
}

// ── Patch executor ───────────────────────────────────────────────────────────

/// One targeted patch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub section: String,
    /// Full lesson content before the patch
    pub content: String,
    pub instructions: String,
    pub target: Issue,
    #[serde(default)]
    pub context: Vec<RagChunk>,
}

/// What the executor reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOutcome {
    /// Full lesson content after the patch
    pub patched_content: String,
    pub success: bool,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl PatchOutcome {
    /// Token count for budgeting. Falls back to `tokens_used` when the
    /// executor did not split input and output.
    pub fn total_tokens(&self) -> u64 {
        let split = self.input_tokens.saturating_add(self.output_tokens);
        if split > 0 {
            split
        } else {
            self.tokens_used
        }
    }

    /// Report for the session, tagged with the section and target.
    pub fn to_report(&self, request: &PatchRequest) -> PatchReport {
        let (input_tokens, output_tokens) =
            if self.input_tokens == 0 && self.output_tokens == 0 {
                // Unsplit usage is billed as output
                (0, self.tokens_used)
            } else {
                (self.input_tokens, self.output_tokens)
            };
        PatchReport {
            section: request.section.clone(),
            success: self.success,
            model: self.model.clone(),
            input_tokens,
            output_tokens,
            target: Some(request.target.clone()),
        }
    }
}

/// Applies a targeted patch to the lesson.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatchExecutor: Send + Sync {
    async fn apply(&self, request: &PatchRequest) -> Result<PatchOutcome, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinement::{Criterion, Severity};

    fn request() -> PatchRequest {
        PatchRequest {
            section: "intro".into(),
            content: "before".into(),
            instructions: "fix it".into(),
            target: Issue::new(Criterion::Completeness, Severity::Minor, "intro", "short"),
            context: vec![],
        }
    }

    fn outcome(tokens_used: u64, input: u64, output: u64) -> PatchOutcome {
        PatchOutcome {
            patched_content: "after".into(),
            success: true,
            tokens_used,
            input_tokens: input,
            output_tokens: output,
            model: Some("gpt-4o".into()),
            error_message: None,
        }
    }

    #[test]
    fn test_split_usage_preferred() {
        let report = outcome(999, 100, 50).to_report(&request());
        assert_eq!(report.tokens_used(), 150);
        assert_eq!(report.section, "intro");
        assert!(report.target.is_some());
    }

    #[test]
    fn test_unsplit_usage_billed_as_output() {
        let out = outcome(300, 0, 0);
        assert_eq!(out.total_tokens(), 300);
        let report = out.to_report(&request());
        assert_eq!((report.input_tokens, report.output_tokens), (0, 300));
    }

    #[tokio::test]
    async fn test_mock_executor() {
        let mut mock = MockPatchExecutor::new();
        mock.expect_apply()
            .times(1)
            .returning(|req| {
                let mut out = outcome(0, 10, 5);
                out.patched_content = format!("{} + patched", req.content);
                Ok(out)
            });
        let result = mock.apply(&request()).await.unwrap();
        assert_eq!(result.patched_content, "before + patched");
    }
}
