//! Judge fan-out.
//!
//! Every judge scores the same content concurrently; the batch waits for all
//! of them (each bounded by its own timeout) and names the ones that failed
//! so the quorum check can refuse partial batches.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use refinement::{AgreementError, JudgeQuorum, VerdictBatch};

use crate::errors::CollaboratorError;
use crate::traits::Judge;

/// Collect one verdict per judge.
///
/// Fails with `IncompleteBatch` when the surviving verdicts do not satisfy
/// `quorum`.
pub async fn collect_verdicts(
    judges: &[Arc<dyn Judge>],
    content: &str,
    quorum: JudgeQuorum,
    per_judge_timeout: Duration,
) -> Result<VerdictBatch, AgreementError> {
    let expected: Vec<String> = judges.iter().map(|j| j.name().to_string()).collect();

    let calls = judges.iter().map(|judge| async move {
        let name = judge.name().to_string();
        match tokio::time::timeout(per_judge_timeout, judge.score(content)).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::JudgeTimeout {
                judge: name,
                timeout_ms: per_judge_timeout.as_millis() as u64,
            }),
        }
    });
    let results = join_all(calls).await;

    let mut batch = VerdictBatch::new(expected);
    for (judge, result) in judges.iter().zip(results) {
        match result {
            Ok(mut verdict) => {
                // The batch tracks judges by the name they were asked under
                verdict.judge = judge.name().to_string();
                batch.push(verdict);
            }
            Err(e) => warn!(judge = judge.name(), error = %e, "Judge returned no verdict"),
        }
    }

    debug!(
        expected = batch.expected_judges.len(),
        received = batch.verdicts.len(),
        "Verdicts collected"
    );

    if batch.satisfies(quorum) {
        Ok(batch)
    } else if batch.verdicts.is_empty() {
        Err(AgreementError::EmptyInput)
    } else {
        Err(AgreementError::IncompleteBatch {
            expected: batch.expected_judges.len(),
            received: batch.verdicts.len(),
            missing: batch.missing(),
        })
    }
}
