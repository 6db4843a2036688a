//! Conflict resolution among pooled judge findings.
//!
//! Findings are first filtered by how much the judges agree, then grouped by
//! normalized location. Within a location only one finding survives, chosen
//! by [`Criterion::PRIORITY`] and then by severity.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::agreement::AgreementLevel;
use crate::criteria::{Criterion, Issue, Severity};

/// Numbered sub-location qualifiers (`paragraph 3`, `step #2`) folded into
/// their parent unit. An unnumbered qualifier word is part of the heading.
static SUB_DETAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[\s,;:/>|\-]*\b(paragraph|para|sentence|line|bullet|item|example|step|subsection)\s*#?\d+\b.*$",
    )
    .expect("SUB_DETAIL_PATTERN regex should compile")
});

static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("WHITESPACE_PATTERN regex should compile"));

/// Canonical grouping key for a free-text location.
///
/// Case-insensitive; sub-detail such as `", paragraph 3"` is dropped so
/// `"Section 2, paragraph 3"` groups with `"section 2"`. Anything after the
/// first comma or semicolon is sub-detail too. Section titles that merely
/// contain a qualifier word (`"Worked Example section"`) keep every word.
pub fn normalize_location(location: &str) -> String {
    let unit = match SUB_DETAIL_PATTERN.find(location) {
        Some(m) if !location[..m.start()].trim().is_empty() => &location[..m.start()],
        _ => location,
    };
    let parent = unit.split([',', ';']).next().unwrap_or_default();
    let collapsed = WHITESPACE_PATTERN.replace_all(parent.trim(), " ");
    let key = collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    if key.is_empty() {
        "unspecified".to_string()
    } else {
        key
    }
}

/// Why a finding was dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RejectionReason {
    /// Low agreement and not critical
    LowAgreement,
    /// Moderate agreement and no second finding at the same location
    Uncorroborated,
    /// Another finding at the same location outranked it
    LostConflict { winner: Criterion },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowAgreement => write!(f, "low judge agreement"),
            Self::Uncorroborated => write!(f, "not corroborated by another finding"),
            Self::LostConflict { winner } => write!(f, "outranked by {}", winner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedIssue {
    pub issue: Issue,
    pub reason: RejectionReason,
}

/// Outcome of agreement-based filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgreementFilter {
    pub accepted: Vec<Issue>,
    pub rejected: Vec<RejectedIssue>,
}

/// One resolved same-location conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictLogEntry {
    /// Normalized location key
    pub location: String,
    pub winner: Issue,
    pub losers: Vec<Issue>,
    pub reason: String,
}

/// Full resolution result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub level: Option<AgreementLevel>,
    pub accepted: Vec<Issue>,
    pub rejected: Vec<RejectedIssue>,
    pub log: Vec<ConflictLogEntry>,
}

/// Filter findings by agreement level.
///
/// `high` accepts everything. `moderate` accepts findings whose location has
/// at least two findings, unless there is only one judge. `low` keeps only
/// critical findings.
pub fn filter_by_agreement(
    issues: &[Issue],
    level: AgreementLevel,
    judge_count: usize,
) -> AgreementFilter {
    let mut filter = AgreementFilter::default();

    match level {
        AgreementLevel::High => filter.accepted = issues.to_vec(),
        AgreementLevel::Moderate if judge_count <= 1 => filter.accepted = issues.to_vec(),
        AgreementLevel::Moderate => {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for issue in issues {
                *counts.entry(normalize_location(&issue.location)).or_insert(0) += 1;
            }
            for issue in issues {
                if counts[&normalize_location(&issue.location)] >= 2 {
                    filter.accepted.push(issue.clone());
                } else {
                    filter.rejected.push(RejectedIssue {
                        issue: issue.clone(),
                        reason: RejectionReason::Uncorroborated,
                    });
                }
            }
        }
        AgreementLevel::Low => {
            for issue in issues {
                if issue.severity == Severity::Critical {
                    filter.accepted.push(issue.clone());
                } else {
                    filter.rejected.push(RejectedIssue {
                        issue: issue.clone(),
                        reason: RejectionReason::LowAgreement,
                    });
                }
            }
        }
    }

    debug!(
        level = %level,
        judge_count,
        accepted = filter.accepted.len(),
        rejected = filter.rejected.len(),
        "Findings filtered by agreement"
    );
    filter
}

/// Filter by agreement, then keep one finding per normalized location.
///
/// `judge_count` feeds the moderate-agreement corroboration rule.
pub fn resolve_conflicts(
    issues: &[Issue],
    agreement_score: f64,
    judge_count: usize,
) -> ConflictResolution {
    let level = AgreementLevel::from_score(agreement_score);
    let filtered = filter_by_agreement(issues, level, judge_count);

    // Groups in order of first appearance
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Issue>> = HashMap::new();
    for issue in filtered.accepted {
        let key = normalize_location(&issue.location);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(issue);
    }

    let mut resolution = ConflictResolution {
        level: Some(level),
        rejected: filtered.rejected,
        ..Default::default()
    };

    for key in order {
        let Some(mut group) = groups.remove(&key) else {
            continue;
        };
        if group.len() == 1 {
            resolution.accepted.append(&mut group);
            continue;
        }

        let winner_idx = pick_winner(&group);
        let winner = group.remove(winner_idx);
        let reason = format!(
            "{} ({}) outranks {} other finding(s) at {}",
            winner.criterion,
            winner.severity,
            group.len(),
            key
        );
        info!(location = %key, winner = %winner.criterion, losers = group.len(), "Conflict resolved");

        for loser in &group {
            resolution.rejected.push(RejectedIssue {
                issue: loser.clone(),
                reason: RejectionReason::LostConflict {
                    winner: winner.criterion,
                },
            });
        }
        resolution.log.push(ConflictLogEntry {
            location: key,
            winner: winner.clone(),
            losers: group,
            reason,
        });
        resolution.accepted.push(winner);
    }

    resolution
}

/// Lowest priority index wins; ties go to higher severity, then first seen.
fn pick_winner(group: &[Issue]) -> usize {
    let mut best = 0;
    for (idx, issue) in group.iter().enumerate().skip(1) {
        let current = &group[best];
        let better = issue.criterion.priority() < current.criterion.priority()
            || (issue.criterion.priority() == current.criterion.priority()
                && issue.severity > current.severity);
        if better {
            best = idx;
        }
    }
    best
}
