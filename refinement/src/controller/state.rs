//! Refinement State: immutable per-cycle snapshot of the loop
//!
//! Every mutation returns a new snapshot; callers keep the old one intact.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error type for state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Unknown section: {0}")]
    UnknownSection(String),
}

/// Result type for state transitions
pub type StateResult<T> = Result<T, StateError>;

/// Loop state owned by the iteration controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementState {
    /// Completed refinement cycles
    pub iteration: u32,
    /// One score per completed cycle
    pub score_history: Vec<f64>,
    /// Every section id of the lesson
    pub all_sections: BTreeSet<String>,
    pub locked_sections: BTreeSet<String>,
    pub section_edit_count: BTreeMap<String, u32>,
    pub tokens_used: u64,
    pub start_time: DateTime<Utc>,
}

impl RefinementState {
    /// Fresh state over the given sections, started now.
    pub fn new<I, S>(sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            iteration: 0,
            score_history: Vec::new(),
            all_sections: sections.into_iter().map(Into::into).collect(),
            locked_sections: BTreeSet::new(),
            section_edit_count: BTreeMap::new(),
            tokens_used: 0,
            start_time: Utc::now(),
        }
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Record a completed cycle's score.
    pub fn record_iteration(&self, score: f64) -> Self {
        let mut next = self.clone();
        next.iteration += 1;
        next.score_history.push(score);
        next
    }

    /// Record a patch attempt. Failed patches leave edit counts unchanged.
    pub fn record_patch(&self, section: &str, success: bool) -> StateResult<Self> {
        if !self.all_sections.contains(section) {
            return Err(StateError::UnknownSection(section.to_string()));
        }
        let mut next = self.clone();
        if success {
            *next
                .section_edit_count
                .entry(section.to_string())
                .or_insert(0) += 1;
        }
        Ok(next)
    }

    pub fn record_tokens(&self, tokens: u64) -> Self {
        let mut next = self.clone();
        next.tokens_used = next.tokens_used.saturating_add(tokens);
        next
    }

    /// Add sections to the locked set. Unknown ids are ignored.
    pub fn with_locked_sections<'a>(&self, sections: impl IntoIterator<Item = &'a String>) -> Self {
        let mut next = self.clone();
        next.locked_sections.extend(
            sections
                .into_iter()
                .filter(|s| self.all_sections.contains(*s))
                .cloned(),
        );
        next
    }

    pub fn latest_score(&self) -> Option<f64> {
        self.score_history.last().copied()
    }

    pub fn edits(&self, section: &str) -> u32 {
        self.section_edit_count.get(section).copied().unwrap_or(0)
    }

    pub fn is_locked(&self, section: &str) -> bool {
        self.locked_sections.contains(section)
    }

    /// Sections that may still be patched, in id order.
    pub fn editable_sections(&self) -> Vec<String> {
        self.all_sections
            .difference(&self.locked_sections)
            .cloned()
            .collect()
    }

    /// Milliseconds since `start_time`, 0 if `now` is earlier.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_time).num_milliseconds().max(0) as u64
    }

    pub fn summary(&self) -> String {
        format!(
            "iter={} latest={:?} locked={}/{} tokens={}",
            self.iteration,
            self.latest_score(),
            self.locked_sections.len(),
            self.all_sections.len(),
            self.tokens_used,
        )
    }
}
