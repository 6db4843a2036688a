//! Running cost totals for a session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::calculator::CostBreakdown;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostLedger {
    pub entries: Vec<CostBreakdown>,
    pub total_cost: f64,
    pub total_tokens: f64,
    pub cost_by_model: BTreeMap<String, f64>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, breakdown: CostBreakdown) {
        self.total_cost += breakdown.total_cost;
        self.total_tokens += breakdown.total_tokens;
        *self
            .cost_by_model
            .entry(breakdown.model.clone())
            .or_insert(0.0) += breakdown.total_cost;
        self.entries.push(breakdown);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
