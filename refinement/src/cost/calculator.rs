//! Cost estimation.
//!
//! `cost = input/1e6 * input_price + output/1e6 * output_price`, in the
//! price table's currency. Invalid token counts and costs above the ceiling
//! fail fast: a clamped cost would hide an accounting bug upstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::pricing::{ModelPrice, PriceTable};

/// Hard ceiling on a single estimate, in price-table currency.
pub const DEFAULT_COST_CEILING: f64 = 1000.0;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Which side of a request a token count belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSide {
    Input,
    Output,
}

impl std::fmt::Display for TokenSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Error type for cost estimation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CostError {
    #[error("Unknown model '{model}'; known models: {}", .known.join(", "))]
    UnknownModel { model: String, known: Vec<String> },

    #[error("Invalid {side} token count: {value}")]
    InvalidTokenCount { side: TokenSide, value: f64 },

    #[error("Cost {cost} exceeds ceiling {ceiling}")]
    CostOverflow { cost: f64, ceiling: f64 },
}

/// Result type for cost estimation
pub type CostResult<T> = Result<T, CostError>;

/// Per-side cost detail for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub model: String,
    pub input_tokens: f64,
    pub output_tokens: f64,
    pub total_tokens: f64,
    pub input_cost: f64,
    pub output_cost: f64,
    /// Always equal to `estimate_cost` for the same arguments
    pub total_cost: f64,
    pub captured_at: DateTime<Utc>,
}

/// Price table plus ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct CostCalculator {
    table: PriceTable,
    ceiling: f64,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new(PriceTable::default(), DEFAULT_COST_CEILING)
    }
}

impl CostCalculator {
    pub fn new(table: PriceTable, ceiling: f64) -> Self {
        Self { table, ceiling }
    }

    pub fn table(&self) -> &PriceTable {
        &self.table
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Estimate the cost of one request.
    pub fn estimate_cost(
        &self,
        model: &str,
        input_tokens: f64,
        output_tokens: f64,
    ) -> CostResult<f64> {
        let (_, _, total) = self.compute(model, input_tokens, output_tokens)?;
        Ok(total)
    }

    /// Same computation as [`estimate_cost`](Self::estimate_cost), with detail.
    pub fn calculate_cost_breakdown(
        &self,
        model: &str,
        input_tokens: f64,
        output_tokens: f64,
    ) -> CostResult<CostBreakdown> {
        let (input_cost, output_cost, total_cost) =
            self.compute(model, input_tokens, output_tokens)?;
        Ok(CostBreakdown {
            model: model.to_string(),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            input_cost,
            output_cost,
            total_cost,
            captured_at: Utc::now(),
        })
    }

    fn compute(
        &self,
        model: &str,
        input_tokens: f64,
        output_tokens: f64,
    ) -> CostResult<(f64, f64, f64)> {
        let price = self.price(model)?;
        validate_tokens(TokenSide::Input, input_tokens)?;
        validate_tokens(TokenSide::Output, output_tokens)?;

        let input_cost = input_tokens / TOKENS_PER_MILLION * price.input_per_million;
        let output_cost = output_tokens / TOKENS_PER_MILLION * price.output_per_million;
        let total = input_cost + output_cost;

        if total > self.ceiling {
            warn!(model, cost = total, ceiling = self.ceiling, "Cost ceiling exceeded");
            return Err(CostError::CostOverflow {
                cost: total,
                ceiling: self.ceiling,
            });
        }
        Ok((input_cost, output_cost, total))
    }

    fn price(&self, model: &str) -> CostResult<ModelPrice> {
        self.table.get(model).ok_or_else(|| CostError::UnknownModel {
            model: model.to_string(),
            known: self.table.models(),
        })
    }
}

fn validate_tokens(side: TokenSide, value: f64) -> CostResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CostError::InvalidTokenCount { side, value })
    }
}

/// Estimate against the built-in price table and default ceiling.
pub fn estimate_cost(model: &str, input_tokens: f64, output_tokens: f64) -> CostResult<f64> {
    CostCalculator::default().estimate_cost(model, input_tokens, output_tokens)
}

/// Breakdown against the built-in price table and default ceiling.
pub fn calculate_cost_breakdown(
    model: &str,
    input_tokens: f64,
    output_tokens: f64,
) -> CostResult<CostBreakdown> {
    CostCalculator::default().calculate_cost_breakdown(model, input_tokens, output_tokens)
}
