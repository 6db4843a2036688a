//! Token cost accounting.
//!
//! - [`pricing`]: per-model price table (configuration, not algorithm)
//! - [`calculator`]: validated cost estimation with a hard ceiling
//! - [`ledger`]: running totals across one refinement session

pub mod calculator;
pub mod ledger;
pub mod pricing;

pub use calculator::{
    calculate_cost_breakdown, estimate_cost, CostBreakdown, CostCalculator, CostError,
    CostResult, TokenSide, DEFAULT_COST_CEILING,
};
pub use ledger::CostLedger;
pub use pricing::{ModelPrice, PriceTable};
