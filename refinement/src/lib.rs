//! Lesson Refinement Library
//!
//! Quality control for iteratively refining a generated lesson:
//! - Quality locks that stop patches from silently regressing criteria
//! - Inter-judge agreement (Krippendorff's alpha) and conflict resolution
//!   among competing findings
//! - The iteration controller deciding when refinement stops
//! - Best-effort selection when the loop never reaches its accept bar
//! - Token cost accounting against a price table
//!
//! # Flow
//!
//! ```text
//! patch (external) ─► judges (external) ─► VerdictBatch
//!                                              │
//!             ┌────────────────────────────────┤
//!             ▼                                ▼
//!       check_locks                  agreement ─► resolve_conflicts
//!             │                                │
//!             └──────────► IterationController ◄┘
//!                                  │
//!                  continue ◄──────┴──────► stop ─► BestEffortSelector
//! ```
//!
//! Every component is synchronous and pure over its inputs. The async loop
//! that drives patches and judges lives in the `refine-runner` crate.

#![allow(clippy::uninlined_format_args)]

pub mod arbiter;
pub mod best_effort;
pub mod config;
pub mod controller;
pub mod cost;
pub mod criteria;
pub mod error;
pub mod history;
pub mod quality_lock;
pub mod session;

// Re-export criterion model
pub use criteria::{CriteriaScores, Criterion, Issue, JudgeVerdict, ScoreError, Severity};

// Re-export quality lock types
pub use quality_lock::{
    check_locks, initialize_locks, verify_delta, DeltaVerdict, LockCheck, LockViolation,
    QualityLockMap,
};

// Re-export arbiter types
pub use arbiter::{
    agreement, filter_by_agreement, resolve_conflicts, Agreement, AgreementError, AgreementLevel,
    ConflictResolution, JudgeQuorum, VerdictBatch,
};

// Re-export controller types
pub use controller::{
    detect_convergence, should_continue_iteration, update_section_locks, DecisionReason,
    IterationController, IterationDecision, RefinementState, StateError,
};

// Re-export best-effort types
pub use best_effort::{
    select_best_iteration, BestEffortResult, BestEffortSelector, FinalStatus, QualityStatus,
    SelectionError,
};

// Re-export cost types
pub use cost::{
    calculate_cost_breakdown, estimate_cost, CostBreakdown, CostCalculator, CostError, CostLedger,
    ModelPrice, PriceTable,
};

pub use config::{ConfigError, OperatingMode, RefinementConfig};
pub use error::{RefinementError, RefinementResult};
pub use history::IterationResult;
pub use session::{
    CycleInput, CycleOutcome, CycleStep, FinalOutcome, PatchReport, RefinementSession,
    SessionReport,
};
