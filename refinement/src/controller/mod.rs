//! Iteration Controller: Deterministic stop/continue decisions
//!
//! Re-invoked once per refinement cycle with an immutable snapshot of the
//! loop state. No LLM calls and no timers: the timeout condition is a check
//! against elapsed time, evaluated whenever the controller is called.
//!
//! # Stop conditions (first match wins)
//!
//! ```text
//! 1. latest score >= accept threshold(mode)   → stop_score_threshold_met
//! 2. iteration >= max_iterations              → stop_max_iterations
//! 3. tokens_used >= max_tokens                → stop_token_budget
//! 4. elapsed >= timeout_ms                    → stop_timeout
//! 5. last three scores plateaued              → stop_converged
//! 6. every section hit its edit limit         → stop_all_sections_locked
//! 7. otherwise                                → continue_more_tasks
//! ```

pub mod engine;
pub mod state;

pub use engine::{
    detect_convergence, should_continue_iteration, update_section_locks, DecisionReason,
    IterationController, IterationDecision,
};
pub use state::{RefinementState, StateError, StateResult};
