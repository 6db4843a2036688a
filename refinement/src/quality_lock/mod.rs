//! Quality Lock Engine: regression guard for targeted patches
//!
//! Criteria that already pass a threshold when a refinement session starts
//! are frozen at their observed score. Every later patch is checked against
//! those frozen baselines so that fixing one criterion cannot silently
//! degrade another.
//!
//! ```text
//! initial scores ──initialize_locks(θ)──▶ QualityLockMap
//!                                             │
//! post-patch scores ──check_locks(tol)────────┤──▶ LockCheck { passed, violations }
//!                                             │
//! target issue + before/after ──verify_delta──┘──▶ DeltaVerdict
//! ```

pub mod delta;
pub mod engine;

pub use delta::{verify_delta, DeltaVerdict};
pub use engine::{
    check_locks, initialize_locks, LockCheck, LockViolation, QualityLockMap,
    DEFAULT_LOCK_THRESHOLD, DEFAULT_LOCK_TOLERANCE,
};
