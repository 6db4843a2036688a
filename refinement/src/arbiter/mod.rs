//! Arbiter: inter-judge agreement and conflict resolution
//!
//! Several independent judges score the same lesson. The arbiter measures
//! how much they agree and uses that level to decide which of their pooled
//! findings are trustworthy enough to act on.
//!
//! # Components
//!
//! - **VerdictBatch**: the set of verdicts for one iteration, with a quorum
//!   policy so missing judges are surfaced instead of skipped
//! - **agreement**: Krippendorff's alpha (interval metric) over the
//!   criterion × judge score matrix, mapped to `low | moderate | high`
//! - **ConflictResolver**: filters findings by agreement level, then keeps one
//!   finding per location using the fixed criterion priority table
//!
//! # Workflow
//!
//! 1. Judges are fanned out by the caller and collected into a `VerdictBatch`
//! 2. `VerdictBatch::into_verdicts` enforces the quorum
//! 3. `agreement` produces a score and level
//! 4. `resolve_conflicts` returns accepted/rejected findings and a log

pub mod agreement;
pub mod batch;
pub mod conflict;

pub use agreement::{
    agreement, krippendorff_alpha, Agreement, AgreementError, AgreementLevel, AgreementResult,
    HIGH_AGREEMENT_THRESHOLD, MODERATE_AGREEMENT_THRESHOLD, SCALE_DISAGREEMENT,
};
pub use batch::{JudgeQuorum, VerdictBatch};
pub use conflict::{
    filter_by_agreement, normalize_location, resolve_conflicts, AgreementFilter, ConflictLogEntry,
    ConflictResolution, RejectedIssue, RejectionReason,
};
