//! Async driver for the lesson refinement loop.
//!
//! Fans content out to judges, applies targeted patches, and feeds each
//! cycle into a `refinement::RefinementSession` until it reaches a final
//! disposition. Scenario files replay scripted judges and patches for
//! offline runs.

pub mod config;
pub mod context;
pub mod driver;
pub mod errors;
pub mod fanout;
pub mod scenario;
pub mod traits;

pub use config::{DriverSettings, RunnerConfig};
pub use context::RagChunk;
pub use driver::{LoopReport, RefinementLoop};
pub use errors::{CollaboratorError, LoopError};
pub use fanout::collect_verdicts;
pub use scenario::{Scenario, ScriptedJudge, ScriptedPatcher};
pub use traits::{Judge, PatchExecutor, PatchOutcome, PatchRequest};
