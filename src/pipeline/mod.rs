//! Per-Target pipeline: homepage, escalation, discovery, candidate pages,
//! merge.

pub mod orchestrator;
pub mod report;
pub mod target;
pub mod visit;

pub use orchestrator::Orchestrator;
pub use report::{PageSummary, SoftFailure, Stage, TargetOutcome, TargetReport};
pub use target::{Target, TargetError};
pub use visit::{PageVisit, visit};
