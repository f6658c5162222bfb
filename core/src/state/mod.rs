//! # Job state
//!
//! Everything one job knows about itself, how node output is merged into it,
//! which stage edges are legal, and how it is persisted between pause points.
//!
//! - [`JobState`] is owned by exactly one executor while the job runs.
//! - [`JobState::apply`] is the only way node output reaches it.
//! - [`JobStore`] persists [`JobRecord`]s so a job survives a restart.

pub mod delta;
pub mod store;
pub mod transitions;
pub mod types;

pub use delta::{Applied, NodeUpdate};
pub use store::{FileJobStore, JobRecord, JobStore, MemoryJobStore, RECORD_VERSION};
pub use transitions::StageTransition;
pub use types::{
    Clarification, CostCounters, JobEvent, JobFailure, JobId, JobState,
    JobStatus, Stage, ValidationReport, ValidationStatus,
};
