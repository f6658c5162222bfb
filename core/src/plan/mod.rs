//! Task Plan Model
//!
//! Typed record of work items, their lifecycle and their dependencies.
//!
//! ```text
//! TaskDraft (planner / interrupt edits)
//!   ↓
//! Plan::add_drafts() / Plan::mutate()   (transactional, validated)
//!   ↓
//! PlanGraph::validate() → dangling deps, self deps, detect_cycle()
//!   ↓
//! Plan::eligible() → dispatch by the scheduler
//! ```

mod graph;
#[allow(clippy::module_inception)]
mod plan;
mod task;

pub use graph::{PlanGraph, TaskLike};
pub use plan::Plan;
pub use task::{
    DependencyRef, SelfValidationStatus, Task, TaskDraft, TaskId, TaskStatus, WorkerRole,
};
