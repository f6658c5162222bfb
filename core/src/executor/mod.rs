//! Job executor: drives a job through the stage graph.
//!
//! Each job is owned by exactly one [`JobExecutor`]. Nodes return
//! [`NodeUpdate`](crate::state::NodeUpdate) deltas which the executor applies
//! in a single place, so concurrent workers never touch shared state.
//!
//! # Architecture
//!
//! ```text
//! Clarify ──(questions)──▶ paused
//!    │
//!    ▼
//! Retrieve ─▶ Plan ─▶ EstimateCost ─▶ Execute ─▶ Aggregate ─▶ Test ─▶ Completed
//!              ▲                        │  ▲                     │
//!              │                        │  └── interrupt edits ──┤
//!              └──── self-correction (tests failed) ─────────────┘
//!
//! Execute:
//!   DependencyScheduler::next_dispatch() → WorkerPool::dispatch()
//!     ↓
//!   select! { next_completion() | interrupt }
//!     ↓
//!   JobState::apply(NodeUpdate::Task) → checkpoint
//! ```

mod engine;
mod outcome;
mod routing;
mod scheduler;

pub use engine::{ExecutorSettings, JobChannels, JobExecutor};
pub use outcome::JobOutcome;
pub use routing::{route, Route, RoutingLimits};
pub use scheduler::{DependencyScheduler, Dispatch, Recorded, WorkerPool};
