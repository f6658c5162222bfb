//! # Node runners
//!
//! One struct per agent. Each node reads an immutable view of the job and
//! returns only the delta it is allowed to write; every side effect goes
//! through the injected [`Capabilities`].
//!
//! ```text
//! Clarifier ─▶ Retriever ─▶ Planner ─▶ ResourceMonitor ─▶ Worker* ─▶ Aggregator ─▶ Tester
//! ```

mod aggregator;
mod clarifier;
pub mod json;
mod planner;
mod resource_monitor;
mod retriever;
mod tester;
mod worker;

use async_trait::async_trait;

use crate::capability::Capabilities;
use crate::error::NodeExecutionError;
use crate::state::{JobState, NodeUpdate};

pub use aggregator::{AggregateUpdate, Aggregator};
pub use clarifier::{ClarifyUpdate, Clarifier};
pub use planner::{PlanUpdate, Planner};
pub use resource_monitor::{CostUpdate, ResourceMonitor};
pub use retriever::{content_hash, merge_snippets, RetrieveUpdate, Retriever};
pub use tester::{TestUpdate, Tester};
pub use worker::{TaskOutcome, TaskSnapshot, Worker};

/// A stage-level agent: `(JobState) -> Update`.
///
/// `Update` is the node's own delta type, so a node cannot produce a change
/// to a field it does not own.
#[async_trait]
pub trait Node: Send + Sync {
    type Update: Into<NodeUpdate> + Send;

    fn role(&self) -> &'static str;

    async fn run(
        &self,
        state: &JobState,
        caps: &Capabilities,
    ) -> Result<Self::Update, NodeExecutionError>;
}
