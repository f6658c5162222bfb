use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Node;
use crate::capability::Capabilities;
use crate::config::CostConfig;
use crate::error::NodeExecutionError;
use crate::plan::TaskStatus;
use crate::state::JobState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostUpdate {
    pub estimated: f64,
}

/// Flat per-task cost estimate over every task that is not cancelled.
pub struct ResourceMonitor {
    cost: CostConfig,
}

impl ResourceMonitor {
    pub fn new(cost: CostConfig) -> Self {
        Self { cost }
    }

    pub fn estimate(&self, state: &JobState) -> f64 {
        let billable = state
            .plan
            .tasks()
            .iter()
            .filter(|t| t.status != TaskStatus::Cancelled)
            .count();
        billable as f64 * self.cost.per_task
    }
}

#[async_trait]
impl Node for ResourceMonitor {
    type Update = CostUpdate;

    fn role(&self) -> &'static str {
        "resource-monitor"
    }

    async fn run(
        &self,
        state: &JobState,
        _caps: &Capabilities,
    ) -> Result<CostUpdate, NodeExecutionError> {
        let estimated = self.estimate(state);
        if estimated > self.cost.warn_threshold {
            tracing::warn!(
                target: "taskweave.nodes",
                job_id = %state.job_id,
                estimated = estimated,
                threshold = self.cost.warn_threshold,
                "estimated cost exceeds threshold"
            );
        } else {
            tracing::info!(
                target: "taskweave.nodes",
                job_id = %state.job_id,
                estimated = estimated,
                "estimated cost"
            );
        }
        Ok(CostUpdate { estimated })
    }
}
